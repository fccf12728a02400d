use anyhow::Result;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::http_err::ApiError;

/// An authenticated caller, parsed from the private `session` cookie.
///
/// Session issuance (credential checks, cookie creation) is handled outside
/// this service. The cookie payload only has to be decryptable with the
/// shared secret key and contain a session ID and user ID.
#[derive(Debug, Deserialize, Serialize)]
pub struct Session {
    id: Uuid,
    user_id: Uuid,
}

impl Session {
    /// Create a new session for a specific user.
    ///
    /// # Example
    ///
    /// ```
    /// # use uuid::Uuid;
    /// # use spendbook_api::authentication::Session;
    ///
    /// let user_id = Uuid::new_v4();
    /// let session = Session::new_for_user(user_id);
    ///
    /// assert_eq!(user_id, session.user_id());
    /// ```
    pub fn new_for_user(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
        }
    }

    pub fn serialized(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Session
where
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookies = PrivateCookieJar::<Key>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        let session_cookie = cookies.get("session").ok_or(ApiError::Unauthorized)?;

        match serde_json::from_str::<Session>(session_cookie.value()) {
            Ok(session) => {
                debug!(user_id = %session.user_id(), session_id = %session.id(), "Parsed cookie session.");

                Ok(session)
            }
            Err(error) => {
                warn!(?error, "Received malformed session value.");

                Err(ApiError::Unauthorized)
            }
        }
    }
}
