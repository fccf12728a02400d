use std::{ops::Deref, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

/// A cloneable handle to the application's Postgres connection pool.
#[derive(Clone)]
pub struct PostgresConnection(PgPool);

impl PostgresConnection {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }

    /// Open a new connection pool.
    ///
    /// # Arguments
    ///
    /// * `database_url` - Connection string for the database.
    /// * `pool_size` - The maximum number of connections held by the pool.
    /// * `timeout` - How long to wait when acquiring a connection.
    pub async fn connect(
        database_url: &str,
        pool_size: u32,
        timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(timeout)
            .connect(database_url)
            .await?;

        Ok(Self(pool))
    }
}

impl Deref for PostgresConnection {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
