use chrono::{DateTime, Utc};
use semval::prelude::*;
use uuid::Uuid;

pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_ICON_LENGTH: usize = 10;

fn is_valid_color(color: &str) -> bool {
    let mut chars = color.chars();

    chars.next() == Some('#')
        && color.len() == 7
        && chars.all(|c| c.is_ascii_hexdigit())
}

/// A validated category that has not been persisted yet.
#[derive(Debug)]
pub struct NewCategory {
    name: String,
    icon: String,
    color: Option<String>,
    is_default: bool,
}

impl NewCategory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CategoryInvalidity {
    NameLength(usize),
    IconLength(usize),
    /// The color is not a `#RRGGBB` hex string.
    ColorFormat,
}

impl Validate for NewCategory {
    type Invalidity = CategoryInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .invalidate_if(
                self.name.is_empty() || self.name.len() > MAX_NAME_LENGTH,
                CategoryInvalidity::NameLength(MAX_NAME_LENGTH),
            )
            .invalidate_if(
                self.icon.is_empty() || self.icon.len() > MAX_ICON_LENGTH,
                CategoryInvalidity::IconLength(MAX_ICON_LENGTH),
            )
            .invalidate_if(
                self.color
                    .as_deref()
                    .map_or(false, |color| !is_valid_color(color)),
                CategoryInvalidity::ColorFormat,
            )
            .into()
    }
}

/// Unvalidated category data as received from a caller.
#[derive(Clone, Debug)]
pub struct NewCategoryData {
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
    pub is_default: bool,
}

impl ValidatedFrom<NewCategoryData> for NewCategory {
    fn validated_from(from: NewCategoryData) -> ValidatedResult<Self> {
        let into = NewCategory {
            name: from.name,
            icon: from.icon,
            color: from.color,
            is_default: from.is_default,
        };

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}

/// A validated set of changes to an existing category.
#[derive(Debug, Default)]
pub struct CategoryChanges {
    name: Option<String>,
    icon: Option<String>,
    color: Option<Option<String>>,
}

impl CategoryChanges {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    /// `Some(None)` clears the color, `None` leaves it untouched.
    pub fn color(&self) -> Option<Option<&str>> {
        self.color.as_ref().map(|color| color.as_deref())
    }
}

impl Validate for CategoryChanges {
    type Invalidity = CategoryInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .invalidate_if(
                self.name
                    .as_deref()
                    .map_or(false, |name| name.is_empty() || name.len() > MAX_NAME_LENGTH),
                CategoryInvalidity::NameLength(MAX_NAME_LENGTH),
            )
            .invalidate_if(
                self.icon
                    .as_deref()
                    .map_or(false, |icon| icon.is_empty() || icon.len() > MAX_ICON_LENGTH),
                CategoryInvalidity::IconLength(MAX_ICON_LENGTH),
            )
            .invalidate_if(
                self.color
                    .as_ref()
                    .and_then(|color| color.as_deref())
                    .map_or(false, |color| !is_valid_color(color)),
                CategoryInvalidity::ColorFormat,
            )
            .into()
    }
}

/// Unvalidated category changes as received from a caller.
#[derive(Clone, Debug, Default)]
pub struct CategoryChangesData {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<Option<String>>,
}

impl ValidatedFrom<CategoryChangesData> for CategoryChanges {
    fn validated_from(from: CategoryChangesData) -> ValidatedResult<Self> {
        let into = CategoryChanges {
            name: from.name,
            icon: from.icon,
            color: from.color,
        };

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}

/// A persisted expense category.
#[derive(Clone, Debug)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
