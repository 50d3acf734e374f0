use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Minimum accepted slug length.
pub const MIN_SLUG_LENGTH: usize = 3;
pub const DEFAULT_DISPLAY_DURATION: i32 = 10;
pub const DEFAULT_IMAGE_EXPIRY_HOURS: i32 = 1;
pub const DEFAULT_CURRENCY: &str = "thb";

/// Errors emitted when a tenant slug fails validation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug may only contain lowercase letters, digits and hyphens")]
    InvalidFormat,
    #[error("slug must be at least {MIN_SLUG_LENGTH} characters")]
    TooShort,
}

impl SlugError {
    /// Stable machine-readable reason returned by the slug availability check.
    pub fn reason(&self) -> &'static str {
        match self {
            SlugError::InvalidFormat => "invalid_format",
            SlugError::TooShort => "too_short",
        }
    }
}

/// Validates that the slug matches `^[a-z0-9-]+$` and is long enough. The
/// format check runs first, so an empty slug reports `InvalidFormat`.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    let well_formed = !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !well_formed {
        return Err(SlugError::InvalidFormat);
    }

    if slug.len() < MIN_SLUG_LENGTH {
        return Err(SlugError::TooShort);
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    pub is_active: bool,
    pub is_public: bool,
    pub payment_enabled: bool,
    pub price_amount: i64,
    pub price_currency: String,
    pub display_duration: i32,
    pub image_expiry_hours: i32,
    pub max_images_per_user: Option<i32>,
    pub theme_settings: Value,
    pub display_settings: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTenant {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    pub is_active: bool,
    pub payment_enabled: bool,
    pub price_amount: i64,
    pub price_currency: String,
}

impl NewTenant {
    /// Active tenant with payments disabled, the shape every signup path starts from.
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            description: None,
            owner_email: None,
            owner_phone: None,
            is_active: true,
            payment_enabled: false,
            price_amount: 0,
            price_currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Partial update applied by admin settings and super-admin edits. `None`
/// leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TenantUpdate {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner_email: Option<String>,
    pub owner_phone: Option<String>,
    pub is_active: Option<bool>,
    pub is_public: Option<bool>,
    pub payment_enabled: Option<bool>,
    pub price_amount: Option<i64>,
    pub price_currency: Option<String>,
    pub display_duration: Option<i32>,
    pub image_expiry_hours: Option<i32>,
    pub max_images_per_user: Option<i32>,
    pub theme_settings: Option<Value>,
    pub display_settings: Option<Value>,
}

impl TenantUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules_check_format_before_length() {
        assert_eq!(validate_slug("test-event"), Ok(()));
        assert_eq!(validate_slug("abc"), Ok(()));
        assert_eq!(validate_slug("ab"), Err(SlugError::TooShort));
        assert_eq!(validate_slug(""), Err(SlugError::InvalidFormat));
        assert_eq!(validate_slug("AB"), Err(SlugError::InvalidFormat));
        assert_eq!(validate_slug("Test-Event"), Err(SlugError::InvalidFormat));
        assert_eq!(validate_slug("with space"), Err(SlugError::InvalidFormat));
        assert_eq!(validate_slug("under_score"), Err(SlugError::InvalidFormat));
        assert_eq!(validate_slug("ไทย"), Err(SlugError::InvalidFormat));
    }

    #[test]
    fn slug_error_reasons_are_stable() {
        assert_eq!(SlugError::InvalidFormat.reason(), "invalid_format");
        assert_eq!(SlugError::TooShort.reason(), "too_short");
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(TenantUpdate::default().is_empty());
        let update = TenantUpdate {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
