use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER_ADMIN: &str = "super_admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: Option<String>,
    /// `None` for super-admins.
    pub tenant_id: Option<Uuid>,
    pub is_super_admin: bool,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl Admin {
    /// Whether this admin may act on `tenant_id`.
    pub fn can_manage(&self, tenant_id: Uuid) -> bool {
        self.is_super_admin || self.tenant_id == Some(tenant_id)
    }
}

/// Outcome of a delete that must leave at least one super-admin behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDeletion {
    Deleted,
    NotFound,
    LastSuperAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdmin {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub is_super_admin: bool,
    pub role: String,
}

impl NewAdmin {
    pub fn tenant_admin(
        tenant_id: Uuid,
        username: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            email: None,
            tenant_id: Some(tenant_id),
            is_super_admin: false,
            role: ROLE_ADMIN.to_string(),
        }
    }

    pub fn super_admin(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            email: None,
            tenant_id: None,
            is_super_admin: true,
            role: ROLE_SUPER_ADMIN.to_string(),
        }
    }
}
