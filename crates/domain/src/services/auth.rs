//! HS256 admin session tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::Admin;

pub const ADMIN_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims carried by every admin token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: Uuid,
    pub username: String,
    pub tenant_id: Option<Uuid>,
    pub is_super_admin: bool,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl AdminClaims {
    pub fn can_manage(&self, tenant_id: Uuid) -> bool {
        self.is_super_admin || self.tenant_id == Some(tenant_id)
    }
}

#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ADMIN_TOKEN_TTL_HOURS),
        }
    }

    pub fn issue(&self, admin: &Admin, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = AdminClaims {
            sub: admin.id,
            username: admin.username.clone(),
            tenant_id: admin.tenant_id,
            is_super_admin: admin.is_super_admin,
            role: admin.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<AdminClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        jsonwebtoken::decode::<AdminClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewAdmin;

    fn admin(tenant_id: Option<Uuid>) -> Admin {
        let template = match tenant_id {
            Some(id) => NewAdmin::tenant_admin(id, "owner_ab12", "hash"),
            None => NewAdmin::super_admin("root", "hash"),
        };
        Admin {
            id: Uuid::new_v4(),
            username: template.username,
            password_hash: template.password_hash,
            email: None,
            tenant_id: template.tenant_id,
            is_super_admin: template.is_super_admin,
            role: template.role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let authority = TokenAuthority::new("secret");
        let tenant_id = Uuid::new_v4();
        let admin = admin(Some(tenant_id));

        let token = authority.issue(&admin, Utc::now()).unwrap();
        let claims = authority.verify(&token).unwrap();
        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.tenant_id, Some(tenant_id));
        assert_eq!(claims.exp - claims.iat, ADMIN_TOKEN_TTL_HOURS * 3600);
        assert!(claims.can_manage(tenant_id));
        assert!(!claims.can_manage(Uuid::new_v4()));
    }

    #[test]
    fn super_admin_can_manage_any_tenant() {
        let authority = TokenAuthority::new("secret");
        let token = authority.issue(&admin(None), Utc::now()).unwrap();
        let claims = authority.verify(&token).unwrap();
        assert!(claims.is_super_admin);
        assert!(claims.can_manage(Uuid::new_v4()));
    }

    #[test]
    fn rejects_foreign_signature_and_expired_tokens() {
        let authority = TokenAuthority::new("secret");
        let other = TokenAuthority::new("other-secret");
        let token = other.issue(&admin(None), Utc::now()).unwrap();
        assert!(matches!(authority.verify(&token), Err(TokenError::Invalid(_))));

        let stale = authority
            .issue(&admin(None), Utc::now() - Duration::hours(48))
            .unwrap();
        assert_eq!(authority.verify(&stale), Err(TokenError::Expired));
    }
}
