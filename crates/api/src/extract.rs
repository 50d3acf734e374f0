//! Request extractors for admin bearer tokens and guest session identity.

use actix_web::{
    dev::Payload, http::header, web::Data, FromRequest, HttpRequest,
};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use picshare_domain::model::Tenant;
use picshare_domain::services::{auth::AdminClaims, session::derive_session_id};

use crate::{handlers::ApiError, state::AppState};

/// A verified admin token. Tenant scoping is checked per route with
/// [`AdminAuth::require_tenant`].
#[derive(Debug, Clone)]
pub struct AdminAuth(pub AdminClaims);

impl AdminAuth {
    pub fn admin_id(&self) -> Uuid {
        self.0.sub
    }

    pub fn require_tenant(&self, tenant: &Tenant) -> Result<(), ApiError> {
        if self.0.can_manage(tenant.id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Access denied to this tenant".into()))
        }
    }
}

impl FromRequest for AdminAuth {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).map(AdminAuth))
    }
}

/// Admin token that must belong to a super-admin.
#[derive(Debug, Clone)]
pub struct SuperAdmin(pub AdminClaims);

impl FromRequest for SuperAdmin {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req).and_then(|claims| {
            if claims.is_super_admin {
                Ok(SuperAdmin(claims))
            } else {
                Err(ApiError::Forbidden("Super admin access required".into()))
            }
        }))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AdminClaims, ApiError> {
    let state = req
        .app_data::<Data<AppState>>()
        .ok_or_else(|| ApiError::Dependency("application state missing".into()))?;
    let token = bearer_token(req).ok_or_else(|| ApiError::Auth("Access token required".into()))?;
    Ok(state.tokens().verify(token)?)
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

/// Guest session for likes and comments: the supplied id, or a fingerprint of
/// the client address and user agent.
pub fn session_id(req: &HttpRequest, supplied: Option<&str>) -> String {
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    derive_session_id(supplied, &client_ip(req), user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_prefix_is_required() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc.def"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer   "))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn session_prefers_supplied_id() {
        let req = TestRequest::default()
            .insert_header((header::USER_AGENT, "agent"))
            .peer_addr("10.1.2.3:4567".parse().unwrap())
            .to_http_request();
        assert_eq!(session_id(&req, Some("abc")), "abc");
        let fingerprint = session_id(&req, None);
        assert_eq!(fingerprint, derive_session_id(None, "10.1.2.3", "agent"));
    }
}
