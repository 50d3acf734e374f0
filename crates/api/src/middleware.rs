use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web::Data,
    Error, HttpResponse,
};
use chrono::Utc;
use picshare_domain::services::rate_limit::RateDecision;
use tracing::debug;

use crate::{extract::client_ip, handlers::ApiError, state::AppState};

/// Fixed-window limit per client address and path.
pub async fn rate_limit<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some(state) = req.app_data::<Data<AppState>>().cloned() else {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    };

    let ip = client_ip(req.request());
    let path = req.path().to_string();
    match state.limiter().check(&ip, &path, Utc::now()).await {
        RateDecision::Allowed { .. } => {
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        RateDecision::Limited { retry_after_secs } => {
            debug!(%ip, %path, retry_after_secs, "request rate limited");
            let response = HttpResponse::from_error(ApiError::RateLimited {
                retry_after: retry_after_secs,
            });
            Ok(req.into_response(response).map_into_right_body())
        }
    }
}
