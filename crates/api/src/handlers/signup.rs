//! Public onboarding: plan catalog, slug checks and both signup paths.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use picshare_domain::model::SubscriptionStatus;
use picshare_domain::services::signup::{
    check_slug_availability, CompleteSignupRequest, SignupOutcome, SignupPayment, SignupRequest,
    SignupService,
};
use picshare_domain::storage::PlanStore;
use picshare_storage::SeaOrmStorage;

use crate::state::AppState;

use super::{success, ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct TenantSummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub plan: String,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub success: bool,
    pub tenant: TenantSummary,
    pub subscription: SubscriptionSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsBody>,
}

impl SignupResponse {
    fn from_outcome(outcome: SignupOutcome, expose_credentials: bool) -> Self {
        let SignupOutcome {
            tenant,
            subscription,
            plan,
            credentials,
        } = outcome;
        Self {
            success: true,
            tenant: TenantSummary {
                id: tenant.id,
                slug: tenant.slug,
                name: tenant.name,
            },
            subscription: SubscriptionSummary {
                plan: plan.key,
                status: subscription.status,
                current_period_end: subscription.current_period_end,
            },
            credentials: expose_credentials.then(|| CredentialsBody {
                username: credentials.username,
                password: credentials.password,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupPaymentResponse {
    pub success: bool,
    #[serde(flatten)]
    pub payment: SignupPayment,
}

fn signup_service(state: &AppState) -> SignupService<'_, SeaOrmStorage> {
    SignupService::new(
        state.storage(),
        state.gateway(),
        state.mailer(),
        &state.settings().base_url,
    )
}

pub async fn plans_handler(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let plans = state.storage().list_plans().await?;
    Ok(success(plans))
}

pub async fn check_slug_handler(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let availability = check_slug_availability(state.storage(), &slug).await?;
    Ok(HttpResponse::Ok().json(availability))
}

pub async fn trial_signup_handler(
    state: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = signup_service(&state)
        .create_trial(&payload, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(SignupResponse::from_outcome(
        outcome,
        state.settings().expose_signup_credentials,
    )))
}

pub async fn create_signup_payment_handler(
    state: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let payment = signup_service(&state)
        .create_payment_intent(&payload)
        .await?;
    Ok(HttpResponse::Ok().json(SignupPaymentResponse {
        success: true,
        payment,
    }))
}

pub async fn complete_signup_handler(
    state: web::Data<AppState>,
    payload: web::Json<CompleteSignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = signup_service(&state)
        .complete(&payload, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(SignupResponse::from_outcome(
        outcome,
        state.settings().expose_signup_credentials,
    )))
}
