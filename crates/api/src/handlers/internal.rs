//! Operator endpoints: Prometheus scrape and the subscription sweep.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use picshare_domain::services::subscription::{sweep_subscriptions, SweepReport};

use crate::{extract::SuperAdmin, state::AppState};

use super::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub success: bool,
    pub expired: usize,
    pub warned: usize,
    pub failed: usize,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            success: true,
            expired: report.expired.len(),
            warned: report.warned.len(),
            failed: report.failed,
        }
    }
}

pub async fn metrics_handler(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(state.telemetry().render_metrics())
}

/// Internal listener variant; reachable only from the operator network.
pub async fn sweep_handler(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    run_sweep(&state).await
}

/// Public-listener variant, mounted only when no internal listener exists.
pub async fn guarded_sweep_handler(
    state: web::Data<AppState>,
    _auth: SuperAdmin,
) -> Result<HttpResponse, ApiError> {
    run_sweep(&state).await
}

async fn run_sweep(state: &AppState) -> Result<HttpResponse, ApiError> {
    let report = sweep_subscriptions(
        state.storage(),
        state.mailer(),
        &state.settings().base_url,
        Utc::now(),
    )
    .await?;
    info!(
        expired = report.expired.len(),
        warned = report.warned.len(),
        failed = report.failed,
        "subscription sweep finished"
    );
    Ok(HttpResponse::Ok().json(SweepResponse::from(report)))
}
