use std::{env, net::SocketAddr, sync::Arc};

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

const DEFAULT_LOG_FILTER: &str = "info";

/// Shared observability options for binaries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    /// Loads telemetry knobs from optional environment variables prefixed with
    /// `<PREFIX>_`, e.g. `API_LOG_FILTER`. Missing entries fall back to
    /// defaults so binaries boot without extra configuration.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();
        let log_key = format!("{upper}_LOG_FILTER");
        let metrics_key = format!("{upper}_METRICS_ADDRESS");

        let log_filter = env::var(log_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let metrics_address = env::var(metrics_key).ok().and_then(|value| {
            if value.trim().is_empty() {
                None
            } else {
                Some(value)
            }
        });

        Self {
            log_filter,
            metrics_address,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }
}

/// Guard returned after telemetry initialization.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Wires up tracing and the Prometheus recorder once per process. Later calls
/// reuse the installed recorder.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = install_metrics(config)?;

    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_metrics(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let mut builder = PrometheusBuilder::new();
            if let Some(addr) = config.metrics_address() {
                let socket: SocketAddr =
                    addr.parse().map_err(|err: std::net::AddrParseError| {
                        TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
                    })?;
                builder = builder.with_http_listener(socket);
            }

            let handle = builder
                .install_recorder()
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            describe_counters();
            Ok(Arc::new(handle))
        })
        .cloned()
}

/// Help text for the counters emitted across the workspace. Labels are
/// attached at the call sites.
fn describe_counters() {
    const COUNTERS: &[(&str, &str)] = &[
        ("signup_requests_total", "Signup attempts by path and result."),
        ("signup_compensation_failures_total", "Rollback steps that failed after a partial signup."),
        ("upload_requests_total", "Guest uploads by result."),
        ("upload_gate_total", "Per-upload payment verifications by outcome."),
        ("quota_checks_total", "Upload quota decisions by result."),
        ("subscription_guard_total", "Subscription guard decisions on upload paths."),
        ("subscription_sweep_expired_total", "Subscriptions expired by the sweep."),
        ("subscription_sweep_warned_total", "Expiry warnings sent by the sweep."),
        ("moderation_actions_total", "Admin moderation actions by kind and result."),
        ("engagement_events_total", "Likes and comments recorded."),
        ("admin_logins_total", "Admin login attempts by result."),
        ("rate_limit_rejections_total", "Requests refused by the rate limiter."),
        ("webhook_requests_total", "Payment webhooks received by result."),
        ("webhook_events_total", "Verified webhook events by type and result."),
        ("stripe_requests_total", "Calls to the payment provider by operation and result."),
        ("emails_sent_total", "Outgoing emails by kind and result."),
    ];
    for (name, help) in COUNTERS {
        describe_counter!(*name, *help);
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn telemetry_config_uses_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("PICSHARE_SKIP_DOTENV", "1");
        env::remove_var("TELEMETRY_TEST_LOG_FILTER");
        env::remove_var("TELEMETRY_TEST_METRICS_ADDRESS");

        let cfg = TelemetryConfig::from_env("telemetry_test");
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.metrics_address(), None);
    }

    #[test]
    fn telemetry_config_reads_env() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("PICSHARE_SKIP_DOTENV", "1");
        env::set_var("TELEMETRY_TEST_LOG_FILTER", "debug");
        env::set_var("TELEMETRY_TEST_METRICS_ADDRESS", "127.0.0.1:9898");

        let cfg = TelemetryConfig::from_env("TELEMETRY_TEST");
        assert_eq!(cfg.log_filter(), "debug");
        assert_eq!(cfg.metrics_address(), Some("127.0.0.1:9898"));

        env::remove_var("TELEMETRY_TEST_LOG_FILTER");
        env::remove_var("TELEMETRY_TEST_METRICS_ADDRESS");
    }

    #[test]
    fn empty_metrics_address_is_treated_as_none() {
        let _guard = ENV_GUARD.lock().unwrap();
        env::set_var("PICSHARE_SKIP_DOTENV", "1");
        env::set_var("TELEMETRY_TEST_METRICS_ADDRESS", "  ");

        let cfg = TelemetryConfig::from_env("TELEMETRY_TEST");
        assert_eq!(cfg.metrics_address(), None);

        env::remove_var("TELEMETRY_TEST_METRICS_ADDRESS");
    }
}
