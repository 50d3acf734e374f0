//! Environment-driven configuration structures shared by all binaries.

use std::{env, path::PathBuf};

use thiserror::Error;

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_SUPABASE_BUCKET: &str = "tenant-images";
const DEFAULT_APP_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 1000;
const DEFAULT_UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Where uploaded originals and thumbnails are written. Chosen once at
/// startup; handlers only ever see the resulting `BlobStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobBackendConfig {
    Local {
        root: PathBuf,
    },
    Supabase {
        url: String,
        service_key: String,
        bucket: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// API configuration: listeners, database, third-party credentials and the
/// behavioural knobs the HTTP surface needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    jwt_secret: String,
    stripe_secret_key: String,
    stripe_webhook_secret: Option<String>,
    stripe_api_base: String,
    blob_backend: BlobBackendConfig,
    mailer: Option<MailerConfig>,
    app_base_url: String,
    verbose_errors: bool,
    expose_signup_credentials: bool,
    rate_limit_window_secs: u64,
    rate_limit_max_requests: u32,
    upload_max_bytes: usize,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            jwt_secret: get_required_var("JWT_SECRET")?,
            stripe_secret_key: get_required_var("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: get_optional_var("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: get_optional_var("STRIPE_API_BASE")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
            blob_backend: load_blob_backend()?,
            mailer: load_mailer(),
            app_base_url: get_optional_var("APP_BASE_URL")
                .unwrap_or_else(|| DEFAULT_APP_BASE_URL.to_string()),
            verbose_errors: get_bool_var("VERBOSE_ERRORS", false)?,
            expose_signup_credentials: get_bool_var("SIGNUP_EXPOSE_CREDENTIALS", false)?,
            rate_limit_window_secs: get_number_var(
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?,
            rate_limit_max_requests: get_number_var(
                "RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            )?,
            upload_max_bytes: get_number_var("UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES)?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn stripe_secret_key(&self) -> &str {
        &self.stripe_secret_key
    }

    pub fn stripe_webhook_secret(&self) -> Option<&str> {
        self.stripe_webhook_secret.as_deref()
    }

    pub fn stripe_api_base(&self) -> &str {
        &self.stripe_api_base
    }

    pub fn blob_backend(&self) -> &BlobBackendConfig {
        &self.blob_backend
    }

    pub fn mailer(&self) -> Option<&MailerConfig> {
        self.mailer.as_ref()
    }

    pub fn app_base_url(&self) -> &str {
        &self.app_base_url
    }

    pub fn verbose_errors(&self) -> bool {
        self.verbose_errors
    }

    pub fn expose_signup_credentials(&self) -> bool {
        self.expose_signup_credentials
    }

    pub fn rate_limit_window_secs(&self) -> u64 {
        self.rate_limit_window_secs
    }

    pub fn rate_limit_max_requests(&self) -> u32 {
        self.rate_limit_max_requests
    }

    pub fn upload_max_bytes(&self) -> usize {
        self.upload_max_bytes
    }
}

/// Minimal configuration for maintenance binaries that only talk to the
/// database (e.g. `create_super_admin`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    database_url: String,
}

impl DatabaseConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

fn load_blob_backend() -> Result<BlobBackendConfig, ConfigError> {
    let backend = get_optional_var("STORAGE_BACKEND").unwrap_or_else(|| "local".to_string());
    match backend.to_ascii_lowercase().as_str() {
        "local" => Ok(BlobBackendConfig::Local {
            root: PathBuf::from(
                get_optional_var("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
        }),
        "supabase" => Ok(BlobBackendConfig::Supabase {
            url: get_required_var("SUPABASE_URL")?,
            service_key: get_required_var("SUPABASE_SERVICE_ROLE_KEY")?,
            bucket: get_optional_var("SUPABASE_BUCKET")
                .unwrap_or_else(|| DEFAULT_SUPABASE_BUCKET.to_string()),
        }),
        _ => Err(ConfigError::InvalidChoice {
            key: "STORAGE_BACKEND",
            value: backend,
        }),
    }
}

fn load_mailer() -> Option<MailerConfig> {
    Some(MailerConfig {
        api_url: get_optional_var("EMAIL_API_URL")?,
        api_key: get_optional_var("EMAIL_API_KEY")?,
        from: get_optional_var("EMAIL_FROM")?,
    })
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match get_optional_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

fn get_bool_var(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match get_optional_var(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool { key, value: raw }),
        },
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("PICSHARE_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean in `{key}`: `{value}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("unsupported value `{value}` for `{key}`")]
    InvalidChoice { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    const OPTIONAL_KEYS: &[&str] = &[
        "API_UNIX_SOCKET",
        "API_INTERNAL_BIND_ADDRESS",
        "API_INTERNAL_UNIX_SOCKET",
        "STRIPE_WEBHOOK_SECRET",
        "STRIPE_API_BASE",
        "STORAGE_BACKEND",
        "UPLOAD_DIR",
        "SUPABASE_URL",
        "SUPABASE_SERVICE_ROLE_KEY",
        "SUPABASE_BUCKET",
        "EMAIL_API_URL",
        "EMAIL_API_KEY",
        "EMAIL_FROM",
        "APP_BASE_URL",
        "VERBOSE_ERRORS",
        "SIGNUP_EXPOSE_CREDENTIALS",
        "RATE_LIMIT_WINDOW_SECS",
        "RATE_LIMIT_MAX_REQUESTS",
        "UPLOAD_MAX_BYTES",
    ];

    fn set_env() {
        std::env::set_var("PICSHARE_SKIP_DOTENV", "1");
        std::env::set_var("DATABASE_URL", "sqlite://test.db");
        std::env::set_var("API_BIND_ADDRESS", "127.0.0.1:8080");
        std::env::set_var("JWT_SECRET", "test-secret");
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_123");
        for key in OPTIONAL_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn api_config_applies_defaults() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();

        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), "sqlite://test.db");
        assert_eq!(config.stripe_api_base(), DEFAULT_STRIPE_API_BASE);
        assert_eq!(
            config.blob_backend(),
            &BlobBackendConfig::Local {
                root: PathBuf::from("uploads")
            }
        );
        assert!(config.mailer().is_none());
        assert!(!config.verbose_errors());
        assert!(!config.has_internal_listener());
        assert_eq!(config.rate_limit_window_secs(), 900);
        assert_eq!(config.rate_limit_max_requests(), 1000);
        assert_eq!(config.upload_max_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn api_config_supports_unix_and_internal_listeners() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("API_UNIX_SOCKET", "/tmp/api.sock");
        std::env::set_var("API_INTERNAL_BIND_ADDRESS", "127.0.0.1:9090");
        std::env::set_var("API_INTERNAL_UNIX_SOCKET", "/tmp/api-internal.sock");

        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.api_unix_socket(), Some("/tmp/api.sock"));
        assert_eq!(config.internal_bind_address(), Some("127.0.0.1:9090"));
        assert_eq!(
            config.internal_unix_socket(),
            Some("/tmp/api-internal.sock")
        );
        assert!(config.has_internal_listener());

        set_env();
    }

    #[test]
    fn required_env_vars_are_trimmed() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("DATABASE_URL", "  sqlite://trim.db  ");
        std::env::set_var("API_BIND_ADDRESS", " 127.0.0.1:8081 ");

        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), "sqlite://trim.db");
        assert_eq!(config.api_bind_address(), "127.0.0.1:8081");

        set_env();
    }

    #[test]
    fn empty_required_env_var_is_treated_as_missing() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("JWT_SECRET", "   ");

        let err = ApiConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { key: "JWT_SECRET" }));

        set_env();
    }

    #[test]
    fn supabase_backend_requires_credentials() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("STORAGE_BACKEND", "supabase");

        let err = ApiConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingVar {
                key: "SUPABASE_URL"
            }
        ));

        std::env::set_var("SUPABASE_URL", "https://project.supabase.co");
        std::env::set_var("SUPABASE_SERVICE_ROLE_KEY", "service-key");
        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(
            config.blob_backend(),
            &BlobBackendConfig::Supabase {
                url: "https://project.supabase.co".into(),
                service_key: "service-key".into(),
                bucket: "tenant-images".into(),
            }
        );

        set_env();
    }

    #[test]
    fn unknown_storage_backend_is_rejected() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("STORAGE_BACKEND", "s3");

        let err = ApiConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidChoice {
                key: "STORAGE_BACKEND",
                ..
            }
        ));

        set_env();
    }

    #[test]
    fn flags_and_numbers_are_parsed() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        std::env::set_var("VERBOSE_ERRORS", "true");
        std::env::set_var("RATE_LIMIT_MAX_REQUESTS", "25");
        std::env::set_var("EMAIL_API_URL", "https://mail.example/send");
        std::env::set_var("EMAIL_API_KEY", "key");
        std::env::set_var("EMAIL_FROM", "noreply@example.com");

        let config = ApiConfig::load_from_env().expect("config loads");
        assert!(config.verbose_errors());
        assert_eq!(config.rate_limit_max_requests(), 25);
        assert_eq!(
            config.mailer().map(|m| m.from.as_str()),
            Some("noreply@example.com")
        );

        std::env::set_var("VERBOSE_ERRORS", "maybe");
        let err = ApiConfig::load_from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidBool {
                key: "VERBOSE_ERRORS",
                ..
            }
        ));

        set_env();
    }
}
