use std::env;
use std::str::FromStr;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub nonce: NonceConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// How much a rejected request learns about why it was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDetail {
    /// Every credential failure looks the same to the caller.
    Generic,
    /// The failed check is named in the response.
    Detailed,
}

impl FromStr for ErrorDetail {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(ErrorDetail::Generic),
            "detailed" => Ok(ErrorDetail::Detailed),
            other => Err(AppError::Configuration(format!(
                "AUTH_ERROR_DETAIL must be 'generic' or 'detailed', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secrets_file: Option<String>,
    /// Inline `issuer=secret` pairs, comma separated.
    pub inline_secrets: Option<String>,
    pub secrets_reload_interval_secs: u64,
    pub error_detail: ErrorDetail,
    pub exp_leeway_secs: i64,
    pub require_nonce: bool,
}

// Inline secrets must never reach the logs through `{:?}`
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secrets_file", &self.secrets_file)
            .field("inline_secrets", &self.inline_secrets.as_ref().map(|_| "<redacted>"))
            .field("secrets_reload_interval_secs", &self.secrets_reload_interval_secs)
            .field("error_detail", &self.error_detail)
            .field("exp_leeway_secs", &self.exp_leeway_secs)
            .field("require_nonce", &self.require_nonce)
            .finish()
    }
}

/// Upper bound for `NONCE_TTL_SECS` and `NONCE_RETENTION_SECS` (30 days).
pub const MAX_NONCE_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceConfig {
    pub ttl_secs: i64,
    pub retention_secs: i64,
    pub purge_interval_secs: u64,
    pub max_outstanding: usize,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            retention_secs: 3600,
            purge_interval_secs: 60,
            max_outstanding: 100_000,
        }
    }
}

impl NonceConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ttl_secs <= 0 || self.purge_interval_secs == 0 || self.max_outstanding == 0 {
            return Err(AppError::Configuration(
                "NONCE_TTL_SECS, NONCE_PURGE_INTERVAL_SECS and NONCE_MAX_OUTSTANDING must be positive".to_string(),
            ));
        }
        if self.ttl_secs > MAX_NONCE_WINDOW_SECS || self.retention_secs > MAX_NONCE_WINDOW_SECS {
            return Err(AppError::Configuration(format!(
                "NONCE_TTL_SECS and NONCE_RETENTION_SECS must not exceed {} seconds",
                MAX_NONCE_WINDOW_SECS
            )));
        }
        if self.retention_secs < self.ttl_secs {
            return Err(AppError::Configuration(
                "NONCE_RETENTION_SECS must be at least NONCE_TTL_SECS".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, AppError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::Configuration(format!("{} must be a valid value", name)))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        // Server config
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| AppError::Configuration("SERVER_PORT must be a valid port number".to_string()))?;

        // CORS origins
        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth config
        let secrets_file = optional_var("ISSUER_SECRETS_FILE");
        let inline_secrets = optional_var("ISSUER_SECRETS");
        if secrets_file.is_none() && inline_secrets.is_none() {
            return Err(AppError::Configuration(
                "ISSUER_SECRETS_FILE or ISSUER_SECRETS must be set".to_string(),
            ));
        }

        let error_detail = env::var("AUTH_ERROR_DETAIL")
            .unwrap_or_else(|_| "generic".to_string())
            .parse::<ErrorDetail>()?;

        let exp_leeway_secs = parse_var::<i64>("AUTH_EXP_LEEWAY_SECS", "0")?;
        if exp_leeway_secs < 0 {
            return Err(AppError::Configuration("AUTH_EXP_LEEWAY_SECS must not be negative".to_string()));
        }

        // Nonce store
        let defaults = NonceConfig::default();
        let nonce = NonceConfig {
            ttl_secs: parse_var("NONCE_TTL_SECS", &defaults.ttl_secs.to_string())?,
            retention_secs: parse_var("NONCE_RETENTION_SECS", &defaults.retention_secs.to_string())?,
            purge_interval_secs: parse_var(
                "NONCE_PURGE_INTERVAL_SECS",
                &defaults.purge_interval_secs.to_string(),
            )?,
            max_outstanding: parse_var("NONCE_MAX_OUTSTANDING", &defaults.max_outstanding.to_string())?,
        };
        nonce.validate()?;

        Ok(Self {
            server: ServerConfig {
                host: server_host,
                port: server_port,
                cors_origins,
            },
            auth: AuthConfig {
                secrets_file,
                inline_secrets,
                secrets_reload_interval_secs: parse_var("SECRETS_RELOAD_INTERVAL_SECS", "0")?,
                error_detail,
                exp_leeway_secs,
                require_nonce: parse_var("AUTH_REQUIRE_NONCE", "false")?,
            },
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_parsing() {
        assert_eq!("generic".parse::<ErrorDetail>().unwrap(), ErrorDetail::Generic);
        assert_eq!(" Detailed ".parse::<ErrorDetail>().unwrap(), ErrorDetail::Detailed);
        assert!("verbose".parse::<ErrorDetail>().is_err());
    }

    #[test]
    fn test_auth_config_debug_redacts_inline_secrets() {
        let config = AuthConfig {
            secrets_file: None,
            inline_secrets: Some("acme=s3cr3t".to_string()),
            secrets_reload_interval_secs: 0,
            error_detail: ErrorDetail::Generic,
            exp_leeway_secs: 0,
            require_nonce: false,
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_nonce_defaults() {
        let defaults = NonceConfig::default();
        assert_eq!(defaults.ttl_secs, 300);
        assert!(defaults.retention_secs >= defaults.ttl_secs);
        assert!(defaults.validate().is_ok());
    }

    #[test]
    fn test_nonce_windows_are_bounded() {
        let huge_ttl = NonceConfig {
            ttl_secs: i64::MAX,
            retention_secs: i64::MAX,
            ..NonceConfig::default()
        };
        assert!(matches!(huge_ttl.validate(), Err(AppError::Configuration(_))));

        let huge_retention = NonceConfig {
            retention_secs: MAX_NONCE_WINDOW_SECS + 1,
            ..NonceConfig::default()
        };
        assert!(matches!(huge_retention.validate(), Err(AppError::Configuration(_))));

        let at_limit = NonceConfig {
            ttl_secs: MAX_NONCE_WINDOW_SECS,
            retention_secs: MAX_NONCE_WINDOW_SECS,
            ..NonceConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_nonce_config_rejects_inconsistent_values() {
        let zero_ttl = NonceConfig {
            ttl_secs: 0,
            ..NonceConfig::default()
        };
        assert!(zero_ttl.validate().is_err());

        let short_retention = NonceConfig {
            ttl_secs: 600,
            retention_secs: 60,
            ..NonceConfig::default()
        };
        assert!(short_retention.validate().is_err());
    }
}
