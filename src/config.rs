//! Application configuration module
//! Handles environment variable loading, configuration validation, and
//! gateway (Daraja) settings.

use serde::Serialize;
use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub daraja: DarajaConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Gateway environment; selects the base host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DarajaEnvironment {
    Sandbox,
    Production,
}

/// Daraja (M-Pesa) gateway configuration.
///
/// Held behind an `Arc` by the gateway client; runtime reconfiguration swaps
/// the whole value and invalidates the cached token rather than mutating
/// fields in place.
#[derive(Debug, Clone)]
pub struct DarajaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub business_short_code: String,
    pub till_number: Option<String>,
    pub paybill_number: Option<String>,
    pub passkey: String,
    pub environment: DarajaEnvironment,
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Sanitized view of the gateway configuration, safe to return from the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DarajaConfigSummary {
    pub business_short_code: String,
    pub till_number: Option<String>,
    pub paybill_number: Option<String>,
    pub environment: DarajaEnvironment,
    pub account_reference: String,
    pub transaction_desc: String,
    pub is_configured: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            daraja: DarajaConfig::from_env(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }
        Ok(())
    }
}

impl DarajaConfig {
    /// Loads whatever is present; completeness is checked by `validate`,
    /// which reports missing fields instead of failing startup. The service
    /// can run with an unconfigured gateway (cash recording still works).
    pub fn from_env() -> Self {
        let non_empty = |v: Result<String, env::VarError>| v.ok().filter(|s| !s.trim().is_empty());

        DarajaConfig {
            consumer_key: env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            business_short_code: env::var("MPESA_BUSINESS_SHORTCODE")
                .unwrap_or_else(|_| "174379".to_string()),
            till_number: non_empty(env::var("MPESA_TILL_NUMBER")),
            paybill_number: non_empty(env::var("MPESA_PAYBILL_NUMBER")),
            passkey: env::var("MPESA_PASSKEY").unwrap_or_default(),
            environment: match env::var("MPESA_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".to_string())
                .to_lowercase()
                .as_str()
            {
                "production" => DarajaEnvironment::Production,
                _ => DarajaEnvironment::Sandbox,
            },
            callback_url: env::var("MPESA_CALLBACK_URL").unwrap_or_default(),
            account_reference: env::var("MPESA_ACCOUNT_REFERENCE")
                .unwrap_or_else(|_| "CLINIC".to_string()),
            transaction_desc: env::var("MPESA_TRANSACTION_DESC")
                .unwrap_or_else(|_| "Medical Services Payment".to_string()),
            timeout_secs: env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: env::var("MPESA_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self.environment {
            DarajaEnvironment::Production => "https://api.safaricom.co.ke",
            DarajaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
        }
    }

    /// Returns the list of missing required fields; empty means configured.
    pub fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.consumer_key.trim().is_empty() {
            missing.push("consumerKey".to_string());
        }
        if self.consumer_secret.trim().is_empty() {
            missing.push("consumerSecret".to_string());
        }
        if self.business_short_code.trim().is_empty() {
            missing.push("businessShortCode".to_string());
        }
        if self.till_number.is_none() && self.paybill_number.is_none() {
            missing.push("tillNumber or paybillNumber".to_string());
        }
        if self.passkey.trim().is_empty() {
            missing.push("passkey".to_string());
        }
        if self.callback_url.trim().is_empty() {
            missing.push("callbackUrl".to_string());
        }
        missing
    }

    pub fn summary(&self) -> DarajaConfigSummary {
        DarajaConfigSummary {
            business_short_code: self.business_short_code.clone(),
            till_number: self.till_number.clone(),
            paybill_number: self.paybill_number.clone(),
            environment: self.environment,
            account_reference: self.account_reference.clone(),
            transaction_desc: self.transaction_desc.clone(),
            is_configured: self.validate().is_empty(),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
