//! Configuration system for serialdesk.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `SERIALDESK_SERVER_HOST` - Server bind address
//! - `SERIALDESK_SERVER_PORT` - Server port
//! - `SERIALDESK_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `SERIALDESK_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `SERIALDESK_LOGGING_ENABLED` - Enable request logging
//! - `SERIALDESK_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `SERIALDESK_AUTH_ENABLED` - Require Basic credentials on data endpoints
//! - `SERIALDESK_AUTH_USERNAME` / `SERIALDESK_AUTH_PASSWORD` - Panel credentials
//! - `SERIALDESK_SELLAUTH_ENABLED` - Push new serials to the storefront
//! - `SERIALDESK_SELLAUTH_BASE_URL` - Storefront API base URL
//! - `SERIALDESK_SELLAUTH_SHOP_ID` - Storefront shop id
//! - `SERIALDESK_SELLAUTH_API_TOKEN` - Storefront bearer token
//!
//! # Storefront variants
//!
//! ```toml
//! [sellauth.variants.week]
//! product_id = "211190"
//! variant_id = "263237"
//! ```

use config::Config;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};
use crate::lifecycle::LicenseKind;

/// Global configuration singleton.
static CONFIG: OnceLock<PanelConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Panel credential configuration
    pub auth: AuthConfig,
    /// Storefront inventory sync configuration
    pub sellauth: SellAuthConfig,
    /// List endpoint limits
    pub listing: ListingConfig,
    /// Serial/coupon generation
    pub generator: GeneratorConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://serialdesk.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/serialdesk".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable per-request logging middleware
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Panel credential configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require HTTP Basic credentials on data endpoints
    pub enabled: bool,
    /// Username (use `env:VAR_NAME` to read from environment)
    pub username: String,
    /// Password (use `env:VAR_NAME` to read from environment)
    pub password: String,
}

/// Storefront product/variant pair that receives serials of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantConfig {
    pub product_id: String,
    pub variant_id: String,
}

impl VariantConfig {
    fn new(product_id: &str, variant_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            variant_id: variant_id.to_string(),
        }
    }
}

/// SellAuth storefront configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SellAuthConfig {
    /// Push newly created serials to the storefront
    pub enabled: bool,
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Shop identifier
    pub shop_id: String,
    /// Bearer token (use `env:VAR_NAME` to read from environment)
    pub api_token: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Drop serials already present remotely before overwriting
    pub deduplicate: bool,
    /// Product/variant per license kind, keyed by `LicenseKind::config_key`
    pub variants: HashMap<String, VariantConfig>,
}

impl Default for SellAuthConfig {
    fn default() -> Self {
        let variants = HashMap::from([
            ("week".to_string(), VariantConfig::new("211190", "263237")),
            ("month".to_string(), VariantConfig::new("204272", "251890")),
            ("lifetime".to_string(), VariantConfig::new("204274", "251892")),
            (
                "lifetime_pro".to_string(),
                VariantConfig::new("320628", "441430"),
            ),
        ]);

        Self {
            enabled: false,
            base_url: "https://api.sellauth.com/v1".to_string(),
            shop_id: String::new(),
            api_token: String::new(),
            timeout_secs: 30,
            deduplicate: false,
            variants,
        }
    }
}

impl SellAuthConfig {
    /// Configured storefront variant for a license kind.
    pub fn variant_for(&self, kind: LicenseKind) -> Option<&VariantConfig> {
        self.variants.get(kind.config_key())
    }
}

/// Limits for the list endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Most-recent rows per table returned by the bounded list
    pub bounded_limit: u32,
    /// Page size used by the unbounded export
    pub page_size: u32,
    /// Safety cap on pages read by the unbounded export
    pub max_pages: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            bounded_limit: 1000,
            page_size: 5000,
            max_pages: 200,
        }
    }
}

/// Serial and coupon generation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Characters per generated serial
    pub serial_length: u8,
    /// Fixed coupon prefix
    pub coupon_prefix: String,
    /// Random characters after the coupon prefix
    pub coupon_length: u8,
    /// Maximum licenses per generate request
    pub max_batch: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            serial_length: 15,
            coupon_prefix: "PURGE".to_string(),
            coupon_length: 5,
            max_batch: 1000,
        }
    }
}

/// Resolve `env:VAR_NAME` indirection for secrets.
pub fn resolve_secret(value: &str) -> LicenseResult<String> {
    match value.strip_prefix("env:") {
        Some(var) => env::var(var).map_err(|_| {
            LicenseError::ConfigError(format!("environment variable {var} is not set"))
        }),
        None => Ok(value.to_string()),
    }
}

impl PanelConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    fn load() -> LicenseResult<Self> {
        let builder = Config::builder()
            // Load from config.toml (optional); struct defaults fill the rest
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("SERIALDESK_SERVER_HOST").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("SERIALDESK_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.db_type",
                env::var("SERIALDESK_DATABASE_TYPE").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("SERIALDESK_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("SERIALDESK_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "logging.enabled",
                env::var("SERIALDESK_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("SERIALDESK_LOG_LEVEL").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "auth.enabled",
                env::var("SERIALDESK_AUTH_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("auth.username", env::var("SERIALDESK_AUTH_USERNAME").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("auth.password", env::var("SERIALDESK_AUTH_PASSWORD").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sellauth.enabled",
                env::var("SERIALDESK_SELLAUTH_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sellauth.base_url",
                env::var("SERIALDESK_SELLAUTH_BASE_URL").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sellauth.shop_id",
                env::var("SERIALDESK_SELLAUTH_SHOP_ID").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sellauth.api_token",
                env::var("SERIALDESK_SELLAUTH_API_TOKEN").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.auth.enabled && (self.auth.username.is_empty() || self.auth.password.is_empty()) {
            return Err(LicenseError::ConfigError(
                "auth.username and auth.password are required when auth.enabled is true"
                    .to_string(),
            ));
        }

        if self.sellauth.enabled {
            if self.sellauth.shop_id.is_empty() {
                return Err(LicenseError::ConfigError(
                    "sellauth.shop_id is required when sellauth.enabled is true".to_string(),
                ));
            }
            if self.sellauth.api_token.is_empty() {
                return Err(LicenseError::ConfigError(
                    "sellauth.api_token is required when sellauth.enabled is true".to_string(),
                ));
            }
        }

        if self.listing.bounded_limit == 0
            || self.listing.page_size == 0
            || self.listing.max_pages == 0
        {
            return Err(LicenseError::ConfigError(
                "listing limits must be greater than 0".to_string(),
            ));
        }

        if self.generator.serial_length == 0 || self.generator.coupon_length == 0 {
            return Err(LicenseError::ConfigError(
                "generator lengths must be greater than 0".to_string(),
            ));
        }

        if self.generator.max_batch == 0 {
            return Err(LicenseError::ConfigError(
                "generator.max_batch must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static PanelConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = PanelConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PanelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listing.bounded_limit, 1000);
        assert_eq!(config.listing.page_size, 5000);
        assert_eq!(config.listing.max_pages, 200);
        assert!(!config.sellauth.enabled);
    }

    #[test]
    fn every_kind_has_a_default_variant() {
        let config = SellAuthConfig::default();
        for kind in LicenseKind::ALL {
            assert!(config.variant_for(kind).is_some(), "missing variant for {kind}");
        }
        assert_eq!(
            config.variant_for(LicenseKind::LifetimePro),
            Some(&VariantConfig::new("320628", "441430"))
        );
    }

    #[test]
    fn auth_requires_credentials() {
        let mut config = PanelConfig::default();
        config.auth.enabled = true;
        assert!(config.validate().is_err());

        config.auth.username = "admin".to_string();
        config.auth.password = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sellauth_requires_shop_and_token() {
        let mut config = PanelConfig::default();
        config.sellauth.enabled = true;
        assert!(config.validate().is_err());

        config.sellauth.shop_id = "121539".to_string();
        assert!(config.validate().is_err());

        config.sellauth.api_token = "token".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_database_type() {
        let mut config = PanelConfig::default();
        config.database.db_type = "mysql".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("db_type"));
    }

    #[test]
    fn rejects_zero_listing_limits() {
        let mut config = PanelConfig::default();
        config.listing.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_secret_passes_literals_through() {
        assert_eq!(resolve_secret("plain").unwrap(), "plain");
        assert!(resolve_secret("env:SERIALDESK_SURELY_UNSET_VARIABLE").is_err());
    }
}
