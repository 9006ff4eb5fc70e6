use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::services::procurement::ProcurementSettings;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_DATABASE_URL: &str = "sqlite://material_ledger.db?mode=rwc";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 1000))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Prefix of generated vendor PO numbers (`{prefix}-000001`)
    #[serde(default = "default_po_number_prefix")]
    #[validate(custom = "validate_document_prefix")]
    pub po_number_prefix: String,

    /// Prefix of PO numbers synthesized for direct receipts
    #[serde(default = "default_direct_receipt_po_prefix")]
    #[validate(custom = "validate_document_prefix")]
    pub direct_receipt_po_prefix: String,

    /// Prefix of generated GRN numbers
    #[serde(default = "default_grn_number_prefix")]
    #[validate(custom = "validate_document_prefix")]
    pub grn_number_prefix: String,

    /// Prefix of invoice numbers generated when a PO is sent without one
    #[serde(default = "default_invoice_number_prefix")]
    #[validate(custom = "validate_document_prefix")]
    pub invoice_number_prefix: String,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything but the
    /// connection URL and environment.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            po_number_prefix: default_po_number_prefix(),
            direct_receipt_po_prefix: default_direct_receipt_po_prefix(),
            grn_number_prefix: default_grn_number_prefix(),
            invoice_number_prefix: default_invoice_number_prefix(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Document numbering used by the procurement orchestrator.
    pub fn procurement_settings(&self) -> ProcurementSettings {
        ProcurementSettings {
            po_number_prefix: self.po_number_prefix.clone(),
            direct_receipt_po_prefix: self.direct_receipt_po_prefix.clone(),
            grn_number_prefix: self.grn_number_prefix.clone(),
            invoice_number_prefix: self.invoice_number_prefix.clone(),
        }
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections_exceeds_max");
            err.message = Some("APP__DB_MIN_CONNECTIONS must not exceed APP__DB_MAX_CONNECTIONS".into());
            errors.add("db_min_connections", err);
        }

        if self.is_production() && self.auto_migrate {
            let mut err = ValidationError::new("auto_migrate_in_production");
            err.message = Some(
                "Run `material-ledger migrate` explicitly instead of APP__AUTO_MIGRATE in production"
                    .into(),
            );
            errors.add("auto_migrate", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    30
}
fn default_po_number_prefix() -> String {
    "VPO".to_string()
}
fn default_direct_receipt_po_prefix() -> String {
    "DR".to_string()
}
fn default_grn_number_prefix() -> String {
    "GRN".to_string()
}
fn default_invoice_number_prefix() -> String {
    "INV".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Document prefixes end up in unique business keys, so keep them short and
/// free of separators.
fn validate_document_prefix(prefix: &str) -> Result<(), ValidationError> {
    let valid = !prefix.is_empty()
        && prefix.len() <= 10
        && prefix.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("document_prefix");
        err.message = Some("Must be 1-10 ASCII letters or digits".into());
        Err(err)
    }
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("material_ledger={},sea_orm=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "development".into())
    }

    #[test]
    fn defaults_validate() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_prefix_with_separator() {
        let mut cfg = base_config();
        cfg.grn_number_prefix = "GRN-".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn min_connections_cannot_exceed_max() {
        let mut cfg = base_config();
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 5;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn production_refuses_auto_migrate() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "production".into());
        cfg.auto_migrate = true;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn procurement_settings_follow_prefixes() {
        let mut cfg = base_config();
        cfg.po_number_prefix = "PO".into();
        let settings = cfg.procurement_settings();
        assert_eq!(settings.po_number_prefix, "PO");
        assert_eq!(settings.grn_number_prefix, "GRN");
    }
}
