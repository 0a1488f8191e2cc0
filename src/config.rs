use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Business constants for returns, rentals and fees.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReturnPolicyConfig {
    /// Days after the sale during which a sale return is accepted
    pub sale_return_window_days: i64,
    /// Restocking fee applied when any item lacks its original packaging
    pub restocking_fee_rate: Decimal,
    pub opened_refund_factor: Decimal,
    pub used_refund_factor: Decimal,
    pub damaged_refund_factor: Decimal,
    /// Require photos for POOR / DAMAGED rental items
    pub require_damage_photos: bool,
    /// Daily late rate applied by the rental processor to `total / 30`
    pub rental_processor_late_rate: Decimal,
    pub damaged_item_fee: Decimal,
    pub poor_condition_fee: Decimal,
    pub beyond_normal_wear_fee: Decimal,
    pub missing_accessory_fee: Decimal,
    pub major_cleaning_fee: Decimal,
    pub minor_cleaning_fee: Decimal,
    /// Late fee rate per day used by the fee calculator
    pub late_fee_rate: Decimal,
    /// Late fee cap, as a multiple of the daily rental amount
    pub max_late_fee_multiplier: Decimal,
    pub extension_fee_rate: Decimal,
    pub default_cleaning_fee: Decimal,
    /// Seconds between overdue scans, 0 disables the background task
    pub overdue_scan_interval_secs: u64,
    /// Seconds between stock reconciliation passes, 0 disables the worker
    pub reconciliation_interval_secs: u64,
    pub reconciliation_max_attempts: i32,
}

impl Default for ReturnPolicyConfig {
    fn default() -> Self {
        Self {
            sale_return_window_days: 30,
            restocking_fee_rate: dec!(0.15),
            opened_refund_factor: dec!(0.95),
            used_refund_factor: dec!(0.80),
            damaged_refund_factor: dec!(0.50),
            require_damage_photos: true,
            rental_processor_late_rate: dec!(0.10),
            damaged_item_fee: dec!(200),
            poor_condition_fee: dec!(100),
            beyond_normal_wear_fee: dec!(50),
            missing_accessory_fee: dec!(25),
            major_cleaning_fee: dec!(75),
            minor_cleaning_fee: dec!(25),
            late_fee_rate: dec!(0.05),
            max_late_fee_multiplier: dec!(3),
            extension_fee_rate: dec!(0.10),
            default_cleaning_fee: dec!(25),
            overdue_scan_interval_secs: 3600,
            reconciliation_interval_secs: 300,
            reconciliation_max_attempts: 5,
        }
    }
}

impl ReturnPolicyConfig {
    fn validate_rates(&self, errors: &mut ValidationErrors) {
        let fractions = [
            ("restocking_fee_rate", self.restocking_fee_rate),
            ("opened_refund_factor", self.opened_refund_factor),
            ("used_refund_factor", self.used_refund_factor),
            ("damaged_refund_factor", self.damaged_refund_factor),
            ("late_fee_rate", self.late_fee_rate),
            ("rental_processor_late_rate", self.rental_processor_late_rate),
            ("extension_fee_rate", self.extension_fee_rate),
        ];
        for (field, value) in fractions {
            if value < Decimal::ZERO || value > Decimal::ONE {
                let mut err = ValidationError::new("rate_out_of_range");
                err.message = Some(format!("returns.{} must be between 0 and 1", field).into());
                errors.add("returns", err);
            }
        }

        let amounts = [
            self.damaged_item_fee,
            self.poor_condition_fee,
            self.beyond_normal_wear_fee,
            self.missing_accessory_fee,
            self.major_cleaning_fee,
            self.minor_cleaning_fee,
            self.default_cleaning_fee,
            self.max_late_fee_multiplier,
        ];
        if amounts.iter().any(|a| *a < Decimal::ZERO) {
            let mut err = ValidationError::new("negative_amount");
            err.message = Some("returns fee amounts must not be negative".into());
            errors.add("returns", err);
        }

        if self.sale_return_window_days < 0 {
            let mut err = ValidationError::new("negative_window");
            err.message = Some("returns.sale_return_window_days must not be negative".into());
            errors.add("returns", err);
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,

    #[serde(default)]
    pub returns: ReturnPolicyConfig,
}

impl AppConfig {
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
            returns: ReturnPolicyConfig::default(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Clamps a requested page size to the configured bounds.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size.max(1))
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        self.returns.validate_rates(&mut errors);

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
}

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

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("rentops_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
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
        .set_default("database_url", "sqlite://rentops.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration policy validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_pass_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn out_of_range_rate_is_rejected() {
        let mut cfg = base_config();
        cfg.returns.restocking_fee_rate = dec!(1.5);
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("returns"));
    }

    #[test]
    fn pool_bounds_are_checked() {
        let mut cfg = base_config();
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 4;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = base_config();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(5_000)), 100);
    }

    #[test]
    fn returns_section_deserializes_partial_overrides() {
        let cfg: ReturnPolicyConfig = Config::builder()
            .set_override("sale_return_window_days", 14)
            .unwrap()
            .set_override("restocking_fee_rate", "0.20")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.sale_return_window_days, 14);
        assert_eq!(cfg.restocking_fee_rate, dec!(0.20));
        assert_eq!(cfg.late_fee_rate, dec!(0.05));
    }
}
