use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Email of the bootstrap admin account, created on startup when missing
    pub admin_email: Option<String>,
    /// Password for the bootstrap admin account
    pub admin_password: Option<String>,
    /// Lifetime of a login session in hours
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_email: None,
            admin_password: None,
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Minutes a one-time passcode stays valid
    #[serde(default = "default_otp_ttl_minutes")]
    pub ttl_minutes: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_otp_ttl_minutes(),
        }
    }
}

fn default_otp_ttl_minutes() -> i64 {
    10
}

/// Pricing rules applied to every cart
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// Flat shipping fee added to every order
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: Decimal,
    /// Tax rate applied to the subtotal (0.10 = 10%)
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            shipping_fee: default_shipping_fee(),
            tax_rate: default_tax_rate(),
        }
    }
}

fn default_shipping_fee() -> Decimal {
    Decimal::new(5000, 2)
}

fn default_tax_rate() -> Decimal {
    Decimal::new(10, 2)
}

/// Settings for the simulated payment gateway
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Probability (0..=1) that a charge is approved
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    /// Simulated processing time in milliseconds
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,
    /// Upper bound for a charge before it is reported as timed out
    #[serde(default = "default_payment_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            success_rate: default_success_rate(),
            processing_delay_ms: default_processing_delay_ms(),
            timeout_ms: default_payment_timeout_ms(),
        }
    }
}

fn default_success_rate() -> f64 {
    0.9
}

fn default_processing_delay_ms() -> u64 {
    2000
}

fn default_payment_timeout_ms() -> u64 {
    10_000
}

/// SMTP settings for transactional email
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    /// Email can only be sent once a host and sender address are set
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "ART&BAY".to_string()
}

/// Background sweep of expired OTP codes and sessions
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval_seconds() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests per window for storefront endpoints
    #[serde(default = "default_api_requests_per_window")]
    pub api_requests_per_window: u32,
    /// Requests per window for login and OTP endpoints
    #[serde(default = "default_auth_requests_per_window")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// How often stale limiter entries are dropped, in seconds
    #[serde(default = "default_rate_limit_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests_per_window(),
            auth_requests_per_window: default_auth_requests_per_window(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_rate_limit_cleanup_interval(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests_per_window() -> u32 {
    120
}

fn default_auth_requests_per_window() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_rate_limit_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Reject settings that would make pricing or payment nonsensical
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.payment.success_rate) {
            bail!(
                "payment.success_rate must be between 0 and 1, got {}",
                self.payment.success_rate
            );
        }
        if self.payment.timeout_ms == 0 {
            bail!("payment.timeout_ms must be greater than zero");
        }
        if self.checkout.shipping_fee.is_sign_negative() {
            bail!("checkout.shipping_fee cannot be negative");
        }
        if self.checkout.tax_rate.is_sign_negative() {
            bail!("checkout.tax_rate cannot be negative");
        }
        if self.otp.ttl_minutes <= 0 {
            bail!("otp.ttl_minutes must be positive");
        }
        if self.auth.session_ttl_hours <= 0 {
            bail!("auth.session_ttl_hours must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checkout.shipping_fee.to_string(), "50.00");
        assert_eq!(config.checkout.tax_rate.to_string(), "0.10");
        assert_eq!(config.otp.ttl_minutes, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [checkout]
            shipping_fee = "75.50"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.checkout.shipping_fee, Decimal::new(7550, 2));
        assert_eq!(config.checkout.tax_rate, Decimal::new(10, 2));
        assert!(!config.email.is_configured());
    }

    #[test]
    fn test_invalid_success_rate_rejected() {
        let mut config = Config::default();
        config.payment.success_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_fee_rejected() {
        let mut config = Config::default();
        config.checkout.shipping_fee = Decimal::new(-1, 0);
        assert!(config.validate().is_err());
    }
}
