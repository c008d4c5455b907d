use safar_core::retry::RetryPolicy;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub odis: OdisConfig,
    pub ccavenue: CcAvenueConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Agency fee added to every flight fare, in minor units.
    pub service_fee_minor: i64,
    pub quote_validity_hours: i64,
    pub search_session_ttl_seconds: u64,
    pub expiry_sweep_seconds: u64,
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            service_fee_minor: 0,
            quote_validity_hours: 48,
            search_session_ttl_seconds: 1800,
            expiry_sweep_seconds: 300,
            rate_limit_per_minute: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Redis is optional; without it search sessions live in process memory and
/// rate limiting is off.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OdisConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_after")]
    pub default_retry_after_seconds: u64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_after() -> u64 {
    5
}

fn default_timeout() -> u64 {
    30
}

impl OdisConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.default_retry_after_seconds),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CcAvenueConfig {
    pub merchant_id: String,
    pub access_code: String,
    pub working_key: String,
    pub gateway_base_url: String,
    pub redirect_url: String,
    #[serde(default)]
    pub cancel_url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // SAFAR__ODIS__PASSWORD=... sets odis.password
            .add_source(config::Environment::with_prefix("SAFAR").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    const DEFAULTS: &str = include_str!("../../config/default.toml");

    fn from_toml(extra: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::from_str(extra, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_shipped_defaults_deserialize() {
        let config = from_toml("");
        assert_eq!(config.odis.max_attempts, 3);
        assert_eq!(config.odis.retry_policy().default_retry_after, Duration::from_secs(5));
        assert!(config.business_rules.quote_validity_hours > 0);
    }

    #[test]
    fn test_overrides_layer_on_top() {
        let config = from_toml(
            r#"
            [business_rules]
            service_fee_minor = 2500
            quote_validity_hours = 24
            search_session_ttl_seconds = 600
            expiry_sweep_seconds = 60
            rate_limit_per_minute = 30

            [redis]
            url = "redis://cache:6379"
            "#,
        );
        assert_eq!(config.business_rules.service_fee_minor, 2500);
        assert_eq!(config.redis.url.as_deref(), Some("redis://cache:6379"));
    }
}
