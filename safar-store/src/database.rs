use safar_core::CoreError;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rules stored in the `business_rules` table on top of the file
    /// configuration. Rows look like `{"value": <number>}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            let Some(v) = value.get("value") else {
                warn!("Business rule {} has no value, ignoring", key);
                continue;
            };
            match key.as_str() {
                "service_fee_minor" => {
                    if let Some(n) = v.as_i64() {
                        rules.service_fee_minor = n;
                    }
                }
                "quote_validity_hours" => {
                    if let Some(n) = v.as_i64() {
                        rules.quote_validity_hours = n;
                    }
                }
                "search_session_ttl_seconds" => {
                    if let Some(n) = v.as_u64() {
                        rules.search_session_ttl_seconds = n;
                    }
                }
                "expiry_sweep_seconds" => {
                    if let Some(n) = v.as_u64() {
                        rules.expiry_sweep_seconds = n;
                    }
                }
                "rate_limit_per_minute" => {
                    if let Some(n) = v.as_i64() {
                        rules.rate_limit_per_minute = n;
                    }
                }
                other => warn!("Unknown business rule {}", other),
            }
        }

        Ok(rules)
    }
}

/// Map a driver error onto the domain taxonomy. Unique violations are
/// conflicts; everything else is a storage failure.
pub(crate) fn storage_error(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return CoreError::Conflict(db.message().to_string());
        }
    }
    CoreError::StorageError(e.to_string())
}

pub(crate) fn to_i32(value: u32, field: &str) -> Result<i32, CoreError> {
    i32::try_from(value).map_err(|_| CoreError::ValidationError(format!("{} is out of range", field)))
}

pub(crate) fn to_u32(value: i32, field: &str) -> Result<u32, CoreError> {
    u32::try_from(value).map_err(|_| CoreError::StorageError(format!("stored {} is negative", field)))
}
