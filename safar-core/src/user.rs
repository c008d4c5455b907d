use chrono::{DateTime, Utc};
use safar_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: Masked<String>,
    pub name: String,
    pub telephone: Option<Masked<String>>,
    pub nationality: Option<String>,
    pub residency: Option<String>,
    pub created_at: DateTime<Utc>,
}
