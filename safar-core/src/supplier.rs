use async_trait::async_trait;

use crate::search::{FlightSearchResult, HotelSearchCriteria, HotelSearchResult, SearchCriteria};

/// Failures talking to third-party providers (ODIS, CCAvenue).
///
/// `Upstream` carries the provider's status and body untouched so operators can
/// see exactly what came back.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Upstream still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32, body: String },
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("Malformed upstream payload: {0}")]
    Decode(String),
    #[error("Payment payload crypto failure: {0}")]
    Crypto(String),
    #[error("Gateway misconfigured: {0}")]
    Config(String),
}

/// Third-party flight/hotel aggregator.
#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search_flights(&self, criteria: &SearchCriteria) -> Result<FlightSearchResult, GatewayError>;

    async fn search_hotels(&self, criteria: &HotelSearchCriteria) -> Result<HotelSearchResult, GatewayError>;
}
