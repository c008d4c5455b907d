use std::sync::Arc;

use safar_core::events::EventPublisher;
use safar_core::payment::PaymentGateway;
use safar_core::repository::{
    BookingRepository, EnquiryRepository, PaymentLedger, SearchSessionStore, UserRepository,
};
use safar_core::supplier::SearchGateway;
use safar_order::{EnquiryManager, PaymentOrchestrator};
use safar_store::app_config::BusinessRules;
use safar_store::{MemoryStore, RedisClient};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Storage ports the handlers need, whichever backend provides them.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SearchSessionStore>,
    pub users: Arc<dyn UserRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub enquiries: Arc<dyn EnquiryRepository>,
    pub ledger: Arc<dyn PaymentLedger>,
}

impl Stores {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            sessions: store.clone(),
            users: store.clone(),
            bookings: store.clone(),
            enquiries: store.clone(),
            ledger: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SearchSessionStore>,
    pub users: Arc<dyn UserRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub search: Arc<dyn SearchGateway>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub enquiries: Arc<EnquiryManager>,
    pub payments: Arc<PaymentOrchestrator>,
    pub redis: Option<Arc<RedisClient>>,
    pub cors_origins: Vec<String>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    /// Origin the payment redirect page is allowed to post to.
    pub payment_origin: String,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stores: Stores,
        search: Arc<dyn SearchGateway>,
        payment_gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventPublisher>,
        auth: AuthConfig,
        business_rules: BusinessRules,
        payment_origin: &str,
        metrics: Arc<Metrics>,
    ) -> Self {
        let enquiries = Arc::new(EnquiryManager::new(
            stores.enquiries.clone(),
            events.clone(),
            business_rules.quote_validity_hours,
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            stores.enquiries,
            stores.ledger,
            payment_gateway.clone(),
            enquiries.clone(),
            events,
        ));

        Self {
            sessions: stores.sessions,
            users: stores.users,
            bookings: stores.bookings,
            search,
            payment_gateway,
            enquiries,
            payments,
            redis: None,
            cors_origins: Vec::new(),
            metrics,
            auth,
            business_rules,
            payment_origin: payment_origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }
}
