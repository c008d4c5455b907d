use anyhow::Context;
use safar_api::{app, metrics::Metrics, worker, AppState, AuthConfig, Stores};
use safar_core::events::{EventPublisher, NoopPublisher};
use safar_core::repository::SearchSessionStore;
use safar_gateway::{CcAvenueGateway, OdisClient};
use safar_store::app_config::Config;
use safar_store::{
    DbClient, EventProducer, MemoryStore, PgBookingRepository, PgEnquiryRepository, PgUserRepository, RedisClient,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safar_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Safar API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let business_rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to load business rules")?;

    // Redis Connection (optional)
    let redis = match config.redis.url.as_deref() {
        Some(url) => match RedisClient::new(url).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Redis unavailable, search sessions stay in memory: {}", e);
                None
            }
        },
        None => None,
    };
    let sessions: Arc<dyn SearchSessionStore> = match &redis {
        Some(client) => client.clone(),
        None => Arc::new(MemoryStore::new()),
    };

    // Kafka Connection (optional)
    let events: Arc<dyn EventPublisher> = match config.kafka.brokers.as_deref() {
        Some(brokers) => Arc::new(EventProducer::new(brokers).context("Failed to create Kafka producer")?),
        None => {
            tracing::warn!("No Kafka brokers configured, domain events are dropped");
            Arc::new(NoopPublisher)
        }
    };

    let enquiry_repo = Arc::new(PgEnquiryRepository::new(db.pool.clone()));
    let stores = Stores {
        sessions,
        users: Arc::new(PgUserRepository::new(db.pool.clone())),
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        enquiries: enquiry_repo.clone(),
        ledger: enquiry_repo,
    };

    let odis = OdisClient::new(
        &config.odis.base_url,
        &config.odis.username,
        &config.odis.password,
        config.odis.retry_policy(),
        config.odis.timeout(),
    )?;
    let ccavenue = CcAvenueGateway::new(
        &config.ccavenue.merchant_id,
        &config.ccavenue.access_code,
        &config.ccavenue.working_key,
        &config.ccavenue.gateway_base_url,
        &config.ccavenue.redirect_url,
        &config.ccavenue.cancel_url,
    )?;

    let mut app_state = AppState::new(
        stores,
        Arc::new(odis),
        Arc::new(ccavenue),
        events,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        business_rules.clone(),
        &config.ccavenue.gateway_base_url,
        Arc::new(Metrics::new()?),
    )
    .with_cors_origins(config.server.cors_origins.clone());
    if let Some(redis) = redis {
        app_state = app_state.with_redis(redis);
    }

    tokio::spawn(worker::start_expiry_worker(
        app_state.enquiries.clone(),
        Duration::from_secs(business_rules.expiry_sweep_seconds.max(1)),
    ));

    let app = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server host/port")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
