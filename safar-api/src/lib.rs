use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod enquiries;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod payment_page;
pub mod profile;
pub mod search;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, AuthConfig, Stores};

use crate::middleware::{admin_auth_middleware, customer_auth_middleware};

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let origins: Vec<HeaderValue> = state
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::USER_AGENT]);
    let cors = if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    };

    let customer = Router::new()
        .merge(search::routes())
        .merge(bookings::routes())
        .merge(enquiries::routes())
        .merge(profile::routes())
        .route_layer(from_fn_with_state(state.clone(), customer_auth_middleware));

    let admin = admin::routes().route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::export))
        .route(
            "/v1/webhooks/payments/ccavenue",
            post(webhooks::handle_ccavenue_response),
        )
        .merge(payment_page::routes())
        .merge(customer)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), metrics::track_requests))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().copied(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match redis
        .check_rate_limit(&key, state.business_rules.rate_limit_per_minute, 60)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
