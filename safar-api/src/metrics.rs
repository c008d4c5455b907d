use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub http_requests: IntCounterVec,
    pub searches: IntCounterVec,
    pub payment_callbacks: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("safar_http_requests_total", "HTTP requests by method and status"),
            &["method", "status"],
        )?;
        let searches = IntCounterVec::new(
            Opts::new("safar_supplier_searches_total", "Supplier searches by kind and outcome"),
            &["kind", "outcome"],
        )?;
        let payment_callbacks = IntCounterVec::new(
            Opts::new("safar_payment_callbacks_total", "Payment gateway callbacks by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(searches.clone()))?;
        registry.register(Box::new(payment_callbacks.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            searches,
            payment_callbacks,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let response = next.run(req).await;
    state
        .metrics
        .http_requests
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    response
}

/// GET /metrics
pub async fn export(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.searches.with_label_values(&["flight", "ok"]).inc();
        metrics.payment_callbacks.with_label_values(&["duplicate"]).inc();

        let text = metrics.render().unwrap();
        assert!(text.contains("safar_supplier_searches_total{kind=\"flight\",outcome=\"ok\"} 1"));
        assert!(text.contains("safar_payment_callbacks_total{outcome=\"duplicate\"} 1"));
    }
}
