use axum::{extract::State, routing::post, Json, Router};
use safar_core::search::{FlightSearchResult, HotelSearchCriteria, HotelSearchResult, SearchCriteria, SearchSession};
use tracing::info;

use crate::error::AppError;
use crate::middleware::Session;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/search/flights", post(search_flights))
        .route("/v1/search/hotels", post(search_hotels))
}

/// POST /v1/search/flights
async fn search_flights(
    State(state): State<AppState>,
    session: Session,
    Json(criteria): Json<SearchCriteria>,
) -> Result<Json<FlightSearchResult>, AppError> {
    criteria.validate()?;

    let result = match state.search.search_flights(&criteria).await {
        Ok(result) => {
            state.metrics.searches.with_label_values(&["flight", "ok"]).inc();
            result
        }
        Err(e) => {
            state.metrics.searches.with_label_values(&["flight", "error"]).inc();
            return Err(e.into());
        }
    };
    info!(
        "Flight search {} for user {} returned {} itineraries",
        result.s_id,
        session.user_id,
        result.itineraries.len()
    );

    let cached = SearchSession::Flight {
        criteria,
        result: result.clone(),
    };
    state
        .sessions
        .save_session(&cached, state.business_rules.search_session_ttl_seconds)
        .await?;

    Ok(Json(result))
}

/// POST /v1/search/hotels
async fn search_hotels(
    State(state): State<AppState>,
    session: Session,
    Json(criteria): Json<HotelSearchCriteria>,
) -> Result<Json<HotelSearchResult>, AppError> {
    criteria.validate()?;

    let result = match state.search.search_hotels(&criteria).await {
        Ok(result) => {
            state.metrics.searches.with_label_values(&["hotel", "ok"]).inc();
            result
        }
        Err(e) => {
            state.metrics.searches.with_label_values(&["hotel", "error"]).inc();
            return Err(e.into());
        }
    };
    info!(
        "Hotel search {} for user {} returned {} hotels",
        result.s_id,
        session.user_id,
        result.hotels.len()
    );

    let cached = SearchSession::Hotel {
        criteria,
        result: result.clone(),
    };
    state
        .sessions
        .save_session(&cached, state.business_rules.search_session_ttl_seconds)
        .await?;

    Ok(Json(result))
}
