use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use safar_core::enquiry::{Enquiry, EnquiryStatus};
use safar_order::QuoteTerms;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListEnquiriesQuery {
    pub status: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/enquiries", get(list_enquiries))
        .route("/v1/admin/enquiries/{id}/quote", post(quote_enquiry))
        .route("/v1/admin/enquiries/{id}/confirm", post(confirm_enquiry))
        .route("/v1/admin/enquiries/{id}/cancel", post(cancel_enquiry))
}

/// GET /v1/admin/enquiries?status=QUOTED
async fn list_enquiries(
    State(state): State<AppState>,
    Query(query): Query<ListEnquiriesQuery>,
) -> Result<Json<Vec<Enquiry>>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            EnquiryStatus::parse(&raw.to_ascii_uppercase())
                .ok_or_else(|| AppError::ValidationError(format!("Unknown enquiry status {}", raw)))?,
        ),
        None => None,
    };
    Ok(Json(state.enquiries.list_by_status(status).await?))
}

/// POST /v1/admin/enquiries/{id}/quote
async fn quote_enquiry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(terms): Json<QuoteTerms>,
) -> Result<Json<Enquiry>, AppError> {
    let enquiry = state.enquiries.quote(id, terms, &session.claims.email).await?;
    info!("Enquiry {} quoted by admin {}", id, session.user_id);
    Ok(Json(enquiry))
}

/// POST /v1/admin/enquiries/{id}/confirm
async fn confirm_enquiry(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Enquiry>, AppError> {
    Ok(Json(state.enquiries.confirm(id).await?))
}

/// POST /v1/admin/enquiries/{id}/cancel
///
/// Paid enquiries are cancelled together with their payment, which is marked
/// refunded; the refund itself is issued from the gateway console.
async fn cancel_enquiry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Enquiry>, AppError> {
    let enquiry = state.payments.admin_cancel(id).await?;
    info!("Enquiry {} cancelled by admin {}", id, session.user_id);
    Ok(Json(enquiry))
}
