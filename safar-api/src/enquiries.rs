use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use safar_core::enquiry::Enquiry;
use safar_core::package::EnquiryProduct;
use safar_order::orchestrator::{Payer, PaymentHandoff, PaymentStatusView};
use safar_shared::Masked;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnquiryRequest {
    pub product: EnquiryProduct,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStarted {
    #[serde(flatten)]
    pub handoff: PaymentHandoff,
    /// Our redirect page, with the hand-off encoded as query parameters.
    pub redirect_path: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/enquiries", post(create_enquiry).get(list_enquiries))
        .route("/v1/enquiries/{id}", get(get_enquiry))
        .route("/v1/enquiries/{id}/submit", post(submit_enquiry))
        .route("/v1/enquiries/{id}/accept", post(accept_quote))
        .route("/v1/enquiries/{id}/cancel", post(cancel_enquiry))
        .route("/v1/enquiries/{id}/payment", post(start_payment))
        .route("/v1/payments/{enquiry_id}/status", get(payment_status))
}

/// POST /v1/enquiries
async fn create_enquiry(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateEnquiryRequest>,
) -> Result<(StatusCode, Json<Enquiry>), AppError> {
    let enquiry = state
        .enquiries
        .create_draft(session.user_id, req.product, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(enquiry)))
}

/// GET /v1/enquiries
async fn list_enquiries(State(state): State<AppState>, session: Session) -> Result<Json<Vec<Enquiry>>, AppError> {
    Ok(Json(state.enquiries.list_for_user(session.user_id).await?))
}

/// GET /v1/enquiries/{id}
async fn get_enquiry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Enquiry>, AppError> {
    Ok(Json(state.enquiries.get_for_user(id, session.user_id).await?))
}

async fn submit_enquiry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Enquiry>, AppError> {
    Ok(Json(state.enquiries.submit(id, session.user_id).await?))
}

async fn accept_quote(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Enquiry>, AppError> {
    Ok(Json(state.enquiries.accept(id, session.user_id).await?))
}

async fn cancel_enquiry(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Enquiry>, AppError> {
    Ok(Json(state.enquiries.cancel(id, session.user_id).await?))
}

/// POST /v1/enquiries/{id}/payment
///
/// Records a pending payment and returns the gateway hand-off. The enquiry
/// stays ACCEPTED until the gateway reports back.
async fn start_payment(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentStarted>, AppError> {
    let payer = Payer {
        user_id: session.user_id,
        name: session.claims.name.clone(),
        email: Masked::from(session.claims.email.clone()),
    };
    let handoff = state.payments.start_payment(id, &payer).await?;

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("encRequest", &handoff.session.enc_request)
        .append_pair("accessCode", &handoff.session.access_code)
        .append_pair("gatewayUrl", &handoff.session.gateway_url)
        .append_pair("enquiryId", &handoff.session.enquiry_id.to_string())
        .finish();

    Ok(Json(PaymentStarted {
        handoff,
        redirect_path: format!("/payment/redirect?{}", query),
    }))
}

/// GET /v1/payments/{enquiry_id}/status
async fn payment_status(
    State(state): State<AppState>,
    session: Session,
    Path(enquiry_id): Path<Uuid>,
) -> Result<Json<PaymentStatusView>, AppError> {
    Ok(Json(state.payments.status_for_user(enquiry_id, session.user_id).await?))
}
