use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use safar_order::ReconcileOutcome;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcAvenueResponse {
    pub enc_resp: String,
    pub order_no: Option<String>,
}

/// POST /v1/webhooks/payments/ccavenue
///
/// The gateway posts the customer's browser back here with the encrypted
/// result. The result is reconciled before the browser is sent on to the
/// read-only result page, so repeated posts are harmless.
pub async fn handle_ccavenue_response(
    State(state): State<AppState>,
    Form(payload): Form<CcAvenueResponse>,
) -> Response {
    let callback = match state.payment_gateway.decode_callback(&payload.enc_resp) {
        Ok(callback) => callback,
        Err(e) => {
            error!("Undecodable gateway response for order {:?}: {}", payload.order_no, e);
            state.metrics.payment_callbacks.with_label_values(&["rejected"]).inc();
            return (StatusCode::BAD_REQUEST, "Invalid gateway response").into_response();
        }
    };

    if let Some(order_no) = payload.order_no.as_deref() {
        if order_no != callback.order_id {
            warn!(
                "orderNo {} does not match the encrypted order id {}, using the encrypted one",
                order_no, callback.order_id
            );
        }
    }

    let enquiry_id = match callback.enquiry_id() {
        Ok(id) => id,
        Err(e) => {
            error!("Gateway response carries an unknown order id: {}", e);
            state.metrics.payment_callbacks.with_label_values(&["rejected"]).inc();
            return (StatusCode::BAD_REQUEST, "Invalid gateway response").into_response();
        }
    };

    let outcome = match state.payments.reconcile(&callback).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Reconciling payment for enquiry {} failed: {}", enquiry_id, e);
            state.metrics.payment_callbacks.with_label_values(&["error"]).inc();
            return (StatusCode::INTERNAL_SERVER_ERROR, "Payment could not be recorded").into_response();
        }
    };

    let label = match &outcome {
        ReconcileOutcome::Applied(status) => {
            info!("Payment for enquiry {} reconciled as {}", enquiry_id, status);
            "applied"
        }
        ReconcileOutcome::Duplicate => "duplicate",
        ReconcileOutcome::Ignored(reason) => {
            warn!("Gateway response for enquiry {} ignored: {}", enquiry_id, reason);
            "ignored"
        }
    };
    state.metrics.payment_callbacks.with_label_values(&[label]).inc();

    Redirect::to(&format!("/payment/result?enquiryId={}", enquiry_id)).into_response()
}
