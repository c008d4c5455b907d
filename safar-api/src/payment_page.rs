use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use safar_core::payment::PaymentStatus;
use serde::Deserialize;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const INVALID_SESSION: &str = "Invalid payment session";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectParams {
    pub enc_request: Option<String>,
    pub access_code: Option<String>,
    pub gateway_url: Option<String>,
    pub enquiry_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultParams {
    pub enquiry_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payment/redirect", get(redirect_page))
        .route("/payment/result", get(result_page))
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// The gateway URL must point at the configured gateway origin, so the page
/// can never be turned into a form that posts elsewhere.
fn allowed_gateway_url(raw: &str, configured: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    let allowed = Url::parse(configured).ok()?;
    (url.origin() == allowed.origin()).then_some(url)
}

fn invalid_session() -> Response {
    let body = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{0}</title></head>\
         <body><p>{0}</p></body></html>",
        INVALID_SESSION
    );
    (StatusCode::BAD_REQUEST, Html(body)).into_response()
}

/// GET /payment/redirect
///
/// Renders the hidden form that posts the encrypted request to the gateway.
/// Any missing or foreign parameter renders the error page and no form.
async fn redirect_page(State(state): State<AppState>, Query(params): Query<RedirectParams>) -> Response {
    let (Some(enc_request), Some(access_code), Some(gateway_url)) = (
        non_empty(&params.enc_request),
        non_empty(&params.access_code),
        non_empty(&params.gateway_url),
    ) else {
        warn!(
            "Payment redirect for enquiry {:?} is missing its encRequest, accessCode or gatewayUrl",
            params.enquiry_id
        );
        return invalid_session();
    };

    let Some(target) = allowed_gateway_url(gateway_url, &state.payment_origin) else {
        warn!("Payment redirect refused foreign gateway url {}", gateway_url);
        return invalid_session();
    };

    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Redirecting to payment</title></head>
<body onload="document.forms['payment'].submit()">
<form id="payment" name="payment" method="post" action="{action}">
<input type="hidden" name="encRequest" value="{enc_request}">
<input type="hidden" name="access_code" value="{access_code}">
<noscript><button type="submit">Continue to payment</button></noscript>
</form>
</body>
</html>"#,
        action = escape_html(target.as_str()),
        enc_request = escape_html(enc_request),
        access_code = escape_html(access_code),
    );
    Html(body).into_response()
}

/// GET /payment/result?enquiryId=
///
/// Only reads the reconciled status; nothing here moves the enquiry.
async fn result_page(
    State(state): State<AppState>,
    Query(params): Query<ResultParams>,
) -> Result<Html<String>, AppError> {
    let view = state.payments.status(params.enquiry_id).await?;

    let (heading, detail) = match view.payment_status {
        Some(PaymentStatus::Success) if view.failure_message.is_some() => (
            "Payment received",
            "This enquiry was closed before the payment arrived; it will be refunded.".to_string(),
        ),
        Some(PaymentStatus::Success) => (
            "Payment received",
            format!("Your booking reference is {}.", view.enquiry_id),
        ),
        Some(PaymentStatus::Failed) => (
            "Payment failed",
            view.failure_message
                .clone()
                .unwrap_or_else(|| "The payment was not completed.".to_string()),
        ),
        Some(PaymentStatus::Refunded) => ("Payment refunded", "This booking was cancelled.".to_string()),
        Some(PaymentStatus::Pending) => (
            "Payment pending",
            "We are waiting for confirmation from the bank.".to_string(),
        ),
        None => ("No payment", "No payment has been started for this enquiry.".to_string()),
    };

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{heading}</title></head>\
         <body><h1>{heading}</h1><p>{detail}</p><p>Status: {status}</p></body></html>",
        heading = heading,
        detail = escape_html(&detail),
        status = view.enquiry_status,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#""><script>alert('x')</script>"#),
            "&quot;&gt;&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
        assert_eq!(escape_html("a1b2c3"), "a1b2c3");
    }

    #[test]
    fn test_gateway_origin_check() {
        let configured = "https://secure.ccavenue.ae";
        assert!(allowed_gateway_url(
            "https://secure.ccavenue.ae/transaction/transaction.do?command=initiateTransaction",
            configured
        )
        .is_some());
        assert!(allowed_gateway_url("https://evil.example/transaction.do", configured).is_none());
        assert!(allowed_gateway_url("http://secure.ccavenue.ae/transaction.do", configured).is_none());
        assert!(allowed_gateway_url("not a url", configured).is_none());
    }

    #[test]
    fn test_missing_values_are_rejected() {
        assert_eq!(non_empty(&Some("  ".to_string())), None);
        assert_eq!(non_empty(&None), None);
        assert_eq!(non_empty(&Some("abc".to_string())), Some("abc"));
    }
}
