use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safar_shared::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::booking::BookingStatus;
use crate::enquiry::{EnquiryStatus, StatusChange};
use crate::supplier::GatewayError;
use crate::{invalid, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment attempt against an enquiry's accepted quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub enquiry_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_tracking_id: Option<String>,
    pub bank_ref_no: Option<String>,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(enquiry_id: Uuid, amount: i64, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            enquiry_id,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            gateway_tracking_id: None,
            bank_ref_no: None,
            failure_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the orchestrator asks the gateway integration to sign.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub payment_id: Uuid,
    pub enquiry_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: Masked<String>,
}

/// The browser hand-off: everything the redirect page posts to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub enc_request: String,
    pub access_code: String,
    pub gateway_url: String,
    pub enquiry_id: Uuid,
}

impl PaymentSession {
    pub fn is_complete(&self) -> bool {
        !self.enc_request.trim().is_empty()
            && !self.access_code.trim().is_empty()
            && !self.gateway_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderStatus {
    Success,
    Failure,
    Aborted,
    Invalid,
    Other(String),
}

impl GatewayOrderStatus {
    pub fn from_gateway(value: &str) -> Self {
        match value.trim() {
            "Success" => GatewayOrderStatus::Success,
            "Failure" => GatewayOrderStatus::Failure,
            "Aborted" => GatewayOrderStatus::Aborted,
            "Invalid" => GatewayOrderStatus::Invalid,
            other => GatewayOrderStatus::Other(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GatewayOrderStatus::Success)
    }
}

/// Decoded asynchronous response from the payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayCallback {
    /// Correlation id we sent as the gateway order id: the enquiry id.
    pub order_id: String,
    /// Our payment attempt id, echoed back in a merchant parameter.
    pub payment_ref: Option<Uuid>,
    pub tracking_id: Option<String>,
    pub bank_ref_no: Option<String>,
    pub order_status: GatewayOrderStatus,
    pub failure_message: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
}

impl GatewayCallback {
    pub fn enquiry_id(&self) -> CoreResult<Uuid> {
        Uuid::parse_str(self.order_id.trim())
            .map_err(|_| invalid(format!("gateway order id '{}' is not an enquiry id", self.order_id)))
    }
}

/// A single atomic state change spanning enquiry, payment and bookings.
///
/// The ledger applies it only if the enquiry is still in `expected_status`
/// and the payment is still in `expected_payment_status`; otherwise it returns
/// `CoreError::Conflict` and changes nothing.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub enquiry_id: Uuid,
    pub expected_status: EnquiryStatus,
    pub transition: Option<StatusChange>,
    pub payment_id: Uuid,
    pub expected_payment_status: PaymentStatus,
    pub payment_status: PaymentStatus,
    pub tracking_id: Option<String>,
    pub bank_ref_no: Option<String>,
    pub failure_message: Option<String>,
    pub booking_status: Option<BookingStatus>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Build the encrypted hand-off for a payment attempt.
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError>;

    /// Decrypt and parse the gateway's response body (`encResp`).
    fn decode_callback(&self, enc_response: &str) -> Result<GatewayCallback, GatewayError>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_value(PaymentStatus::Refunded).unwrap(), "refunded");
        assert_eq!(PaymentStatus::parse("success"), Some(PaymentStatus::Success));
    }

    #[test]
    fn test_session_completeness() {
        let mut session = PaymentSession {
            enc_request: "abc".to_string(),
            access_code: "AVXX".to_string(),
            gateway_url: "https://secure.ccavenue.ae/transaction/transaction.do?command=initiateTransaction".to_string(),
            enquiry_id: Uuid::new_v4(),
        };
        assert!(session.is_complete());

        session.access_code = "  ".to_string();
        assert!(!session.is_complete());
    }

    #[test]
    fn test_gateway_status_mapping() {
        assert!(GatewayOrderStatus::from_gateway("Success").is_success());
        assert_eq!(GatewayOrderStatus::from_gateway("Aborted"), GatewayOrderStatus::Aborted);
        assert_eq!(
            GatewayOrderStatus::from_gateway("Timeout"),
            GatewayOrderStatus::Other("Timeout".to_string())
        );
    }
}
