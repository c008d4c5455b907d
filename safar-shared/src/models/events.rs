use uuid::Uuid;

pub const TOPIC_ENQUIRY_TRANSITIONED: &str = "enquiry.transitioned";
pub const TOPIC_PAYMENT_RECONCILED: &str = "payment.reconciled";
pub const TOPIC_BOOKING_CONFIRMED: &str = "booking.confirmed";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct EnquiryTransitionedEvent {
    pub enquiry_id: Uuid,
    pub user_id: Uuid,
    pub from: String,
    pub to: String,
    pub actor: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentReconciledEvent {
    pub enquiry_id: Uuid,
    pub payment_id: Uuid,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub tracking_id: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub booking_kind: String,
    pub enquiry_id: Uuid,
    pub timestamp: i64,
}
