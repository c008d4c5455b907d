use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{BookingRef, BookingSummary, FlightBooking, HotelBooking};
use crate::enquiry::{Enquiry, EnquiryStatus};
use crate::payment::{Payment, Settlement};
use crate::search::SearchSession;
use crate::user::User;
use crate::CoreResult;

/// Priced search results kept under their `sId` until they expire.
#[async_trait]
pub trait SearchSessionStore: Send + Sync {
    async fn save_session(&self, session: &SearchSession, ttl_seconds: u64) -> CoreResult<()>;

    async fn get_session(&self, s_id: &str) -> CoreResult<Option<SearchSession>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_user(&self, user: &User) -> CoreResult<()>;

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>>;
}

/// Booking records with their passengers/guests. A booking and its people are
/// written together or not at all.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create_flight_booking(&self, booking: &FlightBooking) -> CoreResult<()>;

    async fn get_flight_booking(&self, id: Uuid) -> CoreResult<Option<FlightBooking>>;

    async fn create_hotel_booking(&self, booking: &HotelBooking) -> CoreResult<()>;

    async fn get_hotel_booking(&self, id: Uuid) -> CoreResult<Option<HotelBooking>>;

    async fn list_bookings(&self, user_id: Uuid) -> CoreResult<Vec<BookingSummary>>;

    /// Remove a booking that never got an enquiry to pay for it.
    async fn discard_booking(&self, booking: BookingRef) -> CoreResult<()>;
}

#[async_trait]
pub trait EnquiryRepository: Send + Sync {
    async fn create_enquiry(&self, enquiry: &Enquiry) -> CoreResult<()>;

    async fn get_enquiry(&self, id: Uuid) -> CoreResult<Option<Enquiry>>;

    /// Compare-and-set: persists `enquiry` only if the stored status is still
    /// `expected`, otherwise `CoreError::Conflict`.
    async fn save_enquiry(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> CoreResult<()>;

    /// Compare-and-set like `save_enquiry`, and in the same unit cancels every
    /// booking of the enquiry that is still PENDING. Used for terminal
    /// transitions no money was taken for.
    async fn close_enquiry(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> CoreResult<()>;

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Enquiry>>;

    async fn list_by_status(&self, status: Option<EnquiryStatus>) -> CoreResult<Vec<Enquiry>>;

    /// QUOTED enquiries whose quote lapsed before `now`.
    async fn list_lapsed_quotes(&self, now: DateTime<Utc>) -> CoreResult<Vec<Enquiry>>;
}

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn record_payment(&self, payment: &Payment) -> CoreResult<()>;

    async fn get_payment(&self, id: Uuid) -> CoreResult<Option<Payment>>;

    async fn list_payments(&self, enquiry_id: Uuid) -> CoreResult<Vec<Payment>>;

    /// Apply enquiry transition, payment status and booking status as one unit.
    async fn settle(&self, settlement: &Settlement) -> CoreResult<()>;
}
