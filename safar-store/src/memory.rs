use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safar_core::booking::{BookingKind, BookingRef, BookingStatus, BookingSummary, FlightBooking, HotelBooking};
use safar_core::enquiry::{Enquiry, EnquiryStatus};
use safar_core::events::EventPublisher;
use safar_core::payment::{Payment, Settlement};
use safar_core::repository::{
    BookingRepository, EnquiryRepository, PaymentLedger, SearchSessionStore, UserRepository,
};
use safar_core::search::SearchSession;
use safar_core::user::User;
use safar_core::{CoreError, CoreResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<String, (SearchSession, Instant)>,
    users: HashMap<Uuid, User>,
    flights: HashMap<Uuid, FlightBooking>,
    hotels: HashMap<Uuid, HotelBooking>,
    enquiries: HashMap<Uuid, Enquiry>,
    payments: HashMap<Uuid, Payment>,
}

/// Process-local implementation of every storage port.
///
/// One mutex guards all tables, so `settle`, `save_enquiry` and `close_enquiry` have the same
/// all-or-nothing and compare-and-set behaviour as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchSessionStore for MemoryStore {
    async fn save_session(&self, session: &SearchSession, ttl_seconds: u64) -> CoreResult<()> {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        let mut state = self.state.lock().await;
        state
            .sessions
            .insert(session.s_id().to_string(), (session.clone(), expires));
        Ok(())
    }

    async fn get_session(&self, s_id: &str) -> CoreResult<Option<SearchSession>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.sessions.retain(|_, (_, expires)| *expires > now);
        Ok(state.sessions.get(s_id).map(|(s, _)| s.clone()))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn upsert_user(&self, user: &User) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let duplicate_email = state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email);
        if duplicate_email {
            return Err(CoreError::Conflict("email already registered".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn create_flight_booking(&self, booking: &FlightBooking) -> CoreResult<()> {
        booking.validate()?;
        let mut state = self.state.lock().await;
        if state.flights.contains_key(&booking.id) {
            return Err(CoreError::Conflict(format!("booking {} exists", booking.id)));
        }
        state.flights.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_flight_booking(&self, id: Uuid) -> CoreResult<Option<FlightBooking>> {
        Ok(self.state.lock().await.flights.get(&id).cloned())
    }

    async fn create_hotel_booking(&self, booking: &HotelBooking) -> CoreResult<()> {
        booking.validate()?;
        let mut state = self.state.lock().await;
        if state.hotels.contains_key(&booking.id) {
            return Err(CoreError::Conflict(format!("booking {} exists", booking.id)));
        }
        state.hotels.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_hotel_booking(&self, id: Uuid) -> CoreResult<Option<HotelBooking>> {
        Ok(self.state.lock().await.hotels.get(&id).cloned())
    }

    async fn list_bookings(&self, user_id: Uuid) -> CoreResult<Vec<BookingSummary>> {
        let state = self.state.lock().await;
        let mut summaries: Vec<BookingSummary> = state
            .flights
            .values()
            .filter(|b| b.user_id == user_id)
            .map(BookingSummary::from)
            .chain(
                state
                    .hotels
                    .values()
                    .filter(|b| b.user_id == user_id)
                    .map(BookingSummary::from),
            )
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn discard_booking(&self, booking: BookingRef) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        match booking.kind {
            BookingKind::Flight => {
                state.flights.remove(&booking.id);
            }
            BookingKind::Hotel => {
                state.hotels.remove(&booking.id);
            }
        }
        Ok(())
    }
}

fn check_expected(state: &MemoryState, id: Uuid, expected: EnquiryStatus) -> CoreResult<()> {
    let stored = state
        .enquiries
        .get(&id)
        .ok_or_else(|| CoreError::NotFound(format!("enquiry {}", id)))?;
    if stored.status != expected {
        return Err(CoreError::Conflict(format!(
            "enquiry {} is {} (expected {})",
            id, stored.status, expected
        )));
    }
    Ok(())
}

fn newest_first(mut enquiries: Vec<Enquiry>) -> Vec<Enquiry> {
    enquiries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    enquiries
}

#[async_trait]
impl EnquiryRepository for MemoryStore {
    async fn create_enquiry(&self, enquiry: &Enquiry) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.enquiries.contains_key(&enquiry.id) {
            return Err(CoreError::Conflict(format!("enquiry {} exists", enquiry.id)));
        }
        state.enquiries.insert(enquiry.id, enquiry.clone());
        Ok(())
    }

    async fn get_enquiry(&self, id: Uuid) -> CoreResult<Option<Enquiry>> {
        Ok(self.state.lock().await.enquiries.get(&id).cloned())
    }

    async fn save_enquiry(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        check_expected(&state, enquiry.id, expected)?;
        state.enquiries.insert(enquiry.id, enquiry.clone());
        Ok(())
    }

    async fn close_enquiry(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        check_expected(&state, enquiry.id, expected)?;
        state.enquiries.insert(enquiry.id, enquiry.clone());

        let owned = |id: Option<Uuid>, status: BookingStatus| id == Some(enquiry.id) && status == BookingStatus::Pending;
        for booking in state.flights.values_mut().filter(|b| owned(b.enquiry_id, b.booking_status)) {
            booking.booking_status = BookingStatus::Cancelled;
            booking.updated_at = enquiry.updated_at;
        }
        for booking in state.hotels.values_mut().filter(|b| owned(b.enquiry_id, b.booking_status)) {
            booking.booking_status = BookingStatus::Cancelled;
            booking.updated_at = enquiry.updated_at;
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Enquiry>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .enquiries
                .values()
                .filter(|e| e.user_id == user_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_status(&self, status: Option<EnquiryStatus>) -> CoreResult<Vec<Enquiry>> {
        let state = self.state.lock().await;
        Ok(newest_first(
            state
                .enquiries
                .values()
                .filter(|e| status.map_or(true, |s| e.status == s))
                .cloned()
                .collect(),
        ))
    }

    async fn list_lapsed_quotes(&self, now: DateTime<Utc>) -> CoreResult<Vec<Enquiry>> {
        let state = self.state.lock().await;
        Ok(state
            .enquiries
            .values()
            .filter(|e| e.status == EnquiryStatus::Quoted)
            .filter(|e| e.quote.as_ref().is_some_and(|q| !q.is_valid_at(now)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentLedger for MemoryStore {
    async fn record_payment(&self, payment: &Payment) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.enquiries.contains_key(&payment.enquiry_id) {
            return Err(CoreError::NotFound(format!("enquiry {}", payment.enquiry_id)));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn list_payments(&self, enquiry_id: Uuid) -> CoreResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.enquiry_id == enquiry_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }

    async fn settle(&self, s: &Settlement) -> CoreResult<()> {
        let mut state = self.state.lock().await;

        // Check everything before touching anything.
        let enquiry = state
            .enquiries
            .get(&s.enquiry_id)
            .ok_or_else(|| CoreError::NotFound(format!("enquiry {}", s.enquiry_id)))?;
        if enquiry.status != s.expected_status {
            return Err(CoreError::Conflict(format!(
                "enquiry {} is {} (expected {})",
                s.enquiry_id, enquiry.status, s.expected_status
            )));
        }
        let payment = state
            .payments
            .get(&s.payment_id)
            .filter(|p| p.enquiry_id == s.enquiry_id)
            .ok_or_else(|| CoreError::NotFound(format!("payment {} for enquiry {}", s.payment_id, s.enquiry_id)))?;
        if payment.status != s.expected_payment_status {
            return Err(CoreError::Conflict(format!(
                "payment {} is {} (expected {})",
                s.payment_id, payment.status, s.expected_payment_status
            )));
        }

        if let Some(change) = &s.transition {
            if let Some(enquiry) = state.enquiries.get_mut(&s.enquiry_id) {
                enquiry.status = change.to;
                enquiry.history.push(change.clone());
                enquiry.updated_at = s.at;
            }
        }

        if let Some(payment) = state.payments.get_mut(&s.payment_id) {
            payment.status = s.payment_status;
            if s.tracking_id.is_some() {
                payment.gateway_tracking_id = s.tracking_id.clone();
            }
            if s.bank_ref_no.is_some() {
                payment.bank_ref_no = s.bank_ref_no.clone();
            }
            payment.failure_message = s.failure_message.clone();
            payment.updated_at = s.at;
        }

        if let Some(status) = s.booking_status {
            for booking in state.flights.values_mut().filter(|b| b.enquiry_id == Some(s.enquiry_id)) {
                booking.booking_status = status;
                booking.updated_at = s.at;
            }
            for booking in state.hotels.values_mut().filter(|b| b.enquiry_id == Some(s.enquiry_id)) {
                booking.booking_status = status;
                booking.updated_at = s.at;
            }
        }
        Ok(())
    }
}

/// Keeps every published event, for assertions and local runs without Kafka.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, String, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(topic, key, payload)` in publish order.
    pub async fn events(&self) -> Vec<(String, String, String)> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, topic: &str) -> usize {
        self.events.lock().await.iter().filter(|(t, _, _)| t == topic).count()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> CoreResult<()> {
        self.events
            .lock()
            .await
            .push((topic.to_string(), key.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use safar_core::enquiry::{Actor, Quote, StatusChange};
    use safar_core::package::{EnquiryProduct, HolidayPackage};
    use safar_core::payment::PaymentStatus;
    use safar_core::search::Travellers;

    fn accepted_enquiry(now: DateTime<Utc>) -> Enquiry {
        let product = EnquiryProduct::Holiday(HolidayPackage {
            package_code: "AUH-3N".to_string(),
            destination: "Abu Dhabi".to_string(),
            nights: 3,
            travellers: Travellers { adult: 2, child: 0, infant: 0 },
            inclusions: vec![],
        });
        let mut enquiry = Enquiry::new_draft(Uuid::new_v4(), Uuid::new_v4(), product, None, now).unwrap();
        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now).unwrap();
        enquiry
            .quote(
                Quote {
                    amount: 450_000,
                    currency: "SAR".to_string(),
                    valid_until: now + ChronoDuration::hours(24),
                    quoted_by: "ops@safar.travel".to_string(),
                    remarks: None,
                },
                Actor::Admin,
                now,
            )
            .unwrap();
        enquiry.apply(EnquiryStatus::Accepted, Actor::Customer, now).unwrap();
        enquiry
    }

    fn success_settlement(enquiry: &Enquiry, payment: &Payment, now: DateTime<Utc>) -> Settlement {
        Settlement {
            enquiry_id: enquiry.id,
            expected_status: EnquiryStatus::Accepted,
            transition: Some(StatusChange {
                from: EnquiryStatus::Accepted,
                to: EnquiryStatus::Paid,
                actor: Actor::PaymentGateway,
                at: now,
            }),
            payment_id: payment.id,
            expected_payment_status: PaymentStatus::Pending,
            payment_status: PaymentStatus::Success,
            tracking_id: Some("3100001".to_string()),
            bank_ref_no: None,
            failure_message: None,
            booking_status: Some(BookingStatus::Confirmed),
            at: now,
        }
    }

    #[tokio::test]
    async fn test_save_enquiry_is_compare_and_set() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let enquiry = accepted_enquiry(now);
        store.create_enquiry(&enquiry).await.unwrap();

        let mut cancelled = enquiry.clone();
        cancelled.apply(EnquiryStatus::Cancelled, Actor::Customer, now).unwrap();

        let err = store.save_enquiry(&cancelled, EnquiryStatus::Quoted).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        store.save_enquiry(&cancelled, EnquiryStatus::Accepted).await.unwrap();

        let stored = store.get_enquiry(enquiry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_settlement_applies_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let enquiry = accepted_enquiry(now);
        store.create_enquiry(&enquiry).await.unwrap();
        let payment = Payment::pending(enquiry.id, 450_000, "SAR", now);
        store.record_payment(&payment).await.unwrap();

        let settlement = success_settlement(&enquiry, &payment, now);
        store.settle(&settlement).await.unwrap();
        let replay = store.settle(&settlement).await.unwrap_err();
        assert!(matches!(replay, CoreError::Conflict(_)));

        let stored = store.get_enquiry(enquiry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::Paid);
        assert_eq!(stored.history.len(), 4);
        let payment = store.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.gateway_tracking_id.as_deref(), Some("3100001"));
    }

    #[tokio::test]
    async fn test_settlement_with_stale_payment_changes_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let enquiry = accepted_enquiry(now);
        store.create_enquiry(&enquiry).await.unwrap();
        let mut payment = Payment::pending(enquiry.id, 450_000, "SAR", now);
        payment.status = PaymentStatus::Failed;
        store.record_payment(&payment).await.unwrap();

        let err = store
            .settle(&success_settlement(&enquiry, &payment, now))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let stored = store.get_enquiry(enquiry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EnquiryStatus::Accepted);
    }

    fn flight_for(enquiry: &Enquiry, now: DateTime<Utc>) -> FlightBooking {
        use safar_core::booking::{ContactDetails, NewFlightBooking, Passenger, PassengerType, TicketInfo, TravelDocument};
        use safar_core::search::CabinClass;

        let departure = chrono::NaiveDate::from_ymd_opt(2026, 4, 2).unwrap();
        FlightBooking::new(
            NewFlightBooking {
                s_id: "odis-s-9".to_string(),
                user_id: enquiry.user_id,
                enquiry_id: Some(enquiry.id),
                itinerary_ref: "IT-9".to_string(),
                origin: "JED".to_string(),
                destination: "CAI".to_string(),
                departure_date: departure,
                cabin_class: CabinClass::Economy,
                currency: "SAR".to_string(),
                base_amount: 60_000,
                tax_amount: 9_000,
                service_fee: 2_500,
                contact: ContactDetails {
                    email: "omar@example.com".into(),
                    telephone: "+966511111111".into(),
                },
                passengers: vec![Passenger {
                    passenger_index: 1,
                    passenger_type: PassengerType::Adult,
                    title: None,
                    first_name: "Omar".to_string(),
                    last_name: "Saleh".to_string(),
                    date_of_birth: chrono::NaiveDate::from_ymd_opt(1988, 2, 9).unwrap(),
                    nationality: "EG".to_string(),
                    document: TravelDocument {
                        document_type: "PASSPORT".to_string(),
                        number: "A7654321".to_string().into(),
                        issuing_country: "EG".to_string(),
                        expiry_date: chrono::NaiveDate::from_ymd_opt(2031, 6, 1).unwrap(),
                    },
                    ticket: TicketInfo::default(),
                }],
            },
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_close_enquiry_cancels_pending_bookings() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let enquiry = accepted_enquiry(now);
        store.create_enquiry(&enquiry).await.unwrap();
        let booking = flight_for(&enquiry, now);
        store.create_flight_booking(&booking).await.unwrap();

        let other = accepted_enquiry(now);
        store.create_enquiry(&other).await.unwrap();
        let unrelated = flight_for(&other, now);
        store.create_flight_booking(&unrelated).await.unwrap();

        let mut cancelled = enquiry.clone();
        cancelled.apply(EnquiryStatus::Cancelled, Actor::Customer, now).unwrap();

        // A lost compare-and-set leaves the bookings alone
        let err = store.close_enquiry(&cancelled, EnquiryStatus::Quoted).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        let stored = store.get_flight_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.booking_status, BookingStatus::Pending);

        store.close_enquiry(&cancelled, EnquiryStatus::Accepted).await.unwrap();
        let stored = store.get_flight_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.booking_status, BookingStatus::Cancelled);
        let untouched = store.get_flight_booking(unrelated.id).await.unwrap().unwrap();
        assert_eq!(untouched.booking_status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_discard_booking_removes_it() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let enquiry = accepted_enquiry(now);
        let booking = flight_for(&enquiry, now);
        store.create_flight_booking(&booking).await.unwrap();

        store
            .discard_booking(BookingRef { kind: BookingKind::Flight, id: booking.id })
            .await
            .unwrap();
        assert!(store.get_flight_booking(booking.id).await.unwrap().is_none());
        assert!(store.list_bookings(enquiry.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lapsed_quotes_only_include_quoted() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let accepted = accepted_enquiry(now);
        let mut quoted = accepted_enquiry(now);
        quoted.id = Uuid::new_v4();
        quoted.status = EnquiryStatus::Quoted;
        store.create_enquiry(&accepted).await.unwrap();
        store.create_enquiry(&quoted).await.unwrap();

        let later = now + ChronoDuration::hours(25);
        let lapsed = store.list_lapsed_quotes(later).await.unwrap();
        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].id, quoted.id);
        assert!(store.list_lapsed_quotes(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_sessions_expire() {
        use safar_core::search::{CabinClass, FlightSearchResult, SearchCriteria};

        let store = MemoryStore::new();
        let session = SearchSession::Flight {
            criteria: SearchCriteria {
                segments: vec![],
                travellers: Travellers { adult: 1, child: 0, infant: 0 },
                cabin_class: CabinClass::Economy,
                currency: "SAR".to_string(),
            },
            result: FlightSearchResult {
                s_id: "S-1".to_string(),
                itineraries: vec![],
            },
        };
        store.save_session(&session, 0).await.unwrap();
        assert!(store.get_session("S-1").await.unwrap().is_none());

        store.save_session(&session, 60).await.unwrap();
        assert_eq!(store.get_session("S-1").await.unwrap(), Some(session));
    }
}
