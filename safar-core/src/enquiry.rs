use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::booking::BookingRef;
use crate::money::validate_currency;
use crate::package::EnquiryProduct;
use crate::{invalid, CoreError, CoreResult};

/// Enquiry lifecycle:
/// DRAFT → SUBMITTED → QUOTED → ACCEPTED → PAID → CONFIRMED,
/// with CANCELLED / EXPIRED reachable from the non-terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnquiryStatus {
    Draft,
    Submitted,
    Quoted,
    Accepted,
    Paid,
    Confirmed,
    Cancelled,
    Expired,
}

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Customer,
    Admin,
    PaymentGateway,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer => "CUSTOMER",
            Actor::Admin => "ADMIN",
            Actor::PaymentGateway => "PAYMENT_GATEWAY",
            Actor::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EnquiryStatus {
    pub const ALL: [EnquiryStatus; 8] = [
        EnquiryStatus::Draft,
        EnquiryStatus::Submitted,
        EnquiryStatus::Quoted,
        EnquiryStatus::Accepted,
        EnquiryStatus::Paid,
        EnquiryStatus::Confirmed,
        EnquiryStatus::Cancelled,
        EnquiryStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryStatus::Draft => "DRAFT",
            EnquiryStatus::Submitted => "SUBMITTED",
            EnquiryStatus::Quoted => "QUOTED",
            EnquiryStatus::Accepted => "ACCEPTED",
            EnquiryStatus::Paid => "PAID",
            EnquiryStatus::Confirmed => "CONFIRMED",
            EnquiryStatus::Cancelled => "CANCELLED",
            EnquiryStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EnquiryStatus::Confirmed | EnquiryStatus::Cancelled | EnquiryStatus::Expired
        )
    }

    /// The one place that decides whether `actor` may move an enquiry from
    /// `self` to `to`. PAID is only entered through the payment gateway and
    /// only left by an admin, because money has changed hands.
    pub fn transition(self, to: EnquiryStatus, actor: Actor) -> CoreResult<EnquiryStatus> {
        use Actor::*;
        use EnquiryStatus::*;

        let allowed = match (self, to) {
            (Draft, Submitted) => actor == Customer,
            (Submitted | Quoted, Quoted) => matches!(actor, Admin | System),
            (Quoted, Accepted) => actor == Customer,
            (Accepted, Paid) => actor == PaymentGateway,
            (Paid, Confirmed) => actor == Admin,
            (Paid, Cancelled) => actor == Admin,
            (Paid, Expired) => false,
            (from, Cancelled) if !from.is_terminal() => matches!(actor, Customer | Admin),
            (from, Expired) if !from.is_terminal() => actor == System,
            _ => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
                actor: actor.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for EnquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub amount: i64,
    pub currency: String,
    pub valid_until: DateTime<Utc>,
    pub quoted_by: String,
    pub remarks: Option<String>,
}

impl Quote {
    pub fn validate(&self) -> CoreResult<()> {
        if self.amount <= 0 {
            return Err(invalid("quote amount must be positive"));
        }
        validate_currency(&self.currency)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: EnquiryStatus,
    pub to: EnquiryStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enquiry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product: EnquiryProduct,
    pub notes: Option<String>,
    pub status: EnquiryStatus,
    pub quote: Option<Quote>,
    #[serde(default)]
    pub bookings: Vec<BookingRef>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enquiry {
    pub fn new_draft(
        id: Uuid,
        user_id: Uuid,
        product: EnquiryProduct,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        product.validate()?;
        Ok(Self {
            id,
            user_id,
            product,
            notes,
            status: EnquiryStatus::Draft,
            quote: None,
            bookings: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a transition, recording it in the history.
    pub fn apply(&mut self, to: EnquiryStatus, actor: Actor, now: DateTime<Utc>) -> CoreResult<()> {
        let next = self.status.transition(to, actor)?;

        match next {
            EnquiryStatus::Quoted if self.quote.is_none() => {
                return Err(invalid("an enquiry cannot be QUOTED without a quote"));
            }
            EnquiryStatus::Accepted => match &self.quote {
                Some(q) if q.is_valid_at(now) => {}
                Some(_) => return Err(invalid("the quote has expired")),
                None => return Err(invalid("there is no quote to accept")),
            },
            _ => {}
        }

        self.history.push(StatusChange {
            from: self.status,
            to: next,
            actor,
            at: now,
        });
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Attach (or replace) the quote and move to QUOTED.
    pub fn quote(&mut self, quote: Quote, actor: Actor, now: DateTime<Utc>) -> CoreResult<()> {
        quote.validate()?;
        self.status.transition(EnquiryStatus::Quoted, actor)?;
        if quote.valid_until <= now {
            return Err(invalid("quote validity must be in the future"));
        }
        self.quote = Some(quote);
        self.apply(EnquiryStatus::Quoted, actor, now)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn last_change(&self) -> Option<&StatusChange> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::HolidayPackage;
    use crate::search::Travellers;
    use chrono::Duration;

    fn draft() -> Enquiry {
        let product = EnquiryProduct::Holiday(HolidayPackage {
            package_code: "BAKU-4N".to_string(),
            destination: "Baku".to_string(),
            nights: 4,
            travellers: Travellers { adult: 2, child: 0, infant: 0 },
            inclusions: vec![],
        });
        Enquiry::new_draft(Uuid::new_v4(), Uuid::new_v4(), product, None, Utc::now()).unwrap()
    }

    fn quote(valid_for: Duration) -> Quote {
        Quote {
            amount: 450_000,
            currency: "SAR".to_string(),
            valid_until: Utc::now() + valid_for,
            quoted_by: "agent@safar.travel".to_string(),
            remarks: None,
        }
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut enquiry = draft();
        let now = Utc::now();

        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now).unwrap();
        enquiry.quote(quote(Duration::hours(24)), Actor::Admin, now).unwrap();
        enquiry.apply(EnquiryStatus::Accepted, Actor::Customer, now).unwrap();
        enquiry.apply(EnquiryStatus::Paid, Actor::PaymentGateway, now).unwrap();
        enquiry.apply(EnquiryStatus::Confirmed, Actor::Admin, now).unwrap();

        assert_eq!(enquiry.status, EnquiryStatus::Confirmed);
        assert_eq!(enquiry.history.len(), 5);
        assert!(enquiry.status.is_terminal());
    }

    #[test]
    fn test_paid_only_via_gateway() {
        for actor in [Actor::Customer, Actor::Admin, Actor::System] {
            assert!(EnquiryStatus::Accepted
                .transition(EnquiryStatus::Paid, actor)
                .is_err());
        }
        assert!(EnquiryStatus::Accepted
            .transition(EnquiryStatus::Paid, Actor::PaymentGateway)
            .is_ok());
    }

    #[test]
    fn test_cancel_and_expire_from_non_terminal() {
        for from in [
            EnquiryStatus::Draft,
            EnquiryStatus::Submitted,
            EnquiryStatus::Quoted,
            EnquiryStatus::Accepted,
        ] {
            assert!(from.transition(EnquiryStatus::Cancelled, Actor::Customer).is_ok());
            assert!(from.transition(EnquiryStatus::Expired, Actor::System).is_ok());
            assert!(from.transition(EnquiryStatus::Expired, Actor::Customer).is_err());
        }
        for from in [
            EnquiryStatus::Confirmed,
            EnquiryStatus::Cancelled,
            EnquiryStatus::Expired,
        ] {
            assert!(from.transition(EnquiryStatus::Cancelled, Actor::Admin).is_err());
        }
    }

    #[test]
    fn test_paid_cancellation_is_admin_only() {
        assert!(EnquiryStatus::Paid
            .transition(EnquiryStatus::Cancelled, Actor::Customer)
            .is_err());
        assert!(EnquiryStatus::Paid
            .transition(EnquiryStatus::Cancelled, Actor::Admin)
            .is_ok());
        assert!(EnquiryStatus::Paid
            .transition(EnquiryStatus::Expired, Actor::System)
            .is_err());
    }

    #[test]
    fn test_no_skipping_states() {
        let mut enquiry = draft();
        assert!(enquiry
            .apply(EnquiryStatus::Accepted, Actor::Customer, Utc::now())
            .is_err());
        assert_eq!(enquiry.status, EnquiryStatus::Draft);
        assert!(enquiry.history.is_empty());
    }

    #[test]
    fn test_expired_quote_cannot_be_accepted() {
        let mut enquiry = draft();
        let now = Utc::now();
        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now).unwrap();
        enquiry.quote(quote(Duration::minutes(5)), Actor::Admin, now).unwrap();

        let later = now + Duration::minutes(10);
        assert!(enquiry.apply(EnquiryStatus::Accepted, Actor::Customer, later).is_err());
        assert_eq!(enquiry.status, EnquiryStatus::Quoted);
    }

    #[test]
    fn test_requote_replaces_quote() {
        let mut enquiry = draft();
        let now = Utc::now();
        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now).unwrap();
        enquiry.quote(quote(Duration::hours(1)), Actor::Admin, now).unwrap();

        let mut cheaper = quote(Duration::hours(1));
        cheaper.amount = 400_000;
        enquiry.quote(cheaper, Actor::Admin, now).unwrap();
        assert_eq!(enquiry.quote.as_ref().map(|q| q.amount), Some(400_000));
    }

    #[test]
    fn test_customer_cannot_quote() {
        let mut enquiry = draft();
        let now = Utc::now();
        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now).unwrap();
        assert!(enquiry.quote(quote(Duration::hours(1)), Actor::Customer, now).is_err());
        assert!(enquiry.quote.is_none());
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in EnquiryStatus::ALL {
            assert_eq!(EnquiryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EnquiryStatus::parse("BOGUS"), None);
    }
}
