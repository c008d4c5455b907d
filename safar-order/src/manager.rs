use chrono::{DateTime, Duration, Utc};
use safar_core::booking::BookingRef;
use safar_core::enquiry::{Actor, Enquiry, EnquiryStatus, Quote, StatusChange};
use safar_core::events::{emit, EventPublisher};
use safar_core::package::EnquiryProduct;
use safar_core::repository::EnquiryRepository;
use safar_core::CoreError;
use safar_shared::models::{EnquiryTransitionedEvent, TOPIC_ENQUIRY_TRANSITIONED};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Quote terms an admin sends; validity defaults to the configured window.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTerms {
    pub amount: i64,
    pub currency: String,
    pub valid_until: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

/// Drives enquiries through their lifecycle. Every change goes through
/// `EnquiryStatus::transition` and is persisted compare-and-set, so two
/// concurrent requests can never both move the same enquiry.
pub struct EnquiryManager {
    enquiries: Arc<dyn EnquiryRepository>,
    events: Arc<dyn EventPublisher>,
    quote_validity: Duration,
}

impl EnquiryManager {
    pub fn new(
        enquiries: Arc<dyn EnquiryRepository>,
        events: Arc<dyn EventPublisher>,
        quote_validity_hours: i64,
    ) -> Self {
        Self {
            enquiries,
            events,
            quote_validity: Duration::hours(quote_validity_hours),
        }
    }

    pub async fn create_draft(
        &self,
        user_id: Uuid,
        product: EnquiryProduct,
        notes: Option<String>,
    ) -> Result<Enquiry, EnquiryError> {
        let enquiry = Enquiry::new_draft(Uuid::new_v4(), user_id, product, notes, Utc::now())?;
        self.enquiries.create_enquiry(&enquiry).await?;
        info!("Enquiry {} drafted: {}", enquiry.id, enquiry.product.title());
        Ok(enquiry)
    }

    pub async fn get(&self, id: Uuid) -> Result<Enquiry, EnquiryError> {
        self.enquiries
            .get_enquiry(id)
            .await?
            .ok_or(EnquiryError::NotFound(id))
    }

    /// Fetch an enquiry on behalf of a customer. Someone else's enquiry is
    /// reported as forbidden, not hidden.
    pub async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Enquiry, EnquiryError> {
        let enquiry = self.get(id).await?;
        if !enquiry.is_owned_by(user_id) {
            return Err(EnquiryError::Forbidden(id));
        }
        Ok(enquiry)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Enquiry>, EnquiryError> {
        Ok(self.enquiries.list_for_user(user_id).await?)
    }

    pub async fn list_by_status(&self, status: Option<EnquiryStatus>) -> Result<Vec<Enquiry>, EnquiryError> {
        Ok(self.enquiries.list_by_status(status).await?)
    }

    pub async fn submit(&self, id: Uuid, user_id: Uuid) -> Result<Enquiry, EnquiryError> {
        let enquiry = self.get_for_user(id, user_id).await?;
        self.transition(enquiry, EnquiryStatus::Submitted, Actor::Customer).await
    }

    pub async fn accept(&self, id: Uuid, user_id: Uuid) -> Result<Enquiry, EnquiryError> {
        let enquiry = self.get_for_user(id, user_id).await?;
        self.transition(enquiry, EnquiryStatus::Accepted, Actor::Customer).await
    }

    pub async fn cancel(&self, id: Uuid, user_id: Uuid) -> Result<Enquiry, EnquiryError> {
        let enquiry = self.get_for_user(id, user_id).await?;
        self.transition(enquiry, EnquiryStatus::Cancelled, Actor::Customer).await
    }

    /// Admin cancellation of an enquiry no money has been taken for. Paid
    /// enquiries are cancelled together with their payment by the
    /// `PaymentOrchestrator`.
    pub async fn cancel_unpaid(&self, id: Uuid) -> Result<Enquiry, EnquiryError> {
        let enquiry = self.get(id).await?;
        if enquiry.status == EnquiryStatus::Paid {
            return Err(CoreError::Conflict(format!("enquiry {} is paid; cancel it with a refund", id)).into());
        }
        self.transition(enquiry, EnquiryStatus::Cancelled, Actor::Admin).await
    }

    pub async fn quote(&self, id: Uuid, terms: QuoteTerms, quoted_by: &str) -> Result<Enquiry, EnquiryError> {
        let mut enquiry = self.get(id).await?;
        let expected = enquiry.status;
        let now = Utc::now();
        let quote = Quote {
            amount: terms.amount,
            currency: terms.currency,
            valid_until: terms.valid_until.unwrap_or(now + self.quote_validity),
            quoted_by: quoted_by.to_string(),
            remarks: terms.remarks,
        };
        enquiry.quote(quote, Actor::Admin, now)?;
        self.enquiries.save_enquiry(&enquiry, expected).await?;
        self.announce(&enquiry).await;
        Ok(enquiry)
    }

    /// PAID → CONFIRMED once the agency has fulfilled the booking.
    pub async fn confirm(&self, id: Uuid) -> Result<Enquiry, EnquiryError> {
        let enquiry = self.get(id).await?;
        self.transition(enquiry, EnquiryStatus::Confirmed, Actor::Admin).await
    }

    /// Enquiry behind a direct (search-and-book) booking. It walks the same
    /// transitions as a hand-quoted enquiry and ends ACCEPTED with a system
    /// quote for the booking total, ready for payment.
    pub async fn open_instant(
        &self,
        id: Uuid,
        user_id: Uuid,
        product: EnquiryProduct,
        amount: i64,
        currency: &str,
        bookings: Vec<BookingRef>,
    ) -> Result<Enquiry, EnquiryError> {
        let now = Utc::now();
        let mut enquiry = Enquiry::new_draft(id, user_id, product, None, now)?;
        enquiry.bookings = bookings;
        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now)?;
        enquiry.quote(
            Quote {
                amount,
                currency: currency.to_string(),
                valid_until: now + self.quote_validity,
                quoted_by: Actor::System.as_str().to_string(),
                remarks: None,
            },
            Actor::System,
            now,
        )?;
        enquiry.apply(EnquiryStatus::Accepted, Actor::Customer, now)?;

        self.enquiries.create_enquiry(&enquiry).await?;
        for change in &enquiry.history {
            self.publish(&enquiry, change).await;
        }
        info!("Instant enquiry {} opened for {} bookings", enquiry.id, enquiry.bookings.len());
        Ok(enquiry)
    }

    /// Expire QUOTED enquiries whose quote lapsed before `now`. Returns how
    /// many were expired; enquiries that moved on concurrently are skipped.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize, EnquiryError> {
        let lapsed = self.enquiries.list_lapsed_quotes(now).await?;
        let mut expired = 0;
        for mut enquiry in lapsed {
            let expected = enquiry.status;
            if let Err(e) = enquiry.apply(EnquiryStatus::Expired, Actor::System, now) {
                warn!("Cannot expire enquiry {}: {}", enquiry.id, e);
                continue;
            }
            match self.persist(&enquiry, expected).await {
                Ok(()) => {
                    expired += 1;
                    self.announce(&enquiry).await;
                }
                Err(CoreError::Conflict(msg)) => debug!("Skipping expiry: {}", msg),
                Err(e) => return Err(e.into()),
            }
        }
        if expired > 0 {
            info!("Expired {} enquiries with lapsed quotes", expired);
        }
        Ok(expired)
    }

    async fn transition(
        &self,
        mut enquiry: Enquiry,
        to: EnquiryStatus,
        actor: Actor,
    ) -> Result<Enquiry, EnquiryError> {
        let expected = enquiry.status;
        enquiry.apply(to, actor, Utc::now())?;
        self.persist(&enquiry, expected).await?;
        self.announce(&enquiry).await;
        Ok(enquiry)
    }

    /// Cancelled and expired enquiries take their unpaid bookings with them.
    async fn persist(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> Result<(), CoreError> {
        match enquiry.status {
            EnquiryStatus::Cancelled | EnquiryStatus::Expired => {
                self.enquiries.close_enquiry(enquiry, expected).await
            }
            _ => self.enquiries.save_enquiry(enquiry, expected).await,
        }
    }

    async fn announce(&self, enquiry: &Enquiry) {
        if let Some(change) = enquiry.last_change() {
            info!(
                "Enquiry {} {} -> {} by {}",
                enquiry.id, change.from, change.to, change.actor
            );
            self.publish(enquiry, change).await;
        }
    }

    async fn publish(&self, enquiry: &Enquiry, change: &StatusChange) {
        publish_transition(self.events.as_ref(), enquiry, change).await;
    }
}

pub(crate) async fn publish_transition(events: &dyn EventPublisher, enquiry: &Enquiry, change: &StatusChange) {
    let event = EnquiryTransitionedEvent {
        enquiry_id: enquiry.id,
        user_id: enquiry.user_id,
        from: change.from.as_str().to_string(),
        to: change.to.as_str().to_string(),
        actor: change.actor.as_str().to_string(),
        timestamp: change.at.timestamp(),
    };
    emit(events, TOPIC_ENQUIRY_TRANSITIONED, &enquiry.id.to_string(), &event).await;
}

#[derive(Debug, thiserror::Error)]
pub enum EnquiryError {
    #[error("Enquiry not found: {0}")]
    NotFound(Uuid),

    #[error("Enquiry {0} belongs to another customer")]
    Forbidden(Uuid),

    #[error(transparent)]
    Core(#[from] CoreError),
}
