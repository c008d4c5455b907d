use chrono::{DateTime, Utc};
use safar_core::booking::BookingStatus;
use safar_core::enquiry::{Actor, Enquiry, EnquiryStatus, StatusChange};
use safar_core::events::{emit, EventPublisher};
use safar_core::payment::{
    GatewayCallback, Payment, PaymentGateway, PaymentRequest, PaymentSession, PaymentStatus, Settlement,
};
use safar_core::repository::{EnquiryRepository, PaymentLedger};
use safar_core::{CoreError, GatewayError};
use safar_shared::models::{
    BookingConfirmedEvent, PaymentReconciledEvent, TOPIC_BOOKING_CONFIRMED, TOPIC_PAYMENT_RECONCILED,
};
use safar_shared::Masked;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::locks::KeyedLocks;
use crate::manager::{publish_transition, EnquiryError, EnquiryManager};
use crate::reconcile::{decide, Decision};

/// Who is paying; taken from the authenticated session.
#[derive(Debug, Clone)]
pub struct Payer {
    pub user_id: Uuid,
    pub name: String,
    pub email: Masked<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandoff {
    pub payment_id: Uuid,
    #[serde(flatten)]
    pub session: PaymentSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// This delivery changed state; the payment ended in the given status.
    Applied(PaymentStatus),
    /// An earlier delivery already settled the payment.
    Duplicate,
    Ignored(String),
}

/// Read-only payment view for the result page and status polling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub enquiry_id: Uuid,
    pub enquiry_status: EnquiryStatus,
    pub payment_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub tracking_id: Option<String>,
    pub failure_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct PaymentOrchestrator {
    enquiries: Arc<dyn EnquiryRepository>,
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn PaymentGateway>,
    manager: Arc<EnquiryManager>,
    events: Arc<dyn EventPublisher>,
    locks: KeyedLocks,
}

impl PaymentOrchestrator {
    pub fn new(
        enquiries: Arc<dyn EnquiryRepository>,
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn PaymentGateway>,
        manager: Arc<EnquiryManager>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            enquiries,
            ledger,
            gateway,
            manager,
            events,
            locks: KeyedLocks::new(),
        }
    }

    async fn load(&self, enquiry_id: Uuid) -> Result<Enquiry, PaymentError> {
        self.enquiries
            .get_enquiry(enquiry_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("enquiry {}", enquiry_id)))
    }

    /// Record a pending payment for an ACCEPTED enquiry and get the gateway
    /// hand-off for it. The enquiry status is not touched; only the gateway
    /// callback moves it to PAID.
    pub async fn start_payment(&self, enquiry_id: Uuid, payer: &Payer) -> Result<PaymentHandoff, PaymentError> {
        let enquiry = self.load(enquiry_id).await?;
        if !enquiry.is_owned_by(payer.user_id) {
            return Err(PaymentError::Forbidden(enquiry_id));
        }
        if enquiry.status != EnquiryStatus::Accepted {
            return Err(PaymentError::NotPayable(format!(
                "enquiry {} is {}, only ACCEPTED enquiries can be paid",
                enquiry_id, enquiry.status
            )));
        }
        let now = Utc::now();
        let quote = match &enquiry.quote {
            Some(q) if q.is_valid_at(now) => q,
            Some(_) => return Err(PaymentError::NotPayable("the quote has expired".to_string())),
            None => return Err(PaymentError::NotPayable("the enquiry has no quote".to_string())),
        };

        let payment = Payment::pending(enquiry_id, quote.amount, &quote.currency, now);
        self.ledger.record_payment(&payment).await?;

        let request = PaymentRequest {
            payment_id: payment.id,
            enquiry_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            customer_name: payer.name.clone(),
            customer_email: payer.email.clone(),
        };

        match self.gateway.initiate(&request).await {
            Ok(session) => {
                info!(
                    "Payment {} started for enquiry {} via {}",
                    payment.id,
                    enquiry_id,
                    self.gateway.name()
                );
                Ok(PaymentHandoff {
                    payment_id: payment.id,
                    session,
                })
            }
            Err(e) => {
                error!("Gateway hand-off for payment {} failed: {}", payment.id, e);
                let abandon = Settlement {
                    enquiry_id,
                    expected_status: enquiry.status,
                    transition: None,
                    payment_id: payment.id,
                    expected_payment_status: PaymentStatus::Pending,
                    payment_status: PaymentStatus::Failed,
                    tracking_id: None,
                    bank_ref_no: None,
                    failure_message: Some(e.to_string()),
                    booking_status: None,
                    at: Utc::now(),
                };
                if let Err(settle_err) = self.ledger.settle(&abandon).await {
                    warn!("Could not mark payment {} failed: {}", payment.id, settle_err);
                }
                Err(e.into())
            }
        }
    }

    /// Apply a decoded gateway callback. Deliveries for one enquiry are
    /// handled one at a time; a repeated delivery changes nothing.
    pub async fn reconcile(&self, callback: &GatewayCallback) -> Result<ReconcileOutcome, PaymentError> {
        let enquiry_id = callback.enquiry_id()?;
        let _guard = self.locks.acquire(enquiry_id).await;

        for attempt in 1..=2 {
            let enquiry = self.load(enquiry_id).await?;
            let Some(payment) = self.resolve_payment(&enquiry, callback).await? else {
                warn!("Callback for enquiry {} matches no payment", enquiry_id);
                return Ok(ReconcileOutcome::Ignored("no matching payment".to_string()));
            };

            let settlement = match decide(&enquiry, &payment, callback, Utc::now()) {
                Decision::Duplicate => {
                    info!("Duplicate callback for payment {} ignored", payment.id);
                    return Ok(ReconcileOutcome::Duplicate);
                }
                Decision::Ignore(reason) => {
                    error!("Callback for enquiry {} not applied: {}", enquiry_id, reason);
                    return Ok(ReconcileOutcome::Ignored(reason));
                }
                Decision::Apply(settlement) => settlement,
            };

            match self.ledger.settle(&settlement).await {
                Ok(()) => {
                    if settlement.payment_status == PaymentStatus::Success && settlement.transition.is_none() {
                        error!(
                            "Payment {} captured for {} enquiry {}, refund it in the gateway console",
                            payment.id, enquiry.status, enquiry_id
                        );
                    }
                    self.announce_settlement(&enquiry, &payment, &settlement).await;
                    return Ok(ReconcileOutcome::Applied(settlement.payment_status));
                }
                Err(CoreError::Conflict(msg)) if attempt == 1 => {
                    warn!("Settlement for enquiry {} raced ({}), re-reading", enquiry_id, msg);
                }
                Err(CoreError::Conflict(_)) => return Ok(ReconcileOutcome::Duplicate),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ReconcileOutcome::Duplicate)
    }

    async fn resolve_payment(
        &self,
        enquiry: &Enquiry,
        callback: &GatewayCallback,
    ) -> Result<Option<Payment>, PaymentError> {
        if let Some(payment_id) = callback.payment_ref {
            return Ok(self.ledger.get_payment(payment_id).await?);
        }
        // Without our reference, fall back to the newest pending attempt.
        let payments = self.ledger.list_payments(enquiry.id).await?;
        Ok(payments
            .into_iter()
            .rev()
            .find(|p| p.status == PaymentStatus::Pending))
    }

    /// Admin cancellation. A PAID enquiry is cancelled together with its
    /// payment (marked refunded) and its bookings; anything else is a plain
    /// transition.
    pub async fn admin_cancel(&self, enquiry_id: Uuid) -> Result<Enquiry, PaymentError> {
        let enquiry = self.load(enquiry_id).await?;
        if enquiry.status == EnquiryStatus::Paid {
            self.cancel_paid(enquiry_id).await
        } else {
            Ok(self.manager.cancel_unpaid(enquiry_id).await?)
        }
    }

    pub async fn cancel_paid(&self, enquiry_id: Uuid) -> Result<Enquiry, PaymentError> {
        let _guard = self.locks.acquire(enquiry_id).await;
        let enquiry = self.load(enquiry_id).await?;
        let now = Utc::now();
        if enquiry.status != EnquiryStatus::Paid {
            return Err(CoreError::Conflict(format!("enquiry {} is {}, not PAID", enquiry_id, enquiry.status)).into());
        }

        let payment = self
            .ledger
            .list_payments(enquiry_id)
            .await?
            .into_iter()
            .rev()
            .find(|p| p.status == PaymentStatus::Success)
            .ok_or_else(|| PaymentError::NotFound(format!("successful payment for enquiry {}", enquiry_id)))?;

        let settlement = Settlement {
            enquiry_id,
            expected_status: EnquiryStatus::Paid,
            transition: Some(StatusChange {
                from: EnquiryStatus::Paid,
                to: EnquiryStatus::Cancelled,
                actor: Actor::Admin,
                at: now,
            }),
            payment_id: payment.id,
            expected_payment_status: PaymentStatus::Success,
            payment_status: PaymentStatus::Refunded,
            tracking_id: None,
            bank_ref_no: None,
            failure_message: None,
            booking_status: Some(BookingStatus::Cancelled),
            at: now,
        };
        self.ledger.settle(&settlement).await?;
        info!("Paid enquiry {} cancelled, payment {} marked refunded", enquiry_id, payment.id);
        self.announce_settlement(&enquiry, &payment, &settlement).await;
        self.load(enquiry_id).await
    }

    /// Customer-facing status; the enquiry must belong to `user_id`.
    pub async fn status_for_user(&self, enquiry_id: Uuid, user_id: Uuid) -> Result<PaymentStatusView, PaymentError> {
        let enquiry = self.load(enquiry_id).await?;
        if !enquiry.is_owned_by(user_id) {
            return Err(PaymentError::Forbidden(enquiry_id));
        }
        self.view(enquiry).await
    }

    /// Status for the post-payment result page. Never changes anything.
    pub async fn status(&self, enquiry_id: Uuid) -> Result<PaymentStatusView, PaymentError> {
        let enquiry = self.load(enquiry_id).await?;
        self.view(enquiry).await
    }

    async fn view(&self, enquiry: Enquiry) -> Result<PaymentStatusView, PaymentError> {
        let latest = self.ledger.list_payments(enquiry.id).await?.into_iter().last();
        Ok(PaymentStatusView {
            enquiry_id: enquiry.id,
            enquiry_status: enquiry.status,
            payment_id: latest.as_ref().map(|p| p.id),
            payment_status: latest.as_ref().map(|p| p.status),
            amount: latest.as_ref().map(|p| p.amount),
            currency: latest.as_ref().map(|p| p.currency.clone()),
            tracking_id: latest.as_ref().and_then(|p| p.gateway_tracking_id.clone()),
            failure_message: latest.as_ref().and_then(|p| p.failure_message.clone()),
            updated_at: latest.map(|p| p.updated_at).unwrap_or(enquiry.updated_at),
        })
    }

    async fn announce_settlement(&self, enquiry: &Enquiry, payment: &Payment, settlement: &Settlement) {
        let key = enquiry.id.to_string();
        let timestamp = settlement.at.timestamp();

        let reconciled = PaymentReconciledEvent {
            enquiry_id: enquiry.id,
            payment_id: payment.id,
            status: settlement.payment_status.as_str().to_string(),
            amount_minor: payment.amount,
            currency: payment.currency.clone(),
            tracking_id: settlement.tracking_id.clone().or_else(|| payment.gateway_tracking_id.clone()),
            timestamp,
        };
        emit(self.events.as_ref(), TOPIC_PAYMENT_RECONCILED, &key, &reconciled).await;

        if let Some(change) = &settlement.transition {
            info!(
                "Enquiry {} {} -> {} by {}",
                enquiry.id, change.from, change.to, change.actor
            );
            publish_transition(self.events.as_ref(), enquiry, change).await;
        }

        if settlement.booking_status == Some(BookingStatus::Confirmed) {
            for booking in &enquiry.bookings {
                let event = BookingConfirmedEvent {
                    booking_id: booking.id,
                    booking_kind: booking.kind.as_str().to_string(),
                    enquiry_id: enquiry.id,
                    timestamp,
                };
                emit(self.events.as_ref(), TOPIC_BOOKING_CONFIRMED, &booking.id.to_string(), &event).await;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Enquiry {0} belongs to another customer")]
    Forbidden(Uuid),

    #[error("Not payable: {0}")]
    NotPayable(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<EnquiryError> for PaymentError {
    fn from(e: EnquiryError) -> Self {
        match e {
            EnquiryError::NotFound(id) => PaymentError::NotFound(format!("enquiry {}", id)),
            EnquiryError::Forbidden(id) => PaymentError::Forbidden(id),
            EnquiryError::Core(core) => PaymentError::Core(core),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use safar_core::package::{EnquiryProduct, HolidayPackage};
    use safar_core::payment::GatewayOrderStatus;
    use safar_core::search::Travellers;
    use crate::reconcile::REFUND_REQUIRED;
    use safar_shared::models::TOPIC_ENQUIRY_TRANSITIONED;
    use safar_store::{MemoryStore, RecordingPublisher};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeGateway {
        down: AtomicBool,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GatewayError::Config("gateway offline".to_string()));
            }
            Ok(PaymentSession {
                enc_request: format!("enc-{}", request.payment_id),
                access_code: "AVTEST".to_string(),
                gateway_url: "https://pay.example/transaction".to_string(),
                enquiry_id: request.enquiry_id,
            })
        }

        fn decode_callback(&self, _enc_response: &str) -> Result<GatewayCallback, GatewayError> {
            Err(GatewayError::Config("not used".to_string()))
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct Fixture {
        orchestrator: PaymentOrchestrator,
        manager: Arc<EnquiryManager>,
        gateway: Arc<FakeGateway>,
        store: Arc<MemoryStore>,
        events: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingPublisher::new());
        let gateway = Arc::new(FakeGateway::default());
        let manager = Arc::new(EnquiryManager::new(store.clone(), events.clone(), 48));
        let orchestrator = PaymentOrchestrator::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            manager.clone(),
            events.clone(),
        );
        Fixture {
            orchestrator,
            manager,
            gateway,
            store,
            events,
        }
    }

    fn payer(user_id: Uuid) -> Payer {
        Payer {
            user_id,
            name: "Mariam Al Balushi".to_string(),
            email: Masked::from("mariam@example.com"),
        }
    }

    async fn accepted_enquiry(fx: &Fixture, customer: Uuid) -> Enquiry {
        let product = EnquiryProduct::Holiday(HolidayPackage {
            package_code: "BKK-6N".to_string(),
            destination: "Bangkok".to_string(),
            nights: 6,
            travellers: Travellers { adult: 2, child: 0, infant: 0 },
            inclusions: vec![],
        });
        fx.manager
            .open_instant(Uuid::new_v4(), customer, product, 245_500, "OMR", vec![])
            .await
            .unwrap()
    }

    fn success(enquiry_id: Uuid, payment_id: Uuid) -> GatewayCallback {
        GatewayCallback {
            order_id: enquiry_id.to_string(),
            payment_ref: Some(payment_id),
            tracking_id: Some("310009876543".to_string()),
            bank_ref_no: Some("BNK-1".to_string()),
            order_status: GatewayOrderStatus::Success,
            failure_message: None,
            amount: Some(245_500),
            currency: Some("OMR".to_string()),
        }
    }

    #[tokio::test]
    async fn test_start_payment_keeps_enquiry_accepted() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;

        let handoff = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();
        assert!(handoff.session.is_complete());

        let payment = fx.store.get_payment(handoff.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, 245_500);
        assert_eq!(
            fx.manager.get(enquiry.id).await.unwrap().status,
            EnquiryStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_start_payment_checks_owner_and_status() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;

        let err = fx
            .orchestrator
            .start_payment(enquiry.id, &payer(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Forbidden(_)));

        fx.manager.cancel(enquiry.id, customer).await.unwrap();
        let err = fx
            .orchestrator
            .start_payment(enquiry.id, &payer(customer))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotPayable(_)));
        assert!(fx.store.list_payments(enquiry.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_marks_payment_failed() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        fx.gateway.down.store(true, Ordering::SeqCst);

        let err = fx
            .orchestrator
            .start_payment(enquiry.id, &payer(customer))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(_)));

        let payments = fx.store.list_payments(enquiry.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(
            fx.manager.get(enquiry.id).await.unwrap().status,
            EnquiryStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_duplicate_callback_applies_once() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        let handoff = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();
        let before = fx.events.count(TOPIC_ENQUIRY_TRANSITIONED).await;

        let callback = success(enquiry.id, handoff.payment_id);
        let first = fx.orchestrator.reconcile(&callback).await.unwrap();
        let second = fx.orchestrator.reconcile(&callback).await.unwrap();

        assert_eq!(first, ReconcileOutcome::Applied(PaymentStatus::Success));
        assert_eq!(second, ReconcileOutcome::Duplicate);

        let paid = fx.manager.get(enquiry.id).await.unwrap();
        assert_eq!(paid.status, EnquiryStatus::Paid);
        assert_eq!(paid.last_change().unwrap().actor, Actor::PaymentGateway);
        assert_eq!(fx.events.count(TOPIC_ENQUIRY_TRANSITIONED).await, before + 1);
        assert_eq!(fx.events.count(TOPIC_PAYMENT_RECONCILED).await, 1);

        let view = fx.orchestrator.status_for_user(enquiry.id, customer).await.unwrap();
        assert_eq!(view.payment_status, Some(PaymentStatus::Success));
        assert_eq!(view.tracking_id.as_deref(), Some("310009876543"));
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_apply_once() {
        let fx = Arc::new(fixture());
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        let handoff = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();
        let callback = success(enquiry.id, handoff.payment_id);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let (fx, callback) = (fx.clone(), callback.clone());
            handles.push(tokio::spawn(async move { fx.orchestrator.reconcile(&callback).await.unwrap() }));
        }
        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ReconcileOutcome::Applied(_)) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(fx.manager.get(enquiry.id).await.unwrap().history.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_callback_allows_retry() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        let first = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();

        let mut declined = success(enquiry.id, first.payment_id);
        declined.order_status = GatewayOrderStatus::Failure;
        declined.failure_message = Some("Card declined".to_string());
        assert_eq!(
            fx.orchestrator.reconcile(&declined).await.unwrap(),
            ReconcileOutcome::Applied(PaymentStatus::Failed)
        );

        let view = fx.orchestrator.status(enquiry.id).await.unwrap();
        assert_eq!(view.enquiry_status, EnquiryStatus::Accepted);
        assert_eq!(view.failure_message.as_deref(), Some("Card declined"));

        let second = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();
        assert_ne!(second.payment_id, first.payment_id);
    }

    #[tokio::test]
    async fn test_callback_without_reference_uses_pending_payment() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        let handoff = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();

        let mut callback = success(enquiry.id, handoff.payment_id);
        callback.payment_ref = None;
        assert_eq!(
            fx.orchestrator.reconcile(&callback).await.unwrap(),
            ReconcileOutcome::Applied(PaymentStatus::Success)
        );
        let payment = fx.store.get_payment(handoff.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn test_success_after_cancel_is_recorded_for_refund() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        let handoff = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();
        fx.manager.cancel(enquiry.id, customer).await.unwrap();

        let callback = success(enquiry.id, handoff.payment_id);
        assert_eq!(
            fx.orchestrator.reconcile(&callback).await.unwrap(),
            ReconcileOutcome::Applied(PaymentStatus::Success)
        );
        assert_eq!(
            fx.orchestrator.reconcile(&callback).await.unwrap(),
            ReconcileOutcome::Duplicate
        );

        let view = fx.orchestrator.status(enquiry.id).await.unwrap();
        assert_eq!(view.enquiry_status, EnquiryStatus::Cancelled);
        assert_eq!(view.payment_status, Some(PaymentStatus::Success));
        assert!(view.failure_message.unwrap().starts_with(REFUND_REQUIRED));
        assert_eq!(fx.events.count(TOPIC_BOOKING_CONFIRMED).await, 0);
    }

    #[tokio::test]
    async fn test_admin_cancel_of_paid_enquiry_refunds() {
        let fx = fixture();
        let customer = Uuid::new_v4();
        let enquiry = accepted_enquiry(&fx, customer).await;
        let handoff = fx.orchestrator.start_payment(enquiry.id, &payer(customer)).await.unwrap();
        fx.orchestrator
            .reconcile(&success(enquiry.id, handoff.payment_id))
            .await
            .unwrap();

        let cancelled = fx.orchestrator.admin_cancel(enquiry.id).await.unwrap();
        assert_eq!(cancelled.status, EnquiryStatus::Cancelled);
        assert_eq!(cancelled.last_change().unwrap().actor, Actor::Admin);
        let payment = fx.store.get_payment(handoff.payment_id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
    }
}
