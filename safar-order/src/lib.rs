pub mod locks;
pub mod manager;
pub mod orchestrator;
pub mod reconcile;

pub use locks::KeyedLocks;
pub use manager::{EnquiryError, EnquiryManager, QuoteTerms};
pub use orchestrator::{Payer, PaymentError, PaymentHandoff, PaymentOrchestrator, PaymentStatusView, ReconcileOutcome};
pub use reconcile::{decide, Decision, REFUND_REQUIRED};
