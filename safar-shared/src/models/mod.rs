pub mod events;

pub use events::{
    BookingConfirmedEvent, EnquiryTransitionedEvent, PaymentReconciledEvent, TOPIC_BOOKING_CONFIRMED,
    TOPIC_ENQUIRY_TRANSITIONED, TOPIC_PAYMENT_RECONCILED,
};
