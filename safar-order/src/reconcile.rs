use chrono::{DateTime, Utc};
use safar_core::booking::BookingStatus;
use safar_core::enquiry::{Actor, Enquiry, EnquiryStatus, StatusChange};
use safar_core::money::format_minor;
use safar_core::payment::{GatewayCallback, Payment, PaymentStatus, Settlement};

/// Prefix of the note left on a captured payment that has to be refunded.
pub const REFUND_REQUIRED: &str = "captured for";

/// What to do with one gateway callback.
#[derive(Debug, Clone)]
pub enum Decision {
    /// The payment was already settled by an earlier delivery.
    Duplicate,
    /// The callback cannot be applied; the reason is logged.
    Ignore(String),
    Apply(Settlement),
}

/// Decide how a gateway callback changes `enquiry` and `payment`.
///
/// Pure: no I/O and no clock, so every branch is checked in unit tests. The
/// caller applies the resulting settlement atomically.
pub fn decide(enquiry: &Enquiry, payment: &Payment, callback: &GatewayCallback, now: DateTime<Utc>) -> Decision {
    if payment.enquiry_id != enquiry.id {
        return Decision::Ignore(format!(
            "payment {} belongs to enquiry {}, not {}",
            payment.id, payment.enquiry_id, enquiry.id
        ));
    }
    if payment.status != PaymentStatus::Pending {
        return Decision::Duplicate;
    }

    let failure = if !callback.order_status.is_success() {
        Some(
            callback
                .failure_message
                .clone()
                .unwrap_or_else(|| format!("gateway reported {:?}", callback.order_status)),
        )
    } else if callback.amount != Some(payment.amount) {
        Some(format!(
            "amount mismatch: paid {}, expected {}",
            callback.amount.map(format_minor).unwrap_or_else(|| "nothing".to_string()),
            format_minor(payment.amount)
        ))
    } else if callback.currency.as_deref() != Some(payment.currency.as_str()) {
        Some(format!(
            "currency mismatch: paid in {}, expected {}",
            callback.currency.as_deref().unwrap_or("none"),
            payment.currency
        ))
    } else {
        None
    };

    if let Some(message) = failure {
        // A failed attempt leaves the enquiry where it is so the customer can retry.
        return Decision::Apply(Settlement {
            enquiry_id: enquiry.id,
            expected_status: enquiry.status,
            transition: None,
            payment_id: payment.id,
            expected_payment_status: PaymentStatus::Pending,
            payment_status: PaymentStatus::Failed,
            tracking_id: callback.tracking_id.clone(),
            bank_ref_no: callback.bank_ref_no.clone(),
            failure_message: Some(message),
            booking_status: None,
            at: now,
        });
    }

    // Money was captured for an enquiry that can no longer be paid (cancelled
    // or expired meanwhile). Record it as taken so the refund shows up in the
    // ledger; the enquiry and its bookings stay as they are.
    if enquiry.status.transition(EnquiryStatus::Paid, Actor::PaymentGateway).is_err() {
        return Decision::Apply(Settlement {
            enquiry_id: enquiry.id,
            expected_status: enquiry.status,
            transition: None,
            payment_id: payment.id,
            expected_payment_status: PaymentStatus::Pending,
            payment_status: PaymentStatus::Success,
            tracking_id: callback.tracking_id.clone(),
            bank_ref_no: callback.bank_ref_no.clone(),
            failure_message: Some(format!("{} {} enquiry; refund required", REFUND_REQUIRED, enquiry.status)),
            booking_status: None,
            at: now,
        });
    }

    Decision::Apply(Settlement {
        enquiry_id: enquiry.id,
        expected_status: enquiry.status,
        transition: Some(StatusChange {
            from: enquiry.status,
            to: EnquiryStatus::Paid,
            actor: Actor::PaymentGateway,
            at: now,
        }),
        payment_id: payment.id,
        expected_payment_status: PaymentStatus::Pending,
        payment_status: PaymentStatus::Success,
        tracking_id: callback.tracking_id.clone(),
        bank_ref_no: callback.bank_ref_no.clone(),
        failure_message: None,
        booking_status: Some(BookingStatus::Confirmed),
        at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use safar_core::enquiry::Quote;
    use safar_core::package::{EnquiryProduct, HolidayPackage};
    use safar_core::payment::GatewayOrderStatus;
    use safar_core::search::Travellers;
    use uuid::Uuid;

    fn accepted() -> Enquiry {
        let now = Utc::now();
        let product = EnquiryProduct::Holiday(HolidayPackage {
            package_code: "SLL-5N".to_string(),
            destination: "Salalah".to_string(),
            nights: 5,
            travellers: Travellers { adult: 2, child: 0, infant: 0 },
            inclusions: vec![],
        });
        let mut enquiry = Enquiry::new_draft(Uuid::new_v4(), Uuid::new_v4(), product, None, now).unwrap();
        enquiry.apply(EnquiryStatus::Submitted, Actor::Customer, now).unwrap();
        enquiry
            .quote(
                Quote {
                    amount: 310_000,
                    currency: "OMR".to_string(),
                    valid_until: now + Duration::hours(2),
                    quoted_by: "ops".to_string(),
                    remarks: None,
                },
                Actor::Admin,
                now,
            )
            .unwrap();
        enquiry.apply(EnquiryStatus::Accepted, Actor::Customer, now).unwrap();
        enquiry
    }

    fn callback(enquiry: &Enquiry, payment: &Payment, status: GatewayOrderStatus) -> GatewayCallback {
        GatewayCallback {
            order_id: enquiry.id.to_string(),
            payment_ref: Some(payment.id),
            tracking_id: Some("112233".to_string()),
            bank_ref_no: Some("BR-9".to_string()),
            order_status: status,
            failure_message: None,
            amount: Some(payment.amount),
            currency: Some(payment.currency.clone()),
        }
    }

    #[test]
    fn test_success_moves_to_paid_and_confirms_bookings() {
        let enquiry = accepted();
        let payment = Payment::pending(enquiry.id, 310_000, "OMR", Utc::now());
        let cb = callback(&enquiry, &payment, GatewayOrderStatus::Success);

        match decide(&enquiry, &payment, &cb, Utc::now()) {
            Decision::Apply(s) => {
                assert_eq!(s.expected_status, EnquiryStatus::Accepted);
                assert_eq!(s.transition.as_ref().map(|c| c.to), Some(EnquiryStatus::Paid));
                assert_eq!(s.payment_status, PaymentStatus::Success);
                assert_eq!(s.booking_status, Some(BookingStatus::Confirmed));
                assert_eq!(s.tracking_id.as_deref(), Some("112233"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_keeps_enquiry_accepted() {
        let enquiry = accepted();
        let payment = Payment::pending(enquiry.id, 310_000, "OMR", Utc::now());
        let mut cb = callback(&enquiry, &payment, GatewayOrderStatus::Failure);
        cb.failure_message = Some("Insufficient funds".to_string());

        match decide(&enquiry, &payment, &cb, Utc::now()) {
            Decision::Apply(s) => {
                assert!(s.transition.is_none());
                assert!(s.booking_status.is_none());
                assert_eq!(s.payment_status, PaymentStatus::Failed);
                assert_eq!(s.failure_message.as_deref(), Some("Insufficient funds"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_amount_mismatch_is_a_failure() {
        let enquiry = accepted();
        let payment = Payment::pending(enquiry.id, 310_000, "OMR", Utc::now());
        let mut cb = callback(&enquiry, &payment, GatewayOrderStatus::Success);
        cb.amount = Some(1_000);

        match decide(&enquiry, &payment, &cb, Utc::now()) {
            Decision::Apply(s) => {
                assert_eq!(s.payment_status, PaymentStatus::Failed);
                assert!(s.transition.is_none());
                assert!(s.failure_message.unwrap().contains("amount mismatch"));
            }
            other => panic!("unexpected {:?}", other),
        }

        cb.amount = Some(310_000);
        cb.currency = Some("SAR".to_string());
        assert!(matches!(
            decide(&enquiry, &payment, &cb, Utc::now()),
            Decision::Apply(Settlement { payment_status: PaymentStatus::Failed, .. })
        ));
    }

    #[test]
    fn test_settled_payment_is_duplicate() {
        let enquiry = accepted();
        let mut payment = Payment::pending(enquiry.id, 310_000, "OMR", Utc::now());
        payment.status = PaymentStatus::Success;
        let cb = callback(&enquiry, &payment, GatewayOrderStatus::Success);

        assert!(matches!(
            decide(&enquiry, &payment, &cb, Utc::now()),
            Decision::Duplicate
        ));
    }

    #[test]
    fn test_success_for_cancelled_enquiry_is_recorded_for_refund() {
        let mut enquiry = accepted();
        enquiry
            .apply(EnquiryStatus::Cancelled, Actor::Customer, Utc::now())
            .unwrap();
        let payment = Payment::pending(enquiry.id, 310_000, "OMR", Utc::now());
        let cb = callback(&enquiry, &payment, GatewayOrderStatus::Success);

        match decide(&enquiry, &payment, &cb, Utc::now()) {
            Decision::Apply(s) => {
                assert_eq!(s.expected_status, EnquiryStatus::Cancelled);
                assert!(s.transition.is_none());
                assert!(s.booking_status.is_none());
                assert_eq!(s.payment_status, PaymentStatus::Success);
                let note = s.failure_message.unwrap();
                assert!(note.starts_with(REFUND_REQUIRED));
                assert!(note.contains("CANCELLED"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_foreign_payment_is_ignored() {
        let enquiry = accepted();
        let payment = Payment::pending(Uuid::new_v4(), 310_000, "OMR", Utc::now());
        let cb = callback(&enquiry, &payment, GatewayOrderStatus::Success);

        assert!(matches!(
            decide(&enquiry, &payment, &cb, Utc::now()),
            Decision::Ignore(_)
        ));
    }
}
