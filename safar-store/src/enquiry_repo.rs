use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safar_core::booking::{BookingRef, BookingStatus};
use safar_core::enquiry::{Enquiry, EnquiryStatus, Quote, StatusChange};
use safar_core::package::EnquiryProduct;
use safar_core::payment::{Payment, PaymentStatus, Settlement};
use safar_core::repository::{EnquiryRepository, PaymentLedger};
use safar_core::{CoreError, CoreResult};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::storage_error;

/// Enquiries and the payments made against them. Both live behind one
/// repository because a settlement changes them together.
pub struct PgEnquiryRepository {
    pool: PgPool,
}

impl PgEnquiryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EnquiryRow {
    id: Uuid,
    user_id: Uuid,
    product: Json<EnquiryProduct>,
    notes: Option<String>,
    status: String,
    quote: Option<Json<Quote>>,
    bookings: Json<Vec<BookingRef>>,
    history: Json<Vec<StatusChange>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnquiryRow> for Enquiry {
    type Error = CoreError;

    fn try_from(row: EnquiryRow) -> CoreResult<Self> {
        Ok(Enquiry {
            id: row.id,
            user_id: row.user_id,
            product: row.product.0,
            notes: row.notes,
            status: parse_enquiry_status(&row.status)?,
            quote: row.quote.map(|q| q.0),
            bookings: row.bookings.0,
            history: row.history.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    enquiry_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    gateway_tracking_id: Option<String>,
    bank_ref_no: Option<String>,
    failure_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> CoreResult<Self> {
        Ok(Payment {
            id: row.id,
            enquiry_id: row.enquiry_id,
            amount: row.amount,
            currency: row.currency,
            status: parse_payment_status(&row.status)?,
            gateway_tracking_id: row.gateway_tracking_id,
            bank_ref_no: row.bank_ref_no,
            failure_message: row.failure_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_enquiry_status(value: &str) -> CoreResult<EnquiryStatus> {
    EnquiryStatus::parse(value)
        .ok_or_else(|| CoreError::StorageError(format!("unexpected enquiry status '{}'", value)))
}

fn parse_payment_status(value: &str) -> CoreResult<PaymentStatus> {
    PaymentStatus::parse(value)
        .ok_or_else(|| CoreError::StorageError(format!("unexpected payment status '{}'", value)))
}

const ENQUIRY_COLUMNS: &str =
    "id, user_id, product, notes, status, quote, bookings, history, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, enquiry_id, amount, currency, status, gateway_tracking_id, bank_ref_no, \
     failure_message, created_at, updated_at";

fn rows_to_enquiries(rows: Vec<EnquiryRow>) -> CoreResult<Vec<Enquiry>> {
    rows.into_iter().map(Enquiry::try_from).collect()
}

async fn lock_enquiry_status(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> CoreResult<EnquiryStatus> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM enquiries WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage_error)?;
    match row {
        Some((status,)) => parse_enquiry_status(&status),
        None => Err(CoreError::NotFound(format!("enquiry {}", id))),
    }
}

/// Compare-and-set write of the whole enquiry; returns the rows affected.
async fn update_enquiry<'e>(
    executor: impl PgExecutor<'e>,
    enquiry: &Enquiry,
    expected: EnquiryStatus,
) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE enquiries
        SET product = $2, notes = $3, status = $4, quote = $5, quote_valid_until = $6,
            bookings = $7, history = $8, updated_at = $9
        WHERE id = $1 AND status = $10
        "#,
    )
    .bind(enquiry.id)
    .bind(Json(&enquiry.product))
    .bind(enquiry.notes.as_deref())
    .bind(enquiry.status.as_str())
    .bind(enquiry.quote.as_ref().map(Json))
    .bind(enquiry.quote.as_ref().map(|q| q.valid_until))
    .bind(Json(&enquiry.bookings))
    .bind(Json(&enquiry.history))
    .bind(enquiry.updated_at)
    .bind(expected.as_str())
    .execute(executor)
    .await
    .map_err(storage_error)?;
    Ok(result.rows_affected())
}

impl PgEnquiryRepository {
    /// Error for a compare-and-set that matched no row.
    async fn stale(&self, id: Uuid, expected: EnquiryStatus) -> CoreError {
        match self.get_enquiry(id).await {
            Ok(Some(current)) => CoreError::Conflict(format!(
                "enquiry {} is {} (expected {})",
                id, current.status, expected
            )),
            Ok(None) => CoreError::NotFound(format!("enquiry {}", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl EnquiryRepository for PgEnquiryRepository {
    async fn create_enquiry(&self, enquiry: &Enquiry) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enquiries (id, user_id, product, notes, status, quote, quote_valid_until,
                                   bookings, history, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(enquiry.id)
        .bind(enquiry.user_id)
        .bind(Json(&enquiry.product))
        .bind(enquiry.notes.as_deref())
        .bind(enquiry.status.as_str())
        .bind(enquiry.quote.as_ref().map(Json))
        .bind(enquiry.quote.as_ref().map(|q| q.valid_until))
        .bind(Json(&enquiry.bookings))
        .bind(Json(&enquiry.history))
        .bind(enquiry.created_at)
        .bind(enquiry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_enquiry(&self, id: Uuid) -> CoreResult<Option<Enquiry>> {
        let row: Option<EnquiryRow> =
            sqlx::query_as(&format!("SELECT {} FROM enquiries WHERE id = $1", ENQUIRY_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        row.map(Enquiry::try_from).transpose()
    }

    async fn save_enquiry(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> CoreResult<()> {
        if update_enquiry(&self.pool, enquiry, expected).await? == 1 {
            return Ok(());
        }
        Err(self.stale(enquiry.id, expected).await)
    }

    async fn close_enquiry(&self, enquiry: &Enquiry, expected: EnquiryStatus) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        if update_enquiry(&mut *tx, enquiry, expected).await? != 1 {
            drop(tx);
            return Err(self.stale(enquiry.id, expected).await);
        }

        let mut cancelled = 0;
        for table in ["flight_bookings", "hotel_bookings"] {
            let result = sqlx::query(&format!(
                "UPDATE {} SET booking_status = $2, updated_at = $3 WHERE enquiry_id = $1 AND booking_status = $4",
                table
            ))
            .bind(enquiry.id)
            .bind(BookingStatus::Cancelled.as_str())
            .bind(enquiry.updated_at)
            .bind(BookingStatus::Pending.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
            cancelled += result.rows_affected();
        }

        tx.commit().await.map_err(storage_error)?;
        debug!(
            "Closed enquiry {} as {}, {} pending bookings cancelled",
            enquiry.id, enquiry.status, cancelled
        );
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Enquiry>> {
        let rows: Vec<EnquiryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enquiries WHERE user_id = $1 ORDER BY created_at DESC",
            ENQUIRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows_to_enquiries(rows)
    }

    async fn list_by_status(&self, status: Option<EnquiryStatus>) -> CoreResult<Vec<Enquiry>> {
        let rows: Vec<EnquiryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enquiries WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC",
            ENQUIRY_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows_to_enquiries(rows)
    }

    async fn list_lapsed_quotes(&self, now: DateTime<Utc>) -> CoreResult<Vec<Enquiry>> {
        let rows: Vec<EnquiryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enquiries WHERE status = $1 AND quote_valid_until <= $2",
            ENQUIRY_COLUMNS
        ))
        .bind(EnquiryStatus::Quoted.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows_to_enquiries(rows)
    }
}

#[async_trait]
impl PaymentLedger for PgEnquiryRepository {
    async fn record_payment(&self, payment: &Payment) -> CoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            PAYMENT_COLUMNS
        ))
        .bind(payment.id)
        .bind(payment.enquiry_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.gateway_tracking_id.as_deref())
        .bind(payment.bank_ref_no.as_deref())
        .bind(payment.failure_message.as_deref())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        debug!("Recorded payment {} for enquiry {}", payment.id, payment.enquiry_id);
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        row.map(Payment::try_from).transpose()
    }

    async fn list_payments(&self, enquiry_id: Uuid) -> CoreResult<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE enquiry_id = $1 ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(enquiry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn settle(&self, s: &Settlement) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Row locks on the enquiry and the payment; a concurrent settlement
        // for the same enquiry waits here and then fails the status check.
        let current = lock_enquiry_status(&mut tx, s.enquiry_id).await?;
        if current != s.expected_status {
            return Err(CoreError::Conflict(format!(
                "enquiry {} is {} (expected {})",
                s.enquiry_id, current, s.expected_status
            )));
        }

        let payment: Option<(String,)> =
            sqlx::query_as("SELECT status FROM payments WHERE id = $1 AND enquiry_id = $2 FOR UPDATE")
                .bind(s.payment_id)
                .bind(s.enquiry_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;
        let payment_status = match payment {
            Some((status,)) => parse_payment_status(&status)?,
            None => {
                return Err(CoreError::NotFound(format!(
                    "payment {} for enquiry {}",
                    s.payment_id, s.enquiry_id
                )))
            }
        };
        if payment_status != s.expected_payment_status {
            return Err(CoreError::Conflict(format!(
                "payment {} is {} (expected {})",
                s.payment_id, payment_status, s.expected_payment_status
            )));
        }

        if let Some(change) = &s.transition {
            sqlx::query(
                r#"
                UPDATE enquiries
                SET status = $2, history = history || jsonb_build_array($3::jsonb), updated_at = $4
                WHERE id = $1
                "#,
            )
            .bind(s.enquiry_id)
            .bind(change.to.as_str())
            .bind(Json(change))
            .bind(s.at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                gateway_tracking_id = COALESCE($3, gateway_tracking_id),
                bank_ref_no = COALESCE($4, bank_ref_no),
                failure_message = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(s.payment_id)
        .bind(s.payment_status.as_str())
        .bind(s.tracking_id.as_deref())
        .bind(s.bank_ref_no.as_deref())
        .bind(s.failure_message.as_deref())
        .bind(s.at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        if let Some(booking_status) = s.booking_status {
            for table in ["flight_bookings", "hotel_bookings"] {
                sqlx::query(&format!(
                    "UPDATE {} SET booking_status = $2, updated_at = $3 WHERE enquiry_id = $1",
                    table
                ))
                .bind(s.enquiry_id)
                .bind(booking_status.as_str())
                .bind(s.at)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
            }
        }

        tx.commit().await.map_err(storage_error)?;
        info!(
            "Settled enquiry {}: payment {} -> {}{}",
            s.enquiry_id,
            s.payment_id,
            s.payment_status,
            s.transition
                .as_ref()
                .map(|c| format!(", {} -> {}", c.from, c.to))
                .unwrap_or_default()
        );
        Ok(())
    }
}
