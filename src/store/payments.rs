use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{violates_constraint, Error, Result};
use crate::model::booking::{BookingStatus, RentalBooking};
use crate::model::payment::{
    booking_accepts_payments, check_confirmation, derive_payment_status, ledger_totals,
    CreatePaymentRequest, Payment,
};
use crate::model::payout::{compute_payout, OperatorPayout, PayoutStatus};

const PAYMENT_COLS: &str = "id, booking_id, amount, method, payment_type, \
     transaction_id, is_confirmed, paid_at, created_at, notes";

const PAYOUT_COLS: &str = "id, operator_id, booking_id, gross_amount, \
     platform_fee_percent, platform_fee_amount, net_amount, status, retryable, \
     payout_method, payout_reference, initiated_at, completed_at, created_at";

const BOOKING_COLS: &str = "id, farmer_id, equipment_id, operator_id, job_description, \
     land_size_acres, crop_type, farm_location_county, farm_gps_latitude, \
     farm_gps_longitude, farm_directions, requested_start_date, requested_end_date, \
     actual_start_date, actual_end_date, estimated_hours, actual_hours, quoted_rate, \
     transport_fee, total_amount, deposit_amount, status, payment_status, \
     operator_notes, farmer_notes, cancellation_reason, created_at, updated_at";

// ---------------------------------------------------------------------------
// Payments

/// Record a payment attempt against a booking. The row lands unconfirmed;
/// `confirm_payment` settles it when the provider callback arrives.
pub async fn record_payment(
    pool: &PgPool,
    req: CreatePaymentRequest,
    now: DateTime<Utc>,
) -> Result<Payment> {
    req.validate()?;
    let mut tx = pool.begin().await?;
    let booking = load_booking_for_update(&mut tx, req.booking_id).await?;
    if !booking_accepts_payments(booking.status) {
        return Err(Error::InvalidTransition {
            entity: "booking",
            from: booking.status.to_string(),
            to: format!("record {} payment", req.payment_type.as_str()),
        });
    }

    let duplicate = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM payments WHERE transaction_id = $1)",
    )
    .bind(&req.transaction_id)
    .fetch_one(&mut tx)
    .await?;
    if duplicate {
        return Err(Error::DuplicateTransaction(req.transaction_id));
    }

    let sql = format!(
        "INSERT INTO payments (id, booking_id, amount, method, payment_type, \
         transaction_id, is_confirmed, paid_at, created_at, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, false, NULL, $7, $8) \
         RETURNING {PAYMENT_COLS}"
    );
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(Uuid::new_v4())
        .bind(req.booking_id)
        .bind(req.amount)
        .bind(req.method)
        .bind(req.payment_type)
        .bind(&req.transaction_id)
        .bind(now)
        .bind(&req.notes)
        .fetch_one(&mut tx)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "payments_transaction_id_key") {
                Error::DuplicateTransaction("transaction id already recorded".to_string())
            } else {
                e.into()
            }
        })?;
    tx.commit().await?;
    tracing::info!(payment_id = %payment.id, booking_id = %payment.booking_id, "payment recorded");
    Ok(payment)
}

/// Confirm a recorded payment and refresh the booking's cached
/// payment_status from the ledger, all in one transaction.
pub async fn confirm_payment(
    pool: &PgPool,
    payment_id: Uuid,
    paid_at: DateTime<Utc>,
) -> Result<Payment> {
    let mut tx = pool.begin().await?;
    let sql = format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = $1 FOR UPDATE");
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(payment_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::not_found("payment", payment_id))?;
    if payment.is_confirmed {
        return Err(Error::DuplicateTransaction(payment.transaction_id));
    }

    let booking = load_booking_for_update(&mut tx, payment.booking_id).await?;
    let confirmed = list_confirmed(&mut tx, booking.id).await?;
    check_confirmation(&confirmed, &payment, booking.total_amount)?;

    let sql = format!(
        "UPDATE payments SET is_confirmed = true, paid_at = $1 WHERE id = $2 \
         RETURNING {PAYMENT_COLS}"
    );
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(paid_at)
        .bind(payment_id)
        .fetch_one(&mut tx)
        .await?;

    refresh_payment_status(&mut tx, &booking, paid_at).await?;
    tx.commit().await?;
    tracing::info!(payment_id = %payment.id, amount = %payment.amount, "payment confirmed");
    Ok(payment)
}

pub async fn list_payments_for_booking(pool: &PgPool, booking_id: Uuid) -> Result<Vec<Payment>> {
    let sql = format!(
        "SELECT {PAYMENT_COLS} FROM payments WHERE booking_id = $1 ORDER BY created_at"
    );
    Ok(sqlx::query_as::<_, Payment>(&sql)
        .bind(booking_id)
        .fetch_all(pool)
        .await?)
}

// ---------------------------------------------------------------------------
// Payouts

/// Open the payout for a completed booking: gross is the booking total less
/// refunds, fee and net come from `compute_payout`. One per booking.
pub async fn create_payout(
    pool: &PgPool,
    booking_id: Uuid,
    platform_fee_percent: Decimal,
    now: DateTime<Utc>,
) -> Result<OperatorPayout> {
    let mut tx = pool.begin().await?;
    let booking = load_booking_for_update(&mut tx, booking_id).await?;
    if booking.status != BookingStatus::Completed {
        return Err(Error::InvalidTransition {
            entity: "booking",
            from: booking.status.to_string(),
            to: "payout".to_string(),
        });
    }

    let confirmed = list_confirmed(&mut tx, booking.id).await?;
    let totals = ledger_totals(&confirmed);
    let breakdown = compute_payout(booking.total_amount, totals.refunded, platform_fee_percent)?;

    let sql = format!(
        "INSERT INTO operator_payouts (id, operator_id, booking_id, gross_amount, \
         platform_fee_percent, platform_fee_amount, net_amount, status, retryable, \
         payout_method, payout_reference, initiated_at, completed_at, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', false, NULL, NULL, NULL, NULL, $8) \
         RETURNING {PAYOUT_COLS}"
    );
    let payout = sqlx::query_as::<_, OperatorPayout>(&sql)
        .bind(Uuid::new_v4())
        .bind(booking.operator_id)
        .bind(booking.id)
        .bind(breakdown.gross_amount)
        .bind(platform_fee_percent)
        .bind(breakdown.platform_fee_amount)
        .bind(breakdown.net_amount)
        .bind(now)
        .fetch_one(&mut tx)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "operator_payouts_booking_id_key") {
                Error::conflict(format!("booking {} already has a payout", booking_id))
            } else {
                e.into()
            }
        })?;
    tx.commit().await?;
    tracing::info!(payout_id = %payout.id, net = %payout.net_amount, "payout opened");
    Ok(payout)
}

pub async fn get_payout_for_booking(pool: &PgPool, booking_id: Uuid) -> Result<OperatorPayout> {
    let sql = format!("SELECT {PAYOUT_COLS} FROM operator_payouts WHERE booking_id = $1");
    sqlx::query_as::<_, OperatorPayout>(&sql)
        .bind(booking_id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("payout", booking_id))
}

/// Hand the payout to the money-movement rail.
pub async fn mark_payout_processing(
    pool: &PgPool,
    payout_id: Uuid,
    payout_method: &str,
    now: DateTime<Utc>,
) -> Result<OperatorPayout> {
    let mut tx = pool.begin().await?;
    let payout = load_payout_for_update(&mut tx, payout_id).await?;
    payout.check_transition(PayoutStatus::Processing)?;
    let sql = format!(
        "UPDATE operator_payouts SET status = 'processing', payout_method = $1, \
         initiated_at = $2, retryable = false WHERE id = $3 RETURNING {PAYOUT_COLS}"
    );
    let payout = sqlx::query_as::<_, OperatorPayout>(&sql)
        .bind(payout_method)
        .bind(now)
        .bind(payout_id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    tracing::info!(payout_id = %payout.id, method = payout_method, "payout processing");
    Ok(payout)
}

/// Provider confirmed the transfer.
pub async fn mark_payout_paid(
    pool: &PgPool,
    payout_id: Uuid,
    payout_reference: &str,
    now: DateTime<Utc>,
) -> Result<OperatorPayout> {
    let mut tx = pool.begin().await?;
    let payout = load_payout_for_update(&mut tx, payout_id).await?;
    payout.check_transition(PayoutStatus::Paid)?;
    let sql = format!(
        "UPDATE operator_payouts SET status = 'paid', payout_reference = $1, \
         completed_at = $2 WHERE id = $3 RETURNING {PAYOUT_COLS}"
    );
    let payout = sqlx::query_as::<_, OperatorPayout>(&sql)
        .bind(payout_reference)
        .bind(now)
        .bind(payout_id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    tracing::info!(payout_id = %payout.id, reference = payout_reference, "payout paid");
    Ok(payout)
}

/// Transfer failed. `retryable` decides whether processing may be retried.
pub async fn mark_payout_failed(
    pool: &PgPool,
    payout_id: Uuid,
    retryable: bool,
    now: DateTime<Utc>,
) -> Result<OperatorPayout> {
    let mut tx = pool.begin().await?;
    let payout = load_payout_for_update(&mut tx, payout_id).await?;
    payout.check_transition(PayoutStatus::Failed)?;
    let sql = format!(
        "UPDATE operator_payouts SET status = 'failed', retryable = $1 WHERE id = $2 \
         RETURNING {PAYOUT_COLS}"
    );
    let payout = sqlx::query_as::<_, OperatorPayout>(&sql)
        .bind(retryable)
        .bind(payout_id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    tracing::warn!(payout_id = %payout.id, retryable, "payout failed");
    Ok(payout)
}

// ---------------------------------------------------------------------------
// Shared helpers

async fn load_payout_for_update(
    tx: &mut Transaction<'_, Postgres>,
    payout_id: Uuid,
) -> Result<OperatorPayout> {
    let sql = format!("SELECT {PAYOUT_COLS} FROM operator_payouts WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, OperatorPayout>(&sql)
        .bind(payout_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::not_found("payout", payout_id))
}

async fn load_booking_for_update(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: Uuid,
) -> Result<RentalBooking> {
    let sql = format!("SELECT {BOOKING_COLS} FROM rental_bookings WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, RentalBooking>(&sql)
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::not_found("booking", booking_id))
}

async fn list_confirmed(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: Uuid,
) -> Result<Vec<Payment>> {
    let sql = format!(
        "SELECT {PAYMENT_COLS} FROM payments \
         WHERE booking_id = $1 AND is_confirmed ORDER BY created_at"
    );
    Ok(sqlx::query_as::<_, Payment>(&sql)
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await?)
}

/// Recompute the cached projection from the confirmed ledger. Called after
/// every ledger write; the ledger, not the cache, is the source of truth.
async fn refresh_payment_status(
    tx: &mut Transaction<'_, Postgres>,
    booking: &RentalBooking,
    now: DateTime<Utc>,
) -> Result<()> {
    let confirmed = list_confirmed(&mut *tx, booking.id).await?;
    let status = derive_payment_status(ledger_totals(&confirmed), booking.total_amount);
    sqlx::query("UPDATE rental_bookings SET payment_status = $1, updated_at = $2 WHERE id = $3")
        .bind(status)
        .bind(now)
        .bind(booking.id)
        .execute(&mut *tx)
        .await?;
    Ok(())
}
