use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{violates_constraint, Error, Result};
use crate::model::booking::{
    BookingListResponse, BookingStatus, CreateBookingRequest, Party, RentalBooking,
};
use crate::model::equipment::Equipment;
use crate::model::ops::Channel;
use crate::store::users::get_farmer_profile;

const BOOKING_COLS: &str = "id, farmer_id, equipment_id, operator_id, job_description, \
     land_size_acres, crop_type, farm_location_county, farm_gps_latitude, \
     farm_gps_longitude, farm_directions, requested_start_date, requested_end_date, \
     actual_start_date, actual_end_date, estimated_hours, actual_hours, quoted_rate, \
     transport_fee, total_amount, deposit_amount, status, payment_status, \
     operator_notes, farmer_notes, cancellation_reason, created_at, updated_at";

const EQUIPMENT_COLS: &str = "id, owner_id, category_id, name, brand, model, \
     year_manufactured, serial_number, description, fuel_type, horsepower, \
     capacity_info, daily_rate, hourly_rate, price_includes_operator, \
     price_includes_fuel, current_county, gps_latitude, gps_longitude, status, \
     last_serviced, next_service_due, insurance_expiry, created_at, updated_at";

/// States that hold a date range on the unit; kept in sync with
/// `BookingStatus::blocks_equipment`.
const BLOCKING_STATES: &str = "('pending', 'confirmed', 'in_progress', 'disputed')";

/// Create a new booking for a farmer. The equipment row is locked for the
/// duration of the transaction so concurrent requests for the same unit
/// serialize, and the overlap check plus the range-exclusion constraint keep
/// double bookings out.
pub async fn create_booking(
    pool: &PgPool,
    req: CreateBookingRequest,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    req.validate()?;
    let farmer = get_farmer_profile(pool, req.farmer_id).await?;

    let mut tx = pool.begin().await?;
    let sql = format!("SELECT {EQUIPMENT_COLS} FROM equipment WHERE id = $1 FOR UPDATE");
    let equipment = sqlx::query_as::<_, Equipment>(&sql)
        .bind(req.equipment_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::not_found("equipment", req.equipment_id))?;
    if !equipment.is_bookable() {
        return Err(Error::validation(format!(
            "equipment {} is {} and cannot be booked",
            equipment.id, equipment.status
        )));
    }

    let conflicts = count_overlaps(
        &mut tx,
        req.equipment_id,
        req.requested_start_date,
        req.requested_end_date,
        None,
    )
    .await?;
    if conflicts > 0 {
        return Err(Error::conflict(format!(
            "equipment {} is already booked between {} and {}",
            req.equipment_id, req.requested_start_date, req.requested_end_date
        )));
    }

    let sql = format!(
        "INSERT INTO rental_bookings (id, farmer_id, equipment_id, operator_id, \
         job_description, land_size_acres, crop_type, farm_location_county, \
         farm_gps_latitude, farm_gps_longitude, farm_directions, requested_start_date, \
         requested_end_date, estimated_hours, quoted_rate, transport_fee, total_amount, \
         deposit_amount, status, payment_status, farmer_notes, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
         $16, $17, $18, 'pending', 'unpaid', $19, $20, $20) \
         RETURNING {BOOKING_COLS}"
    );
    let booking = sqlx::query_as::<_, RentalBooking>(&sql)
        .bind(Uuid::new_v4())
        .bind(farmer.id)
        .bind(equipment.id)
        .bind(equipment.owner_id)
        .bind(&req.job_description)
        .bind(req.land_size_acres)
        .bind(&req.crop_type)
        .bind(&req.farm_location_county)
        .bind(req.farm_gps_latitude)
        .bind(req.farm_gps_longitude)
        .bind(&req.farm_directions)
        .bind(req.requested_start_date)
        .bind(req.requested_end_date)
        .bind(req.estimated_hours)
        .bind(req.quoted_rate)
        .bind(req.transport_fee.unwrap_or(Decimal::ZERO))
        .bind(req.total_amount)
        .bind(req.deposit_amount.unwrap_or(Decimal::ZERO))
        .bind(&req.farmer_notes)
        .bind(now)
        .fetch_one(&mut tx)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "rental_bookings_no_overlap") {
                Error::conflict("equipment is already booked for these dates")
            } else {
                e.into()
            }
        })?;

    let operator = get_operator_user_id(&mut tx, booking.operator_id).await?;
    queue_notification(
        &mut tx,
        operator,
        "New booking request",
        &format!(
            "{} requested for {} to {} ({})",
            equipment.name,
            booking.requested_start_date,
            booking.requested_end_date,
            booking.farm_location_county
        ),
        Some(booking.id),
        now,
    )
    .await?;

    tx.commit().await?;
    tracing::info!(booking_id = %booking.id, equipment_id = %booking.equipment_id, "booking created");
    Ok(booking)
}

pub async fn get_booking(pool: &PgPool, id: Uuid) -> Result<RentalBooking> {
    let sql = format!("SELECT {BOOKING_COLS} FROM rental_bookings WHERE id = $1");
    sqlx::query_as::<_, RentalBooking>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("booking", id))
}

pub async fn list_bookings_for_farmer(
    pool: &PgPool,
    farmer_id: Uuid,
    page: i32,
    limit: i32,
) -> Result<BookingListResponse> {
    list_bookings(pool, "farmer_id", farmer_id, page, limit).await
}

pub async fn list_bookings_for_operator(
    pool: &PgPool,
    operator_id: Uuid,
    page: i32,
    limit: i32,
) -> Result<BookingListResponse> {
    list_bookings(pool, "operator_id", operator_id, page, limit).await
}

async fn list_bookings(
    pool: &PgPool,
    owner_col: &str,
    owner: Uuid,
    page: i32,
    limit: i32,
) -> Result<BookingListResponse> {
    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM rental_bookings WHERE {} = $1",
        owner_col
    ))
    .bind(owner)
    .fetch_one(pool)
    .await?;

    let sql = format!(
        "SELECT {} FROM rental_bookings WHERE {} = $1 \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        BOOKING_COLS, owner_col
    );
    let bookings = sqlx::query_as::<_, RentalBooking>(&sql)
        .bind(owner)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(pool)
        .await?;

    Ok(BookingListResponse {
        bookings,
        total,
        page,
        limit,
    })
}

/// Operator accepts a pending request. Confirms the range is still clear and
/// flips the unit to rented.
pub async fn confirm_booking(
    pool: &PgPool,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    let mut tx = pool.begin().await?;
    let mut booking = load_booking_for_update(&mut tx, booking_id).await?;

    let conflicts = count_overlaps(
        &mut tx,
        booking.equipment_id,
        booking.requested_start_date,
        booking.requested_end_date,
        Some(booking.id),
    )
    .await?;
    if conflicts > 0 {
        return Err(Error::conflict(
            "another booking took these dates before confirmation",
        ));
    }

    booking.apply_transition(BookingStatus::Confirmed, Party::Operator)?;
    persist_status(&mut tx, &mut booking, now).await?;
    notify_farmer(&mut tx, &booking, "Booking confirmed", now).await?;
    tx.commit().await?;
    tracing::info!(booking_id = %booking.id, "booking confirmed");
    Ok(booking)
}

/// Operator starts the job on site.
pub async fn start_booking(
    pool: &PgPool,
    booking_id: Uuid,
    actual_start_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    let mut tx = pool.begin().await?;
    let mut booking = load_booking_for_update(&mut tx, booking_id).await?;
    booking.actual_start_date = Some(actual_start_date);
    booking.apply_transition(BookingStatus::InProgress, Party::Operator)?;
    sqlx::query("UPDATE rental_bookings SET actual_start_date = $1 WHERE id = $2")
        .bind(actual_start_date)
        .bind(booking.id)
        .execute(&mut tx)
        .await?;
    persist_status(&mut tx, &mut booking, now).await?;
    notify_farmer(&mut tx, &booking, "Job started", now).await?;
    tx.commit().await?;
    tracing::info!(booking_id = %booking.id, "booking in progress");
    Ok(booking)
}

/// Operator wraps up: records the end date and worked hours, frees the unit.
pub async fn complete_booking(
    pool: &PgPool,
    booking_id: Uuid,
    actual_end_date: NaiveDate,
    actual_hours: Option<Decimal>,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    let mut tx = pool.begin().await?;
    let mut booking = load_booking_for_update(&mut tx, booking_id).await?;
    booking.actual_end_date = Some(actual_end_date);
    booking.actual_hours = actual_hours;
    booking.apply_transition(BookingStatus::Completed, Party::Operator)?;
    sqlx::query(
        "UPDATE rental_bookings SET actual_end_date = $1, actual_hours = $2 WHERE id = $3",
    )
    .bind(actual_end_date)
    .bind(actual_hours)
    .bind(booking.id)
    .execute(&mut tx)
    .await?;
    persist_status(&mut tx, &mut booking, now).await?;
    notify_farmer(&mut tx, &booking, "Job completed", now).await?;
    tx.commit().await?;
    tracing::info!(booking_id = %booking.id, "booking completed");
    Ok(booking)
}

/// Either side cancels. `by` decides which terminal state applies and whose
/// counterparty hears about it.
pub async fn cancel_booking(
    pool: &PgPool,
    booking_id: Uuid,
    by: Party,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    let target = match by {
        Party::Farmer => BookingStatus::CancelledFarmer,
        Party::Operator => BookingStatus::CancelledOperator,
        Party::Admin => {
            return Err(Error::validation(
                "admins resolve disputes, they do not cancel bookings",
            ))
        }
    };
    let mut tx = pool.begin().await?;
    let mut booking = load_booking_for_update(&mut tx, booking_id).await?;
    booking.cancellation_reason = Some(reason.to_string());
    booking.apply_transition(target, by)?;
    sqlx::query("UPDATE rental_bookings SET cancellation_reason = $1 WHERE id = $2")
        .bind(reason)
        .bind(booking.id)
        .execute(&mut tx)
        .await?;
    persist_status(&mut tx, &mut booking, now).await?;
    match by {
        Party::Farmer => notify_operator(&mut tx, &booking, "Booking cancelled by farmer", now).await?,
        _ => notify_farmer(&mut tx, &booking, "Booking cancelled by operator", now).await?,
    }
    tx.commit().await?;
    tracing::info!(booking_id = %booking.id, by = %by, "booking cancelled");
    Ok(booking)
}

/// Farmer or operator raises a dispute on a live booking.
pub async fn dispute_booking(
    pool: &PgPool,
    booking_id: Uuid,
    by: Party,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    let mut tx = pool.begin().await?;
    let mut booking = load_booking_for_update(&mut tx, booking_id).await?;
    booking.apply_transition(BookingStatus::Disputed, by)?;
    persist_status(&mut tx, &mut booking, now).await?;
    match by {
        Party::Farmer => notify_operator(&mut tx, &booking, "Booking disputed", now).await?,
        _ => notify_farmer(&mut tx, &booking, "Booking disputed", now).await?,
    }
    tx.commit().await?;
    tracing::warn!(booking_id = %booking.id, by = %by, "booking disputed");
    Ok(booking)
}

/// Admin closes out a dispute after the support ticket settles it, landing
/// the booking in completed or one of the cancelled states.
pub async fn resolve_dispute(
    pool: &PgPool,
    booking_id: Uuid,
    resolution: BookingStatus,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<RentalBooking> {
    let mut tx = pool.begin().await?;
    let mut booking = load_booking_for_update(&mut tx, booking_id).await?;
    if resolution.is_cancelled() {
        booking.cancellation_reason = Some(reason.to_string());
        sqlx::query("UPDATE rental_bookings SET cancellation_reason = $1 WHERE id = $2")
            .bind(reason)
            .bind(booking.id)
            .execute(&mut tx)
            .await?;
    }
    booking.apply_transition(resolution, Party::Admin)?;
    persist_status(&mut tx, &mut booking, now).await?;
    notify_farmer(&mut tx, &booking, "Dispute resolved", now).await?;
    notify_operator(&mut tx, &booking, "Dispute resolved", now).await?;
    tx.commit().await?;
    tracing::info!(booking_id = %booking.id, resolution = %resolution, "dispute resolved");
    Ok(booking)
}

// ---------------------------------------------------------------------------
// Shared helpers

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

/// Count bookings on the unit whose requested range intersects
/// `[start, end]` and which still block it.
async fn count_overlaps(
    tx: &mut Transaction<'_, Postgres>,
    equipment_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    exclude: Option<Uuid>,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM rental_bookings \
         WHERE equipment_id = $1 AND status IN {BLOCKING_STATES} \
         AND requested_start_date <= $2 AND requested_end_date >= $3 \
         AND ($4::uuid IS NULL OR id != $4)"
    );
    Ok(sqlx::query_scalar::<_, i64>(&sql)
        .bind(equipment_id)
        .bind(end)
        .bind(start)
        .bind(exclude)
        .fetch_one(&mut *tx)
        .await?)
}

/// Write the booking's new status and mirror its equipment-status effect in
/// the same transaction.
async fn persist_status(
    tx: &mut Transaction<'_, Postgres>,
    booking: &mut RentalBooking,
    now: DateTime<Utc>,
) -> Result<()> {
    booking.updated_at = now;
    sqlx::query("UPDATE rental_bookings SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(booking.status)
        .bind(now)
        .bind(booking.id)
        .execute(&mut *tx)
        .await?;
    if let Some(equipment_status) = booking.status.equipment_effect() {
        sqlx::query("UPDATE equipment SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(equipment_status)
            .bind(now)
            .bind(booking.equipment_id)
            .execute(&mut *tx)
            .await?;
    }
    if booking.status == BookingStatus::Completed {
        sqlx::query(
            "UPDATE operator_profiles SET total_jobs_completed = total_jobs_completed + 1 \
             WHERE id = $1",
        )
        .bind(booking.operator_id)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

async fn get_operator_user_id(
    tx: &mut Transaction<'_, Postgres>,
    operator_id: Uuid,
) -> Result<Uuid> {
    sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM operator_profiles WHERE id = $1")
        .bind(operator_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::not_found("operator profile", operator_id))
}

async fn get_farmer_user_id(
    tx: &mut Transaction<'_, Postgres>,
    farmer_id: Uuid,
) -> Result<Uuid> {
    sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM farmer_profiles WHERE id = $1")
        .bind(farmer_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::not_found("farmer profile", farmer_id))
}

async fn notify_farmer(
    tx: &mut Transaction<'_, Postgres>,
    booking: &RentalBooking,
    title: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let user_id = get_farmer_user_id(tx, booking.farmer_id).await?;
    queue_notification(
        tx,
        user_id,
        title,
        &format!("Booking {} is now {}", booking.id, booking.status),
        Some(booking.id),
        now,
    )
    .await
}

async fn notify_operator(
    tx: &mut Transaction<'_, Postgres>,
    booking: &RentalBooking,
    title: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let user_id = get_operator_user_id(tx, booking.operator_id).await?;
    queue_notification(
        tx,
        user_id,
        title,
        &format!("Booking {} is now {}", booking.id, booking.status),
        Some(booking.id),
        now,
    )
    .await
}

async fn queue_notification(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    title: &str,
    message: &str,
    related_booking_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO notifications (id, user_id, title, message, channel, is_read, \
         related_booking_id, sent_at) VALUES ($1, $2, $3, $4, $5, false, $6, $7)",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(Channel::InApp)
    .bind(related_booking_id)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    Ok(())
}
