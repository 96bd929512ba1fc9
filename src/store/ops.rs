use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{violates_constraint, Error, Result};
use crate::model::ops::{
    Channel, CreateTicketRequest, Notification, SupportTicket, TicketPriority, TicketStatus,
};
use crate::model::review::{BookingReview, CreateReviewRequest};

const REVIEW_COLS: &str = "id, booking_id, reviewer_id, reviewee_id, rating, \
     punctuality_rating, quality_rating, comment, created_at";

const TICKET_COLS: &str = "id, submitter_id, booking_id, subject, description, status, \
     priority, assigned_to, resolved_at, created_at, updated_at";

const NOTIFICATION_COLS: &str =
    "id, user_id, title, message, channel, is_read, related_booking_id, sent_at";

// ---------------------------------------------------------------------------
// Reviews

/// Leave a review on a booking. Reviewer and reviewee must be the two
/// opposing parties; one review per (booking, reviewer). A farmer's review
/// of the operator refreshes the operator's cached average rating.
pub async fn create_review(
    pool: &PgPool,
    req: CreateReviewRequest,
    now: DateTime<Utc>,
) -> Result<BookingReview> {
    req.validate()?;
    let mut tx = pool.begin().await?;

    let parties = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
        "SELECT f.user_id, o.user_id, o.id \
         FROM rental_bookings b \
         JOIN farmer_profiles f ON f.id = b.farmer_id \
         JOIN operator_profiles o ON o.id = b.operator_id \
         WHERE b.id = $1",
    )
    .bind(req.booking_id)
    .fetch_optional(&mut tx)
    .await?
    .ok_or(Error::not_found("booking", req.booking_id))?;
    let (farmer_user_id, operator_user_id, operator_profile_id) = parties;
    req.check_parties(farmer_user_id, operator_user_id)?;

    let sql = format!(
        "INSERT INTO booking_reviews (id, booking_id, reviewer_id, reviewee_id, rating, \
         punctuality_rating, quality_rating, comment, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {REVIEW_COLS}"
    );
    let review = sqlx::query_as::<_, BookingReview>(&sql)
        .bind(Uuid::new_v4())
        .bind(req.booking_id)
        .bind(req.reviewer_id)
        .bind(req.reviewee_id)
        .bind(req.rating)
        .bind(req.punctuality_rating)
        .bind(req.quality_rating)
        .bind(&req.comment)
        .bind(now)
        .fetch_one(&mut tx)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "booking_reviews_booking_id_reviewer_id_key") {
                Error::conflict("this party already reviewed the booking")
            } else {
                e.into()
            }
        })?;

    if review.reviewer_id == farmer_user_id {
        refresh_operator_rating(&mut tx, operator_profile_id, operator_user_id).await?;
    }

    tx.commit().await?;
    tracing::info!(review_id = %review.id, booking_id = %review.booking_id, "review created");
    Ok(review)
}

pub async fn list_reviews_for_booking(
    pool: &PgPool,
    booking_id: Uuid,
) -> Result<Vec<BookingReview>> {
    let sql = format!(
        "SELECT {REVIEW_COLS} FROM booking_reviews WHERE booking_id = $1 ORDER BY created_at"
    );
    Ok(sqlx::query_as::<_, BookingReview>(&sql)
        .bind(booking_id)
        .fetch_all(pool)
        .await?)
}

pub async fn list_reviews_for_user(pool: &PgPool, reviewee_id: Uuid) -> Result<Vec<BookingReview>> {
    let sql = format!(
        "SELECT {REVIEW_COLS} FROM booking_reviews WHERE reviewee_id = $1 ORDER BY created_at DESC"
    );
    Ok(sqlx::query_as::<_, BookingReview>(&sql)
        .bind(reviewee_id)
        .fetch_all(pool)
        .await?)
}

/// Keep the cached average in step with the reviews the operator's user has
/// received from farmers.
async fn refresh_operator_rating(
    tx: &mut Transaction<'_, Postgres>,
    operator_profile_id: Uuid,
    operator_user_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "UPDATE operator_profiles SET average_rating = COALESCE( \
         (SELECT ROUND(AVG(rating), 2) FROM booking_reviews WHERE reviewee_id = $1), 0.00) \
         WHERE id = $2",
    )
    .bind(operator_user_id)
    .bind(operator_profile_id)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Support tickets

pub async fn create_ticket(
    pool: &PgPool,
    req: CreateTicketRequest,
    now: DateTime<Utc>,
) -> Result<SupportTicket> {
    req.validate()?;
    let sql = format!(
        "INSERT INTO support_tickets (id, submitter_id, booking_id, subject, description, \
         status, priority, assigned_to, resolved_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, 'open', $6, NULL, NULL, $7, $7) \
         RETURNING {TICKET_COLS}"
    );
    let ticket = sqlx::query_as::<_, SupportTicket>(&sql)
        .bind(Uuid::new_v4())
        .bind(req.submitter_id)
        .bind(req.booking_id)
        .bind(&req.subject)
        .bind(&req.description)
        .bind(req.priority.unwrap_or(TicketPriority::Medium))
        .bind(now)
        .fetch_one(pool)
        .await?;
    tracing::info!(ticket_id = %ticket.id, "support ticket opened");
    Ok(ticket)
}

pub async fn get_ticket(pool: &PgPool, id: Uuid) -> Result<SupportTicket> {
    let sql = format!("SELECT {TICKET_COLS} FROM support_tickets WHERE id = $1");
    sqlx::query_as::<_, SupportTicket>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("ticket", id))
}

pub async fn assign_ticket(
    pool: &PgPool,
    ticket_id: Uuid,
    assignee_id: Uuid,
    now: DateTime<Utc>,
) -> Result<SupportTicket> {
    let sql = format!(
        "UPDATE support_tickets SET assigned_to = $1, updated_at = $2 WHERE id = $3 \
         RETURNING {TICKET_COLS}"
    );
    sqlx::query_as::<_, SupportTicket>(&sql)
        .bind(assignee_id)
        .bind(now)
        .bind(ticket_id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("ticket", ticket_id))
}

/// Move a ticket along its one-way status track. Reaching `resolved` stamps
/// resolved_at.
pub async fn transition_ticket(
    pool: &PgPool,
    ticket_id: Uuid,
    to: TicketStatus,
    now: DateTime<Utc>,
) -> Result<SupportTicket> {
    let mut tx = pool.begin().await?;
    let sql = format!("SELECT {TICKET_COLS} FROM support_tickets WHERE id = $1 FOR UPDATE");
    let ticket = sqlx::query_as::<_, SupportTicket>(&sql)
        .bind(ticket_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::not_found("ticket", ticket_id))?;
    ticket.status.check_transition(to)?;

    let sql = format!(
        "UPDATE support_tickets SET status = $1, \
         resolved_at = CASE WHEN $1 = 'resolved'::ticket_status THEN $2 ELSE resolved_at END, \
         updated_at = $2 WHERE id = $3 RETURNING {TICKET_COLS}"
    );
    let ticket = sqlx::query_as::<_, SupportTicket>(&sql)
        .bind(to)
        .bind(now)
        .bind(ticket_id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    tracing::info!(ticket_id = %ticket.id, status = %ticket.status, "ticket transitioned");
    Ok(ticket)
}

// ---------------------------------------------------------------------------
// Notifications

pub async fn create_notification(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    message: &str,
    channel: Channel,
    related_booking_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Notification> {
    if title.trim().is_empty() {
        return Err(Error::validation("title must not be empty"));
    }
    let sql = format!(
        "INSERT INTO notifications (id, user_id, title, message, channel, is_read, \
         related_booking_id, sent_at) VALUES ($1, $2, $3, $4, $5, false, $6, $7) \
         RETURNING {NOTIFICATION_COLS}"
    );
    Ok(sqlx::query_as::<_, Notification>(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(channel)
        .bind(related_booking_id)
        .bind(now)
        .fetch_one(pool)
        .await?)
}

pub async fn list_unread_notifications(pool: &PgPool, user_id: Uuid) -> Result<Vec<Notification>> {
    let sql = format!(
        "SELECT {NOTIFICATION_COLS} FROM notifications \
         WHERE user_id = $1 AND NOT is_read ORDER BY sent_at DESC"
    );
    Ok(sqlx::query_as::<_, Notification>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?)
}

pub async fn mark_notification_read(pool: &PgPool, notification_id: Uuid) -> Result<()> {
    let done = sqlx::query("UPDATE notifications SET is_read = true WHERE id = $1")
        .bind(notification_id)
        .execute(pool)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::not_found("notification", notification_id));
    }
    Ok(())
}
