use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

// Maintenance records for equipment
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MaintenanceLog {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub service_date: NaiveDate,
    pub service_type: String,
    pub description: String,
    pub cost: Decimal,
    pub performed_by: Option<String>,
    pub next_service_date: Option<NaiveDate>,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMaintenanceLogRequest {
    pub equipment_id: Uuid,
    pub service_date: NaiveDate,
    pub service_type: String,
    pub description: String,
    pub cost: Option<Decimal>,
    pub performed_by: Option<String>,
    pub next_service_date: Option<NaiveDate>,
    pub attachment_url: Option<String>,
    /// Flip the unit to `maintenance` while the work runs.
    pub take_out_of_service: Option<bool>,
}

impl CreateMaintenanceLogRequest {
    pub fn validate(&self) -> Result<()> {
        if self.service_type.trim().is_empty() {
            return Err(Error::validation("service_type must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("description must not be empty"));
        }
        if let Some(cost) = self.cost {
            if cost < Decimal::ZERO {
                return Err(Error::validation("cost must not be negative"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InReview,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InReview => "in_review",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    /// Tickets only move forward: open -> in_review -> resolved -> closed,
    /// with the open -> resolved shortcut for trivial cases.
    pub fn check_transition(&self, to: TicketStatus) -> Result<()> {
        use TicketStatus::*;
        let allowed = matches!(
            (self, to),
            (Open, InReview) | (Open, Resolved) | (InReview, Resolved) | (Resolved, Closed)
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                entity: "ticket",
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ticket_priority", rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Support ticket for disputes or issues; the admin path for unwinding a
/// disputed booking runs through here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub submitter_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub assigned_to: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub submitter_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
    pub priority: Option<TicketPriority>,
}

impl CreateTicketRequest {
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(Error::validation("subject must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("description must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "notification_channel", rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Sms,
    Push,
}

/// In-app and SMS notifications. This crate only records them; delivery is
/// the dispatcher's job.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub channel: Channel,
    pub is_read: bool,
    pub related_booking_id: Option<Uuid>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickets_move_forward_only() {
        assert!(TicketStatus::Open.check_transition(TicketStatus::InReview).is_ok());
        assert!(TicketStatus::Open.check_transition(TicketStatus::Resolved).is_ok());
        assert!(TicketStatus::InReview.check_transition(TicketStatus::Resolved).is_ok());
        assert!(TicketStatus::Resolved.check_transition(TicketStatus::Closed).is_ok());

        assert!(matches!(
            TicketStatus::Resolved.check_transition(TicketStatus::Open),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(TicketStatus::Closed.check_transition(TicketStatus::Resolved).is_err());
        assert!(TicketStatus::Open.check_transition(TicketStatus::Closed).is_err());
    }

    #[test]
    fn maintenance_log_validation() {
        let req = CreateMaintenanceLogRequest {
            equipment_id: Uuid::new_v4(),
            service_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            service_type: "Oil change".to_string(),
            description: "Engine oil and filters".to_string(),
            cost: Some(Decimal::from(-50)),
            performed_by: None,
            next_service_date: None,
            attachment_url: None,
            take_out_of_service: None,
        };
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }
}
