use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::equipment::EquipmentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    CancelledFarmer,
    CancelledOperator,
    Disputed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::CancelledFarmer => "cancelled_farmer",
            BookingStatus::CancelledOperator => "cancelled_operator",
            BookingStatus::Disputed => "disputed",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BookingStatus::CancelledFarmer | BookingStatus::CancelledOperator
        )
    }

    /// A booking in one of these states holds its date range on the unit;
    /// other bookings overlapping it are conflicts.
    pub fn blocks_equipment(&self) -> bool {
        matches!(
            self,
            BookingStatus::Pending
                | BookingStatus::Confirmed
                | BookingStatus::InProgress
                | BookingStatus::Disputed
        )
    }

    /// Equipment status write that entering this state demands, if any.
    pub fn equipment_effect(&self) -> Option<EquipmentStatus> {
        match self {
            BookingStatus::Confirmed | BookingStatus::InProgress => {
                Some(EquipmentStatus::Rented)
            }
            BookingStatus::Completed
            | BookingStatus::CancelledFarmer
            | BookingStatus::CancelledOperator => Some(EquipmentStatus::Available),
            BookingStatus::Pending | BookingStatus::Disputed => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived settlement state, cached on the booking row. The ledger in
/// `model::payment` is the source of truth; see `derive_payment_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    DepositPaid,
    FullyPaid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::DepositPaid => "deposit_paid",
            PaymentStatus::FullyPaid => "fully_paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Farmer,
    Operator,
    Admin,
}

impl Party {
    pub fn as_str(&self) -> &'static str {
        match self {
            Party::Farmer => "farmer",
            Party::Operator => "operator",
            Party::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booking/rental request from a farmer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RentalBooking {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub equipment_id: Uuid,
    pub operator_id: Uuid,

    // Job details
    pub job_description: String,
    pub land_size_acres: Decimal,
    pub crop_type: Option<String>,
    pub farm_location_county: String,
    pub farm_gps_latitude: Option<Decimal>,
    pub farm_gps_longitude: Option<Decimal>,
    pub farm_directions: Option<String>,

    // Timing
    pub requested_start_date: NaiveDate,
    pub requested_end_date: NaiveDate,
    pub actual_start_date: Option<NaiveDate>,
    pub actual_end_date: Option<NaiveDate>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,

    // Pricing
    pub quoted_rate: Decimal,
    pub transport_fee: Decimal,
    pub total_amount: Decimal,
    pub deposit_amount: Decimal,

    pub status: BookingStatus,
    pub payment_status: PaymentStatus,

    pub operator_notes: Option<String>,
    pub farmer_notes: Option<String>,
    pub cancellation_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalBooking {
    /// Transition table for the booking lifecycle. Checks the edge and the
    /// acting party; side requirements (actual dates, cancellation reason)
    /// are checked against the struct as it stands, so callers fill those
    /// fields before applying.
    pub fn apply_transition(&mut self, to: BookingStatus, actor: Party) -> Result<()> {
        use BookingStatus::*;

        let from = self.status;
        let allowed = match (from, to) {
            (Pending, Confirmed) => actor == Party::Operator,
            (Pending, CancelledFarmer) | (Confirmed, CancelledFarmer) => {
                actor == Party::Farmer
            }
            (Pending, CancelledOperator) | (Confirmed, CancelledOperator) => {
                actor == Party::Operator
            }
            (Confirmed, InProgress) => actor == Party::Operator,
            (InProgress, Completed) => actor == Party::Operator,
            (Pending, Disputed) | (Confirmed, Disputed) | (InProgress, Disputed) => {
                actor == Party::Farmer || actor == Party::Operator
            }
            // Dispute resolution goes through support and lands back here
            // with admin authority.
            (Disputed, Completed)
            | (Disputed, CancelledFarmer)
            | (Disputed, CancelledOperator) => actor == Party::Admin,
            _ => false,
        };

        if !allowed {
            return Err(Error::InvalidTransition {
                entity: "booking",
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        match to {
            InProgress => {
                if self.actual_start_date.is_none() {
                    return Err(Error::validation(
                        "actual_start_date is required to start the job",
                    ));
                }
            }
            Completed if from == InProgress => {
                if self.actual_start_date.is_none() || self.actual_end_date.is_none() {
                    return Err(Error::validation(
                        "actual_start_date and actual_end_date are required to complete",
                    ));
                }
            }
            CancelledFarmer | CancelledOperator => {
                if self
                    .cancellation_reason
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or("")
                    .is_empty()
                {
                    return Err(Error::validation("cancellation_reason is required"));
                }
            }
            _ => {}
        }

        self.status = to;
        Ok(())
    }

    /// Closed-interval overlap on the requested ranges. Only meaningful when
    /// both sides are in a blocking state; the caller filters on that.
    pub fn overlaps(&self, other: &RentalBooking) -> bool {
        self.equipment_id == other.equipment_id
            && self.status.blocks_equipment()
            && other.status.blocks_equipment()
            && ranges_overlap(
                self.requested_start_date,
                self.requested_end_date,
                other.requested_start_date,
                other.requested_end_date,
            )
    }
}

/// `[a_start, a_end]` and `[b_start, b_end]` intersect, endpoints included.
pub fn ranges_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && b_start <= a_end
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub farmer_id: Uuid,
    pub equipment_id: Uuid,
    pub job_description: String,
    pub land_size_acres: Decimal,
    pub crop_type: Option<String>,
    pub farm_location_county: String,
    pub farm_gps_latitude: Option<Decimal>,
    pub farm_gps_longitude: Option<Decimal>,
    pub farm_directions: Option<String>,
    pub requested_start_date: NaiveDate,
    pub requested_end_date: NaiveDate,
    pub estimated_hours: Option<Decimal>,
    pub quoted_rate: Decimal,
    pub transport_fee: Option<Decimal>,
    pub total_amount: Decimal,
    pub deposit_amount: Option<Decimal>,
    pub farmer_notes: Option<String>,
}

impl CreateBookingRequest {
    pub fn validate(&self) -> Result<()> {
        if self.requested_end_date < self.requested_start_date {
            return Err(Error::validation(
                "requested_end_date must not be before requested_start_date",
            ));
        }
        if self.job_description.trim().is_empty() {
            return Err(Error::validation("job_description must not be empty"));
        }
        if self.farm_location_county.trim().is_empty() {
            return Err(Error::validation("farm_location_county must not be empty"));
        }
        if self.land_size_acres <= Decimal::ZERO {
            return Err(Error::validation("land_size_acres must be greater than zero"));
        }
        if self.quoted_rate < Decimal::ZERO {
            return Err(Error::validation("quoted_rate must not be negative"));
        }
        if self.total_amount < Decimal::ZERO {
            return Err(Error::validation("total_amount must not be negative"));
        }
        let transport = self.transport_fee.unwrap_or(Decimal::ZERO);
        if transport < Decimal::ZERO {
            return Err(Error::validation("transport_fee must not be negative"));
        }
        let deposit = self.deposit_amount.unwrap_or(Decimal::ZERO);
        if deposit < Decimal::ZERO {
            return Err(Error::validation("deposit_amount must not be negative"));
        }
        if deposit > self.total_amount {
            return Err(Error::validation(
                "deposit_amount must not exceed total_amount",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<RentalBooking>,
    pub total: i64,
    pub page: i32,
    pub limit: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn booking(status: BookingStatus, start: &str, end: &str) -> RentalBooking {
        RentalBooking {
            id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            equipment_id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            job_description: "Ploughing 5 acres of maize".to_string(),
            land_size_acres: Decimal::from(5),
            crop_type: Some("maize".to_string()),
            farm_location_county: "Nakuru".to_string(),
            farm_gps_latitude: None,
            farm_gps_longitude: None,
            farm_directions: None,
            requested_start_date: date(start),
            requested_end_date: date(end),
            actual_start_date: None,
            actual_end_date: None,
            estimated_hours: None,
            actual_hours: None,
            quoted_rate: Decimal::from(2000),
            transport_fee: Decimal::ZERO,
            total_amount: Decimal::from(10000),
            deposit_amount: Decimal::from(2000),
            status,
            payment_status: PaymentStatus::Unpaid,
            operator_notes: None,
            farmer_notes: None,
            cancellation_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        let req = CreateBookingRequest {
            farmer_id: Uuid::new_v4(),
            equipment_id: Uuid::new_v4(),
            job_description: "Harrowing".to_string(),
            land_size_acres: Decimal::from(3),
            crop_type: None,
            farm_location_county: "Kiambu".to_string(),
            farm_gps_latitude: None,
            farm_gps_longitude: None,
            farm_directions: None,
            requested_start_date: date("2025-03-10"),
            requested_end_date: date("2025-03-08"),
            estimated_hours: None,
            quoted_rate: Decimal::from(1500),
            transport_fee: None,
            total_amount: Decimal::from(4500),
            deposit_amount: None,
            farmer_notes: None,
        };
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn operator_confirms_pending() {
        let mut b = booking(BookingStatus::Pending, "2025-03-10", "2025-03-12");
        b.apply_transition(BookingStatus::Confirmed, Party::Operator)
            .unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
    }

    #[test]
    fn farmer_cannot_confirm() {
        let mut b = booking(BookingStatus::Pending, "2025-03-10", "2025-03-12");
        let err = b
            .apply_transition(BookingStatus::Confirmed, Party::Farmer)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(b.status, BookingStatus::Pending);
    }

    #[test]
    fn cancellation_requires_reason_and_right_party() {
        let mut b = booking(BookingStatus::Confirmed, "2025-03-10", "2025-03-12");
        // no reason recorded yet
        let err = b
            .apply_transition(BookingStatus::CancelledFarmer, Party::Farmer)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        b.cancellation_reason = Some("Rain delayed planting".to_string());
        // operator cannot cancel on the farmer's behalf
        assert!(b
            .apply_transition(BookingStatus::CancelledFarmer, Party::Operator)
            .is_err());
        b.apply_transition(BookingStatus::CancelledFarmer, Party::Farmer)
            .unwrap();
        assert_eq!(b.status, BookingStatus::CancelledFarmer);
    }

    #[test]
    fn completion_needs_actual_dates() {
        let mut b = booking(BookingStatus::Confirmed, "2025-03-10", "2025-03-12");
        // start without actual_start_date
        let err = b
            .apply_transition(BookingStatus::InProgress, Party::Operator)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        b.actual_start_date = Some(date("2025-03-10"));
        b.apply_transition(BookingStatus::InProgress, Party::Operator)
            .unwrap();

        let err = b
            .apply_transition(BookingStatus::Completed, Party::Operator)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        b.actual_end_date = Some(date("2025-03-12"));
        b.apply_transition(BookingStatus::Completed, Party::Operator)
            .unwrap();
        assert_eq!(b.status, BookingStatus::Completed);
    }

    #[test]
    fn terminal_states_stay_terminal() {
        for terminal in [
            BookingStatus::Completed,
            BookingStatus::CancelledFarmer,
            BookingStatus::CancelledOperator,
        ] {
            let mut b = booking(terminal, "2025-03-10", "2025-03-12");
            for target in [
                BookingStatus::Pending,
                BookingStatus::Confirmed,
                BookingStatus::InProgress,
                BookingStatus::Disputed,
            ] {
                for actor in [Party::Farmer, Party::Operator, Party::Admin] {
                    assert!(
                        matches!(
                            b.apply_transition(target, actor),
                            Err(Error::InvalidTransition { .. })
                        ),
                        "{} -> {} by {} should be rejected",
                        terminal,
                        target,
                        actor
                    );
                }
            }
        }
    }

    #[test]
    fn only_admin_resolves_disputes() {
        let mut b = booking(BookingStatus::Disputed, "2025-03-10", "2025-03-12");
        b.actual_start_date = Some(date("2025-03-10"));
        b.actual_end_date = Some(date("2025-03-11"));
        assert!(b
            .apply_transition(BookingStatus::Completed, Party::Operator)
            .is_err());
        b.apply_transition(BookingStatus::Completed, Party::Admin)
            .unwrap();
        assert_eq!(b.status, BookingStatus::Completed);
    }

    #[test]
    fn lifecycle_leaves_equipment_available() {
        // pending -> confirmed -> in_progress -> completed, tracking the
        // equipment status effect of every hop
        let mut b = booking(BookingStatus::Pending, "2025-03-10", "2025-03-12");
        let mut eq_status = EquipmentStatus::Available;

        b.apply_transition(BookingStatus::Confirmed, Party::Operator)
            .unwrap();
        if let Some(s) = b.status.equipment_effect() {
            eq_status = s;
        }
        assert_eq!(eq_status, EquipmentStatus::Rented);

        b.actual_start_date = Some(date("2025-03-10"));
        b.apply_transition(BookingStatus::InProgress, Party::Operator)
            .unwrap();
        if let Some(s) = b.status.equipment_effect() {
            eq_status = s;
        }
        assert_eq!(eq_status, EquipmentStatus::Rented);

        b.actual_end_date = Some(date("2025-03-12"));
        b.apply_transition(BookingStatus::Completed, Party::Operator)
            .unwrap();
        if let Some(s) = b.status.equipment_effect() {
            eq_status = s;
        }
        assert_eq!(eq_status, EquipmentStatus::Available);
    }

    #[test]
    fn statuses_serialize_as_wire_strings() {
        assert_eq!(
            serde_json::to_value(BookingStatus::CancelledFarmer).unwrap(),
            serde_json::json!("cancelled_farmer")
        );
        assert_eq!(
            serde_json::to_value(PaymentStatus::DepositPaid).unwrap(),
            serde_json::json!("deposit_paid")
        );
        assert_eq!(
            serde_json::from_str::<BookingStatus>("\"in_progress\"").unwrap(),
            BookingStatus::InProgress
        );
    }

    #[test]
    fn overlap_is_closed_interval() {
        assert!(ranges_overlap(
            date("2025-03-10"),
            date("2025-03-12"),
            date("2025-03-12"),
            date("2025-03-15"),
        ));
        assert!(!ranges_overlap(
            date("2025-03-10"),
            date("2025-03-12"),
            date("2025-03-13"),
            date("2025-03-15"),
        ));
    }

    #[test]
    fn cancelled_bookings_release_the_range() {
        let mut a = booking(BookingStatus::Confirmed, "2025-03-10", "2025-03-14");
        let mut b = booking(BookingStatus::Pending, "2025-03-12", "2025-03-16");
        b.equipment_id = a.equipment_id;
        assert!(a.overlaps(&b));

        a.cancellation_reason = Some("Tractor needed elsewhere".to_string());
        a.apply_transition(BookingStatus::CancelledOperator, Party::Operator)
            .unwrap();
        assert!(!a.overlaps(&b));
    }
}
