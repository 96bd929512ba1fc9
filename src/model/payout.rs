use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Net transfer owed to the operator once a booking completes. Exactly one
/// per booking.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OperatorPayout {
    pub id: Uuid,
    pub operator_id: Uuid,
    pub booking_id: Uuid,
    pub gross_amount: Decimal,
    pub platform_fee_percent: Decimal,
    pub platform_fee_amount: Decimal,
    pub net_amount: Decimal,
    pub status: PayoutStatus,
    pub retryable: bool,
    pub payout_method: Option<String>,
    pub payout_reference: Option<String>,
    pub initiated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OperatorPayout {
    /// pending -> processing -> paid, with failed reachable from the two
    /// live states. A retryable failure may go back to processing; paid and
    /// hard failures are terminal.
    pub fn check_transition(&self, to: PayoutStatus) -> Result<()> {
        use PayoutStatus::*;
        let allowed = match (self.status, to) {
            (Pending, Processing) => true,
            (Processing, Paid) => true,
            (Pending, Failed) | (Processing, Failed) => true,
            (Failed, Processing) => self.retryable,
            _ => false,
        };
        if !allowed {
            return Err(Error::InvalidTransition {
                entity: "payout",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// The money split of a payout, always reconciling to the gross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutBreakdown {
    pub gross_amount: Decimal,
    pub platform_fee_amount: Decimal,
    pub net_amount: Decimal,
}

/// Compute the split for a completed booking. The gross is the booking total
/// less whatever was already refunded; the fee is rounded half-up to 2
/// decimal places and the net is the exact remainder, so
/// `net + fee == gross` always holds.
pub fn compute_payout(
    total_amount: Decimal,
    refunded_amount: Decimal,
    platform_fee_percent: Decimal,
) -> Result<PayoutBreakdown> {
    if platform_fee_percent < Decimal::ZERO || platform_fee_percent > Decimal::from(100) {
        return Err(Error::validation(
            "platform_fee_percent must be between 0 and 100",
        ));
    }
    if refunded_amount < Decimal::ZERO {
        return Err(Error::validation("refunded_amount must not be negative"));
    }
    let gross_amount = (total_amount - refunded_amount).max(Decimal::ZERO);
    let platform_fee_amount = (gross_amount * platform_fee_percent / Decimal::from(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let net_amount = gross_amount - platform_fee_amount;
    Ok(PayoutBreakdown {
        gross_amount,
        platform_fee_amount,
        net_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn payout(status: PayoutStatus, retryable: bool) -> OperatorPayout {
        let breakdown =
            compute_payout(dec("10000"), Decimal::ZERO, dec("10.00")).unwrap();
        OperatorPayout {
            id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            gross_amount: breakdown.gross_amount,
            platform_fee_percent: dec("10.00"),
            platform_fee_amount: breakdown.platform_fee_amount,
            net_amount: breakdown.net_amount,
            status,
            retryable,
            payout_method: Some("mpesa".to_string()),
            payout_reference: None,
            initiated_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ten_percent_of_ten_thousand() {
        let b = compute_payout(dec("10000"), Decimal::ZERO, dec("10.00")).unwrap();
        assert_eq!(b.platform_fee_amount, dec("1000.00"));
        assert_eq!(b.net_amount, dec("9000.00"));
        assert_eq!(b.net_amount + b.platform_fee_amount, b.gross_amount);
    }

    #[test]
    fn refunds_shrink_the_gross() {
        let b = compute_payout(dec("10000"), dec("2500"), dec("10.00")).unwrap();
        assert_eq!(b.gross_amount, dec("7500"));
        assert_eq!(b.platform_fee_amount, dec("750.00"));
        assert_eq!(b.net_amount, dec("6750.00"));
    }

    #[test]
    fn fee_rounds_half_up_and_still_reconciles() {
        // 333.33 * 7.5% = 24.99975 -> 25.00
        let b = compute_payout(dec("333.33"), Decimal::ZERO, dec("7.50")).unwrap();
        assert_eq!(b.platform_fee_amount, dec("25.00"));
        assert_eq!(b.net_amount + b.platform_fee_amount, b.gross_amount);

        // exact midpoint: 0.125 rounds up, not to even
        let b = compute_payout(dec("25"), Decimal::ZERO, dec("0.50")).unwrap();
        assert_eq!(b.platform_fee_amount, dec("0.13"));
        assert_eq!(b.net_amount, dec("24.87"));
    }

    #[test]
    fn fully_refunded_booking_pays_out_nothing() {
        let b = compute_payout(dec("10000"), dec("10000"), dec("10.00")).unwrap();
        assert_eq!(b.gross_amount, Decimal::ZERO);
        assert_eq!(b.net_amount, Decimal::ZERO);
    }

    #[test]
    fn status_machine_edges() {
        assert!(payout(PayoutStatus::Pending, false)
            .check_transition(PayoutStatus::Processing)
            .is_ok());
        assert!(payout(PayoutStatus::Processing, false)
            .check_transition(PayoutStatus::Paid)
            .is_ok());
        assert!(payout(PayoutStatus::Processing, false)
            .check_transition(PayoutStatus::Failed)
            .is_ok());
        // pending cannot jump straight to paid
        assert!(matches!(
            payout(PayoutStatus::Pending, false).check_transition(PayoutStatus::Paid),
            Err(Error::InvalidTransition { .. })
        ));
        // retry only when flagged retryable
        assert!(payout(PayoutStatus::Failed, true)
            .check_transition(PayoutStatus::Processing)
            .is_ok());
        assert!(payout(PayoutStatus::Failed, false)
            .check_transition(PayoutStatus::Processing)
            .is_err());
        // paid is terminal
        assert!(payout(PayoutStatus::Paid, true)
            .check_transition(PayoutStatus::Processing)
            .is_err());
    }
}
