use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::booking::{BookingStatus, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
pub enum PaymentMethod {
    Mpesa,
    AirtelMoney,
    BankTransfer,
    Cash,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
pub enum PaymentType {
    Deposit,
    Final,
    Refund,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "deposit",
            PaymentType::Final => "final",
            PaymentType::Refund => "refund",
        }
    }
}

/// One money movement against a booking. Rows start unconfirmed and are
/// confirmed when the provider callback lands; only confirmed rows count
/// towards the ledger.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub transaction_id: String,
    pub is_confirmed: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub transaction_id: String,
    pub notes: Option<String>,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::validation("amount must be greater than zero"));
        }
        if self.transaction_id.trim().is_empty() {
            return Err(Error::validation("transaction_id must not be empty"));
        }
        Ok(())
    }
}

/// Confirmed inflow/outflow totals for one booking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub paid: Decimal,
    pub refunded: Decimal,
}

impl LedgerTotals {
    /// Net amount the farmer has effectively paid in.
    pub fn effective_paid(&self) -> Decimal {
        self.paid - self.refunded
    }
}

/// Sum the confirmed rows of a booking's ledger.
pub fn ledger_totals(payments: &[Payment]) -> LedgerTotals {
    let mut totals = LedgerTotals::default();
    for p in payments.iter().filter(|p| p.is_confirmed) {
        match p.payment_type {
            PaymentType::Deposit | PaymentType::Final => totals.paid += p.amount,
            PaymentType::Refund => totals.refunded += p.amount,
        }
    }
    totals
}

/// Pure projection of the booking's payment_status from its ledger.
pub fn derive_payment_status(totals: LedgerTotals, total_amount: Decimal) -> PaymentStatus {
    let effective = totals.effective_paid();
    if totals.refunded > Decimal::ZERO && effective <= Decimal::ZERO {
        PaymentStatus::Refunded
    } else if effective <= Decimal::ZERO {
        PaymentStatus::Unpaid
    } else if effective < total_amount {
        PaymentStatus::DepositPaid
    } else {
        PaymentStatus::FullyPaid
    }
}

/// Booking states that accept ledger writes.
pub fn booking_accepts_payments(status: BookingStatus) -> bool {
    matches!(
        status,
        BookingStatus::Confirmed
            | BookingStatus::InProgress
            | BookingStatus::Completed
            | BookingStatus::Disputed
    )
}

/// Rules applied before a payment row is confirmed: inflows may not push the
/// confirmed total past total_amount, refunds may not exceed what was paid.
pub fn check_confirmation(
    confirmed: &[Payment],
    candidate: &Payment,
    total_amount: Decimal,
) -> Result<()> {
    let totals = ledger_totals(confirmed);
    match candidate.payment_type {
        PaymentType::Deposit | PaymentType::Final => {
            if totals.paid + candidate.amount > total_amount {
                return Err(Error::validation(format!(
                    "payment of {} would exceed booking total {} (already paid {})",
                    candidate.amount, total_amount, totals.paid
                )));
            }
        }
        PaymentType::Refund => {
            if totals.paid <= Decimal::ZERO {
                return Err(Error::validation(
                    "refund requires a prior confirmed payment",
                ));
            }
            if totals.refunded + candidate.amount > totals.paid {
                return Err(Error::validation(format!(
                    "refund of {} would exceed confirmed payments of {}",
                    candidate.amount, totals.paid
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(
        booking_id: Uuid,
        amount: i64,
        payment_type: PaymentType,
        confirmed: bool,
    ) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id,
            amount: Decimal::from(amount),
            method: PaymentMethod::Mpesa,
            payment_type,
            transaction_id: format!("MPESA-{}", Uuid::new_v4()),
            is_confirmed: confirmed,
            paid_at: confirmed.then(Utc::now),
            created_at: Utc::now(),
            notes: None,
        }
    }

    #[test]
    fn unconfirmed_rows_do_not_count() {
        let b = Uuid::new_v4();
        let ledger = vec![
            payment(b, 2000, PaymentType::Deposit, true),
            payment(b, 8000, PaymentType::Final, false),
        ];
        let totals = ledger_totals(&ledger);
        assert_eq!(totals.paid, Decimal::from(2000));
        assert_eq!(
            derive_payment_status(totals, Decimal::from(10000)),
            PaymentStatus::DepositPaid
        );
    }

    #[test]
    fn status_walks_the_ledger() {
        let b = Uuid::new_v4();
        let total = Decimal::from(10000);
        let mut ledger: Vec<Payment> = Vec::new();
        assert_eq!(
            derive_payment_status(ledger_totals(&ledger), total),
            PaymentStatus::Unpaid
        );

        ledger.push(payment(b, 2000, PaymentType::Deposit, true));
        assert_eq!(
            derive_payment_status(ledger_totals(&ledger), total),
            PaymentStatus::DepositPaid
        );

        ledger.push(payment(b, 8000, PaymentType::Final, true));
        assert_eq!(
            derive_payment_status(ledger_totals(&ledger), total),
            PaymentStatus::FullyPaid
        );

        ledger.push(payment(b, 10000, PaymentType::Refund, true));
        assert_eq!(
            derive_payment_status(ledger_totals(&ledger), total),
            PaymentStatus::Refunded
        );
    }

    #[test]
    fn partial_refund_falls_back_to_deposit_paid() {
        let b = Uuid::new_v4();
        let ledger = vec![
            payment(b, 10000, PaymentType::Final, true),
            payment(b, 4000, PaymentType::Refund, true),
        ];
        assert_eq!(
            derive_payment_status(ledger_totals(&ledger), Decimal::from(10000)),
            PaymentStatus::DepositPaid
        );
    }

    #[test]
    fn overpayment_is_rejected_at_confirmation() {
        let b = Uuid::new_v4();
        let confirmed = vec![payment(b, 8000, PaymentType::Final, true)];
        let candidate = payment(b, 3000, PaymentType::Final, false);
        let err = check_confirmation(&confirmed, &candidate, Decimal::from(10000))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn refund_needs_prior_confirmed_payment() {
        let b = Uuid::new_v4();
        let candidate = payment(b, 1000, PaymentType::Refund, false);
        let err = check_confirmation(&[], &candidate, Decimal::from(10000)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let confirmed = vec![payment(b, 2000, PaymentType::Deposit, true)];
        let too_big = payment(b, 2500, PaymentType::Refund, false);
        assert!(check_confirmation(&confirmed, &too_big, Decimal::from(10000)).is_err());

        let ok = payment(b, 2000, PaymentType::Refund, false);
        assert!(check_confirmation(&confirmed, &ok, Decimal::from(10000)).is_ok());
    }

    #[test]
    fn pending_bookings_take_no_money() {
        assert!(!booking_accepts_payments(BookingStatus::Pending));
        assert!(!booking_accepts_payments(BookingStatus::CancelledFarmer));
        assert!(booking_accepts_payments(BookingStatus::Confirmed));
        assert!(booking_accepts_payments(BookingStatus::Disputed));
    }
}
