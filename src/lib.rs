//! Data core for an agricultural-equipment rental marketplace: farmers book
//! machinery from operators, pay in instalments, and operators get paid out
//! after the job, platform fee deducted.
//!
//! The crate owns the entities, the booking/payment/payout lifecycle rules,
//! and their Postgres persistence. Auth, file storage, notification delivery
//! and the HTTP surface all live in other services and consume this one.

pub mod error;
pub mod model;
pub mod store;

pub use error::{Error, Result};
