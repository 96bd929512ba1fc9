use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "equipment_status", rename_all = "snake_case")]
pub enum EquipmentStatus {
    Available,
    Rented,
    Maintenance,
    Inactive,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Available => "available",
            EquipmentStatus::Rented => "rented",
            EquipmentStatus::Maintenance => "maintenance",
            EquipmentStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "fuel_type", rename_all = "snake_case")]
pub enum FuelType {
    Diesel,
    Petrol,
    Electric,
    Manual,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EquipmentCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

/// Individual machinery unit listed for rental.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Equipment {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year_manufactured: Option<i32>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
    pub fuel_type: FuelType,
    pub horsepower: Option<Decimal>,
    pub capacity_info: Option<String>,
    pub daily_rate: Decimal,
    pub hourly_rate: Option<Decimal>,
    pub price_includes_operator: bool,
    pub price_includes_fuel: bool,
    pub current_county: String,
    pub gps_latitude: Option<Decimal>,
    pub gps_longitude: Option<Decimal>,
    pub status: EquipmentStatus,
    pub last_serviced: Option<NaiveDate>,
    pub next_service_due: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Equipment {
    pub fn is_bookable(&self) -> bool {
        matches!(
            self.status,
            EquipmentStatus::Available | EquipmentStatus::Rented
        )
    }

    /// Guard for manual status writes. `rented` belongs to the booking
    /// lifecycle, and a unit with live bookings cannot be pulled out of it.
    pub fn check_manual_status_change(
        &self,
        target: EquipmentStatus,
        has_blocking_bookings: bool,
    ) -> Result<()> {
        if target == EquipmentStatus::Rented {
            return Err(Error::validation(
                "status 'rented' is set by the booking lifecycle, not manually",
            ));
        }
        if has_blocking_bookings {
            return Err(Error::conflict(format!(
                "equipment {} has active bookings, cannot move to {}",
                self.id, target
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEquipmentRequest {
    pub owner_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year_manufactured: Option<i32>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
    pub fuel_type: FuelType,
    pub horsepower: Option<Decimal>,
    pub capacity_info: Option<String>,
    pub daily_rate: Decimal,
    pub hourly_rate: Option<Decimal>,
    pub price_includes_operator: Option<bool>,
    pub price_includes_fuel: Option<bool>,
    pub current_county: String,
    pub gps_latitude: Option<Decimal>,
    pub gps_longitude: Option<Decimal>,
    pub last_serviced: Option<NaiveDate>,
    pub next_service_due: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
}

impl CreateEquipmentRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        if self.current_county.trim().is_empty() {
            return Err(Error::validation("current_county must not be empty"));
        }
        if self.daily_rate <= Decimal::ZERO {
            return Err(Error::validation("daily_rate must be greater than zero"));
        }
        if let Some(rate) = self.hourly_rate {
            if rate <= Decimal::ZERO {
                return Err(Error::validation("hourly_rate must be greater than zero"));
            }
        }
        if let Some(year) = self.year_manufactured {
            if !(1950..=2100).contains(&year) {
                return Err(Error::validation("year_manufactured is out of range"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateEquipmentRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub description: Option<String>,
    pub daily_rate: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    pub price_includes_operator: Option<bool>,
    pub price_includes_fuel: Option<bool>,
    pub current_county: Option<String>,
    pub gps_latitude: Option<Decimal>,
    pub gps_longitude: Option<Decimal>,
    pub last_serviced: Option<NaiveDate>,
    pub next_service_due: Option<NaiveDate>,
    pub insurance_expiry: Option<NaiveDate>,
}

impl UpdateEquipmentRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::validation("name must not be empty"));
            }
        }
        if let Some(rate) = self.daily_rate {
            if rate <= Decimal::ZERO {
                return Err(Error::validation("daily_rate must be greater than zero"));
            }
        }
        Ok(())
    }
}

// Listing filters, same shape the rental search screens send
#[derive(Debug, Default, Deserialize)]
pub struct EquipmentQuery {
    pub page: Option<i32>,
    pub limit: Option<i32>,
    pub category_id: Option<Uuid>,
    pub county: Option<String>,
    pub available_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EquipmentListResponse {
    pub equipment: Vec<Equipment>,
    pub total: i64,
    pub page: i32,
    pub limit: i32,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EquipmentImage {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub image_url: String,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// Counties where an operator provides service, with transport surcharge.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceArea {
    pub id: Uuid,
    pub operator_id: Uuid,
    pub county: String,
    pub additional_charge: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tractor(status: EquipmentStatus) -> Equipment {
        Equipment {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "Massey Ferguson 240".to_string(),
            brand: Some("Massey Ferguson".to_string()),
            model: Some("240".to_string()),
            year_manufactured: Some(2018),
            serial_number: None,
            description: None,
            fuel_type: FuelType::Diesel,
            horsepower: Some(Decimal::from(50)),
            capacity_info: None,
            daily_rate: Decimal::from(7000),
            hourly_rate: None,
            price_includes_operator: true,
            price_includes_fuel: false,
            current_county: "Uasin Gishu".to_string(),
            gps_latitude: None,
            gps_longitude: None,
            status,
            last_serviced: None,
            next_service_due: None,
            insurance_expiry: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn manual_rented_is_rejected() {
        let eq = tractor(EquipmentStatus::Available);
        let err = eq
            .check_manual_status_change(EquipmentStatus::Rented, false)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn cannot_sideline_unit_with_live_bookings() {
        let eq = tractor(EquipmentStatus::Rented);
        let err = eq
            .check_manual_status_change(EquipmentStatus::Maintenance, true)
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // no live bookings, maintenance is fine
        assert!(eq
            .check_manual_status_change(EquipmentStatus::Maintenance, false)
            .is_ok());
    }

    #[test]
    fn zero_daily_rate_fails_validation() {
        let req = CreateEquipmentRequest {
            owner_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "Boom sprayer".to_string(),
            brand: None,
            model: None,
            year_manufactured: None,
            serial_number: None,
            description: None,
            fuel_type: FuelType::Manual,
            horsepower: None,
            capacity_info: None,
            daily_rate: Decimal::ZERO,
            hourly_rate: None,
            price_includes_operator: None,
            price_includes_fuel: None,
            current_county: "Kiambu".to_string(),
            gps_latitude: None,
            gps_longitude: None,
            last_serviced: None,
            next_service_due: None,
            insurance_expiry: None,
        };
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }
}
