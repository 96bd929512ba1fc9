use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Platform role. Farmers rent, operators provide, admins arbitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum Role {
    Farmer,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub role: Role,
    pub national_id: Option<String>,
    pub id_verified: bool,
    pub profile_photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub role: Role,
    pub national_id: Option<String>,
    pub profile_photo_url: Option<String>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::validation("username must not be empty"));
        }
        if self.full_name.trim().is_empty() {
            return Err(Error::validation("full_name must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(Error::validation("email is not valid"));
        }
        if self.phone_number.trim().is_empty() {
            return Err(Error::validation("phone_number must not be empty"));
        }
        Ok(())
    }
}

// Profile for smallholder farmers, one per farmer user
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FarmerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub farm_name: Option<String>,
    pub total_land_acres: Decimal,
    pub primary_crop: Option<String>,
    pub secondary_crops: Option<String>,
    pub county: String,
    pub village: Option<String>,
    pub gps_latitude: Option<Decimal>,
    pub gps_longitude: Option<Decimal>,
    pub has_smartphone: bool,
    pub preferred_language: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFarmerProfileRequest {
    pub user_id: Uuid,
    pub farm_name: Option<String>,
    pub total_land_acres: Option<Decimal>,
    pub primary_crop: Option<String>,
    pub secondary_crops: Option<String>,
    pub county: String,
    pub village: Option<String>,
    pub gps_latitude: Option<Decimal>,
    pub gps_longitude: Option<Decimal>,
    pub has_smartphone: Option<bool>,
    pub preferred_language: Option<String>,
}

impl CreateFarmerProfileRequest {
    pub fn validate(&self) -> Result<()> {
        if self.county.trim().is_empty() {
            return Err(Error::validation("county must not be empty"));
        }
        if let Some(acres) = self.total_land_acres {
            if acres < Decimal::ZERO {
                return Err(Error::validation("total_land_acres must not be negative"));
            }
        }
        Ok(())
    }
}

// Profile for equipment owners/operators, one per operator user
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_name: Option<String>,
    pub years_experience: i32,
    pub license_number: Option<String>,
    pub license_document_url: Option<String>,
    pub service_radius_km: i32,
    pub county: String,
    pub bank_account: Option<String>,
    pub mobile_money_number: Option<String>,
    pub average_rating: Decimal,
    pub total_jobs_completed: i32,
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateOperatorProfileRequest {
    pub user_id: Uuid,
    pub business_name: Option<String>,
    pub years_experience: Option<i32>,
    pub license_number: Option<String>,
    pub license_document_url: Option<String>,
    pub service_radius_km: Option<i32>,
    pub county: String,
    pub bank_account: Option<String>,
    pub mobile_money_number: Option<String>,
}

impl CreateOperatorProfileRequest {
    pub fn validate(&self) -> Result<()> {
        if self.county.trim().is_empty() {
            return Err(Error::validation("county must not be empty"));
        }
        if let Some(years) = self.years_experience {
            if years < 0 {
                return Err(Error::validation("years_experience must not be negative"));
            }
        }
        if let Some(radius) = self.service_radius_km {
            if radius <= 0 {
                return Err(Error::validation("service_radius_km must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_email() {
        let req = CreateUserRequest {
            full_name: "Wanjiku Kamau".to_string(),
            username: "wanjiku".to_string(),
            email: "not-an-email".to_string(),
            phone_number: "+254700111222".to_string(),
            password_hash: "x".to_string(),
            role: Role::Farmer,
            national_id: None,
            profile_photo_url: None,
        };
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn negative_land_size_is_rejected() {
        let req = CreateFarmerProfileRequest {
            user_id: Uuid::new_v4(),
            farm_name: None,
            total_land_acres: Some(Decimal::from(-2)),
            primary_crop: None,
            secondary_crops: None,
            county: "Bungoma".to_string(),
            village: None,
            gps_latitude: None,
            gps_longitude: None,
            has_smartphone: None,
            preferred_language: None,
        };
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }
}
