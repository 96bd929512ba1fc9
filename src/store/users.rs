use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{violates_constraint, Error, Result};
use crate::model::user::{
    CreateFarmerProfileRequest, CreateOperatorProfileRequest, CreateUserRequest,
    FarmerProfile, OperatorProfile, Role, User,
};

const USER_COLS: &str = "id, full_name, username, email, phone_number, password_hash, \
     role, national_id, id_verified, profile_photo_url, created_at, updated_at";

const FARMER_COLS: &str = "id, user_id, farm_name, total_land_acres, primary_crop, \
     secondary_crops, county, village, gps_latitude, gps_longitude, has_smartphone, \
     preferred_language";

const OPERATOR_COLS: &str = "id, user_id, business_name, years_experience, \
     license_number, license_document_url, service_radius_km, county, bank_account, \
     mobile_money_number, average_rating, total_jobs_completed, is_available";

pub async fn create_user(
    pool: &PgPool,
    req: CreateUserRequest,
    now: DateTime<Utc>,
) -> Result<User> {
    req.validate()?;
    let id = Uuid::new_v4();
    let sql = format!(
        "INSERT INTO users (id, full_name, username, email, phone_number, password_hash, \
         role, national_id, id_verified, profile_photo_url, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, $9, $10, $10) \
         RETURNING {USER_COLS}"
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .bind(&req.full_name)
        .bind(&req.username)
        .bind(&req.email)
        .bind(&req.phone_number)
        .bind(&req.password_hash)
        .bind(req.role)
        .bind(&req.national_id)
        .bind(&req.profile_photo_url)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "users_username_key")
                || violates_constraint(&e, "users_email_key")
            {
                Error::conflict("username or email already taken")
            } else {
                e.into()
            }
        })?;
    tracing::info!(user_id = %user.id, role = %user.role, "user created");
    Ok(user)
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<User> {
    let sql = format!("SELECT {USER_COLS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("user", id))
}

pub async fn get_user_by_username(pool: &PgPool, username: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLS} FROM users WHERE username = $1");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?)
}

pub async fn set_id_verified(
    pool: &PgPool,
    user_id: Uuid,
    verified: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let done = sqlx::query("UPDATE users SET id_verified = $1, updated_at = $2 WHERE id = $3")
        .bind(verified)
        .bind(now)
        .bind(user_id)
        .execute(pool)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::not_found("user", user_id));
    }
    Ok(())
}

pub async fn create_farmer_profile(
    pool: &PgPool,
    req: CreateFarmerProfileRequest,
) -> Result<FarmerProfile> {
    req.validate()?;
    let user = get_user(pool, req.user_id).await?;
    if user.role != Role::Farmer {
        return Err(Error::validation(format!(
            "user {} has role {}, expected farmer",
            user.id, user.role
        )));
    }
    let sql = format!(
        "INSERT INTO farmer_profiles (id, user_id, farm_name, total_land_acres, \
         primary_crop, secondary_crops, county, village, gps_latitude, gps_longitude, \
         has_smartphone, preferred_language) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {FARMER_COLS}"
    );
    sqlx::query_as::<_, FarmerProfile>(&sql)
        .bind(Uuid::new_v4())
        .bind(req.user_id)
        .bind(&req.farm_name)
        .bind(req.total_land_acres.unwrap_or(Decimal::ZERO))
        .bind(&req.primary_crop)
        .bind(&req.secondary_crops)
        .bind(&req.county)
        .bind(&req.village)
        .bind(req.gps_latitude)
        .bind(req.gps_longitude)
        .bind(req.has_smartphone.unwrap_or(true))
        .bind(req.preferred_language.as_deref().unwrap_or("English"))
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "farmer_profiles_user_id_key") {
                Error::conflict(format!("user {} already has a farmer profile", req.user_id))
            } else {
                e.into()
            }
        })
}

pub async fn get_farmer_profile(pool: &PgPool, id: Uuid) -> Result<FarmerProfile> {
    let sql = format!("SELECT {FARMER_COLS} FROM farmer_profiles WHERE id = $1");
    sqlx::query_as::<_, FarmerProfile>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("farmer profile", id))
}

pub async fn get_farmer_profile_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<FarmerProfile>> {
    let sql = format!("SELECT {FARMER_COLS} FROM farmer_profiles WHERE user_id = $1");
    Ok(sqlx::query_as::<_, FarmerProfile>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn create_operator_profile(
    pool: &PgPool,
    req: CreateOperatorProfileRequest,
) -> Result<OperatorProfile> {
    req.validate()?;
    let user = get_user(pool, req.user_id).await?;
    if user.role != Role::Operator {
        return Err(Error::validation(format!(
            "user {} has role {}, expected operator",
            user.id, user.role
        )));
    }
    let sql = format!(
        "INSERT INTO operator_profiles (id, user_id, business_name, years_experience, \
         license_number, license_document_url, service_radius_km, county, bank_account, \
         mobile_money_number, average_rating, total_jobs_completed, is_available) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0.00, 0, true) \
         RETURNING {OPERATOR_COLS}"
    );
    sqlx::query_as::<_, OperatorProfile>(&sql)
        .bind(Uuid::new_v4())
        .bind(req.user_id)
        .bind(&req.business_name)
        .bind(req.years_experience.unwrap_or(0))
        .bind(&req.license_number)
        .bind(&req.license_document_url)
        .bind(req.service_radius_km.unwrap_or(50))
        .bind(&req.county)
        .bind(&req.bank_account)
        .bind(&req.mobile_money_number)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "operator_profiles_user_id_key") {
                Error::conflict(format!(
                    "user {} already has an operator profile",
                    req.user_id
                ))
            } else {
                e.into()
            }
        })
}

pub async fn get_operator_profile(pool: &PgPool, id: Uuid) -> Result<OperatorProfile> {
    let sql = format!("SELECT {OPERATOR_COLS} FROM operator_profiles WHERE id = $1");
    sqlx::query_as::<_, OperatorProfile>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("operator profile", id))
}

pub async fn get_operator_profile_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<OperatorProfile>> {
    let sql = format!("SELECT {OPERATOR_COLS} FROM operator_profiles WHERE user_id = $1");
    Ok(sqlx::query_as::<_, OperatorProfile>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn set_operator_availability(
    pool: &PgPool,
    operator_id: Uuid,
    is_available: bool,
) -> Result<()> {
    let done = sqlx::query("UPDATE operator_profiles SET is_available = $1 WHERE id = $2")
        .bind(is_available)
        .bind(operator_id)
        .execute(pool)
        .await?;
    if done.rows_affected() == 0 {
        return Err(Error::not_found("operator profile", operator_id));
    }
    Ok(())
}
