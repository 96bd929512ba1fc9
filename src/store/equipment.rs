use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{violates_constraint, Error, Result};
use crate::model::equipment::{
    CreateEquipmentRequest, Equipment, EquipmentCategory, EquipmentImage,
    EquipmentListResponse, EquipmentQuery, EquipmentStatus, ServiceArea,
    UpdateEquipmentRequest,
};
use crate::model::ops::{CreateMaintenanceLogRequest, MaintenanceLog};

const EQUIPMENT_COLS: &str = "id, owner_id, category_id, name, brand, model, \
     year_manufactured, serial_number, description, fuel_type, horsepower, \
     capacity_info, daily_rate, hourly_rate, price_includes_operator, \
     price_includes_fuel, current_county, gps_latitude, gps_longitude, status, \
     last_serviced, next_service_due, insurance_expiry, created_at, updated_at";

// ---------------------------------------------------------------------------
// Categories

pub async fn create_category(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    icon: Option<&str>,
) -> Result<EquipmentCategory> {
    if name.trim().is_empty() {
        return Err(Error::validation("category name must not be empty"));
    }
    sqlx::query_as::<_, EquipmentCategory>(
        "INSERT INTO equipment_categories (id, name, description, icon) \
         VALUES ($1, $2, $3, $4) RETURNING id, name, description, icon",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .bind(icon)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if violates_constraint(&e, "equipment_categories_name_key") {
            Error::conflict(format!("category '{}' already exists", name))
        } else {
            e.into()
        }
    })
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<EquipmentCategory>> {
    Ok(sqlx::query_as::<_, EquipmentCategory>(
        "SELECT id, name, description, icon FROM equipment_categories ORDER BY name",
    )
    .fetch_all(pool)
    .await?)
}

// ---------------------------------------------------------------------------
// Equipment

pub async fn create_equipment(
    pool: &PgPool,
    req: CreateEquipmentRequest,
    now: DateTime<Utc>,
) -> Result<Equipment> {
    req.validate()?;
    let owner_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM operator_profiles WHERE id = $1)")
            .bind(req.owner_id)
            .fetch_one(pool)
            .await?;
    if !owner_exists {
        return Err(Error::not_found("operator profile", req.owner_id));
    }
    let sql = format!(
        "INSERT INTO equipment (id, owner_id, category_id, name, brand, model, \
         year_manufactured, serial_number, description, fuel_type, horsepower, \
         capacity_info, daily_rate, hourly_rate, price_includes_operator, \
         price_includes_fuel, current_county, gps_latitude, gps_longitude, status, \
         last_serviced, next_service_due, insurance_expiry, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
         $16, $17, $18, $19, 'available', $20, $21, $22, $23, $23) \
         RETURNING {EQUIPMENT_COLS}"
    );
    let equipment = sqlx::query_as::<_, Equipment>(&sql)
        .bind(Uuid::new_v4())
        .bind(req.owner_id)
        .bind(req.category_id)
        .bind(&req.name)
        .bind(&req.brand)
        .bind(&req.model)
        .bind(req.year_manufactured)
        .bind(&req.serial_number)
        .bind(&req.description)
        .bind(req.fuel_type)
        .bind(req.horsepower)
        .bind(&req.capacity_info)
        .bind(req.daily_rate)
        .bind(req.hourly_rate)
        .bind(req.price_includes_operator.unwrap_or(true))
        .bind(req.price_includes_fuel.unwrap_or(false))
        .bind(&req.current_county)
        .bind(req.gps_latitude)
        .bind(req.gps_longitude)
        .bind(req.last_serviced)
        .bind(req.next_service_due)
        .bind(req.insurance_expiry)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "equipment_serial_number_key") {
                Error::conflict("serial_number already registered")
            } else if violates_constraint(&e, "equipment_category_id_fkey") {
                Error::not_found("equipment category", req.category_id)
            } else {
                e.into()
            }
        })?;
    tracing::info!(equipment_id = %equipment.id, owner_id = %equipment.owner_id, "equipment listed");
    Ok(equipment)
}

pub async fn get_equipment(pool: &PgPool, id: Uuid) -> Result<Equipment> {
    let sql = format!("SELECT {EQUIPMENT_COLS} FROM equipment WHERE id = $1");
    sqlx::query_as::<_, Equipment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::not_found("equipment", id))
}

/// List units with pagination and filters. Filters compose into the WHERE
/// clause the same way the search screens combine them.
pub async fn list_equipment(
    pool: &PgPool,
    params: &EquipmentQuery,
) -> Result<EquipmentListResponse> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    // Build base query
    let mut where_clauses = Vec::new();
    let mut param_count = 1;

    if params.category_id.is_some() {
        where_clauses.push(format!("category_id = ${}", param_count));
        param_count += 1;
    }
    if params.county.is_some() {
        where_clauses.push(format!("current_county = ${}", param_count));
        param_count += 1;
    }
    if params.available_only.unwrap_or(false) {
        where_clauses.push("status = 'available'".to_string());
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM equipment {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(category_id) = params.category_id {
        count_query = count_query.bind(category_id);
    }
    if let Some(county) = &params.county {
        count_query = count_query.bind(county);
    }
    let total = count_query.fetch_one(pool).await?;

    let fetch_sql = format!(
        "SELECT {} FROM equipment {} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
        EQUIPMENT_COLS,
        where_clause,
        param_count,
        param_count + 1
    );
    let mut fetch_query = sqlx::query_as::<_, Equipment>(&fetch_sql);
    if let Some(category_id) = params.category_id {
        fetch_query = fetch_query.bind(category_id);
    }
    if let Some(county) = &params.county {
        fetch_query = fetch_query.bind(county);
    }
    let equipment = fetch_query
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(pool)
        .await?;

    Ok(EquipmentListResponse {
        equipment,
        total,
        page,
        limit,
    })
}

pub async fn update_equipment(
    pool: &PgPool,
    id: Uuid,
    req: UpdateEquipmentRequest,
    now: DateTime<Utc>,
) -> Result<Equipment> {
    req.validate()?;
    let current = get_equipment(pool, id).await?;
    let sql = format!(
        "UPDATE equipment SET name = $1, brand = $2, model = $3, description = $4, \
         daily_rate = $5, hourly_rate = $6, price_includes_operator = $7, \
         price_includes_fuel = $8, current_county = $9, gps_latitude = $10, \
         gps_longitude = $11, last_serviced = $12, next_service_due = $13, \
         insurance_expiry = $14, updated_at = $15 WHERE id = $16 \
         RETURNING {EQUIPMENT_COLS}"
    );
    Ok(sqlx::query_as::<_, Equipment>(&sql)
        .bind(req.name.as_deref().unwrap_or(&current.name))
        .bind(req.brand.as_deref().or(current.brand.as_deref()))
        .bind(req.model.as_deref().or(current.model.as_deref()))
        .bind(req.description.as_deref().or(current.description.as_deref()))
        .bind(req.daily_rate.unwrap_or(current.daily_rate))
        .bind(req.hourly_rate.or(current.hourly_rate))
        .bind(
            req.price_includes_operator
                .unwrap_or(current.price_includes_operator),
        )
        .bind(req.price_includes_fuel.unwrap_or(current.price_includes_fuel))
        .bind(
            req.current_county
                .as_deref()
                .unwrap_or(&current.current_county),
        )
        .bind(req.gps_latitude.or(current.gps_latitude))
        .bind(req.gps_longitude.or(current.gps_longitude))
        .bind(req.last_serviced.or(current.last_serviced))
        .bind(req.next_service_due.or(current.next_service_due))
        .bind(req.insurance_expiry.or(current.insurance_expiry))
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await?)
}

/// Manual status change by the owner (maintenance, inactive, back to
/// available). The booking lifecycle owns `rented`; live bookings block any
/// manual move.
pub async fn set_equipment_status(
    pool: &PgPool,
    id: Uuid,
    status: EquipmentStatus,
    now: DateTime<Utc>,
) -> Result<Equipment> {
    let mut tx = pool.begin().await?;
    let sql = format!("SELECT {EQUIPMENT_COLS} FROM equipment WHERE id = $1 FOR UPDATE");
    let equipment = sqlx::query_as::<_, Equipment>(&sql)
        .bind(id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::not_found("equipment", id))?;

    let blocking = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM rental_bookings WHERE equipment_id = $1 \
         AND status IN ('confirmed', 'in_progress')",
    )
    .bind(id)
    .fetch_one(&mut tx)
    .await?;
    equipment.check_manual_status_change(status, blocking > 0)?;

    let sql = format!(
        "UPDATE equipment SET status = $1, updated_at = $2 WHERE id = $3 \
         RETURNING {EQUIPMENT_COLS}"
    );
    let updated = sqlx::query_as::<_, Equipment>(&sql)
        .bind(status)
        .bind(now)
        .bind(id)
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;
    tracing::info!(equipment_id = %id, status = %status, "equipment status changed");
    Ok(updated)
}

// ---------------------------------------------------------------------------
// Images

pub async fn add_image(
    pool: &PgPool,
    equipment_id: Uuid,
    image_url: &str,
    caption: Option<&str>,
    is_primary: bool,
    now: DateTime<Utc>,
) -> Result<EquipmentImage> {
    if image_url.trim().is_empty() {
        return Err(Error::validation("image_url must not be empty"));
    }
    let mut tx = pool.begin().await?;
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM equipment WHERE id = $1)")
        .bind(equipment_id)
        .fetch_one(&mut tx)
        .await?;
    if !exists {
        return Err(Error::not_found("equipment", equipment_id));
    }
    if is_primary {
        // only one primary per unit
        sqlx::query("UPDATE equipment_images SET is_primary = false WHERE equipment_id = $1")
            .bind(equipment_id)
            .execute(&mut tx)
            .await?;
    }
    let image = sqlx::query_as::<_, EquipmentImage>(
        "INSERT INTO equipment_images (id, equipment_id, image_url, caption, is_primary, uploaded_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, equipment_id, image_url, caption, is_primary, uploaded_at",
    )
    .bind(Uuid::new_v4())
    .bind(equipment_id)
    .bind(image_url)
    .bind(caption)
    .bind(is_primary)
    .bind(now)
    .fetch_one(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(image)
}

pub async fn list_images(pool: &PgPool, equipment_id: Uuid) -> Result<Vec<EquipmentImage>> {
    Ok(sqlx::query_as::<_, EquipmentImage>(
        "SELECT id, equipment_id, image_url, caption, is_primary, uploaded_at \
         FROM equipment_images WHERE equipment_id = $1 \
         ORDER BY is_primary DESC, uploaded_at ASC",
    )
    .bind(equipment_id)
    .fetch_all(pool)
    .await?)
}

// ---------------------------------------------------------------------------
// Service areas

pub async fn add_service_area(
    pool: &PgPool,
    operator_id: Uuid,
    county: &str,
    additional_charge: Decimal,
) -> Result<ServiceArea> {
    if county.trim().is_empty() {
        return Err(Error::validation("county must not be empty"));
    }
    if additional_charge < Decimal::ZERO {
        return Err(Error::validation("additional_charge must not be negative"));
    }
    sqlx::query_as::<_, ServiceArea>(
        "INSERT INTO service_areas (id, operator_id, county, additional_charge) \
         VALUES ($1, $2, $3, $4) RETURNING id, operator_id, county, additional_charge",
    )
    .bind(Uuid::new_v4())
    .bind(operator_id)
    .bind(county)
    .bind(additional_charge)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if violates_constraint(&e, "service_areas_operator_id_county_key") {
            Error::conflict(format!("operator already serves {}", county))
        } else {
            e.into()
        }
    })
}

pub async fn list_service_areas(pool: &PgPool, operator_id: Uuid) -> Result<Vec<ServiceArea>> {
    Ok(sqlx::query_as::<_, ServiceArea>(
        "SELECT id, operator_id, county, additional_charge \
         FROM service_areas WHERE operator_id = $1 ORDER BY county",
    )
    .bind(operator_id)
    .fetch_all(pool)
    .await?)
}

// ---------------------------------------------------------------------------
// Maintenance

/// Record a service visit. Optionally takes the unit out of service and
/// writes the next-due date through to the equipment row.
pub async fn create_maintenance_log(
    pool: &PgPool,
    req: CreateMaintenanceLogRequest,
    now: DateTime<Utc>,
) -> Result<MaintenanceLog> {
    req.validate()?;
    let mut tx = pool.begin().await?;
    let sql = format!("SELECT {EQUIPMENT_COLS} FROM equipment WHERE id = $1 FOR UPDATE");
    let equipment = sqlx::query_as::<_, Equipment>(&sql)
        .bind(req.equipment_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(Error::not_found("equipment", req.equipment_id))?;

    if req.take_out_of_service.unwrap_or(false) {
        let blocking = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM rental_bookings WHERE equipment_id = $1 \
             AND status IN ('confirmed', 'in_progress')",
        )
        .bind(req.equipment_id)
        .fetch_one(&mut tx)
        .await?;
        equipment.check_manual_status_change(EquipmentStatus::Maintenance, blocking > 0)?;
        sqlx::query("UPDATE equipment SET status = 'maintenance', updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(req.equipment_id)
            .execute(&mut tx)
            .await?;
    }

    sqlx::query(
        "UPDATE equipment SET last_serviced = $1, next_service_due = $2, updated_at = $3 \
         WHERE id = $4",
    )
    .bind(req.service_date)
    .bind(req.next_service_date)
    .bind(now)
    .bind(req.equipment_id)
    .execute(&mut tx)
    .await?;

    let log = sqlx::query_as::<_, MaintenanceLog>(
        "INSERT INTO maintenance_logs (id, equipment_id, service_date, service_type, \
         description, cost, performed_by, next_service_date, attachment_url, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING id, equipment_id, service_date, service_type, description, cost, \
         performed_by, next_service_date, attachment_url, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(req.equipment_id)
    .bind(req.service_date)
    .bind(&req.service_type)
    .bind(&req.description)
    .bind(req.cost.unwrap_or(Decimal::ZERO))
    .bind(&req.performed_by)
    .bind(req.next_service_date)
    .bind(&req.attachment_url)
    .bind(now)
    .fetch_one(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(log)
}

pub async fn list_maintenance_logs(
    pool: &PgPool,
    equipment_id: Uuid,
) -> Result<Vec<MaintenanceLog>> {
    Ok(sqlx::query_as::<_, MaintenanceLog>(
        "SELECT id, equipment_id, service_date, service_type, description, cost, \
         performed_by, next_service_date, attachment_url, created_at \
         FROM maintenance_logs WHERE equipment_id = $1 ORDER BY service_date DESC",
    )
    .bind(equipment_id)
    .fetch_all(pool)
    .await?)
}
