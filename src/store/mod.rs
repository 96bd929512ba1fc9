//! Postgres persistence. One module per entity family, mirroring the data
//! model; every write takes its timestamps from the caller.

use dotenv::dotenv;
use sqlx::PgPool;

use crate::error::{Error, Result};

pub mod bookings;
pub mod equipment;
pub mod ops;
pub mod payments;
pub mod users;

/// Connect to PostgreSQL using `DATABASE_URL` (a `.env` file is honoured).
pub async fn connect() -> Result<PgPool> {
    dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| Error::Config("DATABASE_URL must be set".to_string()))?;
    let pool = PgPool::connect(&database_url).await?;
    tracing::info!("connected to Postgres");
    Ok(pool)
}

/// Run the bundled migrations against the pool.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
    Ok(())
}
