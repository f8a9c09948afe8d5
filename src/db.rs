//! Database module
//!
//! Database connection and schema verification utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Tables the ledger reads and writes
const REQUIRED_TABLES: [&str; 5] = [
    "account_types",
    "accounts",
    "transactions",
    "profit_pools",
    "profit_sharing",
];

/// Open the connection pool
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Verify database connectivity.
///
/// The schema itself lives in raw SQL files under `migrations/`.
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables and the account number sequence exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    let sequence_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.sequences
            WHERE sequence_schema = 'public' AND sequence_name = 'account_number_seq'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !sequence_exists {
        tracing::error!("Required sequence 'account_number_seq' does not exist");
        return Ok(false);
    }

    tracing::info!("Ledger schema verified");
    Ok(true)
}
