// Migration Runner

use sqlx::SqlitePool;
use tracing::info;

/// (version, label, script), applied in ascending order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "tickets table",
    include_str!("../migrations/001_tickets.sql"),
)];

/// Bring the schema up to the latest version
///
/// Each pending script runs in its own transaction together with its
/// `schema_version` row, so a crash mid-migration leaves the previous
/// version in place.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY NOT NULL,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await?;
    info!(schema_version = current, "Checking database migrations");

    for &(version, label, script) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        info!(version = version, "Applying migration: {}", label);

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(script).execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO schema_version (version, applied_at)
             VALUES (?, CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
        )
        .bind(version)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}
