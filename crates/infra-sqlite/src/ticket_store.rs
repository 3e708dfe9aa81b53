// SQLite TicketStore Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;
use waitlist_core::domain::{StatusUpdate, Ticket, TicketId, TicketStatus};
use waitlist_core::error::{AppError, Result};
use waitlist_core::port::TicketStore;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => {
                        // UNIQUE / PRIMARY KEY constraint failed
                        AppError::Internal(format!(
                            "Unique constraint violation: {} ({})",
                            db_err.message(),
                            code_str
                        ))
                    }
                    "275" => {
                        // CHECK constraint failed
                        AppError::Internal(format!(
                            "Check constraint violation: {}",
                            db_err.message()
                        ))
                    }
                    "5" => AppError::StoreUnavailable(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => {
                        AppError::StoreUnavailable(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::StoreUnavailable(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::StoreUnavailable(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Internal(format!("Column not found: {}", col))
        }
        // Connection, pool, io errors
        _ => AppError::StoreUnavailable(err.to_string()),
    }
}

pub struct SqliteTicketStore {
    pool: SqlitePool,
}

impl SqliteTicketStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for SqliteTicketStore {
    async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
        let seq = i64::try_from(ticket.seq)
            .map_err(|_| AppError::Internal(format!("seq {} out of range", ticket.seq)))?;

        sqlx::query(
            r#"
            INSERT INTO tickets (
                uuid, resource, scope, id, status,
                created_at, seq, expires_at, updated_at, activated_at,
                action, extra
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ticket.uuid)
        .bind(&ticket.resource)
        .bind(&ticket.scope)
        .bind(&ticket.id)
        .bind(ticket.status.as_str())
        .bind(ticket.created_at)
        .bind(seq)
        .bind(ticket.expires_at)
        .bind(ticket.updated_at)
        .bind(ticket.activated_at)
        .bind(&ticket.action)
        .bind(ticket.extra.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_status(&self, update: &StatusUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET status = ?, activated_at = ?, updated_at = ?
            WHERE uuid = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.activated_at)
        .bind(update.updated_at)
        .bind(&update.uuid)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Ticket {} not found", update.uuid)));
        }
        Ok(())
    }

    async fn find_by_id(&self, uuid: &TicketId) -> Result<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>("SELECT * FROM tickets WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TicketRow::into_ticket).transpose()
    }

    async fn list_by_resource(&self, resource: &str) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            r#"
            SELECT * FROM tickets
            WHERE resource = ?
            ORDER BY created_at ASC, seq ASC, uuid ASC
            "#,
        )
        .bind(resource)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn list_live(&self) -> Result<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            r#"
            SELECT * FROM tickets
            WHERE status IN ('queued', 'active')
            ORDER BY created_at ASC, seq ASC, uuid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn delete_all(&self, resource: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tickets WHERE resource = ?")
            .bind(resource)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(resource = %resource, rows = result.rows_affected(), "Deleted ticket rows");
        Ok(result.rows_affected())
    }

    async fn purge_terminal(&self, before_millis: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tickets
            WHERE status IN ('expired', 'finished', 'deleted')
              AND updated_at < ?
            "#,
        )
        .bind(before_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    uuid: String,
    resource: String,
    scope: String,
    id: String,
    status: String,
    created_at: i64,
    seq: i64,
    expires_at: i64,
    updated_at: i64,
    activated_at: Option<i64>,
    action: Option<String>,
    extra: String,
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket> {
        let status: TicketStatus = self.status.parse()?;
        let extra = serde_json::from_str(&self.extra).unwrap_or(serde_json::Value::Null);
        let seq = u64::try_from(self.seq)
            .map_err(|_| AppError::Internal(format!("negative seq on ticket {}", self.uuid)))?;

        Ok(Ticket {
            uuid: self.uuid,
            resource: self.resource,
            scope: self.scope,
            id: self.id,
            status,
            created_at: self.created_at,
            seq,
            expires_at: self.expires_at,
            updated_at: self.updated_at,
            activated_at: self.activated_at,
            action: self.action,
            extra,
        })
    }
}
