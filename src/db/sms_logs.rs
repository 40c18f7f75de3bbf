use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::sms::{DeliveryStatus, LogQuery, SendLogEntry};

// key: sms-logs-db -> append-only audit trail
pub async fn insert<'c, E>(executor: E, entry: &SendLogEntry) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO sms_logs (
            id,
            client_id,
            recipient,
            message,
            sender_id,
            priority,
            status,
            provider_status,
            provider_message,
            error,
            ip_address,
            user_agent,
            created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id)
    .bind(entry.client_id)
    .bind(&entry.recipient)
    .bind(&entry.message)
    .bind(&entry.sender_id)
    .bind(&entry.priority)
    .bind(entry.status.as_str())
    .bind(&entry.provider_status)
    .bind(&entry.provider_message)
    .bind(entry.error.as_deref())
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_for_client<'c, E>(
    executor: E,
    client_id: Uuid,
    query: &LogQuery,
) -> Result<Vec<SendLogEntry>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, SendLogRow>(
        r#"
        SELECT * FROM sms_logs
        WHERE client_id = $1
          AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(client_id)
    .bind(query.status.map(|status| status.as_str()))
    .bind(query.limit)
    .bind(query.offset)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(SendLogEntry::from).collect())
}

#[derive(sqlx::FromRow)]
struct SendLogRow {
    id: Uuid,
    client_id: Uuid,
    recipient: String,
    message: String,
    sender_id: String,
    priority: String,
    status: String,
    provider_status: String,
    provider_message: String,
    error: Option<String>,
    ip_address: String,
    user_agent: String,
    created_at: DateTime<Utc>,
}

impl From<SendLogRow> for SendLogEntry {
    fn from(row: SendLogRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            recipient: row.recipient,
            message: row.message,
            sender_id: row.sender_id,
            priority: row.priority,
            status: DeliveryStatus::from_column(&row.status),
            provider_status: row.provider_status,
            provider_message: row.provider_message,
            error: row.error,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}
