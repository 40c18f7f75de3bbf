use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::clients::{Client, UpdateClient};

pub const EMAIL_UNIQUE_INDEX: &str = "api_clients_email_active_key";

// key: api-clients-db -> credential store
pub async fn find_by_api_key<'c, E>(executor: E, api_key: &str) -> Result<Option<Client>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Client>(
        "SELECT * FROM api_clients WHERE api_key = $1 AND deleted_at IS NULL",
    )
    .bind(api_key)
    .fetch_optional(executor)
    .await
}

pub async fn find_by_id<'c, E>(executor: E, id: Uuid) -> Result<Option<Client>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Client>("SELECT * FROM api_clients WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn email_in_use<'c, E>(executor: E, email: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM api_clients WHERE lower(email) = lower($1) AND deleted_at IS NULL)",
    )
    .bind(email)
    .fetch_one(executor)
    .await
}

pub async fn insert<'c, E>(executor: E, client: &Client) -> Result<Client, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Client>(
        r#"
        INSERT INTO api_clients (
            id,
            name,
            email,
            api_key,
            api_secret_hash,
            is_active,
            rate_limit,
            daily_limit,
            monthly_limit,
            daily_usage,
            monthly_usage,
            last_reset,
            daily_reset_at,
            monthly_reset_at,
            created_at,
            updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING *
        "#,
    )
    .bind(client.id)
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.api_key)
    .bind(&client.api_secret_hash)
    .bind(client.is_active)
    .bind(client.rate_limit)
    .bind(client.daily_limit)
    .bind(client.monthly_limit)
    .bind(client.daily_usage)
    .bind(client.monthly_usage)
    .bind(client.last_reset)
    .bind(client.daily_reset_at)
    .bind(client.monthly_reset_at)
    .bind(client.created_at)
    .bind(client.updated_at)
    .fetch_one(executor)
    .await
}

pub async fn list<'c, E>(executor: E, is_active: Option<bool>) -> Result<Vec<Client>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Client>(
        r#"
        SELECT * FROM api_clients
        WHERE deleted_at IS NULL
          AND ($1::BOOLEAN IS NULL OR is_active = $1)
        ORDER BY created_at DESC
        "#,
    )
    .bind(is_active)
    .fetch_all(executor)
    .await
}

pub async fn update<'c, E>(
    executor: E,
    id: Uuid,
    changes: &UpdateClient,
) -> Result<Option<Client>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Client>(
        r#"
        UPDATE api_clients
        SET
            name = COALESCE($2, name),
            is_active = COALESCE($3, is_active),
            rate_limit = COALESCE($4, rate_limit),
            daily_limit = COALESCE($5, daily_limit),
            monthly_limit = COALESCE($6, monthly_limit),
            updated_at = NOW()
        WHERE id = $1
          AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(changes.name.as_deref())
    .bind(changes.is_active)
    .bind(changes.rate_limit)
    .bind(changes.daily_limit)
    .bind(changes.monthly_limit)
    .fetch_optional(executor)
    .await
}

/// Adds `delta` to both counters in one statement so concurrent sends never lose writes.
pub async fn increment_usage<'c, E>(executor: E, id: Uuid, delta: i32) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE api_clients
        SET
            daily_usage = daily_usage + $2,
            monthly_usage = monthly_usage + $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(delta)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn reset_usage<'c, E>(
    executor: E,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Client>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as::<_, Client>(
        r#"
        UPDATE api_clients
        SET
            daily_usage = 0,
            monthly_usage = 0,
            last_reset = $2,
            daily_reset_at = $2,
            monthly_reset_at = $2,
            updated_at = $2
        WHERE id = $1
          AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub async fn reset_daily_usage<'c, E>(
    executor: E,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE api_clients
        SET
            daily_usage = 0,
            daily_reset_at = $2,
            last_reset = $2,
            updated_at = $2
        WHERE deleted_at IS NULL
          AND daily_reset_at < $1
        "#,
    )
    .bind(window_start)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn reset_monthly_usage<'c, E>(
    executor: E,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE api_clients
        SET
            monthly_usage = 0,
            monthly_reset_at = $2,
            last_reset = $2,
            updated_at = $2
        WHERE deleted_at IS NULL
          AND monthly_reset_at < $1
        "#,
    )
    .bind(window_start)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn soft_delete<'c, E>(executor: E, id: Uuid, now: DateTime<Utc>) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE api_clients
        SET
            deleted_at = $2,
            is_active = FALSE,
            updated_at = $2
        WHERE id = $1
          AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
