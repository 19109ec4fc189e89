//! Durable handshake state with expiry (e.g. an account awaiting its credential)

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Postgres};

pub async fn put_state<'e, E>(
    executor: E,
    scope: &str,
    state: &str,
    payload: serde_json::Value,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO pending_states (scope, state, payload, expires_at, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (scope, state)
        DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at, created_at = NOW()
        "#,
    )
    .bind(scope)
    .bind(state)
    .bind(Json(payload))
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Delete-and-return in one statement, so two callers can never both consume a record
pub async fn take_state<'e, E>(
    executor: E,
    scope: &str,
    state: &str,
    now: DateTime<Utc>,
) -> Result<Option<serde_json::Value>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(Json<serde_json::Value>,)> = sqlx::query_as(
        r#"
        DELETE FROM pending_states
        WHERE scope = $1 AND state = $2 AND expires_at > $3
        RETURNING payload
        "#,
    )
    .bind(scope)
    .bind(state)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(payload,)| payload.0))
}

pub async fn purge_expired<'e, E>(executor: E, now: DateTime<Utc>) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM pending_states WHERE expires_at <= $1")
        .bind(now)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}
