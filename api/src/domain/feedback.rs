//! Feedback domain - DB queries for ingested reviews

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Postgres};

use crate::models::{Attachment, FeedbackItem, FeedbackKey, FeedbackStatus, NewFeedbackItem};
use crate::store::StoreError;

const FEEDBACK_COLUMNS: &str = r#"
    id, external_id, tenant_id, account_id, rating, author_name, body_text, pros_text,
    cons_text, attachments, brand_name, product_id, product_name, status, draft_text,
    published_text, is_edited, created_at, fetched_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct FeedbackRow {
    id: i64,
    external_id: String,
    tenant_id: i64,
    account_id: i64,
    rating: i32,
    author_name: String,
    body_text: String,
    pros_text: String,
    cons_text: String,
    attachments: Json<Vec<Attachment>>,
    brand_name: Option<String>,
    product_id: Option<String>,
    product_name: Option<String>,
    status: String,
    draft_text: Option<String>,
    published_text: Option<String>,
    is_edited: bool,
    created_at: DateTime<Utc>,
    fetched_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FeedbackRow> for FeedbackItem {
    type Error = StoreError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        let status = FeedbackStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("feedback {} has status '{}'", row.id, row.status))
        })?;

        Ok(FeedbackItem {
            id: row.id,
            external_id: row.external_id,
            tenant_id: row.tenant_id,
            account_id: row.account_id,
            rating: row.rating,
            author_name: row.author_name,
            body_text: row.body_text,
            pros_text: row.pros_text,
            cons_text: row.cons_text,
            attachments: row.attachments.0,
            brand_name: row.brand_name,
            product_id: row.product_id,
            product_name: row.product_name,
            status,
            draft_text: row.draft_text,
            published_text: row.published_text,
            is_edited: row.is_edited,
            created_at: row.created_at,
            fetched_at: row.fetched_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_items(rows: Vec<FeedbackRow>) -> Result<Vec<FeedbackItem>, StoreError> {
    rows.into_iter().map(FeedbackItem::try_from).collect()
}

pub async fn feedback_exists<'e, E>(executor: E, key: &FeedbackKey) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM feedback_items
            WHERE external_id = $1 AND tenant_id = $2 AND account_id = $3
        )
        "#,
    )
    .bind(&key.external_id)
    .bind(key.tenant_id)
    .bind(key.account_id)
    .fetch_one(executor)
    .await
}

/// Insert a new item. The unique dedup index turns a concurrent duplicate into `None`.
pub async fn insert_feedback<'e, E>(
    executor: E,
    item: &NewFeedbackItem,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO feedback_items (
            external_id, tenant_id, account_id, rating, author_name, body_text, pros_text,
            cons_text, attachments, brand_name, product_id, product_name, status, draft_text,
            published_text, is_edited, created_at, fetched_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, FALSE, $16, $17, NOW())
        ON CONFLICT (external_id, tenant_id, account_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&item.external_id)
    .bind(item.tenant_id)
    .bind(item.account_id)
    .bind(item.rating)
    .bind(&item.author_name)
    .bind(&item.body_text)
    .bind(&item.pros_text)
    .bind(&item.cons_text)
    .bind(Json(&item.attachments))
    .bind(&item.brand_name)
    .bind(&item.product_id)
    .bind(&item.product_name)
    .bind(item.status.as_str())
    .bind(&item.draft_text)
    .bind(&item.published_text)
    .bind(item.created_at)
    .bind(item.fetched_at)
    .fetch_optional(executor)
    .await
}

pub async fn get_feedback<'e, E>(
    executor: E,
    tenant_id: i64,
    id: i64,
) -> Result<Option<FeedbackItem>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {} FROM feedback_items WHERE id = $1 AND tenant_id = $2",
        FEEDBACK_COLUMNS
    );

    let row: Option<FeedbackRow> = sqlx::query_as(&query)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

    row.map(FeedbackItem::try_from).transpose()
}

pub async fn list_feedback<'e, E>(
    executor: E,
    tenant_id: i64,
    status: Option<FeedbackStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<FeedbackItem>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        SELECT {}
        FROM feedback_items
        WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
        FEEDBACK_COLUMNS
    );

    let rows: Vec<FeedbackRow> = sqlx::query_as(&query)
        .bind(tenant_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await?;

    into_items(rows)
}

/// Pending items with a draft. Served by the partial index `feedback_items_retry_idx`.
pub async fn list_retry_candidates<'e, E>(
    executor: E,
    tenant_id: i64,
) -> Result<Vec<FeedbackItem>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        SELECT {}
        FROM feedback_items
        WHERE tenant_id = $1 AND status = 'pending' AND draft_text IS NOT NULL
        ORDER BY created_at ASC, id ASC
        "#,
        FEEDBACK_COLUMNS
    );

    let rows: Vec<FeedbackRow> = sqlx::query_as(&query)
        .bind(tenant_id)
        .fetch_all(executor)
        .await?;

    into_items(rows)
}

pub async fn mark_published<'e, E>(
    executor: E,
    id: i64,
    status: FeedbackStatus,
    text: &str,
    is_edited: bool,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE feedback_items
        SET status = $2, published_text = $3, draft_text = $3,
            is_edited = is_edited OR $4, publish_claimed_until = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(text)
    .bind(is_edited)
    .execute(executor)
    .await?;
    Ok(())
}

/// Takes the publish lease when the item is in one of `allowed` and no other
/// publisher holds an unexpired lease. Returns false otherwise.
pub async fn claim_for_publish<'e, E>(
    executor: E,
    id: i64,
    allowed: &[FeedbackStatus],
    until: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let allowed: Vec<&str> = allowed.iter().map(FeedbackStatus::as_str).collect();
    let result = sqlx::query(
        r#"
        UPDATE feedback_items
        SET publish_claimed_until = $3
        WHERE id = $1 AND status = ANY($2)
          AND (publish_claimed_until IS NULL OR publish_claimed_until < NOW())
        "#,
    )
    .bind(id)
    .bind(allowed)
    .bind(until)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn release_claim<'e, E>(executor: E, id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE feedback_items SET publish_claimed_until = NULL WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn mark_answered_externally<'e, E>(
    executor: E,
    key: &FeedbackKey,
    answer: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE feedback_items
        SET status = 'answered_externally', published_text = COALESCE($4, published_text),
            updated_at = NOW()
        WHERE external_id = $1 AND tenant_id = $2 AND account_id = $3 AND status = 'pending'
        "#,
    )
    .bind(&key.external_id)
    .bind(key.tenant_id)
    .bind(key.account_id)
    .bind(answer)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn archive_stale<'e, E>(executor: E, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE feedback_items
        SET status = 'archived', updated_at = NOW()
        WHERE status IN ('auto', 'sent') AND updated_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
