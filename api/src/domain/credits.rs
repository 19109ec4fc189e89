//! Credit ledger - balance row plus append-only transaction log

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};

use crate::models::{CreditTransaction, LedgerEntry, TransactionKind};
use crate::store::StoreError;

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    tenant_id: i64,
    amount: i64,
    kind: String,
    description: String,
    feedback_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = TransactionKind::parse(&row.kind).ok_or_else(|| {
            StoreError::Corrupt(format!("transaction {} has kind '{}'", row.id, row.kind))
        })?;

        Ok(CreditTransaction {
            id: row.id,
            tenant_id: row.tenant_id,
            amount: row.amount,
            kind,
            description: row.description,
            feedback_id: row.feedback_id,
            created_at: row.created_at,
        })
    }
}

pub async fn get_balance<'e, E>(executor: E, tenant_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT balance FROM credit_balances WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(executor)
            .await?;

    Ok(balance.unwrap_or(0))
}

async fn insert_transaction<'e, E>(
    executor: E,
    entry: &LedgerEntry,
    signed_amount: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO credit_transactions (tenant_id, amount, kind, description, feedback_id, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(entry.tenant_id)
    .bind(signed_amount)
    .bind(entry.kind.as_str())
    .bind(&entry.description)
    .bind(entry.feedback_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Conditional decrement and its transaction row in one transaction.
///
/// The `WHERE balance >= $2` guard makes the decrement a single compare-and-set,
/// so concurrent spenders serialize on the row lock and can never drive the
/// balance below zero. Returns `None` when the guard fails.
pub async fn spend(db: &PgPool, entry: &LedgerEntry) -> Result<Option<i64>, StoreError> {
    if entry.amount <= 0 {
        return Err(StoreError::InvalidAmount(entry.amount));
    }

    let mut tx = db.begin().await?;

    let new_balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE credit_balances
        SET balance = balance - $2, updated_at = NOW()
        WHERE tenant_id = $1 AND balance >= $2
        RETURNING balance
        "#,
    )
    .bind(entry.tenant_id)
    .bind(entry.amount)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(new_balance) = new_balance else {
        tx.rollback().await?;
        return Ok(None);
    };

    insert_transaction(&mut *tx, entry, -entry.amount).await?;
    tx.commit().await?;

    Ok(Some(new_balance))
}

/// Increment (creating the balance row on first use) and its transaction row
pub async fn deposit(db: &PgPool, entry: &LedgerEntry) -> Result<i64, StoreError> {
    if entry.amount <= 0 {
        return Err(StoreError::InvalidAmount(entry.amount));
    }

    let mut tx = db.begin().await?;

    let new_balance: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO credit_balances (tenant_id, balance, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (tenant_id)
        DO UPDATE SET balance = credit_balances.balance + EXCLUDED.balance, updated_at = NOW()
        RETURNING balance
        "#,
    )
    .bind(entry.tenant_id)
    .bind(entry.amount)
    .fetch_one(&mut *tx)
    .await?;

    insert_transaction(&mut *tx, entry, entry.amount).await?;
    tx.commit().await?;

    Ok(new_balance)
}

pub async fn list_transactions<'e, E>(
    executor: E,
    tenant_id: i64,
    kind: Option<TransactionKind>,
) -> Result<Vec<CreditTransaction>, StoreError>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, amount, kind, description, feedback_id, created_at
        FROM credit_transactions
        WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR kind = $2)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(tenant_id)
    .bind(kind.map(|k| k.as_str()))
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(CreditTransaction::try_from).collect()
}
