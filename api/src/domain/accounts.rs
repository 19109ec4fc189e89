//! Tenant and upstream account queries

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, Postgres};

use crate::models::{Account, ReplyModeMap};

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    tenant_id: i64,
    name: String,
    credential: Option<String>,
    reply_modes: Json<ReplyModeMap>,
    default_brand: Option<String>,
    system_prompt: String,
    prompt_template: String,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            credential: row.credential,
            reply_modes: row.reply_modes.0,
            default_brand: row.default_brand,
            system_prompt: row.system_prompt,
            prompt_template: row.prompt_template,
        }
    }
}

pub async fn list_tenant_accounts<'e, E>(
    executor: E,
    tenant_id: i64,
) -> Result<Vec<Account>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<AccountRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, name, credential, reply_modes, default_brand,
               system_prompt, prompt_template
        FROM accounts
        WHERE tenant_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(tenant_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Account::from).collect())
}

pub async fn get_account<'e, E>(
    executor: E,
    tenant_id: i64,
    account_id: i64,
) -> Result<Option<Account>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<AccountRow> = sqlx::query_as(
        r#"
        SELECT id, tenant_id, name, credential, reply_modes, default_brand,
               system_prompt, prompt_template
        FROM accounts
        WHERE id = $1 AND tenant_id = $2
        "#,
    )
    .bind(account_id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Account::from))
}

pub async fn set_credential<'e, E>(
    executor: E,
    tenant_id: i64,
    account_id: i64,
    credential: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts SET credential = $3, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2
        "#,
    )
    .bind(account_id)
    .bind(tenant_id)
    .bind(credential)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_credentialed_tenants<'e, E>(executor: E) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT tenant_id
        FROM accounts
        WHERE credential IS NOT NULL AND btrim(credential) <> ''
        ORDER BY tenant_id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn touch_last_sync<'e, E>(
    executor: E,
    tenant_id: i64,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE tenants SET last_sync_at = $2 WHERE id = $1")
        .bind(tenant_id)
        .bind(at)
        .execute(executor)
        .await?;
    Ok(())
}
