use sqlx::{Executor, Postgres};

use crate::models::RecommendationHint;

pub async fn hints_for_product<'e, E>(
    executor: E,
    account_id: i64,
    product_id: &str,
) -> Result<Vec<RecommendationHint>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT target_id, target_name
        FROM recommendation_hints
        WHERE account_id = $1 AND product_id = $2
        ORDER BY position ASC, id ASC
        "#,
    )
    .bind(account_id)
    .bind(product_id)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(target_id, target_name)| RecommendationHint {
            target_id,
            target_name,
        })
        .collect())
}
