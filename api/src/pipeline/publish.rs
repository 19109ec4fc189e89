//! Credit-gated publish: spend, submit upstream, refund if the submit fails

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::constants::{CREDITS_PER_REPLY, PUBLISH_CLAIM_TTL_SECS};
use crate::models::{LedgerEntry, TenantId, TransactionKind};
use crate::services::feed::{FeedbackFeed, UpstreamError};
use crate::store::{CreditLedger, StoreError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { balance: i64 },
    InsufficientCredit,
}

pub struct PublishTarget<'a> {
    pub tenant_id: TenantId,
    /// Local row id; `None` for an item not inserted yet
    pub feedback_id: Option<i64>,
    pub external_id: &'a str,
    pub credential: &'a str,
    pub text: &'a str,
    pub kind: TransactionKind,
}

/// Expiry for a publish lease taken now
pub fn claim_deadline() -> DateTime<Utc> {
    Utc::now() + Duration::seconds(PUBLISH_CLAIM_TTL_SECS)
}

pub async fn spend_and_submit<L>(
    ledger: &L,
    feed: &dyn FeedbackFeed,
    target: PublishTarget<'_>,
) -> Result<PublishOutcome, PublishError>
where
    L: CreditLedger + ?Sized,
{
    let spend = LedgerEntry {
        tenant_id: target.tenant_id,
        amount: CREDITS_PER_REPLY,
        kind: target.kind,
        description: format!("Reply to feedback {}", target.external_id),
        feedback_id: target.feedback_id,
    };

    let Some(balance) = ledger.spend(&spend).await? else {
        return Ok(PublishOutcome::InsufficientCredit);
    };

    if let Err(e) = feed
        .submit_response(target.credential, target.external_id, target.text)
        .await
    {
        let refund = LedgerEntry {
            kind: TransactionKind::Refund,
            description: format!("Refund: publish failed for feedback {}", target.external_id),
            ..spend
        };
        match ledger.deposit(&refund).await {
            Ok(_) => tracing::info!(
                tenant_id = target.tenant_id,
                external_id = target.external_id,
                "Refunded credit after failed publish"
            ),
            Err(refund_err) => tracing::error!(
                tenant_id = target.tenant_id,
                external_id = target.external_id,
                error = %refund_err,
                "Refund after failed publish did not persist"
            ),
        }
        return Err(PublishError::Upstream(e));
    }

    Ok(PublishOutcome::Published { balance })
}
