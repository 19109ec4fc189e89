//! Reviewer edit-and-send for a single stored item

use thiserror::Error;

use super::publish::{PublishError, PublishOutcome, PublishTarget, claim_deadline, spend_and_submit};
use crate::models::{FeedbackItem, FeedbackStatus, TenantId, TransactionKind};
use crate::services::feed::FeedbackFeed;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ManualSendError {
    #[error("feedback {0} not found")]
    NotFound(i64),
    #[error("account has no upstream credential")]
    NotConfigured,
    #[error("insufficient credit")]
    InsufficientCredit,
    #[error("feedback is {0} and cannot be sent")]
    InvalidState(&'static str),
    #[error("reply text is empty")]
    EmptyText,
    #[error("feedback {0} is being published by another request")]
    Busy(i64),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Spends a `manual_reply` credit and publishes `text`. On failure the item is
/// left unchanged and any spent credit is refunded.
pub async fn send_manual<S>(
    store: &S,
    feed: &dyn FeedbackFeed,
    tenant_id: TenantId,
    feedback_id: i64,
    text: &str,
) -> Result<FeedbackItem, ManualSendError>
where
    S: Store + ?Sized,
{
    let text = text.trim();
    if text.is_empty() {
        return Err(ManualSendError::EmptyText);
    }

    let item = store
        .get_feedback(tenant_id, feedback_id)
        .await?
        .ok_or(ManualSendError::NotFound(feedback_id))?;

    if matches!(
        item.status,
        FeedbackStatus::Archived | FeedbackStatus::AnsweredExternally
    ) {
        return Err(ManualSendError::InvalidState(item.status.as_str()));
    }

    let account = store
        .get_account(tenant_id, item.account_id)
        .await?
        .ok_or(ManualSendError::NotConfigured)?;
    let credential = account
        .active_credential()
        .ok_or(ManualSendError::NotConfigured)?;

    let target = PublishTarget {
        tenant_id,
        feedback_id: Some(item.id),
        external_id: &item.external_id,
        credential,
        text,
        kind: TransactionKind::ManualReply,
    };

    let sendable = [
        FeedbackStatus::Pending,
        FeedbackStatus::Auto,
        FeedbackStatus::Sent,
    ];
    if !store
        .claim_for_publish(item.id, &sendable, claim_deadline())
        .await?
    {
        return Err(ManualSendError::Busy(item.id));
    }

    let outcome = spend_and_submit(store, feed, target).await;
    let failure = match outcome {
        Ok(PublishOutcome::Published { balance }) => {
            tracing::info!(
                tenant_id,
                feedback_id = item.id,
                balance,
                "Manual reply published"
            );
            None
        }
        Ok(PublishOutcome::InsufficientCredit) => Some(ManualSendError::InsufficientCredit),
        Err(e) => Some(ManualSendError::Publish(e)),
    };
    if let Some(err) = failure {
        if let Err(e) = store.release_claim(item.id).await {
            tracing::warn!(feedback_id = item.id, error = %e, "Failed to release publish claim");
        }
        return Err(err);
    }

    let is_edited =
        item.status == FeedbackStatus::Sent || item.draft_text.as_deref() != Some(text);
    store
        .mark_published(item.id, FeedbackStatus::Sent, text, is_edited)
        .await?;

    store
        .get_feedback(tenant_id, feedback_id)
        .await?
        .ok_or(ManualSendError::NotFound(feedback_id))
}
