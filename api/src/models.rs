//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type TenantId = i64;
pub type AccountId = i64;

/// Lifecycle state of a feedback item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Pending,
    Auto,
    Sent,
    Archived,
    AnsweredExternally,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::Pending => "pending",
            FeedbackStatus::Auto => "auto",
            FeedbackStatus::Sent => "sent",
            FeedbackStatus::Archived => "archived",
            FeedbackStatus::AnsweredExternally => "answered_externally",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FeedbackStatus::Pending),
            "auto" => Some(FeedbackStatus::Auto),
            "sent" => Some(FeedbackStatus::Sent),
            "archived" => Some(FeedbackStatus::Archived),
            "answered_externally" => Some(FeedbackStatus::AnsweredExternally),
            _ => None,
        }
    }
}

/// How a rating tier is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Auto,
    Manual,
}

/// Rating ("1".."5") -> mode, per account. Unmapped ratings are manual.
pub type ReplyModeMap = HashMap<String, ReplyMode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Video,
}

/// Media reference attached to a review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
}

/// Dedup key of a feedback item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedbackKey {
    pub external_id: String,
    pub tenant_id: TenantId,
    pub account_id: AccountId,
}

/// A stored customer review
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackItem {
    pub id: i64,
    pub external_id: String,
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub rating: i32,
    pub author_name: String,
    pub body_text: String,
    pub pros_text: String,
    pub cons_text: String,
    pub attachments: Vec<Attachment>,
    pub brand_name: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub status: FeedbackStatus,
    pub draft_text: Option<String>,
    pub published_text: Option<String>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A review seen for the first time, ready to insert
#[derive(Debug, Clone)]
pub struct NewFeedbackItem {
    pub external_id: String,
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub rating: i32,
    pub author_name: String,
    pub body_text: String,
    pub pros_text: String,
    pub cons_text: String,
    pub attachments: Vec<Attachment>,
    pub brand_name: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub status: FeedbackStatus,
    pub draft_text: Option<String>,
    pub published_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// A tenant's connection to one upstream seller account
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub name: String,
    pub credential: Option<String>,
    pub reply_modes: ReplyModeMap,
    pub default_brand: Option<String>,
    pub system_prompt: String,
    pub prompt_template: String,
}

impl Account {
    /// The upstream credential, if one is set and non-blank
    pub fn active_credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Cross-sell suggestion configured for a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationHint {
    pub target_id: String,
    pub target_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TopUp,
    AutoReply,
    ManualReply,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::TopUp => "top_up",
            TransactionKind::AutoReply => "auto_reply",
            TransactionKind::ManualReply => "manual_reply",
            TransactionKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top_up" => Some(TransactionKind::TopUp),
            "auto_reply" => Some(TransactionKind::AutoReply),
            "manual_reply" => Some(TransactionKind::ManualReply),
            "refund" => Some(TransactionKind::Refund),
            _ => None,
        }
    }
}

/// One row of the append-only credit log. `amount` is signed.
#[derive(Debug, Clone, Serialize)]
pub struct CreditTransaction {
    pub id: i64,
    pub tenant_id: TenantId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub feedback_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Ledger mutation request. `amount` is always positive; the direction
/// comes from the operation (spend or deposit).
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub tenant_id: TenantId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub feedback_id: Option<i64>,
}

/// Result of one tenant sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub fetched: usize,
    #[serde(rename = "new")]
    pub new_count: usize,
    pub auto_sent: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
