//! Upstream marketplace feedback API client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Attachment, AttachmentKind};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream returned status {status_code}: {body}")]
    Status { status_code: u16, body: String },
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl UpstreamError {
    /// True when the platform rejected the credential itself
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            UpstreamError::Status {
                status_code: 401 | 403,
                ..
            }
        )
    }
}

/// Which side of the feed to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedFilter {
    Unanswered,
    Answered,
}

impl FeedFilter {
    fn is_answered(&self) -> &'static str {
        match self {
            FeedFilter::Unanswered => "false",
            FeedFilter::Answered => "true",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoLink {
    pub full_size: String,
    #[serde(default)]
    pub mini_size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoLink {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub preview_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub nm_id: i64,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedAnswer {
    pub text: String,
}

/// One review as the platform returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub pros: Option<String>,
    #[serde(default)]
    pub cons: Option<String>,
    pub product_valuation: i32,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub photo_links: Option<Vec<PhotoLink>>,
    #[serde(default)]
    pub video: Option<VideoLink>,
    #[serde(default)]
    pub product_details: Option<ProductDetails>,
    #[serde(default)]
    pub answer: Option<FeedAnswer>,
}

impl FeedEntry {
    /// Photos in feed order, then the video if it carries a link
    pub fn attachments(&self) -> Vec<Attachment> {
        let mut attachments: Vec<Attachment> = self
            .photo_links
            .iter()
            .flatten()
            .map(|p| Attachment {
                kind: AttachmentKind::Photo,
                url: p.full_size.clone(),
            })
            .collect();

        if let Some(link) = self.video.as_ref().and_then(|v| v.link.clone()) {
            attachments.push(Attachment {
                kind: AttachmentKind::Video,
                url: link,
            });
        }

        attachments
    }

    pub fn product_id(&self) -> Option<String> {
        self.product_details.as_ref().map(|d| d.nm_id.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: FeedData,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    #[serde(default)]
    feedbacks: Vec<FeedEntry>,
}

/// Read/write access to the upstream feedback feed
#[async_trait]
pub trait FeedbackFeed: Send + Sync {
    async fn fetch_page(
        &self,
        credential: &str,
        filter: FeedFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, UpstreamError>;

    async fn submit_response(
        &self,
        credential: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError>;
}

#[derive(Clone)]
pub struct FeedClient {
    base_url: String,
    http: Client,
}

impl FeedClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl FeedbackFeed for FeedClient {
    async fn fetch_page(
        &self,
        credential: &str,
        filter: FeedFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, UpstreamError> {
        let url = format!("{}/api/v1/feedbacks", self.base_url);
        let take = limit.to_string();
        let skip = offset.to_string();

        let resp = self
            .http
            .get(url)
            .header("Authorization", credential)
            .query(&[
                ("isAnswered", filter.is_answered()),
                ("take", take.as_str()),
                ("skip", skip.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status_code: status.as_u16(),
                body,
            });
        }

        let wrapper: FeedResponse = resp.json().await?;
        Ok(wrapper.data.feedbacks)
    }

    async fn submit_response(
        &self,
        credential: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        let url = format!("{}/api/v1/feedbacks/answer", self.base_url);
        let body = serde_json::json!({ "id": external_id, "text": text });

        let resp = self
            .http
            .post(url)
            .header("Authorization", credential)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status_code: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Everything read from one feed walk. `error` is set when a page failed;
/// `entries` still holds the pages fetched before it.
#[derive(Debug, Default)]
pub struct FeedWalk {
    pub entries: Vec<FeedEntry>,
    pub pages: usize,
    pub error: Option<UpstreamError>,
}

/// Walks the feed from offset 0 until a page comes back shorter than `page_size`,
/// sleeping `page_delay` between pages.
pub async fn fetch_all(
    feed: &dyn FeedbackFeed,
    credential: &str,
    filter: FeedFilter,
    page_size: usize,
    page_delay: Duration,
) -> FeedWalk {
    let mut walk = FeedWalk::default();
    let mut offset = 0;

    loop {
        if walk.pages > 0 && !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }

        match feed.fetch_page(credential, filter, offset, page_size).await {
            Ok(page) => {
                let count = page.len();
                walk.pages += 1;
                walk.entries.extend(page);
                if count < page_size {
                    break;
                }
                offset += count;
            }
            Err(e) => {
                walk.error = Some(e);
                break;
            }
        }
    }

    walk
}
