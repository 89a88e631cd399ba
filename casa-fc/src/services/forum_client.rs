//! Forum listing client
//!
//! Fetches the newest posts of one channel (subreddit) per call and maps them
//! into canonical records. Items are parsed one at a time so a single
//! malformed post only costs that post.

use async_trait::async_trait;
use casa_common::config::{ForumConfig, FORUM_MAX_BATCH};
use casa_common::record::ForumPostDraft;
use casa_common::CanonicalRecord;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::FetchError;

/// Records read from one channel
#[derive(Debug, Clone, Default)]
pub struct FetchedBatch {
    pub records: Vec<CanonicalRecord>,
    /// Listing items that could not be mapped
    pub malformed: usize,
}

/// Result of a successful fetch call
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(FetchedBatch),
    /// Upstream says the channel does not exist; skipped, not an error
    ChannelNotFound,
}

/// A source queried in bounded batches, one channel per call
#[async_trait]
pub trait PullSource: Send + Sync {
    /// Fetch up to `limit` items from `channel_id`
    ///
    /// `limit` above the upstream maximum is clamped, not rejected.
    async fn fetch_batch(&self, channel_id: &str, limit: u32) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
impl<T: PullSource + ?Sized> PullSource for Arc<T> {
    async fn fetch_batch(&self, channel_id: &str, limit: u32) -> Result<FetchOutcome, FetchError> {
        (**self).fetch_batch(channel_id, limit).await
    }
}

/// Listing envelope
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    /// Kept raw so each child is parsed independently
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: ForumPost,
}

/// Forum post as returned in a listing
///
/// Only `id` is required; optional fields of the wrong type read as absent.
#[derive(Debug, Deserialize)]
struct ForumPost {
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    subreddit: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    selftext: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    author: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    created_utc: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    permalink: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    num_comments: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    upvote_ratio: Option<f64>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

/// HTTP client for a Reddit-style listing API
pub struct ForumClient {
    http_client: reqwest::Client,
    /// Site root used for permalinks, without a trailing slash
    base_url: String,
    /// Parsed site root that listing paths are appended to
    api_root: reqwest::Url,
}

impl ForumClient {
    /// Build a client from configuration
    ///
    /// The configured user agent is attached to every request.
    pub fn new(config: &ForumConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let api_root = reqwest::Url::parse(&base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if api_root.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(format!("{} cannot hold a path", base_url)));
        }

        Ok(Self {
            http_client,
            base_url,
            api_root,
        })
    }

    /// Listing URL for `channel_id`, encoded as a single path segment
    fn listing_url(&self, channel_id: &str) -> Result<reqwest::Url, FetchError> {
        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["r", channel_id, "new.json"]);
        Ok(url)
    }

    fn map_post(&self, channel_id: &str, post: ForumPost) -> CanonicalRecord {
        let mut metrics = BTreeMap::new();
        if let Some(score) = post.score {
            metrics.insert("score".to_string(), score);
        }
        if let Some(comments) = post.num_comments {
            metrics.insert("num_comments".to_string(), comments);
        }
        if let Some(ratio) = post.upvote_ratio {
            metrics.insert("upvote_ratio".to_string(), ratio);
        }

        let url = post
            .permalink
            .map(|permalink| format!("{}{}", self.base_url, permalink));

        CanonicalRecord::from_forum_post(
            ForumPostDraft {
                channel_id: channel_id.to_string(),
                post_id: post.id,
                channel_label: post.subreddit,
                author: post.author,
                title: post.title,
                selftext: post.selftext,
                created_utc: post.created_utc,
                url,
                metrics,
            },
            Utc::now(),
        )
    }

    /// Map listing children, isolating failures per item
    fn map_children(&self, channel_id: &str, children: Vec<serde_json::Value>) -> FetchedBatch {
        let mut batch = FetchedBatch::default();

        for (index, child) in children.into_iter().enumerate() {
            match serde_json::from_value::<ListingChild>(child) {
                Ok(child) => batch.records.push(self.map_post(channel_id, child.data)),
                Err(e) => {
                    batch.malformed += 1;
                    tracing::warn!(
                        channel = %channel_id,
                        index,
                        error = %e,
                        "Skipping malformed listing item"
                    );
                }
            }
        }

        batch
    }
}

#[async_trait]
impl PullSource for ForumClient {
    async fn fetch_batch(&self, channel_id: &str, limit: u32) -> Result<FetchOutcome, FetchError> {
        let limit = limit.min(FORUM_MAX_BATCH);
        let url = self.listing_url(channel_id)?;

        tracing::debug!(channel = %channel_id, limit, url = %url, "Querying forum listing");

        let response = self
            .http_client
            .get(url)
            .query(&[("limit", limit.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::ChannelNotFound);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::Api(status.as_u16(), error_text));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        let batch = self.map_children(channel_id, listing.data.children);

        tracing::debug!(
            channel = %channel_id,
            records = batch.records.len(),
            malformed = batch.malformed,
            "Fetched forum listing"
        );

        Ok(FetchOutcome::Fetched(batch))
    }
}
