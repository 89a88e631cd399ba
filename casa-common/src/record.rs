//! Canonical record model
//!
//! Every source maps its native items into [`CanonicalRecord`]. Construction
//! never fails: optional fields that are missing or unusable degrade to
//! defaults instead of aborting ingestion of the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Maximum stored body length, in characters
pub const BODY_CHAR_CAP: usize = 2000;

/// Author sentinel used when the source does not report one
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Origin of a record
///
/// Part of the identity key: record IDs are only unique within a source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Periodically polled forum (subreddit listing)
    PullForum,
    /// Streaming chat session (group messages)
    PushChat,
}

impl SourceType {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::PullForum => "pull_forum",
            SourceType::PushChat => "push_chat",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull_forum" => Ok(SourceType::PullForum),
            "push_chat" => Ok(SourceType::PushChat),
            other => Err(Error::InvalidInput(format!("Unknown source type: {}", other))),
        }
    }
}

/// Normalized, source-agnostic representation of one ingested item
///
/// Built transiently per fetch or event, handed to the store once, then dropped.
/// There is no update path once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub source_type: SourceType,
    /// Logical grouping (subreddit name, chat group identifier)
    pub channel_id: String,
    /// Source-native identifier, unique within `source_type`
    pub record_id: String,
    /// Human-readable channel name, falls back to `channel_id`
    pub channel_label: String,
    pub author_id: String,
    /// Body truncated to [`BODY_CHAR_CAP`] characters (lossy)
    pub body: String,
    /// Source-reported creation time, Unix epoch when unknown
    pub created_at: DateTime<Utc>,
    /// Collector-side ingestion time
    pub fetched_at: DateTime<Utc>,
    /// Link back to the item at the source, when it has one
    pub url: Option<String>,
    /// Source-specific counters (score, reply count); never part of identity
    pub engagement_metrics: BTreeMap<String, f64>,
}

impl CanonicalRecord {
    /// Identity key used for deduplication
    pub fn identity(&self) -> (SourceType, &str) {
        (self.source_type, self.record_id.as_str())
    }

    /// Map a forum post into a canonical record
    pub fn from_forum_post(post: ForumPostDraft, fetched_at: DateTime<Utc>) -> Self {
        let channel_label = non_blank(post.channel_label).unwrap_or_else(|| post.channel_id.clone());

        let title = post.title.unwrap_or_default();
        let body = match non_blank(post.selftext) {
            Some(text) if title.is_empty() => text,
            Some(text) => format!("{}\n\n{}", title, text),
            None => title,
        };

        let created_at = post
            .created_utc
            .and_then(timestamp_from_secs_f64)
            .unwrap_or_else(epoch_sentinel);

        Self {
            source_type: SourceType::PullForum,
            channel_id: post.channel_id,
            record_id: post.post_id,
            channel_label,
            author_id: non_blank(post.author).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            body: truncate_body(&body),
            created_at,
            fetched_at,
            url: non_blank(post.url),
            engagement_metrics: post.metrics,
        }
    }

    /// Map a chat group message into a canonical record
    pub fn from_chat_message(message: ChatMessageDraft, fetched_at: DateTime<Utc>) -> Self {
        let channel_label = non_blank(message.chat_name).unwrap_or_else(|| message.chat_id.clone());

        let created_at = message
            .timestamp
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(epoch_sentinel);

        Self {
            source_type: SourceType::PushChat,
            channel_id: message.chat_id,
            record_id: message.message_id,
            channel_label,
            author_id: non_blank(message.author).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            body: truncate_body(message.body.as_deref().unwrap_or_default()),
            created_at,
            fetched_at,
            url: None,
            engagement_metrics: message.metrics,
        }
    }
}

/// Raw fields of a forum post, as far as the forum client could read them
#[derive(Debug, Clone, Default)]
pub struct ForumPostDraft {
    pub channel_id: String,
    pub post_id: String,
    pub channel_label: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    /// Seconds since the Unix epoch (fractional, as the forum reports it)
    pub created_utc: Option<f64>,
    pub url: Option<String>,
    pub metrics: BTreeMap<String, f64>,
}

/// Raw fields of a chat message, as delivered by the provider
#[derive(Debug, Clone, Default)]
pub struct ChatMessageDraft {
    pub chat_id: String,
    pub message_id: String,
    pub chat_name: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    /// Seconds since the Unix epoch
    pub timestamp: Option<i64>,
    pub metrics: BTreeMap<String, f64>,
}

/// Truncate to [`BODY_CHAR_CAP`] characters without splitting a code point
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(BODY_CHAR_CAP) {
        Some((byte_idx, _)) => body[..byte_idx].to_string(),
        None => body.to_string(),
    }
}

/// Creation time used when the source does not report one
pub fn epoch_sentinel() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

fn timestamp_from_secs_f64(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
