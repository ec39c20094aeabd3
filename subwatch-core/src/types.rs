use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A top-level post as returned by a forum listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    /// `None` when the post was never edited.
    pub edited_at: Option<DateTime<Utc>>,
    pub comment_count: u32,
}

impl ForumPost {
    /// Edit timestamp used for watermark comparison. Unedited posts sit at
    /// the Unix epoch so any later edit compares strictly greater.
    pub fn edit_watermark(&self) -> DateTime<Utc> {
        self.edited_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumComment {
    pub id: String,
    pub body: String,
}

/// Persisted reprocessing state for one post, keyed by `post_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPost {
    pub post_id: String,
    pub source: String,
    pub last_processed: DateTime<Utc>,
    pub last_comment_check: DateTime<Utc>,
    pub last_edit_seen: DateTime<Utc>,
    pub comment_count: u32,
}

impl TrackedPost {
    /// Record for `post` after a reprocessing pass finishing at `now`.
    pub fn observed(post: &ForumPost, now: DateTime<Utc>) -> Self {
        Self {
            post_id: post.id.clone(),
            source: post.source.clone(),
            last_processed: now,
            last_comment_check: now,
            last_edit_seen: post.edit_watermark(),
            comment_count: post.comment_count,
        }
    }

    /// Combines an incoming write with the stored record. Watermarks never
    /// move backwards; everything else takes the incoming value.
    pub fn merged_over(self, stored: &TrackedPost) -> Self {
        Self {
            last_edit_seen: self.last_edit_seen.max(stored.last_edit_seen),
            comment_count: self.comment_count.max(stored.comment_count),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Post,
    Comment,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Post => "post",
            MatchKind::Comment => "comment",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One keyword hit inside a post or one of its comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub kind: MatchKind,
    pub source: String,
    pub post_id: String,
    pub comment_id: Option<String>,
    pub keyword: String,
    pub excerpt: String,
    pub detected_at: DateTime<Utc>,
}

const EXCERPT_CHARS: usize = 160;

impl MatchEvent {
    pub fn post(post: &ForumPost, keyword: &str) -> Self {
        Self {
            kind: MatchKind::Post,
            source: post.source.clone(),
            post_id: post.id.clone(),
            comment_id: None,
            keyword: keyword.to_string(),
            excerpt: excerpt(&post.title),
            detected_at: Utc::now(),
        }
    }

    pub fn comment(post: &ForumPost, comment: &ForumComment, keyword: &str) -> Self {
        Self {
            kind: MatchKind::Comment,
            source: post.source.clone(),
            post_id: post.id.clone(),
            comment_id: Some(comment.id.clone()),
            keyword: keyword.to_string(),
            excerpt: excerpt(&comment.body),
            detected_at: Utc::now(),
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
    cut.push('…');
    cut
}
