//! Incremental reprocessing decisions.
//!
//! For every post seen on a poll cycle the engine compares the observed edit
//! timestamp and comment count against the stored watermarks and reports
//! what work is outstanding. The engine keeps no state of its own.

use crate::{ErrorExt, ForumPost, PostStateStore, TrackedPost};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Values of a freshly fetched post that take part in the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation<'a> {
    pub post_id: &'a str,
    pub edit_time: DateTime<Utc>,
    pub comment_count: u32,
}

impl<'a> From<&'a ForumPost> for Observation<'a> {
    fn from(post: &'a ForumPost) -> Self {
        Self {
            post_id: &post.id,
            edit_time: post.edit_watermark(),
            comment_count: post.comment_count,
        }
    }
}

/// Outcome of the decision engine. The two signals are computed
/// independently; the monitor only acts on `needs_comment_fetch` when
/// `needs_post_reprocess` is also set (see [`ReprocessDecision::fetch_comments`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprocessDecision {
    pub needs_post_reprocess: bool,
    pub needs_comment_fetch: bool,
}

impl ReprocessDecision {
    pub const SKIP: Self = Self {
        needs_post_reprocess: false,
        needs_comment_fetch: false,
    };

    pub const FULL: Self = Self {
        needs_post_reprocess: true,
        needs_comment_fetch: true,
    };

    /// Pure comparison against the stored record. A missing record means the
    /// post was never seen and everything is done.
    pub fn evaluate(observed: &Observation<'_>, stored: Option<&TrackedPost>) -> Self {
        match stored {
            None => Self::FULL,
            Some(stored) => Self {
                needs_post_reprocess: observed.edit_time > stored.last_edit_seen,
                needs_comment_fetch: observed.comment_count > stored.comment_count,
            },
        }
    }

    /// Comment growth alone never reopens a post: comments are fetched only
    /// on a pass that is already reprocessing the post itself.
    pub fn fetch_comments(&self) -> bool {
        self.needs_post_reprocess && self.needs_comment_fetch
    }

    pub fn is_skip(&self) -> bool {
        !self.needs_post_reprocess
    }
}

/// Looks up the stored state for `post` and evaluates it. A failed lookup
/// fails closed: the post is skipped for this cycle and retried on the next.
pub async fn decide(store: &dyn PostStateStore, post: &ForumPost) -> ReprocessDecision {
    let observed = Observation::from(post);
    match store.get(observed.post_id).await {
        Ok(stored) => ReprocessDecision::evaluate(&observed, stored.as_ref()),
        Err(e) => {
            warn!(
                post_id = %post.id,
                source = %post.source,
                code = %e.error_code(),
                "State lookup failed, skipping post this cycle: {}",
                e
            );
            ReprocessDecision::SKIP
        }
    }
}
