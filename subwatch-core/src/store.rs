use crate::{CoreError, TrackedPost};
use async_trait::async_trait;

/// Per-post reprocessing state, keyed by post id.
///
/// Implementations must be safe for concurrent use from every monitor and
/// must make `upsert` a single atomic replacement of the record in which the
/// `last_edit_seen` and `comment_count` watermarks never decrease.
#[async_trait]
pub trait PostStateStore: Send + Sync {
    /// `Ok(None)` means the post has never been seen.
    async fn get(&self, post_id: &str) -> Result<Option<TrackedPost>, CoreError>;

    async fn upsert(&self, state: &TrackedPost) -> Result<(), CoreError>;
}
