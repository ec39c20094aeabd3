use crate::{CoreError, ForumComment, ForumPost};
use async_trait::async_trait;

/// Read access to a forum. Implementations do not pace themselves; callers
/// hold a rate budget token before every call.
#[async_trait]
pub trait ForumClient: Send + Sync {
    /// Newest posts of `source`, at most `limit`.
    async fn list_new_posts(&self, source: &str, limit: u32) -> Result<Vec<ForumPost>, CoreError>;

    /// Every comment in the thread of `post_id`.
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<ForumComment>, CoreError>;
}
