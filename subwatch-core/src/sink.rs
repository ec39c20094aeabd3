use crate::{CoreError, MatchEvent};
use async_trait::async_trait;

/// Destination for keyword match events.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn emit(&self, event: &MatchEvent) -> Result<(), CoreError>;
}
