use async_trait::async_trait;
use std::sync::Arc;
use subwatch_core::{CoreError, MatchEvent, MatchKind, MatchSink};
use tokio::sync::mpsc;
use tracing::info;

/// Writes every match to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MatchSink for LogSink {
    async fn emit(&self, event: &MatchEvent) -> Result<(), CoreError> {
        match event.kind {
            MatchKind::Post => info!(
                source = %event.source,
                post_id = %event.post_id,
                keyword = %event.keyword,
                "Found keyword '{}' in post: {}",
                event.keyword,
                event.excerpt
            ),
            MatchKind::Comment => info!(
                source = %event.source,
                post_id = %event.post_id,
                comment_id = event.comment_id.as_deref().unwrap_or_default(),
                keyword = %event.keyword,
                "Found keyword '{}' in comment: {}",
                event.keyword,
                event.excerpt
            ),
        }
        Ok(())
    }
}

/// Forwards matches to an in-process receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MatchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MatchSink for ChannelSink {
    async fn emit(&self, event: &MatchEvent) -> Result<(), CoreError> {
        self.tx.send(event.clone()).map_err(|_| CoreError::Internal {
            message: "match receiver dropped".to_string(),
        })
    }
}

/// Delivers each event to every inner sink. All sinks are attempted; the
/// first failure is returned.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MatchSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn MatchSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn MatchSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl MatchSink for FanoutSink {
    async fn emit(&self, event: &MatchEvent) -> Result<(), CoreError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
