//! Per-source polling loop.

use chrono::Utc;
use reddit_client::RateBudget;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use subwatch_core::{
    decide, CoreError, ErrorExt, ForumClient, ForumPost, KeywordMatcher, MatchEvent, MatchKind,
    MatchSink, PostStateStore, RedditApiError, TrackedPost,
};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a monitor. `Stopping` is published the moment cancellation
/// is observed and `Stopped` once the loop has exited. Nothing awaits
/// between the two, so a watcher reading the latest value usually sees
/// `Running` and then `Stopped` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub page_limit: u32,
    pub poll_interval: Duration,
}

/// Collaborators shared by every monitor of a supervisor.
#[derive(Clone)]
pub struct MonitorDeps {
    pub client: Arc<dyn ForumClient>,
    pub store: Arc<dyn PostStateStore>,
    pub sink: Arc<dyn MatchSink>,
    pub matcher: Arc<KeywordMatcher>,
}

/// Counters a monitor returns when it exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub source: String,
    pub cycles: u64,
    pub posts_seen: u64,
    pub posts_reprocessed: u64,
    pub comment_threads_fetched: u64,
    pub post_matches: u64,
    pub comment_matches: u64,
    pub fetch_failures: u64,
    pub state_write_failures: u64,
    pub sink_failures: u64,
    pub final_state: MonitorState,
}

impl MonitorReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            cycles: 0,
            posts_seen: 0,
            posts_reprocessed: 0,
            comment_threads_fetched: 0,
            post_matches: 0,
            comment_matches: 0,
            fetch_failures: 0,
            state_write_failures: 0,
            sink_failures: 0,
            final_state: MonitorState::Running,
        }
    }
}

pub struct SourceMonitor {
    source: String,
    deps: MonitorDeps,
    budget: Arc<RateBudget>,
    settings: MonitorSettings,
    state_tx: watch::Sender<MonitorState>,
    report: MonitorReport,
    /// Extra wait requested by a rate-limited response, applied once.
    cooldown: Option<Duration>,
}

impl SourceMonitor {
    pub fn new(
        source: impl Into<String>,
        deps: MonitorDeps,
        budget: Arc<RateBudget>,
        settings: MonitorSettings,
    ) -> Self {
        let source = source.into();
        let (state_tx, _) = watch::channel(MonitorState::Running);
        let report = MonitorReport::new(&source);
        Self {
            source,
            deps,
            budget,
            settings,
            state_tx,
            report,
            cooldown: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_tx.subscribe()
    }

    pub fn report(&self) -> &MonitorReport {
        &self.report
    }

    /// Polls until `cancel` fires. Every blocking step (rate token, page
    /// fetch, comment fetch, interval sleep) is raced against cancellation;
    /// state writes are never interrupted.
    pub async fn run(mut self, cancel: CancellationToken) -> MonitorReport {
        info!(source = %self.source, "Monitoring started");

        loop {
            if self.run_cycle(&cancel).await.is_break() {
                break;
            }

            let pause = match self.cooldown.take() {
                Some(cooldown) => cooldown.max(self.settings.poll_interval),
                None => self.settings.poll_interval,
            };
            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = sleep(pause) => false,
            };
            if cancelled {
                self.begin_stopping();
                break;
            }
        }

        info!(source = %self.source, "Stopping monitoring for source");
        self.set_state(MonitorState::Stopped);
        info!(
            source = %self.source,
            cycles = self.report.cycles,
            reprocessed = self.report.posts_reprocessed,
            "Monitor stopped"
        );
        self.report
    }

    /// One poll: wait for a token, list the newest page and process every
    /// post on it. A failed listing counts as an empty page.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> ControlFlow<()> {
        if !self.acquire_or_cancel(cancel).await {
            self.begin_stopping();
            return ControlFlow::Break(());
        }

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            page = self.deps.client.list_new_posts(&self.source, self.settings.page_limit) => Some(page),
        };
        let Some(page) = page else {
            self.begin_stopping();
            return ControlFlow::Break(());
        };
        self.report.cycles += 1;

        let posts = match page {
            Ok(posts) => posts,
            Err(e) => {
                self.note_fetch_failure(&e);
                warn!(
                    source = %self.source,
                    code = %e.error_code(),
                    retryable = e.is_retryable(),
                    cooldown = ?self.cooldown,
                    "Error fetching posts: {}",
                    e
                );
                return ControlFlow::Continue(());
            }
        };

        debug!(source = %self.source, count = posts.len(), "Processing page");
        for post in &posts {
            self.report.posts_seen += 1;
            if self.process_post(post, cancel).await.is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn process_post(&mut self, post: &ForumPost, cancel: &CancellationToken) -> ControlFlow<()> {
        let decision = decide(self.deps.store.as_ref(), post).await;
        if decision.is_skip() {
            return ControlFlow::Continue(());
        }

        self.report.posts_reprocessed += 1;
        debug!(
            source = %self.source,
            post_id = %post.id,
            fetch_comments = decision.fetch_comments(),
            "Reprocessing post"
        );

        let matcher = Arc::clone(&self.deps.matcher);
        for keyword in matcher.matches_any(&[post.title.as_str(), post.body.as_str()]) {
            self.emit(MatchEvent::post(post, keyword)).await;
        }

        if decision.fetch_comments() {
            if !self.acquire_or_cancel(cancel).await {
                self.begin_stopping();
                return ControlFlow::Break(());
            }

            let comments = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                comments = self.deps.client.fetch_comments(&post.id) => Some(comments),
            };
            let Some(comments) = comments else {
                self.begin_stopping();
                return ControlFlow::Break(());
            };

            match comments {
                Ok(comments) => {
                    self.report.comment_threads_fetched += 1;
                    for comment in &comments {
                        for keyword in matcher.matches(&comment.body) {
                            self.emit(MatchEvent::comment(post, comment, keyword)).await;
                        }
                    }
                }
                Err(e) => {
                    // Leave the stored state untouched so the post is retried.
                    self.note_fetch_failure(&e);
                    warn!(
                        source = %self.source,
                        post_id = %post.id,
                        code = %e.error_code(),
                        retryable = e.is_retryable(),
                        "Error fetching comments: {}",
                        e
                    );
                    return ControlFlow::Continue(());
                }
            }
        }

        let state = TrackedPost::observed(post, Utc::now());
        if let Err(e) = self.deps.store.upsert(&state).await {
            self.report.state_write_failures += 1;
            warn!(
                source = %self.source,
                post_id = %post.id,
                code = %e.error_code(),
                "Error updating post tracking: {}",
                e
            );
        }
        ControlFlow::Continue(())
    }

    async fn emit(&mut self, event: MatchEvent) {
        match event.kind {
            MatchKind::Post => self.report.post_matches += 1,
            MatchKind::Comment => self.report.comment_matches += 1,
        }
        if let Err(e) = self.deps.sink.emit(&event).await {
            self.report.sink_failures += 1;
            warn!(
                source = %self.source,
                post_id = %event.post_id,
                "Failed to deliver match event: {}",
                e
            );
        }
    }

    /// Waits for a rate token. Returns `false` if cancelled first.
    async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.budget.acquire() => true,
        }
    }

    /// Counts a failed fetch. A 429 pushes the next poll out to at least the
    /// server's `retry-after`.
    fn note_fetch_failure(&mut self, e: &CoreError) {
        self.report.fetch_failures += 1;
        if matches!(
            e,
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { .. })
        ) {
            self.cooldown = e.retry_after();
        }
    }

    fn begin_stopping(&mut self) {
        if self.report.final_state == MonitorState::Running {
            self.set_state(MonitorState::Stopping);
        }
    }

    fn set_state(&mut self, state: MonitorState) {
        self.report.final_state = state;
        self.state_tx.send_replace(state);
        debug!(source = %self.source, ?state, "Monitor state changed");
    }
}
