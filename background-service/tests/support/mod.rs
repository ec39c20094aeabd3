#![allow(dead_code)]

use async_trait::async_trait;
use background_service::{ChannelSink, MonitorDeps, MonitorSettings};
use chrono::{DateTime, TimeZone, Utc};
use database::MemoryPostStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subwatch_core::{
    CoreError, ForumClient, ForumComment, ForumPost, KeywordMatcher, MatchEvent, RedditApiError,
};
use tokio::sync::mpsc;

/// Forum stand-in whose pages and comment threads are set by the test.
#[derive(Default)]
pub struct ScriptedForum {
    pages: Mutex<HashMap<String, Vec<ForumPost>>>,
    threads: Mutex<HashMap<String, Vec<ForumComment>>>,
    list_failing: AtomicBool,
    comments_failing: AtomicBool,
    list_hanging: AtomicBool,
    list_rate_limited: Mutex<Option<u64>>,
    comments_hanging: AtomicBool,
    list_calls: AtomicUsize,
    comment_calls: Mutex<Vec<String>>,
}

impl ScriptedForum {
    pub fn set_page(&self, source: &str, posts: Vec<ForumPost>) {
        self.pages.lock().unwrap().insert(source.to_string(), posts);
    }

    pub fn set_thread(&self, post_id: &str, comments: Vec<ForumComment>) {
        self.threads
            .lock()
            .unwrap()
            .insert(post_id.to_string(), comments);
    }

    pub fn set_list_failing(&self, failing: bool) {
        self.list_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_comments_failing(&self, failing: bool) {
        self.comments_failing.store(failing, Ordering::SeqCst);
    }

    /// Listing calls answer 429 with `retry_after` seconds while set.
    pub fn set_list_rate_limited(&self, retry_after: Option<u64>) {
        *self.list_rate_limited.lock().unwrap() = retry_after;
    }

    /// Listing calls never complete while set.
    pub fn set_list_hanging(&self, hanging: bool) {
        self.list_hanging.store(hanging, Ordering::SeqCst);
    }

    /// Comment fetches never complete while set.
    pub fn set_comments_hanging(&self, hanging: bool) {
        self.comments_hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn comment_calls(&self) -> Vec<String> {
        self.comment_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForumClient for ScriptedForum {
    async fn list_new_posts(&self, source: &str, limit: u32) -> Result<Vec<ForumPost>, CoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.list_hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let rate_limited = *self.list_rate_limited.lock().unwrap();
        if let Some(retry_after) = rate_limited {
            return Err(RedditApiError::RateLimitExceeded { retry_after }.into());
        }
        if self.list_failing.load(Ordering::SeqCst) {
            return Err(RedditApiError::ServerError { status_code: 503 }.into());
        }
        let pages = self.pages.lock().unwrap();
        Ok(pages
            .get(source)
            .map(|posts| posts.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<ForumComment>, CoreError> {
        self.comment_calls.lock().unwrap().push(post_id.to_string());
        if self.comments_hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.comments_failing.load(Ordering::SeqCst) {
            return Err(RedditApiError::RequestTimeout.into());
        }
        Ok(self
            .threads
            .lock()
            .unwrap()
            .get(post_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct Harness {
    pub forum: Arc<ScriptedForum>,
    pub store: Arc<MemoryPostStore>,
    pub events: mpsc::UnboundedReceiver<MatchEvent>,
    pub deps: MonitorDeps,
}

impl Harness {
    pub fn new(keywords: &[&str]) -> Self {
        let forum = Arc::new(ScriptedForum::default());
        let store = Arc::new(MemoryPostStore::new());
        let (sink, events) = ChannelSink::new();
        let deps = MonitorDeps {
            client: forum.clone(),
            store: store.clone(),
            sink: Arc::new(sink),
            matcher: Arc::new(KeywordMatcher::new(keywords.iter().copied())),
        };
        Self {
            forum,
            store,
            events,
            deps,
        }
    }

    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn settings(poll_interval: Duration) -> MonitorSettings {
    MonitorSettings {
        page_limit: 100,
        poll_interval,
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn post(id: &str, title: &str, edited: Option<i64>, comments: u32) -> ForumPost {
    ForumPost {
        id: id.to_string(),
        source: "golang".to_string(),
        title: title.to_string(),
        body: String::new(),
        edited_at: edited.map(ts),
        comment_count: comments,
    }
}

pub fn comment(id: &str, body: &str) -> ForumComment {
    ForumComment {
        id: id.to_string(),
        body: body.to_string(),
    }
}
