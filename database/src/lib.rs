use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use subwatch_core::{
    CoreError, DatabaseError, MatchEvent, MatchKind, MatchSink, PostStateStore, TrackedPost,
};
use tracing::{debug, info};

mod memory;

pub use memory::MemoryPostStore;

/// SQLite-backed post state store and match recorder.
pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to post state database");
        self.pool = Some(pool);
        Ok(())
    }

    /// Round-trips a trivial query to prove the store is reachable.
    pub async fn ping(&self) -> Result<(), CoreError> {
        sqlx::query("SELECT 1")
            .execute(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!()
            .run(self.pool()?)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool.as_ref().ok_or_else(|| {
            DatabaseError::ConnectionFailed {
                reason: "database not connected".to_string(),
            }
            .into()
        })
    }

    pub async fn get_tracked_post(&self, post_id: &str) -> Result<Option<TrackedPost>, CoreError> {
        let row = sqlx::query_as::<_, TrackedPostRow>(
            "SELECT * FROM tracked_posts WHERE post_id = ?",
        )
        .bind(post_id)
        .fetch_optional(self.pool()?)
        .await
        .map_err(DatabaseError::from)?;

        row.map(TrackedPost::try_from).transpose()
    }

    /// Single-statement upsert. Watermark columns keep the larger of the
    /// stored and incoming values. Timestamps are stored in nanoseconds so an
    /// observed edit time reads back exactly equal.
    pub async fn upsert_tracked_post(&self, post: &TrackedPost) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO tracked_posts (
                post_id, source, last_processed_ns, last_comment_check_ns,
                last_edit_seen_ns, comment_count
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(post_id) DO UPDATE SET
                source = excluded.source,
                last_processed_ns = excluded.last_processed_ns,
                last_comment_check_ns = excluded.last_comment_check_ns,
                last_edit_seen_ns = MAX(tracked_posts.last_edit_seen_ns, excluded.last_edit_seen_ns),
                comment_count = MAX(tracked_posts.comment_count, excluded.comment_count)
            "#,
        )
        .bind(&post.post_id)
        .bind(&post.source)
        .bind(to_nanos(post.last_processed, "last_processed")?)
        .bind(to_nanos(post.last_comment_check, "last_comment_check")?)
        .bind(to_nanos(post.last_edit_seen, "last_edit_seen")?)
        .bind(i64::from(post.comment_count))
        .execute(self.pool()?)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub async fn count_tracked_posts(&self, source: &str) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracked_posts WHERE source = ?")
            .bind(source)
            .fetch_one(self.pool()?)
            .await
            .map_err(DatabaseError::from)?;
        Ok(count)
    }

    /// Stores a match event and returns its generated id.
    pub async fn record_match(&self, event: &MatchEvent) -> Result<String, CoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO matches (
                id, kind, source, post_id, comment_id, keyword, excerpt, detected_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(event.kind.as_str())
        .bind(&event.source)
        .bind(&event.post_id)
        .bind(&event.comment_id)
        .bind(&event.keyword)
        .bind(&event.excerpt)
        .bind(event.detected_at.timestamp_millis())
        .execute(self.pool()?)
        .await
        .map_err(DatabaseError::from)?;
        Ok(id)
    }

    pub async fn get_matches_for_post(&self, post_id: &str) -> Result<Vec<MatchEvent>, CoreError> {
        let rows = sqlx::query_as::<_, MatchRow>(
            "SELECT * FROM matches WHERE post_id = ? ORDER BY detected_ms, keyword",
        )
        .bind(post_id)
        .fetch_all(self.pool()?)
        .await
        .map_err(DatabaseError::from)?;

        rows.into_iter().map(MatchEvent::try_from).collect()
    }
}

#[async_trait]
impl PostStateStore for Database {
    async fn get(&self, post_id: &str) -> Result<Option<TrackedPost>, CoreError> {
        self.get_tracked_post(post_id).await
    }

    async fn upsert(&self, state: &TrackedPost) -> Result<(), CoreError> {
        self.upsert_tracked_post(state).await
    }
}

#[async_trait]
impl MatchSink for Database {
    async fn emit(&self, event: &MatchEvent) -> Result<(), CoreError> {
        self.record_match(event).await.map(|_| ())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TrackedPostRow {
    post_id: String,
    source: String,
    last_processed_ns: i64,
    last_comment_check_ns: i64,
    last_edit_seen_ns: i64,
    comment_count: i64,
}

impl TryFrom<TrackedPostRow> for TrackedPost {
    type Error = CoreError;

    fn try_from(row: TrackedPostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            last_processed: from_nanos(row.last_processed_ns, "last_processed_ns")?,
            last_comment_check: from_nanos(row.last_comment_check_ns, "last_comment_check_ns")?,
            last_edit_seen: from_nanos(row.last_edit_seen_ns, "last_edit_seen_ns")?,
            comment_count: u32::try_from(row.comment_count).map_err(|_| {
                DatabaseError::QueryFailed {
                    query: format!("comment_count out of range for post {}", row.post_id),
                }
            })?,
            post_id: row.post_id,
            source: row.source,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    #[allow(dead_code)]
    id: String,
    kind: String,
    source: String,
    post_id: String,
    comment_id: Option<String>,
    keyword: String,
    excerpt: String,
    detected_ms: i64,
}

impl TryFrom<MatchRow> for MatchEvent {
    type Error = CoreError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "post" => MatchKind::Post,
            "comment" => MatchKind::Comment,
            other => {
                return Err(DatabaseError::QueryFailed {
                    query: format!("unknown match kind {other:?}"),
                }
                .into())
            }
        };
        Ok(Self {
            kind,
            source: row.source,
            post_id: row.post_id,
            comment_id: row.comment_id,
            keyword: row.keyword,
            excerpt: row.excerpt,
            detected_at: from_millis(row.detected_ms, "detected_ms")?,
        })
    }
}

fn from_millis(ms: i64, column: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        DatabaseError::QueryFailed {
            query: format!("{column} holds an invalid timestamp: {ms}"),
        }
        .into()
    })
}

fn to_nanos(at: DateTime<Utc>, field: &str) -> Result<i64, CoreError> {
    at.timestamp_nanos_opt().ok_or_else(|| {
        DatabaseError::QueryFailed {
            query: format!("{field} is outside the storable range: {at}"),
        }
        .into()
    })
}

fn from_nanos(ns: i64, column: &str) -> Result<DateTime<Utc>, CoreError> {
    const NANOS_PER_SEC: i64 = 1_000_000_000;
    let secs = ns.div_euclid(NANOS_PER_SEC);
    let subsec = ns.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, subsec).ok_or_else(|| {
        DatabaseError::QueryFailed {
            query: format!("{column} holds an invalid timestamp: {ns}"),
        }
        .into()
    })
}
