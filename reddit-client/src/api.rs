use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use subwatch_core::{CoreError, ForumClient, ForumComment, ForumPost, RedditApiError};
use tracing::{debug, error, info, warn};
use url::Url;

const REDDIT_API_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// Reddit reports `edited` as `false` for untouched posts and as a float
/// epoch timestamp once edited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditedField {
    Flag(bool),
    Timestamp(f64),
}

impl Default for EditedField {
    fn default() -> Self {
        EditedField::Flag(false)
    }
}

impl EditedField {
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            EditedField::Flag(_) => None,
            EditedField::Timestamp(secs) => DateTime::from_timestamp_millis((secs * 1000.0) as i64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub edited: EditedField,
    #[serde(default)]
    pub num_comments: u32,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: Url,
    user_agent: String,
}

impl RedditApiClient {
    /// Builds an anonymous client. `timeout` applies to each request; `None`
    /// leaves requests unbounded.
    pub fn new(user_agent: String, timeout: Option<Duration>) -> Result<Self, CoreError> {
        let base_url = Url::parse(REDDIT_API_BASE).map_err(|e| CoreError::Internal {
            message: format!("invalid Reddit base URL: {e}"),
        })?;
        Self::with_base_url(user_agent, timeout, base_url)
    }

    pub fn with_base_url(
        user_agent: String,
        timeout: Option<Duration>,
        base_url: Url,
    ) -> Result<Self, CoreError> {
        let mut builder = Client::builder().user_agent(&user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            http_client,
            base_url,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn endpoint_url(
        &self,
        segments: &[&str],
        query_params: &[(&str, &str)],
    ) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::InvalidInput {
                message: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        if !query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(query_params);
        }
        Ok(url)
    }

    async fn make_request(&self, url: Url, not_found: RedditApiError) -> Result<Response, CoreError> {
        let start_time = Instant::now();
        let endpoint = url.path().to_string();

        info!("Making Reddit API request: GET {}", endpoint);
        let response = match self.http_client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        debug!(
            "GET {} answered {} in {:?}",
            endpoint,
            status,
            start_time.elapsed()
        );

        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let err = match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            StatusCode::UNAUTHORIZED => RedditApiError::Unauthorized { endpoint },
            StatusCode::FORBIDDEN => RedditApiError::Forbidden { resource: endpoint },
            StatusCode::NOT_FOUND => not_found,
            s if s.is_server_error() => RedditApiError::ServerError {
                status_code: s.as_u16(),
            },
            s => RedditApiError::InvalidResponse {
                details: format!("unexpected status {s} for {endpoint}"),
            },
        };
        Err(CoreError::RedditApi(err))
    }

    pub async fn get_new_posts(
        &self,
        subreddit: &str,
        limit: u32,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let limit_str = limit.to_string();
        let url = self.endpoint_url(
            &["r", subreddit, "new.json"],
            &[("limit", limit_str.as_str()), ("raw_json", "1")],
        )?;

        let response = self
            .make_request(
                url,
                RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                },
            )
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            })
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing)
    }

    pub async fn get_comment_thread(&self, post_id: &str) -> Result<Vec<ForumComment>, CoreError> {
        let thread_file = format!("{post_id}.json");
        let url = self.endpoint_url(&["comments", thread_file.as_str()], &[("raw_json", "1")])?;

        let response = self
            .make_request(
                url,
                RedditApiError::PostNotFound {
                    post_id: post_id.to_string(),
                },
            )
            .await?;

        // The thread endpoint answers with [post listing, comment listing].
        let listings: Vec<RedditListing<Value>> = response.json().await.map_err(|e| {
            error!("Failed to parse comment thread: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comments for post {}", post_id),
            })
        })?;

        let comments = listings
            .get(1)
            .map(flatten_comment_listing)
            .unwrap_or_default();
        debug!("Retrieved {} comments for post {}", comments.len(), post_id);
        Ok(comments)
    }
}

#[async_trait]
impl ForumClient for RedditApiClient {
    async fn list_new_posts(&self, source: &str, limit: u32) -> Result<Vec<ForumPost>, CoreError> {
        let listing = self.get_new_posts(source, limit).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter(|child| child.kind == "t3")
            .map(|child| ForumPost::from(child.data))
            .collect())
    }

    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<ForumComment>, CoreError> {
        self.get_comment_thread(post_id).await
    }
}

/// Collects every `t1` comment in a thread listing, descending into reply
/// listings. `more` placeholders are skipped.
pub fn flatten_comment_listing(listing: &RedditListing<Value>) -> Vec<ForumComment> {
    let mut comments = Vec::new();
    for child in &listing.data.children {
        collect_comment(&child.kind, &child.data, &mut comments);
    }
    comments
}

fn collect_comment(kind: &str, data: &Value, out: &mut Vec<ForumComment>) {
    if kind != "t1" {
        return;
    }

    let id = data.get("id").and_then(Value::as_str).unwrap_or_default();
    let body = data.get("body").and_then(Value::as_str).unwrap_or_default();
    out.push(ForumComment {
        id: id.to_string(),
        body: body.to_string(),
    });

    // `replies` is an empty string when there are none.
    let children = data
        .get("replies")
        .and_then(|r| r.get("data"))
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array);
    for child in children.into_iter().flatten() {
        let kind = child.get("kind").and_then(Value::as_str).unwrap_or_default();
        if let Some(data) = child.get("data") {
            collect_comment(kind, data, out);
        }
    }
}

impl From<RedditPostData> for ForumPost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            source: post_data.subreddit,
            title: post_data.title,
            body: post_data.selftext,
            edited_at: post_data.edited.to_datetime(),
            comment_count: post_data.num_comments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_client_creation() {
        let client = RedditApiClient::new("test-user-agent/1.0".to_string(), None).unwrap();
        assert_eq!(client.user_agent(), "test-user-agent/1.0");
    }

    #[test]
    fn test_endpoint_urls() {
        let client = RedditApiClient::new("ua".to_string(), Some(Duration::from_secs(5))).unwrap();

        let url = client
            .endpoint_url(&["r", "golang", "new.json"], &[("limit", "100")])
            .unwrap();
        assert_eq!(url.as_str(), "https://www.reddit.com/r/golang/new.json?limit=100");

        let url = client.endpoint_url(&["comments", "abc123.json"], &[]).unwrap();
        assert_eq!(url.as_str(), "https://www.reddit.com/comments/abc123.json");
    }

    #[test]
    fn test_post_listing_parsing() {
        let raw = json!({
            "kind": "Listing",
            "data": {
                "after": "t3_zzz",
                "before": null,
                "dist": 2,
                "children": [
                    {"kind": "t3", "data": {
                        "id": "p1", "title": "Goroutine leak", "selftext": "help",
                        "subreddit": "golang", "edited": false, "num_comments": 5,
                        "created_utc": 1700000000.0
                    }},
                    {"kind": "t3", "data": {
                        "id": "p2", "title": "Edited", "selftext": "",
                        "subreddit": "golang", "edited": 1700000123.5, "num_comments": 0
                    }}
                ]
            }
        });

        let listing: RedditListing<RedditPostData> = serde_json::from_value(raw).unwrap();
        let posts: Vec<ForumPost> = listing
            .data
            .children
            .into_iter()
            .map(|c| ForumPost::from(c.data))
            .collect();

        assert_eq!(posts[0].id, "p1");
        assert_eq!(posts[0].source, "golang");
        assert_eq!(posts[0].edited_at, None);
        assert_eq!(posts[0].comment_count, 5);
        assert_eq!(
            posts[1].edited_at,
            DateTime::from_timestamp_millis(1_700_000_123_500)
        );
    }

    #[test]
    fn test_comment_tree_flattening() {
        let raw = json!({
            "kind": "Listing",
            "data": {
                "after": null, "before": null, "dist": null,
                "children": [
                    {"kind": "t1", "data": {
                        "id": "c1", "body": "top level",
                        "replies": {"kind": "Listing", "data": {"children": [
                            {"kind": "t1", "data": {"id": "c2", "body": "nested", "replies": ""}},
                            {"kind": "more", "data": {"count": 3, "children": ["c9"]}}
                        ]}}
                    }},
                    {"kind": "t1", "data": {"id": "c3", "body": "second", "replies": ""}},
                    {"kind": "more", "data": {"count": 10}}
                ]
            }
        });

        let listing: RedditListing<Value> = serde_json::from_value(raw).unwrap();
        let comments = flatten_comment_listing(&listing);
        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(comments[1].body, "nested");
    }

    #[test]
    fn test_edited_field_variants() {
        let flag: EditedField = serde_json::from_str("false").unwrap();
        assert_eq!(flag.to_datetime(), None);

        let ts: EditedField = serde_json::from_str("1700000000").unwrap();
        assert_eq!(ts.to_datetime(), DateTime::from_timestamp(1_700_000_000, 0));
    }
}
