use reddit_client::RedditApiClient;
use subwatch_core::{CoreError, ForumClient, RedditApiError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// Serves the same canned HTTP response to every connection.
async fn serve(status: &'static str, extra_headers: &'static str, body: &'static str) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    Url::parse(&format!("http://{addr}")).unwrap()
}

fn client(base_url: Url) -> RedditApiClient {
    RedditApiClient::with_base_url("subwatch-tests/1.0".to_string(), None, base_url).unwrap()
}

#[tokio::test]
async fn too_many_requests_carries_retry_after() {
    let base = serve("429 Too Many Requests", "retry-after: 17\r\n", "{}").await;

    let err = client(base).list_new_posts("golang", 10).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 17 })
    ));
}

#[tokio::test]
async fn not_found_names_the_missing_subreddit() {
    let base = serve("404 Not Found", "", "{}").await;

    let err = client(base).list_new_posts("nosuchplace", 10).await.unwrap_err();
    match err {
        CoreError::RedditApi(RedditApiError::SubredditNotFound { subreddit }) => {
            assert_eq!(subreddit, "nosuchplace")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn not_found_on_thread_names_the_missing_post() {
    let base = serve("404 Not Found", "", "{}").await;

    let err = client(base).fetch_comments("abc123").await.unwrap_err();
    match err {
        CoreError::RedditApi(RedditApiError::PostNotFound { post_id }) => {
            assert_eq!(post_id, "abc123")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_keep_their_status() {
    let base = serve("503 Service Unavailable", "", "{}").await;

    let err = client(base).list_new_posts("golang", 10).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::ServerError { status_code: 503 })
    ));
}

#[tokio::test]
async fn unparseable_body_is_an_invalid_response() {
    let base = serve("200 OK", "", "<html>not json</html>").await;

    let err = client(base.clone())
        .list_new_posts("golang", 10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::InvalidResponse { .. })
    ));

    let err = client(base).fetch_comments("abc123").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::InvalidResponse { .. })
    ));
}

#[tokio::test]
async fn listing_keeps_only_link_children() {
    let body = r#"{
        "kind": "Listing",
        "data": {
            "after": null,
            "before": null,
            "dist": 2,
            "children": [
                {"kind": "t3", "data": {
                    "id": "p1", "title": "Goroutine leak", "selftext": "help",
                    "subreddit": "golang", "edited": 1700000000.5, "num_comments": 4
                }},
                {"kind": "t5", "data": {
                    "id": "s1", "title": "golang", "subreddit": "golang"
                }}
            ]
        }
    }"#;
    let base = serve("200 OK", "", body).await;

    let posts = client(base).list_new_posts("golang", 10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, "p1");
    assert_eq!(posts[0].comment_count, 4);
    assert!(posts[0].edited_at.is_some());
}
