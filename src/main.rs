use anyhow::Context;
use background_service::{FanoutSink, LogSink, MonitorDeps, Supervisor};
use database::Database;
use reddit_client::RedditApiClient;
use std::path::PathBuf;
use std::sync::Arc;
use subwatch_core::{AppConfig, ErrorExt, KeywordMatcher, MatchSink};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "subwatch=info,subwatch_core=info,background_service=info,reddit_client=warn,database=info",
        )
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Subwatch - keyword monitor");

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())
        .map_err(|e| {
            e.log_error();
            tracing::error!("{}", e.user_friendly_message());
            e
        })
        .context("loading configuration")?;

    // The store must be reachable before any monitor starts.
    let mut db = Database::new(config.database_url.clone());
    db.connect().await.context("connecting to post state store")?;
    db.ping().await.context("pinging post state store")?;
    db.run_migrations().await.context("migrating post state store")?;
    let db = Arc::new(db);

    let client = RedditApiClient::new(config.user_agent.clone(), config.request_timeout())
        .context("building Reddit client")?;

    let sinks: Vec<Arc<dyn MatchSink>> = vec![Arc::new(LogSink), db.clone()];
    let deps = MonitorDeps {
        client: Arc::new(client),
        store: db.clone(),
        sink: Arc::new(FanoutSink::new(sinks)),
        matcher: Arc::new(KeywordMatcher::new(config.keywords.iter().cloned())),
    };

    let shutdown = CancellationToken::new();
    let supervisor = Supervisor::start_with_token(&config, deps, shutdown.child_token());
    tracing::info!(
        sources = ?config.sources,
        keywords = ?config.keywords,
        "Monitoring {} sources",
        supervisor.monitor_count()
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    let reports = supervisor.join().await;
    for report in &reports {
        tracing::info!(
            source = %report.source,
            cycles = report.cycles,
            reprocessed = report.posts_reprocessed,
            post_matches = report.post_matches,
            comment_matches = report.comment_matches,
            failures = report.fetch_failures + report.state_write_failures,
            "Monitor summary"
        );
    }

    db.close().await;
    tracing::info!("Subwatch stopped");
    Ok(())
}
