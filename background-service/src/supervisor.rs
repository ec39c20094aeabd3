use crate::monitor::{MonitorDeps, MonitorReport, MonitorSettings, MonitorState, SourceMonitor};
use reddit_client::{RateBudget, RateBudgetConfig};
use std::sync::Arc;
use subwatch_core::AppConfig;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Owns one monitor task per source, the shared rate budget and the
/// cancellation token they all observe.
pub struct Supervisor {
    cancel: CancellationToken,
    budget: Arc<RateBudget>,
    tasks: JoinSet<MonitorReport>,
    states: Vec<(String, watch::Receiver<MonitorState>)>,
}

impl Supervisor {
    pub fn start(config: &AppConfig, deps: MonitorDeps) -> Self {
        Self::start_with_token(config, deps, CancellationToken::new())
    }

    /// Starts monitors that stop when `cancel` (or a parent of it) fires.
    pub fn start_with_token(config: &AppConfig, deps: MonitorDeps, cancel: CancellationToken) -> Self {
        let budget = Arc::new(RateBudget::new(RateBudgetConfig::per_minute(
            config.requests_per_minute,
        )));
        let settings = MonitorSettings {
            page_limit: config.page_limit,
            poll_interval: config.poll_interval(),
        };

        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let monitor = SourceMonitor::new(
                source.clone(),
                deps.clone(),
                Arc::clone(&budget),
                settings.clone(),
            );
            states.push((source.clone(), monitor.subscribe()));
            tasks.spawn(monitor.run(cancel.child_token()));
        }

        info!(
            monitors = states.len(),
            interval = ?budget.interval(),
            "Supervisor started"
        );

        Self {
            cancel,
            budget,
            tasks,
            states,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn budget(&self) -> Arc<RateBudget> {
        Arc::clone(&self.budget)
    }

    pub fn monitor_count(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> Vec<(String, MonitorState)> {
        self.states
            .iter()
            .map(|(source, rx)| (source.clone(), *rx.borrow()))
            .collect()
    }

    /// Cancels every monitor and waits for all of them to exit.
    pub async fn shutdown(self) -> Vec<MonitorReport> {
        info!("Shutting down monitors");
        self.cancel.cancel();
        self.join().await
    }

    /// Waits for every monitor to exit without cancelling them.
    pub async fn join(mut self) -> Vec<MonitorReport> {
        let mut reports = Vec::with_capacity(self.states.len());
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("Monitor task failed: {}", e),
            }
        }
        info!(stopped = reports.len(), "All monitors stopped");
        reports
    }
}
