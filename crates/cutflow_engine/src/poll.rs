//! Fixed-cadence status polling with cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use cutflow_core::{JobStatus, Msg, PollTarget};
use pipeline_logging::{pipeline_debug, pipeline_info, pipeline_warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::request::send_timed;
use crate::{RequestError, StatusReport};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Deadline for a single status query.
    pub query_deadline: Duration,
    /// Give up after this many failed queries in a row. `None` keeps polling.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            query_deadline: Duration::from_secs(30),
            max_consecutive_failures: None,
        }
    }
}

#[async_trait::async_trait]
pub trait StatusQuery: Send + Sync {
    async fn query(&self, target: &PollTarget) -> Result<StatusReport, RequestError>;
}

/// Receives what a polling loop observes. Calls stop once the handle is cancelled.
pub trait PollObserver: Send + Sync {
    fn on_progress(&self, target: &PollTarget, report: &StatusReport);
    fn on_terminal(&self, target: &PollTarget, outcome: Result<(), String>);
    fn on_transient(&self, target: &PollTarget, error: &RequestError);
}

/// Forwards observations into the orchestrator's message channel.
pub struct ChannelObserver {
    tx: UnboundedSender<Msg>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<Msg>) -> Self {
        Self { tx }
    }
}

impl PollObserver for ChannelObserver {
    fn on_progress(&self, target: &PollTarget, report: &StatusReport) {
        let _ = self.tx.send(Msg::PollProgress {
            job_id: target.id.clone(),
            status: report.status,
            progress: report.progress,
            step_label: report.current_step.clone(),
            steps: report.steps.clone(),
        });
    }

    fn on_terminal(&self, target: &PollTarget, outcome: Result<(), String>) {
        let _ = self.tx.send(Msg::PollFinished {
            job_id: target.id.clone(),
            outcome,
        });
    }

    fn on_transient(&self, target: &PollTarget, error: &RequestError) {
        let _ = self.tx.send(Msg::PollHiccup {
            job_id: target.id.clone(),
            message: error.to_string(),
        });
    }
}

/// A running polling loop. Dropping the handle cancels it.
#[derive(Debug)]
pub struct PollHandle {
    target: PollTarget,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn target(&self) -> &PollTarget {
        &self.target
    }

    /// Stops future ticks. Safe to call more than once.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            pipeline_debug!("cancelling poll of {}", self.target.id);
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the loop task to exit.
    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns a loop that queries `target` every `settings.interval` until a
/// terminal status arrives or the handle is cancelled. The first query runs
/// one interval after the start.
pub fn start_polling(
    target: PollTarget,
    query: Arc<dyn StatusQuery>,
    settings: PollSettings,
    observer: Arc<dyn PollObserver>,
) -> PollHandle {
    pipeline_info!(
        "polling {} every {}ms",
        target.id,
        settings.interval.as_millis()
    );
    let token = CancellationToken::new();
    let task = tokio::spawn(poll_loop(
        target.clone(),
        query,
        settings,
        observer,
        token.clone(),
    ));
    PollHandle {
        target,
        token,
        task,
    }
}

async fn poll_loop(
    target: PollTarget,
    query: Arc<dyn StatusQuery>,
    settings: PollSettings,
    observer: Arc<dyn PollObserver>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = send_timed(settings.query_deadline, query.query(&target)) => result,
        };
        if token.is_cancelled() {
            break;
        }

        match result {
            Ok(report) => {
                failures = 0;
                observer.on_progress(&target, &report);
                match report.status {
                    JobStatus::Completed => {
                        pipeline_info!("{} completed", target.id);
                        observer.on_terminal(&target, Ok(()));
                        break;
                    }
                    JobStatus::Failed => {
                        let message = report.error.unwrap_or_default();
                        pipeline_warn!("{} failed: {}", target.id, message);
                        observer.on_terminal(&target, Err(message));
                        break;
                    }
                    JobStatus::Pending | JobStatus::Active => {}
                }
            }
            Err(err) => {
                failures += 1;
                pipeline_warn!(
                    "status query for {} failed ({} in a row): {}",
                    target.id,
                    failures,
                    err
                );
                observer.on_transient(&target, &err);
                if let Some(limit) = settings.max_consecutive_failures {
                    if failures >= limit {
                        observer.on_terminal(
                            &target,
                            Err(format!("status polling failed {failures} times in a row: {err}")),
                        );
                        break;
                    }
                }
            }
        }
    }
    pipeline_debug!("poll loop for {} exited", target.id);
}
