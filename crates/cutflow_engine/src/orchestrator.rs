use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cutflow_core::{
    update, Adjustments, CallTicket, Effect, JobSource, Msg, OneShotCall, PipelineStage,
    PipelineState, PipelineView, PollTarget, Quality, TrailLevel,
};
use pipeline_logging::{pipeline_debug, pipeline_error, pipeline_info, pipeline_warn};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::poll::{start_polling, ChannelObserver, PollHandle, PollSettings, StatusQuery};
use crate::request::{send_timed, send_with_retry, RetryPolicy};
use crate::upload::validate_source;
use crate::{Backend, RequestError, StatusReport, VersionInfo};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub retry: RetryPolicy,
    pub poll: PollSettings,
    /// Per-attempt deadline for downloading an exported file.
    pub download_deadline: Duration,
    pub health_deadline: Duration,
    pub output_dir: PathBuf,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll: PollSettings::default(),
            download_deadline: Duration::from_secs(600),
            health_deadline: Duration::from_secs(5),
            output_dir: PathBuf::from("./exports"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("backend is not reachable: {0}")]
    Unhealthy(#[source] RequestError),
    #[error("pipeline is {}, expected {}: {message}", .stage.label(), .expected.label())]
    UnexpectedStage {
        stage: PipelineStage,
        expected: PipelineStage,
        message: String,
    },
}

/// Gets called after every message that changed the pipeline.
pub trait ViewSink: Send {
    fn render(&mut self, state: &PipelineState);
}

struct BackendStatus(Arc<dyn Backend>);

#[async_trait::async_trait]
impl StatusQuery for BackendStatus {
    async fn query(&self, target: &PollTarget) -> Result<StatusReport, RequestError> {
        self.0.job_status(target).await
    }
}

/// Owns one pipeline session. State only changes through [`update`]; every
/// effect runs as a spawned task that reports back as a [`Msg`].
pub struct Orchestrator {
    state: PipelineState,
    backend: Arc<dyn Backend>,
    settings: OrchestratorSettings,
    tx: UnboundedSender<Msg>,
    rx: UnboundedReceiver<Msg>,
    poll: Option<PollHandle>,
    /// Task running the one-shot call the state is waiting for.
    call: Option<(CallTicket, JoinHandle<()>)>,
    sink: Option<Box<dyn ViewSink>>,
    logged: usize,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>, settings: OrchestratorSettings) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            state: PipelineState::new(),
            backend,
            settings,
            tx,
            rx,
            poll: None,
            call: None,
            sink: None,
            logged: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ViewSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn view(&self) -> PipelineView {
        self.state.view()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Sender for feeding messages from outside, e.g. a UI thread.
    pub fn sender(&self) -> UnboundedSender<Msg> {
        self.tx.clone()
    }

    /// Applies one message and starts whatever effects it produced.
    pub fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.log_trail();
        self.abort_superseded_call();
        for effect in effects {
            self.execute(effect);
        }
        if self.state.consume_dirty() {
            if let Some(sink) = self.sink.as_mut() {
                sink.render(&self.state);
            }
        }
    }

    /// Waits for the next message from a running task and applies it.
    /// Returns false when nothing is in flight.
    pub async fn step(&mut self) -> bool {
        if !self.state.is_busy() {
            return false;
        }
        match self.rx.recv().await {
            Some(msg) => {
                self.dispatch(msg);
                true
            }
            None => false,
        }
    }

    /// Processes messages until no call is in flight and no loop is polling.
    pub async fn settle(&mut self) -> PipelineStage {
        while self.step().await {}
        self.state.stage()
    }

    pub async fn start(&mut self, source: JobSource) -> PipelineStage {
        self.dispatch(Msg::CreateRequested(source));
        self.settle().await
    }

    pub async fn adjust(&mut self, adjustments: Adjustments) -> PipelineStage {
        self.dispatch(Msg::AdjustRequested(adjustments));
        self.settle().await
    }

    pub async fn export(&mut self, quality: Quality) -> PipelineStage {
        self.dispatch(Msg::ExportRequested { quality });
        self.settle().await
    }

    pub async fn retry_download(&mut self) -> PipelineStage {
        self.dispatch(Msg::DownloadRequested);
        self.settle().await
    }

    pub fn new_pipeline(&mut self) {
        self.dispatch(Msg::NewPipeline);
    }

    /// Checks that the pipeline reached `expected`, carrying the last error otherwise.
    pub fn expect_stage(&self, expected: PipelineStage) -> Result<(), OrchestratorError> {
        let stage = self.state.stage();
        if stage == expected {
            return Ok(());
        }
        Err(OrchestratorError::UnexpectedStage {
            stage,
            expected,
            message: self
                .state
                .last_error()
                .unwrap_or("no error reported")
                .to_string(),
        })
    }

    /// Single `GET /health` bounded by the health deadline, without retries.
    pub async fn check_health(&self) -> Result<(), OrchestratorError> {
        send_timed(self.settings.health_deadline, self.backend.health())
            .await
            .map_err(OrchestratorError::Unhealthy)
    }

    pub async fn list_versions(&self, base_id: &str) -> Result<Vec<VersionInfo>, RequestError> {
        let backend = self.backend.clone();
        send_with_retry("list versions", &self.settings.retry, |_| {
            let backend = backend.clone();
            let base_id = base_id.to_string();
            async move { backend.list_versions(&base_id).await }
        })
        .await
    }

    fn log_trail(&mut self) {
        for entry in self.state.trail().since(self.logged) {
            match entry.level {
                TrailLevel::Info => pipeline_info!("{}", entry.message),
                TrailLevel::Warn => pipeline_warn!("{}", entry.message),
                TrailLevel::Error => pipeline_error!("{}", entry.message),
            }
        }
        self.logged = self.state.trail().len();
    }

    fn execute(&mut self, effect: Effect) {
        pipeline_debug!("effect {:?}", effect);
        let retry = self.settings.retry.clone();
        match effect {
            Effect::CreateJob { ticket, source } => {
                // Local problems are reported without touching the network.
                if let Err(err) = validate_source(&source) {
                    let _ = self.tx.send(Msg::CallFailed {
                        ticket,
                        call: OneShotCall::Create,
                        failure: err.into_call_failure(),
                    });
                    return;
                }
                let kind = source.kind();
                self.spawn_call(
                    ticket,
                    OneShotCall::Create,
                    retry,
                    move |backend| {
                        let source = source.clone();
                        async move { backend.create_job(&source).await }
                    },
                    move |job_id| Msg::JobCreated {
                        ticket,
                        kind,
                        job_id,
                    },
                );
            }
            Effect::StartPolling(target) => {
                self.cancel_poll();
                let query: Arc<dyn StatusQuery> = Arc::new(BackendStatus(self.backend.clone()));
                let observer = Arc::new(ChannelObserver::new(self.tx.clone()));
                self.poll = Some(start_polling(
                    target,
                    query,
                    self.settings.poll.clone(),
                    observer,
                ));
            }
            Effect::CancelPolling { job_id } => {
                if self
                    .poll
                    .as_ref()
                    .is_some_and(|handle| handle.target().id == job_id)
                {
                    self.cancel_poll();
                }
            }
            Effect::FetchDetail { ticket, job_id } => {
                let loaded_id = job_id.clone();
                self.spawn_call(
                    ticket,
                    OneShotCall::FetchDetail,
                    retry,
                    move |backend| {
                        let job_id = job_id.clone();
                        async move { backend.job_detail(&job_id).await }
                    },
                    move |detail| Msg::DetailLoaded {
                        ticket,
                        job_id: loaded_id,
                        detail,
                    },
                );
            }
            Effect::SubmitAdjustment {
                ticket,
                project_id,
                adjustments,
            } => {
                let base_id = project_id.clone();
                self.spawn_call(
                    ticket,
                    OneShotCall::SubmitAdjustment,
                    retry,
                    move |backend| {
                        let project_id = project_id.clone();
                        let adjustments = adjustments.clone();
                        async move { backend.submit_adjustment(&project_id, &adjustments).await }
                    },
                    move |new_version| Msg::AdjustmentAccepted {
                        ticket,
                        base_id,
                        new_version,
                    },
                );
            }
            Effect::CreateExport {
                ticket,
                project_id,
                quality,
            } => {
                self.spawn_call(
                    ticket,
                    OneShotCall::CreateExport,
                    retry,
                    move |backend| {
                        let project_id = project_id.clone();
                        async move { backend.create_export(&project_id, quality).await }
                    },
                    move |export_id| Msg::ExportCreated { ticket, export_id },
                );
            }
            Effect::Download {
                ticket,
                export_id,
                quality,
            } => {
                let output_dir = self.settings.output_dir.clone();
                let finished_id = export_id.clone();
                let policy = retry.with_deadline(self.settings.download_deadline);
                self.spawn_call(
                    ticket,
                    OneShotCall::Download,
                    policy,
                    move |backend| {
                        let export_id = export_id.clone();
                        let output_dir = output_dir.clone();
                        async move {
                            backend
                                .download_export(&export_id, quality, &output_dir)
                                .await
                        }
                    },
                    move |file| Msg::DownloadFinished {
                        ticket,
                        export_id: finished_id,
                        file,
                    },
                );
            }
        }
    }

    /// Runs a one-shot call through the retry policy on its own task and
    /// reports the outcome as a message tagged with `ticket`.
    fn spawn_call<T, Op, Fut, Done>(
        &mut self,
        ticket: CallTicket,
        call: OneShotCall,
        policy: RetryPolicy,
        mut op: Op,
        done: Done,
    ) where
        T: Send + 'static,
        Op: FnMut(Arc<dyn Backend>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T, RequestError>> + Send + 'static,
        Done: FnOnce(T) -> Msg + Send + 'static,
    {
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let result = send_with_retry(call.label(), &policy, |_| op(backend.clone())).await;
            let msg = match result {
                Ok(value) => done(value),
                Err(err) => Msg::CallFailed {
                    ticket,
                    call,
                    failure: err.into_call_failure(),
                },
            };
            let _ = tx.send(msg);
        });
        if let Some((_, previous)) = self.call.replace((ticket, task)) {
            previous.abort();
        }
    }

    /// Aborts the running call once the state no longer waits for its ticket,
    /// e.g. after a new pipeline. An aborted download drops its temp file.
    fn abort_superseded_call(&mut self) {
        let pending = self.state.pending_ticket();
        if self
            .call
            .as_ref()
            .is_some_and(|(ticket, _)| Some(*ticket) != pending)
        {
            if let Some((ticket, task)) = self.call.take() {
                if !task.is_finished() {
                    pipeline_debug!("aborting superseded call {:?}", ticket);
                }
                task.abort();
            }
        }
    }

    fn cancel_poll(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.cancel();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some((_, task)) = self.call.take() {
            task.abort();
        }
        self.cancel_poll();
    }
}
