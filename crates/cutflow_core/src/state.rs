use crate::trail::{DiagnosticTrail, TrailLevel};
use crate::version::{base_of, VersionChain};
use crate::view_model::{JobView, PipelineView};
use crate::{
    CallTicket, DownloadedFile, ExportTask, Job, JobDetail, JobKind, OneShotCall, PollTarget,
    Quality, TimelineStep,
};

/// Client-owned phase of the pipeline, distinct from backend job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineStage {
    #[default]
    Idle,
    Created,
    Reviewing,
    Adjusting,
    Exporting,
    Downloaded,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Downloaded | PipelineStage::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Created => "created",
            PipelineStage::Reviewing => "reviewing",
            PipelineStage::Adjusting => "adjusting",
            PipelineStage::Exporting => "exporting",
            PipelineStage::Downloaded => "downloaded",
            PipelineStage::Failed => "failed",
        }
    }
}

/// Everything one session knows about its pipeline. Only `update` mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineState {
    stage: PipelineStage,
    job: Option<Job>,
    chain: Option<VersionChain>,
    active_id: Option<String>,
    pending_version: Option<String>,
    export: Option<ExportTask>,
    export_quality: Option<Quality>,
    detail: Option<JobDetail>,
    timeline: Vec<TimelineStep>,
    in_flight: Option<(OneShotCall, CallTicket)>,
    /// Last ticket handed out; survives `reset` so abandoned calls never match.
    last_ticket: CallTicket,
    polling: Option<PollTarget>,
    last_error: Option<String>,
    download: Option<DownloadedFile>,
    trail: DiagnosticTrail,
    dirty: bool,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Base id of the pipeline, with any version suffix removed.
    pub fn base_id(&self) -> Option<&str> {
        self.active_id.as_deref().map(base_of)
    }

    pub fn chain(&self) -> Option<&VersionChain> {
        self.chain.as_ref()
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn export(&self) -> Option<&ExportTask> {
        self.export.as_ref()
    }

    pub fn polling(&self) -> Option<&PollTarget> {
        self.polling.as_ref()
    }

    pub fn in_flight(&self) -> Option<OneShotCall> {
        self.in_flight.map(|(call, _)| call)
    }

    /// Ticket of the one-shot call whose result is awaited.
    pub fn pending_ticket(&self) -> Option<CallTicket> {
        self.in_flight.map(|(_, ticket)| ticket)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn download(&self) -> Option<&DownloadedFile> {
        self.download.as_ref()
    }

    pub fn trail(&self) -> &DiagnosticTrail {
        &self.trail
    }

    /// True while a one-shot call or a polling loop is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.polling.is_some()
    }

    /// Busy with something other than loading the preview detail. A review
    /// action may supersede a pending detail fetch.
    pub(crate) fn is_busy_beyond_detail(&self) -> bool {
        self.polling.is_some()
            || self
                .in_flight
                .is_some_and(|(call, _)| call != OneShotCall::FetchDetail)
    }

    pub fn view(&self) -> PipelineView {
        PipelineView {
            stage: self.stage,
            active_id: self.active_id.clone(),
            base_id: self.base_id().map(ToOwned::to_owned),
            versions: self
                .chain
                .as_ref()
                .map(|chain| chain.versions().to_vec())
                .unwrap_or_default(),
            job: self.job.as_ref().map(JobView::from),
            timeline: self.timeline.clone(),
            export: self.export.clone(),
            detail: self.detail.clone(),
            last_error: self.last_error.clone(),
            download: self.download.clone(),
            busy: self.is_busy(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn note(&mut self, level: TrailLevel, message: impl Into<String>) {
        self.trail.push(level, message);
        self.dirty = true;
    }

    pub(crate) fn set_stage(&mut self, stage: PipelineStage) {
        if self.stage != stage {
            let message = format!("stage {} -> {}", self.stage.label(), stage.label());
            self.stage = stage;
            self.note(TrailLevel::Info, message);
        }
    }

    /// Marks `call` in flight under a fresh ticket, superseding any earlier call.
    pub(crate) fn begin_call(&mut self, call: OneShotCall) -> CallTicket {
        let ticket = self.last_ticket.next();
        self.last_ticket = ticket;
        self.in_flight = Some((call, ticket));
        self.dirty = true;
        ticket
    }

    /// Clears the in-flight call if it is `call` issued under `ticket`;
    /// returns false for a stale result.
    pub(crate) fn finish_call(&mut self, call: OneShotCall, ticket: CallTicket) -> bool {
        if self.in_flight == Some((call, ticket)) {
            self.in_flight = None;
            self.dirty = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_polling(&self, job_id: &str) -> bool {
        self.polling.as_ref().is_some_and(|target| target.id == job_id)
    }

    pub(crate) fn start_polling(&mut self, target: PollTarget) {
        self.polling = Some(target);
        self.dirty = true;
    }

    pub(crate) fn stop_polling(&mut self) -> Option<PollTarget> {
        self.polling.take()
    }

    pub(crate) fn record_created(&mut self, kind: JobKind, job_id: String) {
        self.chain = Some(VersionChain::new(job_id.clone()));
        self.job = Some(Job::new(job_id.clone(), kind));
        self.active_id = Some(job_id);
        self.timeline.clear();
        self.set_stage(PipelineStage::Created);
    }

    pub(crate) fn job_mut(&mut self) -> Option<&mut Job> {
        self.job.as_mut()
    }

    pub(crate) fn export_mut(&mut self) -> Option<&mut ExportTask> {
        self.export.as_mut()
    }

    pub(crate) fn set_timeline(&mut self, steps: Vec<TimelineStep>) {
        self.timeline = steps;
    }

    /// Derives the next version id from the chain and tracks it as a new job.
    pub(crate) fn derive_version(&mut self) -> Option<String> {
        let derived = self.chain.as_mut()?.derive_next();
        self.job = Some(Job::new(derived.clone(), JobKind::ProjectJob));
        self.pending_version = Some(derived.clone());
        self.timeline.clear();
        Some(derived)
    }

    /// Makes the pending derived version the active id.
    pub(crate) fn promote_pending_version(&mut self) -> Option<&str> {
        let derived = self.pending_version.take()?;
        self.active_id = Some(derived);
        self.detail = None;
        self.active_id.as_deref()
    }

    pub(crate) fn set_export_quality(&mut self, quality: Quality) {
        self.export_quality = Some(quality);
    }

    pub(crate) fn export_quality(&self) -> Option<Quality> {
        self.export_quality
    }

    pub(crate) fn set_export(&mut self, export: ExportTask) {
        self.export = Some(export);
        self.dirty = true;
    }

    pub(crate) fn set_detail(&mut self, detail: JobDetail) {
        self.detail = Some(detail);
        self.dirty = true;
    }

    pub(crate) fn set_download(&mut self, file: DownloadedFile) {
        self.download = Some(file);
        self.dirty = true;
    }

    pub(crate) fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.note(TrailLevel::Error, message.clone());
        self.last_error = Some(message);
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Drops all pipeline state but keeps the diagnostic trail and the
    /// ticket counter.
    pub(crate) fn reset(&mut self) {
        let trail = std::mem::take(&mut self.trail);
        *self = Self {
            trail,
            last_ticket: self.last_ticket,
            ..Self::default()
        };
        self.note(TrailLevel::Info, "new pipeline");
    }
}
