use crate::{
    Adjustments, CallTicket, DownloadedFile, JobDetail, JobKind, JobSource, JobStatus,
    OneShotCall, Quality, TimelineStep,
};

/// Why a one-shot call did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The backend answered with an error; the stage can be retried.
    Rejected(String),
    /// Every attempt failed at the transport level; the pipeline is lost.
    Exhausted(String),
}

impl CallFailure {
    pub fn message(&self) -> &str {
        match self {
            CallFailure::Rejected(message) | CallFailure::Exhausted(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User started a new pipeline from a video or an asset manifest.
    CreateRequested(JobSource),
    /// Backend accepted the creation call.
    JobCreated {
        ticket: CallTicket,
        kind: JobKind,
        job_id: String,
    },
    /// A one-shot call failed after its retry budget.
    CallFailed {
        ticket: CallTicket,
        call: OneShotCall,
        failure: CallFailure,
    },
    /// One status response from the active polling loop.
    PollProgress {
        job_id: String,
        status: JobStatus,
        progress: u8,
        step_label: Option<String>,
        steps: Vec<TimelineStep>,
    },
    /// The polling loop observed a terminal status and stopped.
    PollFinished {
        job_id: String,
        outcome: Result<(), String>,
    },
    /// A single status query failed; the loop keeps ticking.
    PollHiccup { job_id: String, message: String },
    /// Preview detail for a finished job.
    DetailLoaded {
        ticket: CallTicket,
        job_id: String,
        detail: JobDetail,
    },
    /// User asked for an adjustment of the reviewed result.
    AdjustRequested(Adjustments),
    /// Backend accepted an adjustment submission.
    AdjustmentAccepted {
        ticket: CallTicket,
        base_id: String,
        new_version: Option<u32>,
    },
    /// User confirmed export at the given quality.
    ExportRequested { quality: Quality },
    /// Backend created the export task.
    ExportCreated {
        ticket: CallTicket,
        export_id: String,
    },
    /// User asked to (re)try the download of a finished export.
    DownloadRequested,
    /// The exported file is on disk.
    DownloadFinished {
        ticket: CallTicket,
        export_id: String,
        file: DownloadedFile,
    },
    /// Drop the current pipeline and return to `Idle`.
    NewPipeline,
    /// Fallback for placeholder wiring.
    NoOp,
}
