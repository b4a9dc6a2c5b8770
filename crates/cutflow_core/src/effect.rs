use crate::{Adjustments, JobSource, PollTarget, Quality};

/// Issued with every one-shot call and echoed back in its result. A result
/// whose ticket is not the one in flight belongs to an abandoned call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallTicket(u64);

impl CallTicket {
    pub(crate) fn next(self) -> Self {
        CallTicket(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CreateJob {
        ticket: CallTicket,
        source: JobSource,
    },
    /// Start polling `target`; any loop already running is cancelled first.
    StartPolling(PollTarget),
    CancelPolling { job_id: String },
    FetchDetail { ticket: CallTicket, job_id: String },
    SubmitAdjustment {
        ticket: CallTicket,
        project_id: String,
        adjustments: Adjustments,
    },
    CreateExport {
        ticket: CallTicket,
        project_id: String,
        quality: Quality,
    },
    Download {
        ticket: CallTicket,
        export_id: String,
        quality: Quality,
    },
}

impl Effect {
    /// Ticket of the one-shot call this effect starts, if it starts one.
    pub fn ticket(&self) -> Option<CallTicket> {
        match self {
            Effect::CreateJob { ticket, .. }
            | Effect::FetchDetail { ticket, .. }
            | Effect::SubmitAdjustment { ticket, .. }
            | Effect::CreateExport { ticket, .. }
            | Effect::Download { ticket, .. } => Some(*ticket),
            Effect::StartPolling(_) | Effect::CancelPolling { .. } => None,
        }
    }
}

/// The one-shot network calls the pipeline makes, used to match a failure
/// back to the call that is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneShotCall {
    Create,
    FetchDetail,
    SubmitAdjustment,
    CreateExport,
    Download,
}

impl OneShotCall {
    pub fn label(self) -> &'static str {
        match self {
            OneShotCall::Create => "create job",
            OneShotCall::FetchDetail => "fetch detail",
            OneShotCall::SubmitAdjustment => "submit adjustment",
            OneShotCall::CreateExport => "create export",
            OneShotCall::Download => "download export",
        }
    }
}
