//! Cutflow core: pure pipeline state machine, version chain and view-model helpers.
mod effect;
mod job;
mod msg;
mod state;
mod trail;
mod update;
pub mod version;
mod view_model;

pub use effect::{CallTicket, Effect, OneShotCall};
pub use job::{
    AdjustAction, Adjustments, CreateOptions, DownloadedFile, ExportTask, Job, JobDetail, JobKind,
    JobSource, JobStatus, JobSummary, PollTarget, Quality, StepStatus, TimelineStep,
};
pub use msg::{CallFailure, Msg};
pub use state::{PipelineStage, PipelineState};
pub use trail::{DiagnosticTrail, TrailEntry, TrailLevel};
pub use update::update;
pub use version::{base_of, VersionChain};
pub use view_model::{JobView, PipelineView};
