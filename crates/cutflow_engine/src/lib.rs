//! Cutflow engine: backend access, retries, polling and effect execution.
mod backend;
mod download;
mod error;
mod orchestrator;
mod poll;
mod request;
mod types;
mod upload;

pub use backend::{Backend, BackendSettings, ReqwestBackend};
pub use download::{ensure_output_dir, export_filename, DownloadError, DownloadWriter};
pub use error::RequestError;
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorSettings, ViewSink};
pub use poll::{
    start_polling, ChannelObserver, PollHandle, PollObserver, PollSettings, StatusQuery,
};
pub use request::{send_timed, send_with_retry, RetryPolicy};
pub use types::{StatusReport, VersionInfo};
pub use upload::{validate_source, MAX_VIDEO_BYTES};
