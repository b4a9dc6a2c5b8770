use cutflow_core::{JobDetail, JobStatus, JobSummary, StepStatus, TimelineStep};
use serde::Deserialize;
use serde_json::Value;

/// One status response, already mapped onto the core vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub steps: Vec<TimelineStep>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: JobStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            current_step: None,
            steps: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: u32,
    pub status: Option<JobStatus>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireStatus {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    current_step: Option<String>,
    #[serde(default)]
    steps: Option<Vec<WireStep>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStep {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<WireStatus> for StatusReport {
    fn from(wire: WireStatus) -> Self {
        let steps = wire
            .steps
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(idx, step)| TimelineStep {
                index: idx + 1,
                status: StepStatus::from_wire(step.status.as_deref().unwrap_or("pending")),
                message: step.message,
            })
            .collect();
        Self {
            status: JobStatus::from_wire(&wire.status),
            progress: clamp_progress(wire.progress),
            current_step: wire.current_step.filter(|step| !step.trim().is_empty()),
            steps,
            error: wire.error.filter(|error| !error.trim().is_empty()),
        }
    }
}

fn clamp_progress(raw: Option<f64>) -> u8 {
    match raw {
        Some(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCreated {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAdjusted {
    #[serde(default)]
    pub new_version: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireExportCreated {
    pub export_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireDetail {
    #[serde(default)]
    summary: Option<WireSummary>,
    #[serde(default)]
    preview_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSummary {
    #[serde(default)]
    hook: Option<Value>,
    #[serde(default)]
    pace: Option<Value>,
    #[serde(default)]
    music: Option<Value>,
    #[serde(default)]
    duration: Option<Value>,
}

impl From<WireDetail> for JobDetail {
    fn from(wire: WireDetail) -> Self {
        Self {
            summary: wire.summary.map(|summary| JobSummary {
                hook: summary.hook.as_ref().and_then(value_text),
                pace: summary.pace.as_ref().and_then(value_text),
                music: summary.music.as_ref().and_then(value_text),
                duration: summary.duration.as_ref().and_then(value_text),
            }),
            preview_url: wire.preview_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireVersions {
    #[serde(default)]
    pub versions: Vec<WireVersion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireVersion {
    version: u32,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    preview_url: Option<String>,
}

impl From<WireVersion> for VersionInfo {
    fn from(wire: WireVersion) -> Self {
        Self {
            version: wire.version,
            status: wire.status.as_deref().map(JobStatus::from_wire),
            preview_url: wire.preview_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

/// Renders a loosely typed JSON field as display text.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
