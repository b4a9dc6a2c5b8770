use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

/// Which backend route family a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    ProjectJob,
    AssemblyJob,
    ExportJob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    /// Maps the backend's status vocabulary. Anything not recognised is
    /// treated as still running so the poll keeps going.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => JobStatus::Pending,
            "completed" | "done" => JobStatus::Completed,
            "error" | "failed" => JobStatus::Failed,
            _ => JobStatus::Active,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One backend-tracked unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step_label: Option<String>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            current_step_label: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
}

impl StepStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" | "done" => StepStatus::Completed,
            "active" | "processing" => StepStatus::Active,
            _ => StepStatus::Pending,
        }
    }
}

/// Backend-reported sub-step of a project job. Indices start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineStep {
    pub index: usize,
    pub status: StepStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "4k")]
    UltraHd,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::FullHd => "1080p",
            Quality::UltraHd => "4k",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1080p" | "1080" => Ok(Quality::FullHd),
            "4k" | "2160p" => Ok(Quality::UltraHd),
            other => Err(format!("unknown export quality '{other}' (expected 1080p or 4k)")),
        }
    }
}

/// Export job tracked separately from the edited project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTask {
    pub id: String,
    pub quality: Quality,
    pub status: JobStatus,
    pub progress: u8,
}

/// Either leave an aspect untouched or ask the backend for an action on it
/// (`"faster"`, `"regenerate"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(into = "String")]
pub enum AdjustAction {
    #[default]
    Keep,
    Action(String),
}

impl From<AdjustAction> for String {
    fn from(action: AdjustAction) -> Self {
        match action {
            AdjustAction::Keep => "keep".to_string(),
            AdjustAction::Action(value) => value,
        }
    }
}

impl From<&str> for AdjustAction {
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("keep") {
            AdjustAction::Keep
        } else {
            AdjustAction::Action(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Adjustments {
    pub pace: AdjustAction,
    pub hook: AdjustAction,
    pub music: AdjustAction,
    pub subtitle: AdjustAction,
}

impl Adjustments {
    /// Applies one `aspect=action` pair, e.g. `hook=regenerate`.
    pub fn apply_pair(&mut self, pair: &str) -> Result<(), String> {
        let (aspect, action) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected aspect=action, got '{pair}'"))?;
        let slot = match aspect.trim().to_ascii_lowercase().as_str() {
            "pace" => &mut self.pace,
            "hook" => &mut self.hook,
            "music" => &mut self.music,
            "subtitle" => &mut self.subtitle,
            other => return Err(format!("unknown adjustment aspect '{other}'")),
        };
        *slot = AdjustAction::from(action);
        Ok(())
    }

    pub fn is_noop(&self) -> bool {
        [&self.pace, &self.hook, &self.music, &self.subtitle]
            .iter()
            .all(|action| **action == AdjustAction::Keep)
    }
}

/// Editing preferences sent as form fields with every creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub platform: String,
    pub style: String,
    pub pace: String,
    pub subtitle_density: String,
    pub music_preference: String,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            platform: "douyin".to_string(),
            style: "viral".to_string(),
            pace: "medium".to_string(),
            subtitle_density: "standard".to_string(),
            music_preference: "emotional".to_string(),
        }
    }
}

/// What a new pipeline is created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Video {
        path: PathBuf,
        options: CreateOptions,
    },
    Assembly {
        manifest: PathBuf,
        outline: Option<PathBuf>,
        options: CreateOptions,
    },
}

impl JobSource {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSource::Video { .. } => JobKind::ProjectJob,
            JobSource::Assembly { .. } => JobKind::AssemblyJob,
        }
    }
}

/// Identifies what a polling loop is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollTarget {
    pub kind: JobKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobSummary {
    pub hook: Option<String>,
    pub pace: Option<String>,
    pub music: Option<String>,
    pub duration: Option<String>,
}

/// Preview information shown while reviewing a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobDetail {
    pub summary: Option<JobSummary>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}
