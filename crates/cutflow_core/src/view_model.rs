use crate::{
    DownloadedFile, ExportTask, Job, JobDetail, JobKind, JobStatus, PipelineStage, TimelineStep,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineView {
    pub stage: PipelineStage,
    pub active_id: Option<String>,
    pub base_id: Option<String>,
    pub versions: Vec<u32>,
    pub job: Option<JobView>,
    pub timeline: Vec<TimelineStep>,
    pub export: Option<ExportTask>,
    pub detail: Option<JobDetail>,
    pub last_error: Option<String>,
    pub download: Option<DownloadedFile>,
    pub busy: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub step_label: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            kind: job.kind,
            status: job.status,
            progress: job.progress,
            step_label: job.current_step_label.clone(),
        }
    }
}
