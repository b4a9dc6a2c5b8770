//! Terminal rendering of the pipeline view model.

use std::io::{self, Write};

use cutflow_core::{
    JobKind, JobStatus, PipelineState, PipelineView, StepStatus, TrailEntry, TrailLevel,
};
use cutflow_engine::ViewSink;

/// Prints a status line whenever it changes, plus every new trail entry.
#[derive(Default)]
pub struct TerminalView {
    shown: usize,
    last_status: String,
}

impl ViewSink for TerminalView {
    fn render(&mut self, state: &PipelineState) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let stamp = chrono::Local::now().format("%H:%M:%S");
        for entry in state.trail().since(self.shown) {
            let _ = writeln!(out, "[{stamp}] {}", trail_line(entry));
        }
        self.shown = state.trail().len();

        let status = status_line(&state.view());
        if status != self.last_status {
            let _ = writeln!(out, "[{stamp}] {status}");
            self.last_status = status;
        }
    }
}

fn trail_line(entry: &TrailEntry) -> String {
    match entry.level {
        TrailLevel::Info => entry.message.clone(),
        TrailLevel::Warn => format!("warning: {}", entry.message),
        TrailLevel::Error => format!("error: {}", entry.message),
    }
}

pub fn status_line(view: &PipelineView) -> String {
    let mut line = format!("[{}]", view.stage.label());
    if let Some(active) = &view.active_id {
        line.push_str(&format!(" {active}"));
    }
    if let Some(export) = &view.export {
        line.push_str(&format!(
            " | export {} {} {}%",
            export.id, export.quality, export.progress
        ));
    } else if let Some(job) = &view.job {
        line.push_str(&format!(
            " | {} {} {}% {}",
            kind_label(job.kind),
            job.id,
            job.progress,
            status_label(job.status)
        ));
        if let Some(step) = &job.step_label {
            line.push_str(&format!(" ({step})"));
        }
    }
    if !view.timeline.is_empty() {
        line.push(' ');
        line.push_str(&timeline_bar(view));
    }
    line
}

/// One glyph per step: `#` done, `>` running, `.` waiting.
fn timeline_bar(view: &PipelineView) -> String {
    view.timeline
        .iter()
        .map(|step| match step.status {
            StepStatus::Completed => '#',
            StepStatus::Active => '>',
            StepStatus::Pending => '.',
        })
        .collect()
}

/// Multi-line summary printed once the pipeline settles.
pub fn summary_lines(view: &PipelineView) -> Vec<String> {
    let mut lines = vec![format!("stage: {}", view.stage.label())];
    if let (Some(base), Some(active)) = (&view.base_id, &view.active_id) {
        lines.push(format!("project: {base} (active {active})"));
    }
    if !view.versions.is_empty() {
        let versions: Vec<String> = view.versions.iter().map(|v| format!("v{v}")).collect();
        lines.push(format!("versions: {}", versions.join(", ")));
    }
    if let Some(summary) = view.detail.as_ref().and_then(|detail| detail.summary.as_ref()) {
        let fields = [
            ("hook", &summary.hook),
            ("pace", &summary.pace),
            ("music", &summary.music),
            ("duration", &summary.duration),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                lines.push(format!("{name}: {value}"));
            }
        }
    }
    if let Some(url) = view.detail.as_ref().and_then(|detail| detail.preview_url.as_ref()) {
        lines.push(format!("preview: {url}"));
    }
    if let Some(file) = &view.download {
        lines.push(format!(
            "saved: {} ({} bytes, sha256 {})",
            file.path.display(),
            file.bytes,
            file.sha256
        ));
    }
    if let Some(error) = &view.last_error {
        lines.push(format!("last error: {error}"));
    }
    lines
}

fn kind_label(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ProjectJob => "project",
        JobKind::AssemblyJob => "assembly",
        JobKind::ExportJob => "export",
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Active => "running",
        JobStatus::Completed => "done",
        JobStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use cutflow_core::{
        DownloadedFile, ExportTask, JobDetail, JobSummary, JobView, PipelineStage, Quality,
        TimelineStep,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn step(index: usize, status: StepStatus) -> TimelineStep {
        TimelineStep {
            index,
            status,
            message: None,
        }
    }

    #[test]
    fn status_line_shows_job_progress_and_timeline() {
        let view = PipelineView {
            stage: PipelineStage::Created,
            active_id: Some("p1".into()),
            job: Some(JobView {
                id: "p1".into(),
                kind: JobKind::ProjectJob,
                status: JobStatus::Active,
                progress: 40,
                step_label: Some("audio_analysis".into()),
            }),
            timeline: vec![
                step(1, StepStatus::Completed),
                step(2, StepStatus::Active),
                step(3, StepStatus::Pending),
            ],
            ..PipelineView::default()
        };
        assert_eq!(
            status_line(&view),
            "[created] p1 | project p1 40% running (audio_analysis) #>."
        );
    }

    #[test]
    fn status_line_prefers_export_once_it_exists() {
        let view = PipelineView {
            stage: PipelineStage::Exporting,
            active_id: Some("p1_v1".into()),
            export: Some(ExportTask {
                id: "e1".into(),
                quality: Quality::UltraHd,
                status: JobStatus::Active,
                progress: 70,
            }),
            ..PipelineView::default()
        };
        assert_eq!(status_line(&view), "[exporting] p1_v1 | export e1 4k 70%");
    }

    #[test]
    fn summary_lists_versions_detail_and_download() {
        let view = PipelineView {
            stage: PipelineStage::Downloaded,
            active_id: Some("p1_v2".into()),
            base_id: Some("p1".into()),
            versions: vec![1, 2],
            detail: Some(JobDetail {
                summary: Some(JobSummary {
                    hook: Some("strong open".into()),
                    duration: Some("45".into()),
                    ..JobSummary::default()
                }),
                preview_url: None,
            }),
            download: Some(DownloadedFile {
                path: PathBuf::from("out/cutflow_e1_1080p.mp4"),
                bytes: 9,
                sha256: "abc".into(),
            }),
            ..PipelineView::default()
        };
        assert_eq!(
            summary_lines(&view),
            vec![
                "stage: downloaded".to_string(),
                "project: p1 (active p1_v2)".to_string(),
                "versions: v1, v2".to_string(),
                "hook: strong open".to_string(),
                "duration: 45".to_string(),
                "saved: out/cutflow_e1_1080p.mp4 (9 bytes, sha256 abc)".to_string(),
            ]
        );
    }

    #[test]
    fn trail_levels_are_prefixed() {
        let entry = TrailEntry {
            level: TrailLevel::Warn,
            message: "status query for p1 failed: timeout".into(),
        };
        assert_eq!(
            trail_line(&entry),
            "warning: status query for p1 failed: timeout"
        );
    }
}
