use crate::trail::TrailLevel;
use crate::{
    CallFailure, CallTicket, Effect, ExportTask, JobKind, JobStatus, Msg, OneShotCall,
    PipelineStage, PipelineState, PollTarget, TimelineStep,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: PipelineState, msg: Msg) -> (PipelineState, Vec<Effect>) {
    let effects = match msg {
        Msg::CreateRequested(source) => {
            if state.stage() != PipelineStage::Idle || state.is_busy() {
                state.note(
                    TrailLevel::Warn,
                    "create ignored: this session already has a pipeline",
                );
                Vec::new()
            } else {
                state.clear_error();
                let ticket = state.begin_call(OneShotCall::Create);
                state.note(
                    TrailLevel::Info,
                    format!("creating {} job", kind_label(source.kind())),
                );
                vec![Effect::CreateJob { ticket, source }]
            }
        }
        Msg::JobCreated {
            ticket,
            kind,
            job_id,
        } => {
            if state.stage() != PipelineStage::Idle
                || !state.finish_call(OneShotCall::Create, ticket)
            {
                return (state, Vec::new());
            }
            state.note(TrailLevel::Info, format!("job created (id {job_id})"));
            state.record_created(kind, job_id.clone());
            let target = PollTarget { kind, id: job_id };
            state.start_polling(target.clone());
            vec![Effect::StartPolling(target)]
        }
        Msg::CallFailed {
            ticket,
            call,
            failure,
        } => on_call_failed(&mut state, ticket, call, failure),
        Msg::PollProgress {
            job_id,
            status,
            progress,
            step_label,
            steps,
        } => {
            apply_progress(&mut state, &job_id, status, progress, step_label, steps);
            Vec::new()
        }
        Msg::PollFinished { job_id, outcome } => on_poll_finished(&mut state, job_id, outcome),
        Msg::PollHiccup { job_id, message } => {
            if state.is_polling(&job_id) {
                state.note(
                    TrailLevel::Warn,
                    format!("status query for {job_id} failed: {message}"),
                );
            }
            Vec::new()
        }
        Msg::DetailLoaded {
            ticket,
            job_id,
            detail,
        } => {
            if state.finish_call(OneShotCall::FetchDetail, ticket)
                && state.active_id() == Some(job_id.as_str())
            {
                state.set_detail(detail);
                state.note(TrailLevel::Info, format!("preview ready for {job_id}"));
            }
            Vec::new()
        }
        Msg::AdjustRequested(adjustments) => {
            if state.stage() != PipelineStage::Reviewing {
                state.note(TrailLevel::Warn, "adjustment ignored: nothing to review");
                Vec::new()
            } else if state.is_busy_beyond_detail() {
                state.note(
                    TrailLevel::Warn,
                    "adjustment ignored: another request is still running",
                );
                Vec::new()
            } else if adjustments.is_noop() {
                state.note(TrailLevel::Warn, "adjustment ignored: every aspect is keep");
                Vec::new()
            } else {
                let project_id = state.base_id().unwrap_or_default().to_string();
                state.clear_error();
                state.set_stage(PipelineStage::Adjusting);
                let ticket = state.begin_call(OneShotCall::SubmitAdjustment);
                vec![Effect::SubmitAdjustment {
                    ticket,
                    project_id,
                    adjustments,
                }]
            }
        }
        Msg::AdjustmentAccepted {
            ticket,
            base_id,
            new_version,
        } => {
            if state.stage() != PipelineStage::Adjusting
                || state.base_id() != Some(base_id.as_str())
                || !state.finish_call(OneShotCall::SubmitAdjustment, ticket)
            {
                return (state, Vec::new());
            }
            let expected = state.chain().map(|chain| chain.latest().saturating_add(1));
            if let (Some(reported), Some(expected)) = (new_version, expected) {
                if reported != expected {
                    // The derived id would name a job the backend never created.
                    state.set_error(format!(
                        "submit adjustment failed: backend created version {reported} \
                         of {base_id}, expected version {expected}"
                    ));
                    state.set_stage(PipelineStage::Reviewing);
                    return (state, Vec::new());
                }
            }
            let Some(derived) = state.derive_version() else {
                return (state, Vec::new());
            };
            state.note(TrailLevel::Info, format!("regenerating as {derived}"));
            let target = PollTarget {
                kind: JobKind::ProjectJob,
                id: derived,
            };
            state.start_polling(target.clone());
            vec![Effect::StartPolling(target)]
        }
        Msg::ExportRequested { quality } => {
            if state.stage() != PipelineStage::Reviewing {
                state.note(TrailLevel::Warn, "export ignored: nothing to export");
                Vec::new()
            } else if state.is_busy_beyond_detail() {
                state.note(
                    TrailLevel::Warn,
                    "export ignored: another request is still running",
                );
                Vec::new()
            } else {
                let project_id = state.base_id().unwrap_or_default().to_string();
                state.clear_error();
                state.set_export_quality(quality);
                state.set_stage(PipelineStage::Exporting);
                let ticket = state.begin_call(OneShotCall::CreateExport);
                vec![Effect::CreateExport {
                    ticket,
                    project_id,
                    quality,
                }]
            }
        }
        Msg::ExportCreated { ticket, export_id } => {
            if state.stage() != PipelineStage::Exporting
                || !state.finish_call(OneShotCall::CreateExport, ticket)
            {
                return (state, Vec::new());
            }
            let quality = state.export_quality().unwrap_or_default();
            state.set_export(ExportTask {
                id: export_id.clone(),
                quality,
                status: JobStatus::Pending,
                progress: 0,
            });
            state.note(TrailLevel::Info, format!("export created (id {export_id})"));
            let target = PollTarget {
                kind: JobKind::ExportJob,
                id: export_id,
            };
            state.start_polling(target.clone());
            vec![Effect::StartPolling(target)]
        }
        Msg::DownloadRequested => {
            let ready = state
                .export()
                .filter(|export| export.status == JobStatus::Completed)
                .map(|export| (export.id.clone(), export.quality));
            match ready {
                Some((export_id, quality))
                    if state.stage() == PipelineStage::Exporting && !state.is_busy() =>
                {
                    state.clear_error();
                    let ticket = state.begin_call(OneShotCall::Download);
                    vec![Effect::Download {
                        ticket,
                        export_id,
                        quality,
                    }]
                }
                _ => {
                    state.note(TrailLevel::Warn, "download ignored: no finished export");
                    Vec::new()
                }
            }
        }
        Msg::DownloadFinished {
            ticket,
            export_id,
            file,
        } => {
            if state.stage() != PipelineStage::Exporting
                || !state.finish_call(OneShotCall::Download, ticket)
            {
                return (state, Vec::new());
            }
            state.note(
                TrailLevel::Info,
                format!(
                    "export {export_id} saved to {} ({} bytes)",
                    file.path.display(),
                    file.bytes
                ),
            );
            state.set_download(file);
            state.set_stage(PipelineStage::Downloaded);
            Vec::new()
        }
        Msg::NewPipeline => {
            let polled = state.stop_polling();
            state.reset();
            polled
                .map(|target| Effect::CancelPolling { job_id: target.id })
                .into_iter()
                .collect()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn apply_progress(
    state: &mut PipelineState,
    job_id: &str,
    status: JobStatus,
    progress: u8,
    step_label: Option<String>,
    steps: Vec<TimelineStep>,
) {
    if !state.is_polling(job_id) {
        return;
    }
    let kind = state.polling().map(|target| target.kind);
    let progress = progress.min(100);
    if kind == Some(JobKind::ExportJob) {
        if let Some(export) = state.export_mut().filter(|export| export.id == job_id) {
            export.status = status;
            export.progress = progress;
        }
    } else {
        let mut project_steps = false;
        if let Some(job) = state.job_mut().filter(|job| job.id == job_id) {
            job.status = status;
            job.progress = progress;
            if step_label.is_some() {
                job.current_step_label = step_label;
            }
            project_steps = job.kind == JobKind::ProjectJob;
        }
        if project_steps && !steps.is_empty() {
            state.set_timeline(steps);
        }
    }
    state.mark_dirty();
}

fn on_poll_finished(
    state: &mut PipelineState,
    job_id: String,
    outcome: Result<(), String>,
) -> Vec<Effect> {
    if !state.is_polling(&job_id) {
        return Vec::new();
    }
    state.stop_polling();

    match outcome {
        Ok(()) => {
            mark_terminal(state, &job_id, JobStatus::Completed, None);
            match state.stage() {
                PipelineStage::Created => {
                    state.set_stage(PipelineStage::Reviewing);
                    let ticket = state.begin_call(OneShotCall::FetchDetail);
                    vec![Effect::FetchDetail { ticket, job_id }]
                }
                PipelineStage::Adjusting => {
                    let Some(active) = state.promote_pending_version().map(ToOwned::to_owned)
                    else {
                        return Vec::new();
                    };
                    state.note(TrailLevel::Info, format!("active version is now {active}"));
                    state.set_stage(PipelineStage::Reviewing);
                    let ticket = state.begin_call(OneShotCall::FetchDetail);
                    vec![Effect::FetchDetail {
                        ticket,
                        job_id: active,
                    }]
                }
                PipelineStage::Exporting => {
                    let quality = state
                        .export()
                        .map(|export| export.quality)
                        .unwrap_or_default();
                    state.note(TrailLevel::Info, format!("export {job_id} finished"));
                    let ticket = state.begin_call(OneShotCall::Download);
                    vec![Effect::Download {
                        ticket,
                        export_id: job_id,
                        quality,
                    }]
                }
                _ => Vec::new(),
            }
        }
        Err(message) => {
            let message = if message.trim().is_empty() {
                format!("job {job_id} failed")
            } else {
                message
            };
            mark_terminal(state, &job_id, JobStatus::Failed, Some(&message));
            state.set_error(message);
            state.set_stage(PipelineStage::Failed);
            Vec::new()
        }
    }
}

fn mark_terminal(state: &mut PipelineState, job_id: &str, status: JobStatus, error: Option<&str>) {
    if let Some(job) = state.job_mut().filter(|job| job.id == job_id) {
        job.status = status;
        if status == JobStatus::Completed {
            job.progress = 100;
        }
        job.error = error.map(ToOwned::to_owned);
    }
    if let Some(export) = state.export_mut().filter(|export| export.id == job_id) {
        export.status = status;
        if status == JobStatus::Completed {
            export.progress = 100;
        }
    }
}

fn on_call_failed(
    state: &mut PipelineState,
    ticket: CallTicket,
    call: OneShotCall,
    failure: CallFailure,
) -> Vec<Effect> {
    if !state.finish_call(call, ticket) {
        return Vec::new();
    }
    if call == OneShotCall::FetchDetail {
        state.note(
            TrailLevel::Warn,
            format!("preview detail unavailable: {}", failure.message()),
        );
        return Vec::new();
    }

    state.set_error(format!("{} failed: {}", call.label(), failure.message()));
    match failure {
        CallFailure::Rejected(_) => {
            // Only the attempted transition is undone; the session stays usable.
            match call {
                OneShotCall::SubmitAdjustment | OneShotCall::CreateExport => {
                    state.set_stage(PipelineStage::Reviewing);
                }
                OneShotCall::Create | OneShotCall::Download | OneShotCall::FetchDetail => {}
            }
            Vec::new()
        }
        CallFailure::Exhausted(_) => {
            let polled = state.stop_polling();
            state.set_stage(PipelineStage::Failed);
            polled
                .map(|target| Effect::CancelPolling { job_id: target.id })
                .into_iter()
                .collect()
        }
    }
}

fn kind_label(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ProjectJob => "project",
        JobKind::AssemblyJob => "assembly",
        JobKind::ExportJob => "export",
    }
}
