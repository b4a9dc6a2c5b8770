use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cutflow_core::{JobKind, JobStatus, PollTarget};
use cutflow_engine::{
    start_polling, PollObserver, PollSettings, RequestError, StatusQuery, StatusReport,
};
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Progress(JobStatus, u8),
    Terminal(Result<(), String>),
    Transient(String),
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl PollObserver for Recorder {
    fn on_progress(&self, _target: &PollTarget, report: &StatusReport) {
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Progress(report.status, report.progress));
    }

    fn on_terminal(&self, _target: &PollTarget, outcome: Result<(), String>) {
        self.seen.lock().unwrap().push(Seen::Terminal(outcome));
    }

    fn on_transient(&self, _target: &PollTarget, error: &RequestError) {
        self.seen
            .lock()
            .unwrap()
            .push(Seen::Transient(error.to_string()));
    }
}

/// Answers queries from a script; once the script runs out every query stays active.
struct Scripted {
    script: Mutex<VecDeque<Result<StatusReport, RequestError>>>,
    queries: Mutex<u32>,
}

impl Scripted {
    fn new(script: Vec<Result<StatusReport, RequestError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            queries: Mutex::new(0),
        }
    }

    fn queries(&self) -> u32 {
        *self.queries.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl StatusQuery for Scripted {
    async fn query(&self, _target: &PollTarget) -> Result<StatusReport, RequestError> {
        *self.queries.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatusReport::new(JobStatus::Active, 50)))
    }
}

fn target() -> PollTarget {
    PollTarget {
        kind: JobKind::ProjectJob,
        id: "p1".into(),
    }
}

fn failed(message: &str) -> StatusReport {
    StatusReport {
        error: Some(message.into()),
        ..StatusReport::new(JobStatus::Failed, 30)
    }
}

#[tokio::test(start_paused = true)]
async fn completed_status_stops_the_loop() {
    let query = Arc::new(Scripted::new(vec![
        Ok(StatusReport::new(JobStatus::Active, 40)),
        Ok(StatusReport::new(JobStatus::Completed, 100)),
    ]));
    let recorder = Arc::new(Recorder::default());

    let handle = start_polling(
        target(),
        query.clone(),
        PollSettings::default(),
        recorder.clone(),
    );
    handle.join().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        recorder.seen(),
        vec![
            Seen::Progress(JobStatus::Active, 40),
            Seen::Progress(JobStatus::Completed, 100),
            Seen::Terminal(Ok(())),
        ]
    );
    assert_eq!(query.queries(), 2);
}

#[tokio::test(start_paused = true)]
async fn ticks_at_the_configured_interval() {
    let query = Arc::new(Scripted::new(Vec::new()));
    let recorder = Arc::new(Recorder::default());
    let handle = start_polling(
        target(),
        query.clone(),
        PollSettings::default(),
        recorder.clone(),
    );

    tokio::time::sleep(Duration::from_millis(1999)).await;
    assert_eq!(query.queries(), 0);
    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(query.queries(), 1);
    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert_eq!(query.queries(), 3);
    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn transient_failure_does_not_stop_the_loop() {
    let query = Arc::new(Scripted::new(vec![
        Err(RequestError::Transport("connection reset".into())),
        Ok(StatusReport::new(JobStatus::Completed, 100)),
    ]));
    let recorder = Arc::new(Recorder::default());

    start_polling(
        target(),
        query.clone(),
        PollSettings::default(),
        recorder.clone(),
    )
    .join()
    .await;

    assert_eq!(
        recorder.seen(),
        vec![
            Seen::Transient("network error: connection reset".into()),
            Seen::Progress(JobStatus::Completed, 100),
            Seen::Terminal(Ok(())),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_status_carries_backend_message() {
    let query = Arc::new(Scripted::new(vec![Ok(failed("decode failed"))]));
    let recorder = Arc::new(Recorder::default());

    start_polling(
        target(),
        query.clone(),
        PollSettings::default(),
        recorder.clone(),
    )
    .join()
    .await;

    assert_eq!(
        recorder.seen().last(),
        Some(&Seen::Terminal(Err("decode failed".into())))
    );
    assert_eq!(query.queries(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_cap_escalates_when_configured() {
    let query = Arc::new(Scripted::new(vec![
        Err(RequestError::Transport("down".into())),
        Err(RequestError::Timeout(Duration::from_secs(30))),
        Err(RequestError::Transport("down".into())),
    ]));
    let recorder = Arc::new(Recorder::default());
    let settings = PollSettings {
        max_consecutive_failures: Some(3),
        ..PollSettings::default()
    };

    start_polling(target(), query.clone(), settings, recorder.clone())
        .join()
        .await;

    let seen = recorder.seen();
    assert_eq!(seen.len(), 4);
    assert!(matches!(
        seen.last(),
        Some(Seen::Terminal(Err(message))) if message.contains("3 times in a row")
    ));
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent_and_silences_the_loop() {
    let query = Arc::new(Scripted::new(Vec::new()));
    let recorder = Arc::new(Recorder::default());
    let handle = start_polling(
        target(),
        query.clone(),
        PollSettings::default(),
        recorder.clone(),
    );

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(recorder.seen().len(), 1);

    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancelled());
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(recorder.seen().len(), 1);
    assert_eq!(query.queries(), 1);
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_cancels() {
    let query = Arc::new(Scripted::new(Vec::new()));
    let recorder = Arc::new(Recorder::default());
    drop(start_polling(
        target(),
        query.clone(),
        PollSettings::default(),
        recorder.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(query.queries(), 0);
    assert!(recorder.seen().is_empty());
}
