use std::path::PathBuf;
use std::time::Duration;

use cutflow_core::{Adjustments, CreateOptions, JobKind, JobSource, JobStatus, PollTarget, Quality};
use cutflow_engine::{Backend, BackendSettings, RequestError, ReqwestBackend, VersionInfo};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> ReqwestBackend {
    ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        connect_timeout: Duration::from_secs(2),
    })
    .expect("valid base url")
}

fn sample_video(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"fake mp4 bytes").unwrap();
    path
}

#[tokio::test]
async fn create_project_uploads_video_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/projects/create"))
        .and(body_string_contains("name=\"video\""))
        .and(body_string_contains("fake mp4 bytes"))
        .and(body_string_contains("name=\"platform\""))
        .and(body_string_contains("douyin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": "p1",
            "status": "processing",
            "message": "started"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = JobSource::Video {
        path: sample_video(&dir),
        options: CreateOptions::default(),
    };
    let id = backend(&server).create_job(&source).await.unwrap();
    assert_eq!(id, "p1");
}

#[tokio::test]
async fn create_assembly_sends_manifest_and_outline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/assembly/create"))
        .and(body_string_contains("name=\"assets_manifest\""))
        .and(body_string_contains("name=\"script_outline\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"project_id": "a1"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("assets.json");
    let outline = dir.path().join("outline.json");
    std::fs::write(&manifest, br#"{"assets": []}"#).unwrap();
    std::fs::write(&outline, br#"{"scenes": []}"#).unwrap();
    let source = JobSource::Assembly {
        manifest,
        outline: Some(outline),
        options: CreateOptions::default(),
    };
    assert_eq!(backend(&server).create_job(&source).await.unwrap(), "a1");
}

#[tokio::test]
async fn status_routes_by_job_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/assembly/a1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
            "progress": 40,
            "current_step": "material_matching"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/exports/e1/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "completed", "progress": 100})),
        )
        .mount(&server)
        .await;

    let backend = backend(&server);
    let assembly = backend
        .job_status(&PollTarget {
            kind: JobKind::AssemblyJob,
            id: "a1".into(),
        })
        .await
        .unwrap();
    assert_eq!(assembly.status, JobStatus::Active);
    assert_eq!(assembly.progress, 40);
    assert_eq!(assembly.current_step.as_deref(), Some("material_matching"));

    let export = backend
        .job_status(&PollTarget {
            kind: JobKind::ExportJob,
            id: "e1".into(),
        })
        .await
        .unwrap();
    assert_eq!(export.status, JobStatus::Completed);
}

#[tokio::test]
async fn application_error_uses_backend_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/nope/status"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Project not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/projects/bare/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let target = |id: &str| PollTarget {
        kind: JobKind::ProjectJob,
        id: id.into(),
    };
    assert_eq!(
        backend.job_status(&target("nope")).await,
        Err(RequestError::Application {
            status: 404,
            detail: "Project not found".into(),
        })
    );
    assert_eq!(
        backend.job_status(&target("bare")).await,
        Err(RequestError::Application {
            status: 503,
            detail: "503 Service Unavailable".into(),
        })
    );
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = backend(&server).job_detail("p1").await.unwrap_err();
    assert!(matches!(err, RequestError::Malformed(_)), "{err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn adjustment_posts_every_aspect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/projects/p1/adjust"))
        .and(body_json(json!({
            "adjustments": {
                "pace": "keep",
                "hook": "regenerate",
                "music": "keep",
                "subtitle": "keep"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": "p1",
            "new_version": 1,
            "status": "processing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut adjustments = Adjustments::default();
    adjustments.apply_pair("hook=regenerate").unwrap();
    let version = backend(&server)
        .submit_adjustment("p1", &adjustments)
        .await
        .unwrap();
    assert_eq!(version, Some(1));
}

#[tokio::test]
async fn export_goes_to_collection_route() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exports/"))
        .and(body_json(json!({"project_id": "p1", "quality": "4k"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "export_id": "export_p1_1",
            "status": "processing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = backend(&server)
        .create_export("p1", Quality::UltraHd)
        .await
        .unwrap();
    assert_eq!(id, "export_p1_1");
}

#[tokio::test]
async fn download_lands_atomically_with_digest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/exports/e1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"hello world".to_vec(), "video/mp4"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested");
    let file = backend(&server)
        .download_export("e1", Quality::FullHd, &out)
        .await
        .unwrap();

    assert_eq!(file.path, out.join("cutflow_e1_1080p.mp4"));
    assert_eq!(file.bytes, 11);
    assert_eq!(
        file.sha256,
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert_eq!(std::fs::read(&file.path).unwrap(), b"hello world");
}

#[tokio::test]
async fn failed_download_leaves_nothing_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/exports/e1/download"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"detail": "Export not ready"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = backend(&server)
        .download_export("e1", Quality::FullHd, dir.path())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RequestError::Application {
            status: 400,
            detail: "Export not ready".into(),
        }
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn versions_and_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/projects/p1/versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "project_id": "p1",
            "total_versions": 2,
            "versions": [
                {"version": 1, "status": "completed", "preview_url": "/api/projects/p1_v1/preview"},
                {"version": 2, "status": "processing"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let backend = backend(&server);
    assert_eq!(
        backend.list_versions("p1").await.unwrap(),
        vec![
            VersionInfo {
                version: 1,
                status: Some(JobStatus::Completed),
                preview_url: Some("/api/projects/p1_v1/preview".into()),
            },
            VersionInfo {
                version: 2,
                status: Some(JobStatus::Active),
                preview_url: None,
            },
        ]
    );
    assert_eq!(backend.health().await, Ok(()));
}

#[tokio::test]
async fn unreachable_backend_is_transient() {
    let backend = ReqwestBackend::new(BackendSettings {
        base_url: "http://127.0.0.1:9/".into(),
        connect_timeout: Duration::from_secs(2),
    })
    .unwrap();
    let err = backend.health().await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}
