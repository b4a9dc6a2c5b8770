use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use cutflow_core::{Adjustments, DownloadedFile, JobDetail, JobKind, JobSource, PollTarget, Quality};
use futures_util::StreamExt;
use pipeline_logging::pipeline_debug;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::download::{export_filename, DownloadWriter};
use crate::error::map_reqwest_error;
use crate::types::{
    value_text, WireAdjusted, WireCreated, WireDetail, WireErrorBody, WireExportCreated,
    WireStatus, WireVersions,
};
use crate::upload::creation_form;
use crate::{RequestError, StatusReport, VersionInfo};

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// The remote video-editing service. Every method is a single request; the
/// caller owns deadlines and retries.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn create_job(&self, source: &JobSource) -> Result<String, RequestError>;

    async fn job_status(&self, target: &PollTarget) -> Result<StatusReport, RequestError>;

    async fn job_detail(&self, job_id: &str) -> Result<JobDetail, RequestError>;

    /// Returns the version number the backend assigned, when it reports one.
    async fn submit_adjustment(
        &self,
        project_id: &str,
        adjustments: &Adjustments,
    ) -> Result<Option<u32>, RequestError>;

    async fn create_export(&self, project_id: &str, quality: Quality) -> Result<String, RequestError>;

    async fn download_export(
        &self,
        export_id: &str,
        quality: Quality,
        output_dir: &Path,
    ) -> Result<DownloadedFile, RequestError>;

    async fn list_versions(&self, base_id: &str) -> Result<Vec<VersionInfo>, RequestError>;

    async fn health(&self) -> Result<(), RequestError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    base_url: Url,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, RequestError> {
        let mut base_url = Url::parse(&settings.base_url).map_err(|err| {
            RequestError::InvalidRequest(format!("invalid base url {}: {err}", settings.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RequestError::InvalidRequest(format!(
                "{base_url} cannot be used as a base url"
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RequestError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                RequestError::InvalidRequest(format!("{} cannot be a base url", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RequestError> {
        pipeline_debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        pipeline_debug!("POST {}", url);
        let payload =
            serde_json::to_vec(body).map_err(|err| RequestError::InvalidRequest(err.to_string()))?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }
}

fn route_family(kind: JobKind) -> &'static str {
    match kind {
        JobKind::ProjectJob => "projects",
        JobKind::AssemblyJob => "assembly",
        JobKind::ExportJob => "exports",
    }
}

/// Turns a non-success response into `Application`, preferring the backend's
/// own `detail` message over the status text.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let detail = serde_json::from_slice::<WireErrorBody>(&body)
        .ok()
        .and_then(|wire| wire.detail)
        .and_then(|detail| value_text(&detail))
        .filter(|detail| !detail.trim().is_empty())
        .unwrap_or_else(|| status.to_string());
    Err(RequestError::Application {
        status: status.as_u16(),
        detail,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RequestError> {
    let response = check_status(response).await?;
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&body).map_err(|err| RequestError::Malformed(err.to_string()))
}

#[derive(Serialize)]
struct AdjustBody<'a> {
    adjustments: &'a Adjustments,
}

#[derive(Serialize)]
struct ExportBody<'a> {
    project_id: &'a str,
    quality: Quality,
}

#[async_trait::async_trait]
impl Backend for ReqwestBackend {
    async fn create_job(&self, source: &JobSource) -> Result<String, RequestError> {
        let url = self.endpoint(&["api", route_family(source.kind()), "create"])?;
        let form = creation_form(source).await?;
        pipeline_debug!("POST {} (multipart)", url);
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let created: WireCreated = read_json(response).await?;
        Ok(created.project_id)
    }

    async fn job_status(&self, target: &PollTarget) -> Result<StatusReport, RequestError> {
        let url = self.endpoint(&["api", route_family(target.kind), &target.id, "status"])?;
        let wire: WireStatus = self.get_json(url).await?;
        Ok(wire.into())
    }

    async fn job_detail(&self, job_id: &str) -> Result<JobDetail, RequestError> {
        let url = self.endpoint(&["api", "projects", job_id])?;
        let wire: WireDetail = self.get_json(url).await?;
        Ok(wire.into())
    }

    async fn submit_adjustment(
        &self,
        project_id: &str,
        adjustments: &Adjustments,
    ) -> Result<Option<u32>, RequestError> {
        let url = self.endpoint(&["api", "projects", project_id, "adjust"])?;
        let accepted: WireAdjusted = self.post_json(url, &AdjustBody { adjustments }).await?;
        Ok(accepted.new_version)
    }

    async fn create_export(&self, project_id: &str, quality: Quality) -> Result<String, RequestError> {
        let url = self.endpoint(&["api", "exports", ""])?;
        let created: WireExportCreated = self
            .post_json(url, &ExportBody {
                project_id,
                quality,
            })
            .await?;
        Ok(created.export_id)
    }

    async fn download_export(
        &self,
        export_id: &str,
        quality: Quality,
        output_dir: &Path,
    ) -> Result<DownloadedFile, RequestError> {
        let url = self.endpoint(&["api", "exports", export_id, "download"])?;
        pipeline_debug!("GET {} -> {}", url, output_dir.display());
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        let response = check_status(response).await?;

        let filename = export_filename(export_id, quality);
        let mut writer = DownloadWriter::create(output_dir, &filename).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk.map_err(map_reqwest_error)?;
            writer.write_chunk(&chunk).await?;
        }
        Ok(writer.finish().await?)
    }

    async fn list_versions(&self, base_id: &str) -> Result<Vec<VersionInfo>, RequestError> {
        let url = self.endpoint(&["api", "projects", base_id, "versions"])?;
        let wire: WireVersions = self.get_json(url).await?;
        Ok(wire.versions.into_iter().map(VersionInfo::from).collect())
    }

    async fn health(&self) -> Result<(), RequestError> {
        let url = self.endpoint(&["health"])?;
        pipeline_debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        check_status(response).await.map(|_| ())
    }
}
