use std::path::Path;

use cutflow_core::{CreateOptions, JobSource};
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;

use crate::error::map_reqwest_error;
use crate::RequestError;

/// Largest video the backend accepts.
pub const MAX_VIDEO_BYTES: u64 = 2 * 1024 * 1024 * 1024;

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn video_mime(path: &Path) -> Option<&'static str> {
    let ext = extension(path)?;
    VIDEO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Checks a job source before anything is sent: files exist, the video has a
/// supported container and fits the size limit.
pub fn validate_source(source: &JobSource) -> Result<(), RequestError> {
    match source {
        JobSource::Video { path, .. } => {
            if video_mime(path).is_none() {
                return Err(RequestError::InvalidRequest(format!(
                    "unsupported video format {}; use mp4, mov or avi",
                    path.display()
                )));
            }
            let meta = std::fs::metadata(path).map_err(|err| {
                RequestError::InvalidRequest(format!("cannot read {}: {err}", path.display()))
            })?;
            if !meta.is_file() {
                return Err(RequestError::InvalidRequest(format!(
                    "{} is not a file",
                    path.display()
                )));
            }
            if meta.len() > MAX_VIDEO_BYTES {
                return Err(RequestError::InvalidRequest(format!(
                    "{} is {} bytes; the limit is 2 GiB",
                    path.display(),
                    meta.len()
                )));
            }
            Ok(())
        }
        JobSource::Assembly {
            manifest, outline, ..
        } => {
            for path in std::iter::once(manifest).chain(outline.iter()) {
                if !path.is_file() {
                    return Err(RequestError::InvalidRequest(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
            }
            Ok(())
        }
    }
}

async fn file_part(path: &Path, mime: &str) -> Result<Part, RequestError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|err| RequestError::Io(format!("open {}: {err}", path.display())))?;
    let len = file
        .metadata()
        .await
        .map_err(|err| RequestError::Io(format!("stat {}: {err}", path.display())))?
        .len();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    Part::stream_with_length(body, len)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(map_reqwest_error)
}

fn options_form(options: &CreateOptions) -> Form {
    Form::new()
        .text("platform", options.platform.clone())
        .text("style", options.style.clone())
        .text("pace", options.pace.clone())
        .text("subtitle_density", options.subtitle_density.clone())
        .text("music_preference", options.music_preference.clone())
}

/// Builds the multipart body for a creation call. Called once per attempt,
/// since a streamed body cannot be replayed.
pub(crate) async fn creation_form(source: &JobSource) -> Result<Form, RequestError> {
    match source {
        JobSource::Video { path, options } => {
            let mime = video_mime(path).unwrap_or("application/octet-stream");
            let part = file_part(path, mime).await?;
            Ok(options_form(options).part("video", part))
        }
        JobSource::Assembly {
            manifest,
            outline,
            options,
        } => {
            let manifest_part = file_part(manifest, "application/json").await?;
            let mut form = options_form(options).part("assets_manifest", manifest_part);
            if let Some(outline) = outline {
                let outline_part = file_part(outline, "application/json").await?;
                form = form.part("script_outline", outline_part);
            }
            Ok(form)
        }
    }
}
