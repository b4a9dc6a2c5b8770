use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cutflow_core::{DownloadedFile, Quality};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::RequestError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<DownloadError> for RequestError {
    fn from(err: DownloadError) -> Self {
        RequestError::Io(err.to_string())
    }
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), DownloadError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| DownloadError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(DownloadError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| DownloadError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// File name for a finished export: `cutflow_{export_id}_{quality}.mp4`.
pub fn export_filename(export_id: &str, quality: Quality) -> String {
    let mut cleaned: String = export_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        cleaned = "export".to_string();
    }
    format!("cutflow_{cleaned}_{}.mp4", quality.as_str())
}

/// Streams a download into a temp file next to its target and renames it into
/// place on [`finish`](Self::finish). Dropping it early leaves nothing behind.
///
/// Writes go through `tokio::fs`; directory setup, the rename and the
/// digest run off the async workers.
pub struct DownloadWriter {
    tmp: NamedTempFile,
    file: tokio::fs::File,
    target: PathBuf,
    hasher: Sha256,
    bytes: u64,
}

impl DownloadWriter {
    pub async fn create(dir: &Path, filename: &str) -> Result<Self, DownloadError> {
        let dir = dir.to_path_buf();
        let target = dir.join(filename);
        let tmp = blocking(move || {
            ensure_output_dir(&dir)?;
            NamedTempFile::new_in(&dir).map_err(|e| DownloadError::OutputDir(e.to_string()))
        })
        .await?;
        let file = tokio::fs::File::from_std(tmp.reopen()?);
        Ok(Self {
            tmp,
            file,
            target,
            hasher: Sha256::new(),
            bytes: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.file.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub async fn finish(self) -> Result<DownloadedFile, DownloadError> {
        let Self {
            tmp,
            mut file,
            target,
            hasher,
            bytes,
        } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        blocking(move || {
            // Replace existing file if present so reruns overwrite.
            if target.exists() {
                fs::remove_file(&target)?;
            }
            tmp.persist(&target).map_err(|e| DownloadError::Io(e.error))?;

            let digest = hasher.finalize();
            let mut sha256 = String::with_capacity(64);
            for byte in digest.iter() {
                let _ = write!(&mut sha256, "{byte:02x}");
            }
            Ok(DownloadedFile {
                path: target,
                bytes,
                sha256,
            })
        })
        .await
    }
}

async fn blocking<T, F>(work: F) -> Result<T, DownloadError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DownloadError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DownloadError::Io(io::Error::other(e)))?
}
