use crate::sink::{LineSink, SinkError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Appends lines to a file, creating it if needed.
///
/// Existing content is kept, so a restarted collector continues the same file.
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SinkError::Open {
                    path: path.clone(),
                    source,
                })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Opened output file");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended through this handle
    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl LineSink for FileSink {
    async fn append(&mut self, line: &str) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        self.written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.get_mut().sync_all().await?;
            debug!(path = %self.path.display(), lines = self.written, "Closed output file");
        }
        Ok(())
    }
}
