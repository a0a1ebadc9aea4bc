pub mod file;
pub mod memory;

pub use file::FileSink;
pub use memory::MemorySink;

use async_trait::async_trait;
use std::path::PathBuf;

/// Destination for deduplicated lines. Owned by exactly one writer task.
#[async_trait]
pub trait LineSink: Send {
    /// Append one line; the sink adds the line terminator.
    async fn append(&mut self, line: &str) -> Result<(), SinkError>;

    /// Flush buffered output and release the resource.
    async fn close(&mut self) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open output '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),

    #[error("sink already closed")]
    Closed,
}
