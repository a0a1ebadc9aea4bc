pub mod channel;
pub mod flusher;
pub mod writer;

pub use channel::{create_channel, Receiver, Sender};
pub use flusher::{run_flusher, FlusherStats};
pub use writer::{run_writer, WriterStats};

use crate::sink::SinkError;
use thiserror::Error;

/// Errors that end a pipeline task
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("output channel closed before the flusher finished")]
    ChannelSend,
}
