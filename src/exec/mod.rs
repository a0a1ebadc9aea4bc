pub mod kubectl;

pub use kubectl::KubectlExec;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Live byte stream returned by a follow request.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Identifies the container whose logs are followed.
///
/// The pod is looked up by name prefix on every request, so a restarted pod
/// with a new suffix is picked up automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub namespace: String,
    pub pod_prefix: String,
    pub container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Look-back window, sent with whole-second granularity
    pub since: Duration,
    pub follow: bool,
    pub timestamps: bool,
}

impl LogOptions {
    pub fn follow_since(since: Duration) -> Self {
        Self {
            since,
            follow: true,
            timestamps: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("no pod with prefix '{prefix}' in namespace '{namespace}'")]
    PodNotFound { namespace: String, prefix: String },

    #[error("log stream for '{0}' has no stdout")]
    MissingStdout(String),
}

/// Remote execution capability used to fetch container logs.
#[async_trait]
pub trait ExecContext: Send + Sync {
    /// Start streaming the container's log from `options.since` ago.
    ///
    /// A returned stream may end early without error; callers treat that as a
    /// possible log rotation.
    async fn logs_since(
        &self,
        target: &ContainerRef,
        options: LogOptions,
    ) -> Result<LogStream, ExecError>;
}
