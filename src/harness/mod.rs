//! Generic scheduling of independently paced collectors.

pub mod registry;
pub mod runner;

pub use registry::{builtin_registry, CollectorBuilder, CollectorRegistry, Inclusion};
pub use runner::{Harness, HarnessReport};

use crate::collector::poller::PollError;
use crate::collector::reconcile::ReconcileFault;
use crate::config::Config;
use crate::exec::ExecContext;
use crate::pipeline::PipelineError;
use crate::sink::SinkError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("poll failed: {0}")]
    Poll(#[from] PollError),

    #[error("reconciliation fault: {0}")]
    Reconcile(#[from] ReconcileFault),

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("output error: {0}")]
    Sink(#[from] SinkError),

    #[error("{0} task stopped unexpectedly")]
    TaskStopped(String),

    #[error("collector not started")]
    NotStarted,
}

impl CollectorError {
    /// Hard failures end the collector; everything else is reported and the
    /// next poll proceeds as usual.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectorError::Pipeline(_)
                | CollectorError::Sink(_)
                | CollectorError::TaskStopped(_)
                | CollectorError::NotStarted
        )
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("unknown collector '{0}'")]
    UnknownCollector(String),

    #[error("collector '{0}' is registered twice")]
    DuplicateCollector(String),

    #[error("failed to build collector '{name}': {source}")]
    Build {
        name: String,
        #[source]
        source: CollectorError,
    },

    #[error("failed to start collector '{name}': {source}")]
    Start {
        name: String,
        #[source]
        source: CollectorError,
    },
}

/// Outcome of one poll, sent back to the harness for aggregate reporting.
#[derive(Debug)]
pub struct PollResult {
    pub collector_name: String,
    pub errors: Vec<CollectorError>,
}

impl PollResult {
    pub fn new(collector_name: impl Into<String>) -> Self {
        Self {
            collector_name: collector_name.into(),
            errors: Vec::new(),
        }
    }

    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(CollectorError::is_fatal)
    }
}

/// Everything a collector builder may need.
#[derive(Clone)]
pub struct CollectorContext {
    pub config: Arc<Config>,
    pub exec: Arc<dyn ExecContext>,
    /// Cancelled once when the harness shuts down
    pub shutdown: CancellationToken,
}

#[async_trait]
pub trait Collector: Send {
    fn name(&self) -> &str;

    fn poll_interval(&self) -> Duration;

    async fn start(&mut self) -> Result<(), CollectorError>;

    async fn poll(&mut self) -> PollResult;

    /// Stop background work, draining everything already collected.
    async fn clean_up(&mut self) -> Result<(), CollectorError>;
}
