use crate::collector::poller::{PollClock, PollDriver, PollMark};
use crate::collector::reconcile::ReconcileFault;
use crate::config::LogsConfig;
use crate::exec::ExecContext;
use crate::harness::{Collector, CollectorContext, CollectorError, PollResult};
use crate::pipeline::{
    create_channel, run_flusher, run_writer, FlusherStats, PipelineError, Receiver, WriterStats,
};
use crate::sink::{FileSink, LineSink};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const LOGS_COLLECTOR_NAME: &str = "logs";

type TaskHandle<T> = JoinHandle<Result<T, PipelineError>>;

/// Follows one container log and writes it, deduplicated, to a sink.
///
/// `start` spawns the flusher and writer tasks; each `poll` runs one cycle of
/// the poll driver on the caller's task.
pub struct LogsCollector {
    config: LogsConfig,
    exec: Arc<dyn ExecContext>,
    shutdown: CancellationToken,
    clock: Arc<PollClock>,
    sink: Option<Box<dyn LineSink>>,
    driver: Option<PollDriver>,
    faults: Option<Receiver<ReconcileFault>>,
    flusher: Option<TaskHandle<FlusherStats>>,
    writer: Option<TaskHandle<WriterStats>>,
}

impl LogsCollector {
    pub fn new(
        config: LogsConfig,
        exec: Arc<dyn ExecContext>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            exec,
            shutdown,
            clock: Arc::new(PollClock::new(Utc::now())),
            sink: None,
            driver: None,
            faults: None,
            flusher: None,
            writer: None,
        }
    }

    /// Write to `sink` instead of opening the configured output file.
    pub fn with_sink(mut self, sink: Box<dyn LineSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(context: &CollectorContext) -> Result<Box<dyn Collector>, CollectorError> {
        Ok(Box::new(Self::new(
            context.config.logs.clone(),
            context.exec.clone(),
            context.shutdown.clone(),
        )))
    }

    /// Last successful poll time and current generation.
    pub fn mark(&self) -> PollMark {
        self.clock.snapshot()
    }

    /// Report a pipeline task that ended while the collector is running.
    async fn check_tasks(&mut self, errors: &mut Vec<CollectorError>) {
        if self.writer.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.writer.take() {
                errors.push(task_failure("writer", handle).await);
            }
        }
        if self.flusher.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.flusher.take() {
                errors.push(task_failure("flusher", handle).await);
            }
        }
    }
}

async fn task_failure<T>(task: &str, handle: TaskHandle<T>) -> CollectorError {
    match handle.await {
        Ok(Err(e)) => CollectorError::Pipeline(e),
        Ok(Ok(_)) => CollectorError::TaskStopped(task.to_string()),
        Err(e) => CollectorError::TaskStopped(format!("{} ({})", task, e)),
    }
}

async fn join_task<T>(task: &str, handle: Option<TaskHandle<T>>) -> Result<Option<T>, CollectorError> {
    let Some(handle) = handle else {
        return Ok(None);
    };
    match handle.await {
        Ok(Ok(stats)) => Ok(Some(stats)),
        Ok(Err(e)) => Err(CollectorError::Pipeline(e)),
        Err(e) => Err(CollectorError::TaskStopped(format!("{} ({})", task, e))),
    }
}

#[async_trait]
impl Collector for LogsCollector {
    fn name(&self) -> &str {
        LOGS_COLLECTOR_NAME
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    async fn start(&mut self) -> Result<(), CollectorError> {
        let sink: Box<dyn LineSink> = match self.sink.take() {
            Some(sink) => sink,
            None => Box::new(FileSink::open(&self.config.output).await?),
        };

        let (slice_tx, slice_rx) = create_channel(self.config.slice_buffer);
        let (line_tx, line_rx) = create_channel(self.config.line_buffer);
        let (fault_tx, fault_rx) = create_channel(self.config.fault_buffer);

        self.writer = Some(tokio::spawn(run_writer(
            line_rx,
            sink,
            self.config.include_timestamps,
        )));
        self.flusher = Some(tokio::spawn(run_flusher(
            slice_rx,
            line_tx,
            fault_tx,
            self.config.keep_generations,
        )));
        self.faults = Some(fault_rx);
        self.driver = Some(PollDriver::new(
            self.exec.clone(),
            self.config.target.clone(),
            self.config.poll_settings(),
            self.clock.clone(),
            slice_tx,
            self.shutdown.clone(),
        ));

        info!(
            namespace = %self.config.target.namespace,
            pod_prefix = %self.config.target.pod_prefix,
            container = %self.config.target.container,
            output = %self.config.output.display(),
            "Log collector started"
        );
        Ok(())
    }

    async fn poll(&mut self) -> PollResult {
        let mut result = PollResult::new(LOGS_COLLECTOR_NAME);

        self.check_tasks(&mut result.errors).await;
        if !result.errors.is_empty() {
            return result;
        }

        match self.driver.as_mut() {
            Some(driver) => match driver.poll_once().await {
                Ok(report) => {
                    if let Some(e) = report.read_error {
                        warn!(error = %e, lines = report.lines, "Log stream broke mid-cycle");
                        result.errors.push(e.into());
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Log poll failed, window retried next cycle");
                    result.errors.push(e.into());
                }
            },
            None => result.errors.push(CollectorError::NotStarted),
        }

        if let Some(faults) = self.faults.as_mut() {
            while let Ok(fault) = faults.try_recv() {
                result.errors.push(fault.into());
            }
        }

        result
    }

    async fn clean_up(&mut self) -> Result<(), CollectorError> {
        info!("Stopping log collector, draining pipeline");

        // Closing the slice channel lets the flusher run its final flush
        self.driver = None;
        let flushed = join_task("flusher", self.flusher.take()).await;
        let written = join_task("writer", self.writer.take()).await;

        if let Some(faults) = self.faults.as_mut() {
            while let Ok(fault) = faults.try_recv() {
                warn!(fault = %fault, "Reconciliation fault during final flush");
            }
        }
        self.faults = None;

        let flushed = flushed?;
        let written = written?;
        info!(
            slices = flushed.as_ref().map(|s| s.slices).unwrap_or_default(),
            lines = written.as_ref().map(|s| s.lines).unwrap_or_default(),
            generation = self.clock.generation(),
            "Log collector stopped"
        );
        Ok(())
    }
}
