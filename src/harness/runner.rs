use crate::harness::{Collector, CollectorError, HarnessError, PollResult};
use crate::pipeline::{create_channel, Sender};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Aggregate view of a harness run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    /// Poll results received, per collector
    pub polls: BTreeMap<String, u64>,
    /// Errors reported across all polls, per collector
    pub errors: BTreeMap<String, u64>,
    /// Collectors that stopped on a hard failure
    pub failed: Vec<String>,
}

impl HarnessReport {
    pub fn total_polls(&self) -> u64 {
        self.polls.values().sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.values().sum()
    }

    fn record(&mut self, result: &PollResult) {
        *self.polls.entry(result.collector_name.clone()).or_default() += 1;
        if !result.errors.is_empty() {
            *self.errors.entry(result.collector_name.clone()).or_default() +=
                result.errors.len() as u64;
        }
    }

    fn mark_failed(&mut self, name: &str) {
        if !self.failed.iter().any(|failed| failed == name) {
            self.failed.push(name.to_string());
        }
    }
}

/// Owns a set of collectors and polls each on its own cadence.
pub struct Harness {
    collectors: Vec<Box<dyn Collector>>,
    poll_count: Option<u64>,
    results_buffer: usize,
    shutdown: CancellationToken,
}

impl Harness {
    /// `shutdown` should be the token handed to the collectors, so cancelling
    /// it also shortens their in-flight polls.
    pub fn new(
        collectors: Vec<Box<dyn Collector>>,
        poll_count: Option<u64>,
        results_buffer: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            collectors,
            poll_count,
            results_buffer,
            shutdown,
        }
    }

    /// Start every collector, poll until `signal` resolves or every collector
    /// has finished, then clean all of them up.
    pub async fn run_until<F>(self, signal: F) -> Result<HarnessReport, HarnessError>
    where
        F: Future<Output = ()> + Send,
    {
        let Harness {
            collectors,
            poll_count,
            results_buffer,
            shutdown,
        } = self;

        let mut started: Vec<Box<dyn Collector>> = Vec::with_capacity(collectors.len());
        for mut collector in collectors {
            let name = collector.name().to_string();
            if let Err(source) = collector.start().await {
                error!(collector = %name, error = %source, "Failed to start collector");
                for mut running in started {
                    if let Err(e) = running.clean_up().await {
                        warn!(collector = %running.name(), error = %e, "Clean up failed");
                    }
                }
                return Err(HarnessError::Start { name, source });
            }
            info!(collector = %name, interval = ?collector.poll_interval(), "Collector started");
            started.push(collector);
        }

        let (results_tx, mut results_rx) = create_channel::<PollResult>(results_buffer);
        let handles: Vec<(String, JoinHandle<Result<(), CollectorError>>)> = started
            .into_iter()
            .map(|collector| {
                let name = collector.name().to_string();
                let handle = tokio::spawn(drive(
                    collector,
                    results_tx.clone(),
                    poll_count,
                    shutdown.clone(),
                ));
                (name, handle)
            })
            .collect();
        drop(results_tx);

        let mut report = HarnessReport::default();
        tokio::pin!(signal);
        let mut signalled = false;

        loop {
            tokio::select! {
                result = results_rx.recv() => match result {
                    Some(result) => {
                        for e in &result.errors {
                            if e.is_fatal() {
                                error!(collector = %result.collector_name, error = %e, "Collector failed");
                            } else {
                                warn!(collector = %result.collector_name, error = %e, "Poll reported error");
                            }
                        }
                        if result.has_fatal() {
                            report.mark_failed(&result.collector_name);
                        }
                        report.record(&result);
                    }
                    None => {
                        debug!("All collectors finished");
                        break;
                    }
                },
                _ = &mut signal, if !signalled => {
                    info!("Shutdown requested, stopping collectors");
                    signalled = true;
                    shutdown.cancel();
                }
            }
        }

        let joined = join_all(
            handles
                .into_iter()
                .map(|(name, handle)| async move { (name, handle.await) }),
        )
        .await;
        for (name, joined) in joined {
            match joined {
                Ok(Ok(())) => info!(collector = %name, "Collector stopped"),
                Ok(Err(e)) => {
                    error!(collector = %name, error = %e, "Collector clean up failed");
                    report.mark_failed(&name);
                }
                Err(e) => {
                    error!(collector = %name, error = %e, "Collector task panicked");
                    report.mark_failed(&name);
                }
            }
        }

        info!(
            polls = report.total_polls(),
            errors = report.total_errors(),
            failed = report.failed.len(),
            "Harness finished"
        );
        Ok(report)
    }
}

/// Poll one collector until cancelled, its poll budget is spent, or it fails.
async fn drive(
    mut collector: Box<dyn Collector>,
    results: Sender<PollResult>,
    poll_count: Option<u64>,
    shutdown: CancellationToken,
) -> Result<(), CollectorError> {
    let name = collector.name().to_string();
    let period = collector.poll_interval().max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = collector.poll().await;
        polls += 1;
        let fatal = result.has_fatal();
        if results.send(result).await.is_err() {
            break;
        }
        if fatal {
            break;
        }
        if poll_count.is_some_and(|count| polls >= count) {
            debug!(collector = %name, polls, "Poll count reached");
            break;
        }
    }

    // Let the rest of the system see this collector is done.
    drop(results);
    info!(collector = %name, polls, "Cleaning up collector");
    collector.clean_up().await
}
