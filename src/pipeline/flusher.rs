use crate::collector::generations::{FlushOutput, GenerationStore};
use crate::collector::reconcile::ReconcileFault;
use crate::collector::slice::LineSlice;
use crate::pipeline::{PipelineError, Receiver, Sender};
use crate::source::Line;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Counters reported when the flusher exits
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlusherStats {
    pub slices: u64,
    pub flushes: u64,
    pub lines: u64,
    pub faults: u64,
}

/// Run the flush task.
///
/// Owns the generation store: stores every incoming slice, flushes ready
/// generations to `output`, and forwards reconciliation faults to `faults`.
/// When the slice channel closes, everything left is flushed and the task
/// returns, dropping `output` so the writer can finish.
pub async fn run_flusher(
    mut input: Receiver<LineSlice>,
    output: Sender<Line>,
    faults: Sender<ReconcileFault>,
    keep_generations: u32,
) -> Result<FlusherStats, PipelineError> {
    let mut store = GenerationStore::new(keep_generations);
    let mut stats = FlusherStats::default();

    info!(keep_generations, "Flusher started");

    while let Some(slice) = input.recv().await {
        debug!(
            generation = slice.generation(),
            lines = slice.len(),
            start = %slice.start(),
            end = %slice.end(),
            "Received slice"
        );
        stats.slices += 1;
        store.add(slice);

        while store.should_flush() {
            let flushed = store.flush();
            stats.flushes += 1;
            forward(flushed, &output, &faults, &mut stats).await?;
        }
    }

    info!(
        buckets = store.bucket_count(),
        "Input channel closed, flushing remaining generations"
    );
    let remaining = store.flush_all();
    stats.flushes += 1;
    forward(remaining, &output, &faults, &mut stats).await?;

    info!(
        slices = stats.slices,
        lines = stats.lines,
        faults = stats.faults,
        "Flusher shutdown complete"
    );
    Ok(stats)
}

async fn forward(
    flushed: FlushOutput,
    output: &Sender<Line>,
    faults: &Sender<ReconcileFault>,
    stats: &mut FlusherStats,
) -> Result<(), PipelineError> {
    for fault in flushed.faults {
        stats.faults += 1;
        match faults.try_send(fault) {
            Ok(()) => {}
            Err(TrySendError::Full(fault)) => {
                warn!(fault = %fault, "Fault channel full, fault only logged");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    let count = flushed.lines.len();
    for line in flushed.lines {
        output
            .send(line)
            .await
            .map_err(|_| PipelineError::ChannelSend)?;
    }
    stats.lines += count as u64;
    if count > 0 {
        debug!(lines = count, "Forwarded flushed lines");
    }
    Ok(())
}
