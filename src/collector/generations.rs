use crate::collector::reconcile::{reconcile_slices, Merged, ReconcileFault};
use crate::collector::slice::{Generation, LineSlice};
use crate::source::line::Line;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Lines released by a flush, plus any faults found while reconciling them.
#[derive(Debug, Default)]
pub struct FlushOutput {
    pub lines: Vec<Line>,
    pub faults: Vec<ReconcileFault>,
}

/// Buckets of line slices keyed by generation.
///
/// Not thread-safe; owned by the flush task. After every `flush` the newest
/// flushed coverage stays behind as a reference bucket so the next slices can
/// be matched against it.
#[derive(Debug)]
pub struct GenerationStore {
    buckets: BTreeMap<Generation, Vec<LineSlice>>,
    oldest: Generation,
    latest: Generation,
    window: u32,
}

impl GenerationStore {
    pub fn new(window: u32) -> Self {
        Self {
            buckets: BTreeMap::new(),
            oldest: 0,
            latest: 0,
            window,
        }
    }

    pub fn add(&mut self, mut slice: LineSlice) {
        if slice.generation() < self.oldest {
            warn!(
                generation = slice.generation(),
                oldest = self.oldest,
                "Late slice for an already flushed generation, filing under oldest"
            );
            slice.refile(self.oldest);
        }

        let generation = slice.generation();
        debug!(generation, lines = slice.len(), "Storing slice");
        self.buckets.entry(generation).or_default().push(slice);

        if generation > self.latest {
            self.latest = generation;
        }
    }

    /// True once the store spans more generations than the retention window
    /// and holds more buckets than the window size.
    pub fn should_flush(&self) -> bool {
        self.latest.saturating_sub(self.oldest) > self.window
            && self.buckets.len() > self.window as usize
    }

    /// Reconcile and release every generation up to `oldest + window`.
    ///
    /// The newest part of the result is kept as the reference bucket and is
    /// not returned.
    pub fn flush(&mut self) -> FlushOutput {
        if let Some(&first) = self.buckets.keys().next() {
            self.oldest = self.oldest.max(first);
        }
        let last = self.oldest.saturating_add(self.window);
        info!(oldest = self.oldest, up_to = last, "Flushing generations");

        let remaining = self.buckets.split_off(&last.saturating_add(1));
        let ready = std::mem::replace(&mut self.buckets, remaining);
        if ready.is_empty() {
            self.oldest = last;
            return FlushOutput::default();
        }

        let (merged, mut faults) = reconcile_generations(ready);
        let tail_generation = merged.tail_generation;
        faults.extend(merged.faults);

        // Advance by at least the window so sparse generations cannot stall
        self.oldest = tail_generation.max(last);
        if let Ok(reference) = LineSlice::new(merged.tail, tail_generation) {
            self.buckets.insert(tail_generation, vec![reference]);
        }

        debug!(
            lines = merged.settled.len(),
            faults = faults.len(),
            oldest = self.oldest,
            "Flush complete"
        );
        FlushOutput {
            lines: merged.settled,
            faults,
        }
    }

    /// Reconcile and release everything, leaving the store empty.
    pub fn flush_all(&mut self) -> FlushOutput {
        info!(buckets = self.buckets.len(), "Flushing all generations");
        let ready = std::mem::take(&mut self.buckets);
        let (merged, mut faults) = reconcile_generations(ready);
        faults.extend(merged.faults.iter().cloned());
        self.oldest = self.latest;

        FlushOutput {
            lines: merged.into_lines(),
            faults,
        }
    }

    pub fn oldest(&self) -> Generation {
        self.oldest
    }

    pub fn latest(&self) -> Generation {
        self.latest
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn slice_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Merge each generation's slices, then merge the generations oldest first.
fn reconcile_generations(
    buckets: BTreeMap<Generation, Vec<LineSlice>>,
) -> (Merged, Vec<ReconcileFault>) {
    let mut faults = Vec::new();
    let mut per_generation = Vec::with_capacity(buckets.len());

    for (generation, slices) in buckets {
        let merged = reconcile_slices(slices);
        faults.extend(merged.faults.iter().cloned());
        if let Ok(slice) = LineSlice::new(merged.into_lines(), generation) {
            per_generation.push(slice);
        }
    }

    (reconcile_slices(per_generation), faults)
}
