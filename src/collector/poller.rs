//! One log request per poll tick.
//!
//! Each cycle moves through `Idle -> Requesting -> Streaming` and ends either
//! `Complete` (the stream was still open when the cycle's window closed) or
//! `Faulted` (the stream ended early). A faulted cycle still hands over what
//! it read, but the next cycle starts a new generation since the remote log
//! was probably rotated underneath us.

use crate::collector::slice::{Generation, LineSlice};
use crate::exec::{ContainerRef, ExecContext, ExecError, LogOptions};
use crate::source::{LineDecoder, ProcessedLine};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Read buffer size for the log stream
pub const STREAM_BUFFER_BYTES: usize = 2000;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("log request failed: {0}")]
    Exec(#[from] ExecError),

    #[error("log request did not return within {0:?}")]
    RequestTimeout(Duration),

    #[error("log stream read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("slice channel closed")]
    ChannelClosed,
}

/// Last successful poll time and current generation, read together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollMark {
    pub last_poll: DateTime<Utc>,
    pub generation: Generation,
}

/// Shared "last poll + generation" counter. Written only by the poll driver.
#[derive(Debug)]
pub struct PollClock {
    last_poll: RwLock<DateTime<Utc>>,
    generation: AtomicU32,
}

impl PollClock {
    /// Start one second in the past so the first request covers a real window.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_poll: RwLock::new(now - chrono::Duration::seconds(1)),
            generation: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> PollMark {
        let last_poll = *self
            .last_poll
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        PollMark {
            last_poll,
            generation: self.generation.load(Ordering::Acquire),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    fn advance(&self, to: DateTime<Utc>) {
        let mut last_poll = self
            .last_poll
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if to > *last_poll {
            *last_poll = to;
        }
    }

    /// Start a new generation, returning it.
    fn bump_generation(&self) -> Generation {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Timing knobs for one poll driver.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// How long one cycle keeps the stream open
    pub follow_duration: Duration,
    /// Cap on waiting for the request itself
    pub follow_timeout: Duration,
    /// Extra look-back added to the "since" window
    pub overlap: Duration,
    /// Completed cycles before a planned generation roll, 0 disables it
    pub rollover_cycles: u32,
    /// Longest an in-flight read continues after shutdown is requested
    pub shutdown_grace: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            follow_duration: Duration::from_secs(2),
            follow_timeout: Duration::from_secs(60),
            overlap: Duration::from_secs(1),
            rollover_cycles: 10,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Window elapsed, or a line past the window arrived
    Complete,
    /// Stream ended before the window elapsed
    Faulted,
}

/// What one cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Generation the emitted slice was tagged with
    pub generation: Generation,
    pub lines: usize,
    /// Lines dropped because they failed to parse
    pub rejected: usize,
    /// Mid-stream read failure; the lines read before it were still emitted
    pub read_error: Option<PollError>,
}

pub struct PollDriver {
    exec: Arc<dyn ExecContext>,
    target: ContainerRef,
    settings: PollSettings,
    clock: Arc<PollClock>,
    slices: mpsc::Sender<LineSlice>,
    shutdown: CancellationToken,
    completed_cycles: u32,
}

impl PollDriver {
    pub fn new(
        exec: Arc<dyn ExecContext>,
        target: ContainerRef,
        settings: PollSettings,
        clock: Arc<PollClock>,
        slices: mpsc::Sender<LineSlice>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            exec,
            target,
            settings,
            clock,
            slices,
            shutdown,
            completed_cycles: 0,
        }
    }

    pub fn clock(&self) -> &Arc<PollClock> {
        &self.clock
    }

    /// Run one full cycle.
    ///
    /// Request failures are returned as errors and leave the clock untouched,
    /// so the next cycle asks for the missed window again.
    pub async fn poll_once(&mut self) -> Result<CycleReport, PollError> {
        let mark = self.clock.snapshot();
        let started = Utc::now();
        let since = look_back(started, mark.last_poll, self.settings.overlap);
        debug!(
            generation = mark.generation,
            since_secs = since.as_secs(),
            "Requesting logs"
        );

        let request = self
            .exec
            .logs_since(&self.target, LogOptions::follow_since(since));
        let mut stream = match tokio::time::timeout(self.settings.follow_timeout, request).await {
            Ok(stream) => stream?,
            Err(_) => return Err(PollError::RequestTimeout(self.settings.follow_timeout)),
        };

        let expected_end = started
            + chrono::Duration::from_std(self.settings.follow_duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(2));
        let deadline = tokio::time::sleep_until(Instant::now() + self.settings.follow_duration);
        tokio::pin!(deadline);

        let mut decoder = LineDecoder::new();
        let mut buffer = vec![0u8; STREAM_BUFFER_BYTES];
        let mut collected = Collected::default();
        let mut read_error = None;
        let mut shutdown_seen = false;

        let outcome = loop {
            tokio::select! {
                read = stream.read(&mut buffer) => match read {
                    Ok(0) => {
                        if let Some(partial) = decoder.finish() {
                            collected.admit(&partial, expected_end);
                        }
                        break CycleOutcome::Faulted;
                    }
                    Ok(n) => {
                        let mut past_window = false;
                        for raw in decoder.feed(&buffer[..n]) {
                            past_window |= collected.admit(&raw, expected_end);
                        }
                        if past_window {
                            debug!("Line past the cycle window, ending stream");
                            break CycleOutcome::Complete;
                        }
                    }
                    Err(e) => {
                        read_error = Some(PollError::Read(e));
                        break CycleOutcome::Faulted;
                    }
                },
                _ = &mut deadline => break CycleOutcome::Complete,
                _ = self.shutdown.cancelled(), if !shutdown_seen => {
                    shutdown_seen = true;
                    let grace = Instant::now() + self.settings.shutdown_grace;
                    if grace < deadline.deadline() {
                        deadline.as_mut().reset(grace);
                    }
                }
            }
        };
        drop(stream);

        let generation = mark.generation;
        let lines = collected.lines.len();
        if let Some(received) = collected.last_received {
            if let Ok(slice) = LineSlice::new(collected.lines, generation) {
                self.slices
                    .send(slice)
                    .await
                    .map_err(|_| PollError::ChannelClosed)?;
            }
            self.clock.advance(received);
        }

        match outcome {
            CycleOutcome::Faulted if lines == 0 && read_error.is_some() => {
                // Transport failure, not a rotation: retry the same window
                self.completed_cycles = 0;
                warn!(generation, "Log stream failed before any line arrived, coverage gap");
            }
            CycleOutcome::Faulted => {
                self.completed_cycles = 0;
                let next = self.clock.bump_generation();
                info!(
                    generation,
                    next_generation = next,
                    lines,
                    "Log stream ended early, suspected rotation"
                );
            }
            CycleOutcome::Complete => {
                self.completed_cycles += 1;
                let rollover = self.settings.rollover_cycles;
                if rollover > 0 && self.completed_cycles >= rollover {
                    self.completed_cycles = 0;
                    let next = self.clock.bump_generation();
                    debug!(generation, next_generation = next, "Planned generation rollover");
                }
            }
        }

        if collected.rejected > 0 {
            warn!(rejected = collected.rejected, "Dropped unparsable lines this cycle");
        }
        debug!(generation, lines, outcome = ?outcome, "Poll cycle finished");

        Ok(CycleReport {
            outcome,
            generation,
            lines,
            rejected: collected.rejected,
            read_error,
        })
    }
}

#[derive(Default)]
struct Collected {
    lines: Vec<crate::source::Line>,
    rejected: usize,
    last_received: Option<DateTime<Utc>>,
}

impl Collected {
    /// Parse and keep one raw line. Returns true when the line lies past the
    /// cycle's expected end.
    fn admit(&mut self, raw: &str, expected_end: DateTime<Utc>) -> bool {
        if raw.trim().is_empty() {
            return false;
        }
        match ProcessedLine::parse(raw) {
            Ok(line) => {
                let past_window = line.timestamp > expected_end;
                self.lines.push(Arc::new(line));
                self.last_received = Some(Utc::now());
                past_window
            }
            Err(e) => {
                warn!(error = %e, "Failed to process line");
                self.rejected += 1;
                false
            }
        }
    }
}

/// Window to request: time since the last poll plus the overlap, rounded up
/// to whole seconds, at least one second.
pub fn look_back(now: DateTime<Utc>, last_poll: DateTime<Utc>, overlap: Duration) -> Duration {
    let elapsed = (now - last_poll).to_std().unwrap_or(Duration::ZERO) + overlap;
    let mut secs = elapsed.as_secs();
    if elapsed.subsec_nanos() > 0 {
        secs += 1;
    }
    Duration::from_secs(secs.max(1))
}
