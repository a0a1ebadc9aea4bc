use crate::pipeline::{PipelineError, Receiver};
use crate::sink::LineSink;
use crate::source::Line;
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriterStats {
    pub lines: u64,
}

/// Run the output writer task.
///
/// Appends lines to the sink strictly in arrival order. Returns once the
/// line channel is closed and drained, after closing the sink. A sink error
/// ends the task immediately.
pub async fn run_writer(
    mut input: Receiver<Line>,
    mut sink: Box<dyn LineSink>,
    include_timestamps: bool,
) -> Result<WriterStats, PipelineError> {
    let mut stats = WriterStats::default();

    info!(include_timestamps, "Output writer started");

    while let Some(line) = input.recv().await {
        if let Err(e) = sink.append(line.render(include_timestamps)).await {
            error!(error = %e, written = stats.lines, "Failed to write line, stopping writer");
            return Err(e.into());
        }
        stats.lines += 1;
        if stats.lines % 10_000 == 0 {
            debug!(lines = stats.lines, "Writer progress");
        }
    }

    info!("Input channel closed, closing output");
    sink.close().await?;

    info!(lines = stats.lines, "Output writer shutdown complete");
    Ok(stats)
}
