pub mod generations;
pub mod logs;
pub mod poller;
pub mod reconcile;
pub mod slice;

pub use generations::{FlushOutput, GenerationStore};
pub use logs::{LogsCollector, LOGS_COLLECTOR_NAME};
pub use poller::{CycleOutcome, CycleReport, PollClock, PollDriver, PollError, PollMark, PollSettings};
pub use reconcile::{reconcile_pair, reconcile_slices, Alignment, Conflict, Merged, ReconcileFault, Reconciled};
pub use slice::{Generation, LineSlice, SliceError};
