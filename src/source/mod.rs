pub mod decoder;
pub mod line;

pub use decoder::LineDecoder;
pub use line::{Line, LineError, ProcessedLine};
