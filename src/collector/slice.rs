use crate::source::line::Line;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Polling epoch; slices sharing a generation come from one continuous log window.
pub type Generation = u32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceError {
    #[error("a line slice needs at least one line")]
    Empty,
}

/// One ordered batch of lines produced by a single poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSlice {
    /// Lines in arrival order (chronological)
    lines: Vec<Line>,

    /// Generation the producing cycle belonged to
    generation: Generation,
}

impl LineSlice {
    pub fn new(lines: Vec<Line>, generation: Generation) -> Result<Self, SliceError> {
        if lines.is_empty() {
            return Err(SliceError::Empty);
        }
        Ok(Self { lines, generation })
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Timestamp of the first line
    pub fn start(&self) -> DateTime<Utc> {
        self.lines[0].timestamp
    }

    /// Timestamp of the last line
    pub fn end(&self) -> DateTime<Utc> {
        self.lines[self.lines.len() - 1].timestamp
    }

    pub(crate) fn refile(&mut self, generation: Generation) {
        self.generation = generation;
    }
}
