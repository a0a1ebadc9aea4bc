//! Overlap reconciliation between temporally adjacent line slices.
//!
//! Consecutive polls ask for "everything since the last poll", so each new
//! slice repeats the tail of the previous one. Reconciliation finds where the
//! newer slice starts inside the older one, checks the claimed overlap line by
//! line, and keeps the newer copy of the shared region:
//!
//! ```text
//! reference  A: a0 a1 a2 a3 a4
//! incoming   B:       a2 a3 a4 b0 b1
//! merged      : a0 a1 a2 a3 a4 b0 b1
//!                     ^ anchor
//! ```
//!
//! Everything before the anchor is settled; everything from the anchor on is
//! still the newest coverage and may overlap whatever the next poll returns.

use crate::collector::slice::{Generation, LineSlice};
use crate::source::line::Line;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Lines shown on each side of a conflicting line in fault reports
const CONTEXT_LINES: usize = 2;

/// How an incoming sequence lines up against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Incoming starts at `at` in the reference and reaches at least its end
    Overlap { at: usize },
    /// Incoming is a contiguous run inside the reference, which extends past it
    Contained { at: usize },
    /// The reference starts at `at` inside the incoming sequence
    Covered { at: usize },
    /// No common line
    Disjoint,
}

/// The first divergence inside a claimed overlap, with surrounding lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub reference_index: usize,
    pub incoming_index: usize,
    pub reference_line: String,
    pub incoming_line: String,
    pub reference_context: Vec<String>,
    pub incoming_context: Vec<String>,
}

impl Conflict {
    fn capture(reference: &[Line], reference_index: usize, incoming: &[Line], incoming_index: usize) -> Self {
        Self {
            reference_index,
            incoming_index,
            reference_line: reference[reference_index].raw.clone(),
            incoming_line: incoming[incoming_index].raw.clone(),
            reference_context: context(reference, reference_index),
            incoming_context: context(incoming, incoming_index),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reference[{}] '{}' != incoming[{}] '{}'",
            self.reference_index, self.reference_line, self.incoming_index, self.incoming_line
        )
    }
}

fn context(lines: &[Line], index: usize) -> Vec<String> {
    let start = index.saturating_sub(CONTEXT_LINES);
    let end = (index + CONTEXT_LINES + 1).min(lines.len());
    lines[start..end]
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("{}: {}", start + offset, line.raw))
        .collect()
}

/// Data-integrity faults found while stitching slices together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileFault {
    #[error(
        "overlap mismatch between generation {reference_generation} and {incoming_generation}: {conflict}"
    )]
    Inconsistent {
        reference_generation: Generation,
        incoming_generation: Generation,
        conflict: Conflict,
    },

    #[error(
        "no overlap within generation {generation}: reference ends {reference_end}, incoming starts {incoming_start}"
    )]
    MissingOverlap {
        generation: Generation,
        reference_end: DateTime<Utc>,
        incoming_start: DateTime<Utc>,
    },
}

/// Result of reconciling one incoming sequence against a reference.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Deduplicated concatenation, oldest first
    pub merged: Vec<Line>,
    /// Index in `merged` where the incoming sequence's coverage begins
    pub anchor: usize,
    pub alignment: Alignment,
    /// Set when the claimed overlap did not match; `merged` then holds the
    /// incoming version of the disputed region
    pub conflict: Option<Conflict>,
}

impl Reconciled {
    /// Reference lines that precede the incoming sequence.
    ///
    /// When the incoming sequence is contained in the reference this is the
    /// whole reference.
    pub fn head(&self) -> &[Line] {
        match self.alignment {
            Alignment::Contained { .. } if self.conflict.is_none() => &self.merged,
            _ => &self.merged[..self.anchor],
        }
    }

    /// Lines the incoming sequence contributes after the head.
    pub fn extension(&self) -> &[Line] {
        match self.alignment {
            Alignment::Contained { .. } if self.conflict.is_none() => &[],
            _ => &self.merged[self.anchor..],
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.conflict.is_none()
    }
}

/// Reconcile an older `reference` with a newer `incoming` sequence.
pub fn reconcile_pair(reference: &[Line], incoming: &[Line]) -> Reconciled {
    merge(reference.to_vec(), incoming)
}

/// Index of the first position where the two sequences disagree, comparing
/// up to the shorter length.
fn first_mismatch(a: &[Line], b: &[Line]) -> Option<usize> {
    a.iter().zip(b.iter()).position(|(x, y)| x.raw != y.raw)
}

fn positions(haystack: &[Line], needle: &str) -> Vec<usize> {
    haystack
        .iter()
        .enumerate()
        .filter(|(_, line)| line.raw == needle)
        .map(|(index, _)| index)
        .collect()
}

fn merge(mut reference: Vec<Line>, incoming: &[Line]) -> Reconciled {
    if incoming.is_empty() {
        let at = reference.len();
        return Reconciled {
            merged: reference,
            anchor: at,
            alignment: Alignment::Contained { at },
            conflict: None,
        };
    }
    if reference.is_empty() {
        return Reconciled {
            merged: incoming.to_vec(),
            anchor: 0,
            alignment: Alignment::Overlap { at: 0 },
            conflict: None,
        };
    }

    // Incoming starts somewhere inside the reference
    let mut first_conflict: Option<(usize, usize)> = None;
    for at in positions(&reference, &incoming[0].raw) {
        match first_mismatch(&reference[at..], incoming) {
            None => {
                if reference.len() - at > incoming.len() {
                    return Reconciled {
                        merged: reference,
                        anchor: at,
                        alignment: Alignment::Contained { at },
                        conflict: None,
                    };
                }
                reference.truncate(at);
                reference.extend_from_slice(incoming);
                return Reconciled {
                    merged: reference,
                    anchor: at,
                    alignment: Alignment::Overlap { at },
                    conflict: None,
                };
            }
            Some(offset) => {
                first_conflict.get_or_insert((at, offset));
            }
        }
    }
    if let Some((at, offset)) = first_conflict {
        let conflict = Conflict::capture(&reference, at + offset, incoming, offset);
        return prefer_incoming(reference, incoming, at, Alignment::Overlap { at }, conflict);
    }

    // The reference starts somewhere inside the incoming sequence
    for at in positions(incoming, &reference[0].raw) {
        match first_mismatch(&reference, &incoming[at..]) {
            None => {
                let covered = incoming.len() - at;
                let mut merged = incoming.to_vec();
                if reference.len() > covered {
                    merged.extend_from_slice(&reference[covered..]);
                }
                return Reconciled {
                    merged,
                    anchor: 0,
                    alignment: Alignment::Covered { at },
                    conflict: None,
                };
            }
            Some(offset) => {
                first_conflict.get_or_insert((at, offset));
            }
        }
    }
    if let Some((at, offset)) = first_conflict {
        let conflict = Conflict::capture(&reference, offset, incoming, at + offset);
        return prefer_incoming(reference, incoming, 0, Alignment::Covered { at }, conflict);
    }

    // No common line: keep both, older range first
    if incoming[incoming.len() - 1].timestamp < reference[0].timestamp {
        let mut merged = incoming.to_vec();
        merged.extend(reference);
        return Reconciled {
            merged,
            anchor: 0,
            alignment: Alignment::Disjoint,
            conflict: None,
        };
    }
    let anchor = reference.len();
    reference.extend_from_slice(incoming);
    Reconciled {
        merged: reference,
        anchor,
        alignment: Alignment::Disjoint,
        conflict: None,
    }
}

/// Recovery for a mismatched overlap: keep `reference[..keep]`, take the
/// incoming sequence as the authority for the disputed region, and keep any
/// reference lines strictly later than the incoming sequence's last line.
fn prefer_incoming(
    reference: Vec<Line>,
    incoming: &[Line],
    keep: usize,
    alignment: Alignment,
    conflict: Conflict,
) -> Reconciled {
    let incoming_end = incoming[incoming.len() - 1].timestamp;
    let mut merged = Vec::with_capacity(reference.len() + incoming.len());
    merged.extend_from_slice(&reference[..keep]);
    merged.extend_from_slice(incoming);
    merged.extend(
        reference[keep..]
            .iter()
            .filter(|line| line.timestamp > incoming_end)
            .cloned(),
    );

    Reconciled {
        merged,
        anchor: keep,
        alignment,
        conflict: Some(conflict),
    }
}

/// Output of reconciling an ordered run of slices.
#[derive(Debug, Clone, Default)]
pub struct Merged {
    /// Lines no later slice can overlap any more
    pub settled: Vec<Line>,
    /// Coverage of the newest slice, held back for future matching
    pub tail: Vec<Line>,
    /// Generation of the newest slice
    pub tail_generation: Generation,
    pub faults: Vec<ReconcileFault>,
}

impl Merged {
    pub fn into_lines(self) -> Vec<Line> {
        let mut lines = self.settled;
        lines.extend(self.tail);
        lines
    }
}

/// Reconcile slices pairwise from oldest to newest, carrying a running
/// reference. The newest pairwise result is returned separately as `tail`.
///
/// Slices must already be in chronological order. A missing overlap between
/// slices of the same generation is a fault; across a generation boundary it
/// is an expected gap and only logged.
pub fn reconcile_slices(slices: Vec<LineSlice>) -> Merged {
    let mut slices = slices.into_iter();
    let Some(first) = slices.next() else {
        return Merged::default();
    };

    let mut previous_generation = first.generation();
    let mut reference = first.into_lines();
    let mut anchor = 0;
    let mut faults = Vec::new();

    for slice in slices {
        let generation = slice.generation();
        let reference_end = reference.last().map(|line| line.timestamp);
        let result = merge(std::mem::take(&mut reference), slice.lines());

        if let Some(conflict) = &result.conflict {
            error!(
                reference_generation = previous_generation,
                incoming_generation = generation,
                reference_index = conflict.reference_index,
                incoming_index = conflict.incoming_index,
                reference_line = %conflict.reference_line,
                incoming_line = %conflict.incoming_line,
                reference_context = ?conflict.reference_context,
                incoming_context = ?conflict.incoming_context,
                "Overlap did not match, keeping the newer slice for the disputed region"
            );
            faults.push(ReconcileFault::Inconsistent {
                reference_generation: previous_generation,
                incoming_generation: generation,
                conflict: conflict.clone(),
            });
        } else if result.alignment == Alignment::Disjoint {
            match reference_end {
                Some(reference_end) if generation == previous_generation => {
                    error!(
                        generation,
                        %reference_end,
                        incoming_start = %slice.start(),
                        "No overlap between slices of the same generation"
                    );
                    faults.push(ReconcileFault::MissingOverlap {
                        generation,
                        reference_end,
                        incoming_start: slice.start(),
                    });
                }
                _ => {
                    warn!(
                        from_generation = previous_generation,
                        to_generation = generation,
                        incoming_start = %slice.start(),
                        "No overlap across generation boundary, assuming a gap"
                    );
                }
            }
        } else {
            debug!(
                generation,
                alignment = ?result.alignment,
                incoming = slice.len(),
                "Reconciled slice"
            );
        }

        reference = result.merged;
        anchor = result.anchor;
        previous_generation = generation;
    }

    let tail = reference.split_off(anchor);
    Merged {
        settled: reference,
        tail,
        tail_generation: previous_generation,
        faults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::line::ProcessedLine;
    use std::sync::Arc;

    fn lines(range: std::ops::Range<usize>) -> Vec<Line> {
        range
            .map(|i| {
                Arc::new(
                    ProcessedLine::parse(&format!(
                        "2025-12-04T10:{:02}:{:02}Z line {}",
                        i / 60,
                        i % 60,
                        i
                    ))
                    .unwrap(),
                )
            })
            .collect()
    }

    fn slice(range: std::ops::Range<usize>, generation: Generation) -> LineSlice {
        LineSlice::new(lines(range), generation).unwrap()
    }

    #[test]
    fn test_identical_sequences() {
        let a = lines(0..50);
        let result = reconcile_pair(&a, &a);
        assert!(result.head().is_empty());
        assert_eq!(result.extension(), &a[..]);
        assert_eq!(result.alignment, Alignment::Overlap { at: 0 });
    }

    #[test]
    fn test_partial_overlap() {
        let all = lines(0..300);
        let result = reconcile_pair(&all[..200], &all[100..300]);
        assert_eq!(result.head(), &all[..100]);
        assert_eq!(result.extension(), &all[100..300]);
        assert_eq!(result.merged, all);
        assert_eq!(result.anchor, 100);
    }

    #[test]
    fn test_disjoint_sequences() {
        let all = lines(0..300);
        let result = reconcile_pair(&all[..100], &all[200..300]);
        assert_eq!(result.alignment, Alignment::Disjoint);
        assert_eq!(result.head(), &all[..100]);
        assert_eq!(result.extension(), &all[200..300]);
    }

    #[test]
    fn test_disjoint_older_incoming_goes_first() {
        let all = lines(0..300);
        let result = reconcile_pair(&all[200..300], &all[..100]);
        assert_eq!(result.alignment, Alignment::Disjoint);
        assert!(result.is_consistent());
        assert_eq!(result.anchor, 0);
        assert_eq!(result.merged[..100], all[..100]);
        assert_eq!(result.merged[100..], all[200..300]);
    }

    #[test]
    fn test_incoming_contained_in_reference() {
        let all = lines(0..300);
        let result = reconcile_pair(&all, &all[100..200]);
        assert_eq!(result.alignment, Alignment::Contained { at: 100 });
        assert_eq!(result.head(), &all[..]);
        assert!(result.extension().is_empty());
        assert_eq!(result.anchor, 100);
    }

    #[test]
    fn test_incoming_extends_reference_from_start() {
        let all = lines(0..300);
        let result = reconcile_pair(&all[..200], &all[..300]);
        assert!(result.head().is_empty());
        assert_eq!(result.extension(), &all[..300]);
    }

    #[test]
    fn test_reference_missing_first_line() {
        let all = lines(0..300);
        let result = reconcile_pair(&all[1..200], &all[..300]);
        assert_eq!(result.alignment, Alignment::Covered { at: 1 });
        assert!(result.head().is_empty());
        assert_eq!(result.extension(), &all[..300]);
    }

    #[test]
    fn test_reference_covered_and_extending_past_incoming() {
        let all = lines(0..300);
        let result = reconcile_pair(&all[50..300], &all[..100]);
        assert_eq!(result.alignment, Alignment::Covered { at: 50 });
        assert_eq!(result.merged, all);
    }

    #[test]
    fn test_missing_interior_lines_reported() {
        let all = lines(0..300);
        let gappy: Vec<Line> = all[..200]
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 3 != 0)
            .map(|(_, line)| line.clone())
            .collect();

        let result = reconcile_pair(&gappy, &all[..300]);
        let conflict = result.conflict.clone().unwrap();
        assert_eq!(conflict.reference_line, all[4].raw);
        assert_eq!(conflict.incoming_line, all[3].raw);
        // the newer slice wins the disputed region
        assert_eq!(result.merged, all);
    }

    #[test]
    fn test_incoming_with_dropped_lines_reported() {
        let all = lines(0..300);
        let mut incoming = all[100..300].to_vec();
        incoming.remove(10);

        let result = reconcile_pair(&all[..200], &incoming);
        let conflict = result.conflict.clone().unwrap();
        assert_eq!(conflict.reference_index, 110);
        assert_eq!(conflict.incoming_index, 10);
        assert_eq!(conflict.reference_context.len(), 5);
        assert_eq!(result.head(), &all[..100]);
        assert_eq!(result.extension(), &incoming[..]);
    }

    #[test]
    fn test_repeated_first_line_uses_clean_candidate() {
        let base = lines(0..10);
        // reference: 0 1 2 3 0 1 2 ; incoming: 0 1 2 9 -> only the second run of "0" aligns cleanly
        let mut reference = base[..4].to_vec();
        reference.extend_from_slice(&base[..3]);
        let mut incoming = base[..3].to_vec();
        incoming.push(base[9].clone());

        let result = reconcile_pair(&reference, &incoming);
        assert!(result.is_consistent());
        assert_eq!(result.alignment, Alignment::Overlap { at: 4 });
        assert_eq!(result.merged.len(), 8);
    }

    #[test]
    fn test_reconcile_slices_single() {
        let merged = reconcile_slices(vec![slice(0..10, 2)]);
        assert!(merged.settled.is_empty());
        assert_eq!(merged.tail, lines(0..10));
        assert_eq!(merged.tail_generation, 2);
    }

    #[test]
    fn test_reconcile_slices_chain() {
        let merged = reconcile_slices(vec![
            slice(0..100, 0),
            slice(80..180, 0),
            slice(160..260, 0),
        ]);
        assert!(merged.faults.is_empty());
        assert_eq!(merged.settled, lines(0..160));
        assert_eq!(merged.tail, lines(160..260));
    }

    #[test]
    fn test_reconcile_slices_contained_last_keeps_reference_tail() {
        let merged = reconcile_slices(vec![slice(0..100, 0), slice(40..60, 0)]);
        assert_eq!(merged.settled, lines(0..40));
        assert_eq!(merged.tail, lines(40..100));
    }

    #[test]
    fn test_gap_within_generation_is_fault() {
        let merged = reconcile_slices(vec![slice(0..10, 4), slice(20..30, 4)]);
        assert_eq!(merged.faults.len(), 1);
        assert!(matches!(
            merged.faults[0],
            ReconcileFault::MissingOverlap { generation: 4, .. }
        ));
        // nothing is dropped
        assert_eq!(merged.into_lines().len(), 20);
    }

    #[test]
    fn test_gap_across_generations_is_not_fault() {
        let merged = reconcile_slices(vec![slice(0..10, 1), slice(20..30, 2)]);
        assert!(merged.faults.is_empty());
        assert_eq!(merged.settled, lines(0..10));
        assert_eq!(merged.tail, lines(20..30));
    }
}
