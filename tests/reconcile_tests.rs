use std::sync::Arc;
use synclog::collector::{
    reconcile_pair, reconcile_slices, Alignment, GenerationStore, LineSlice, ReconcileFault,
};
use synclog::source::{Line, ProcessedLine};

fn line(i: usize, text: &str) -> Line {
    Arc::new(
        ProcessedLine::parse(&format!(
            "2025-12-04T11:{:02}:{:02}.{:06}Z phc2sys[77]: {} {}",
            (i / 60) % 60,
            i % 60,
            i,
            text,
            i
        ))
        .unwrap(),
    )
}

fn sequence(range: std::ops::Range<usize>) -> Vec<Line> {
    range.map(|i| line(i, "CLOCK_REALTIME phc offset")).collect()
}

fn raws(lines: &[Line]) -> Vec<&str> {
    lines.iter().map(|l| l.raw.as_str()).collect()
}

#[test]
fn test_identical_slices_yield_full_second_slice() {
    for len in [1, 2, 7, 64] {
        let a = sequence(0..len);
        let b = a.clone();
        let result = reconcile_pair(&a, &b);

        assert!(result.head().is_empty(), "len {}", len);
        assert_eq!(raws(result.extension()), raws(&b));
        assert!(result.is_consistent());
    }
}

#[test]
fn test_disjoint_slices_returned_unchanged() {
    let a = sequence(0..30);
    let b = sequence(40..55);
    let result = reconcile_pair(&a, &b);

    assert_eq!(result.alignment, Alignment::Disjoint);
    assert_eq!(raws(result.head()), raws(&a));
    assert_eq!(raws(result.extension()), raws(&b));
}

#[test]
fn test_partial_overlap_restores_full_sequence() {
    let full = sequence(0..120);
    for (k, m) in [(10, 1), (50, 20), (100, 20), (1, 119)] {
        let a = &full[..k + m];
        let b = &full[k..];
        let result = reconcile_pair(a, b);

        assert!(result.is_consistent());
        assert_eq!(raws(&result.merged), raws(&full), "k={} m={}", k, m);
    }
}

#[test]
fn test_contained_slice_adds_nothing() {
    let a = sequence(0..60);
    let b = &a[20..35];
    let result = reconcile_pair(&a, b);

    assert_eq!(result.alignment, Alignment::Contained { at: 20 });
    assert_eq!(raws(result.head()), raws(&a));
    assert!(result.extension().is_empty());
    assert_eq!(raws(&result.merged), raws(&a));
}

#[test]
fn test_contained_suffix_returns_unique_part() {
    let a = sequence(0..60);
    let b = sequence(50..60);
    let result = reconcile_pair(&a, &b);

    assert_eq!(raws(&result.merged), raws(&a));
    assert!(result.is_consistent());
}

#[test]
fn test_corrupted_overlap_is_reported() {
    let a = sequence(0..40);
    let mut b = sequence(30..70);
    b[5] = line(35, "CORRUPTED");

    let result = reconcile_pair(&a, &b);
    let conflict = result.conflict.as_ref().expect("conflict must be reported");
    assert_eq!(conflict.reference_index, 35);
    assert_eq!(conflict.incoming_index, 5);
    assert!(conflict.incoming_line.contains("CORRUPTED"));

    // Newer slice wins the disputed region, nothing is duplicated
    assert_eq!(result.merged.len(), 70);
    assert!(result.merged[35].raw.contains("CORRUPTED"));
}

#[test]
fn test_corruption_surfaces_as_fault_across_slices() {
    let mut corrupted = sequence(20..50);
    corrupted[3] = line(23, "CORRUPTED");
    let slices = vec![
        LineSlice::new(sequence(0..25), 2).unwrap(),
        LineSlice::new(corrupted, 2).unwrap(),
    ];

    let merged = reconcile_slices(slices);
    assert_eq!(merged.faults.len(), 1);
    assert!(matches!(
        &merged.faults[0],
        ReconcileFault::Inconsistent {
            reference_generation: 2,
            incoming_generation: 2,
            ..
        }
    ));
    assert!(merged.faults[0].to_string().contains("CORRUPTED"));
}

#[test]
fn test_generations_flush_in_order_regardless_of_arrival() {
    let mut store = GenerationStore::new(5);
    store.add(LineSlice::new(sequence(200..210), 3).unwrap());
    store.add(LineSlice::new(sequence(0..10), 1).unwrap());
    store.add(LineSlice::new(sequence(100..110), 2).unwrap());
    store.add(LineSlice::new(sequence(5..20), 1).unwrap());
    store.add(LineSlice::new(sequence(105..115), 2).unwrap());

    let output = store.flush_all();
    let expected: Vec<Line> = sequence(0..20)
        .into_iter()
        .chain(sequence(100..115))
        .chain(sequence(200..210))
        .collect();
    assert_eq!(raws(&output.lines), raws(&expected));
    assert!(output.faults.is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_parse_keeps_raw_line() {
    let original = "2025-12-04T10:15:30.123456789+02:00   ts2phc[9]: nmea sentence ok  ";
    let parsed = ProcessedLine::parse(original).unwrap();
    assert_eq!(parsed.raw, original.trim_end());
    assert_eq!(parsed.content, "ts2phc[9]: nmea sentence ok");
    assert_eq!(parsed.timestamp.to_rfc3339(), "2025-12-04T08:15:30.123456789+00:00");
}
