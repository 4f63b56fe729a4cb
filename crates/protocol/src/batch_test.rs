//! Batch and BatchBuilder tests

use bytes::Bytes;

use crate::{BatchBuilder, SequencedRecord};

fn record(seq: u64, payload: &'static [u8]) -> SequencedRecord {
    SequencedRecord::new(seq, Bytes::from_static(payload))
}

#[test]
fn test_empty_builder_yields_no_batch() {
    let builder = BatchBuilder::new();
    assert!(builder.is_empty());
    assert!(builder.finish().is_none());
}

#[test]
fn test_builder_accumulates_in_order() {
    let mut builder = BatchBuilder::new();
    builder.push(record(10, b"aa"), 0, 14);
    builder.push(record(11, b"bbb"), 14, 29);
    builder.push(record(12, b""), 29, 41);

    assert_eq!(builder.len(), 3);

    let batch = builder.finish().unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.first_position(), 0);
    assert_eq!(batch.end_position(), 41);
    assert_eq!(batch.payload_bytes(), 5);
    assert_eq!(batch.first_sequence(), 10);
    assert_eq!(batch.last_sequence(), 12);

    let seqs: Vec<u64> = batch.records().iter().map(|r| r.sequence()).collect();
    assert_eq!(seqs, vec![10, 11, 12]);
}

#[test]
fn test_single_record_batch() {
    let mut builder = BatchBuilder::new();
    builder.push(record(0, b"only"), 100, 116);

    let batch = builder.finish().unwrap();
    assert_eq!(batch.len(), 1);
    assert!(!batch.is_empty());
    assert_eq!(batch.first_position(), 100);
    assert_eq!(batch.end_position(), 116);
    assert_eq!(batch.first_sequence(), batch.last_sequence());
}

#[test]
fn test_into_records_preserves_order() {
    let mut builder = BatchBuilder::new();
    for seq in 0..5 {
        builder.push(record(seq, b"x"), seq * 13, (seq + 1) * 13);
    }

    let records = builder.finish().unwrap().into_records();
    let seqs: Vec<u64> = records.iter().map(|r| r.sequence()).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
}
