//! Null sink tests

use tracepipe_pipeline::EventSink;
use tracepipe_protocol::{BatchBuilder, Bytes, SequencedRecord};

use crate::NullSink;

#[tokio::test]
async fn test_discards_but_counts() {
    let mut sink = NullSink::new();
    let metrics = sink.metrics();

    let mut builder = BatchBuilder::new();
    builder.push(SequencedRecord::new(0, Bytes::from_static(b"abcd")), 0, 1);
    builder.push(SequencedRecord::new(1, Bytes::from_static(b"ef")), 1, 2);
    sink.write_batch(builder.finish().unwrap()).await.unwrap();
    sink.close().await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.batches_written, 1);
    assert_eq!(snapshot.records_written, 2);
    assert_eq!(snapshot.bytes_written, 6);
    assert_eq!(snapshot.write_errors, 0);
}
