//! Hand-off queue between the listener and the render loop.
//!
//! The queue is unbounded: enqueueing never blocks a decoder, so a slow
//! terminal can never make the listener drop messages. Memory is the only
//! limit under sustained overload.

use minisyslog_common::StructuredRecord;
use tokio::sync::mpsc;

/// Producer side; cloned once per listener task and per TCP connection.
pub type RecordSender = mpsc::UnboundedSender<StructuredRecord>;

/// Consumer side; owned by the single render loop.
pub type RecordReceiver = mpsc::UnboundedReceiver<StructuredRecord>;

/// Create a new dispatch channel.
pub fn channel() -> (RecordSender, RecordReceiver) {
    mpsc::unbounded_channel()
}

/// Enqueue a record. Returns `false` once the render loop has gone away,
/// which tells the caller to stop producing.
pub fn dispatch(tx: &RecordSender, record: StructuredRecord) -> bool {
    tx.send(record).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_sender_fifo() {
        let (tx, mut rx) = channel();
        let other = tx.clone();

        for i in 0..100i64 {
            assert!(dispatch(&tx, StructuredRecord::new().with_field("seq", i)));
            assert!(dispatch(&other, StructuredRecord::new().with_field("other", i)));
        }
        drop(tx);
        drop(other);

        let mut seq = Vec::new();
        let mut other_seq = Vec::new();
        while let Some(record) = rx.recv().await {
            if let Some(i) = record.int("seq") {
                seq.push(i);
            } else if let Some(i) = record.int("other") {
                other_seq.push(i);
            }
        }

        assert_eq!(seq, (0..100).collect::<Vec<_>>());
        assert_eq!(other_seq, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_send_never_blocks_without_consumer() {
        let (tx, mut rx) = channel();
        for i in 0..10_000i64 {
            assert!(dispatch(&tx, StructuredRecord::new().with_field("seq", i)));
        }
        drop(tx);

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 10_000);
    }

    #[test]
    fn test_dispatch_after_close() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!dispatch(&tx, StructuredRecord::new()));
    }
}
