//! Property-based tests for the stream buffer
//!
//! Generates arbitrary chunkings of arbitrary data and verifies that the
//! ring delivers exactly the bytes written, in order, across any number of
//! wraps, and that the occupancy counters stay consistent after every
//! operation.

use cast_buffer::{BufferConfig, SeekOrigin, StreamBuffer};
use proptest::prelude::*;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn buffer(capacity: usize) -> StreamBuffer {
    let mut cfg = BufferConfig::with_capacity(capacity);
    // Keep property runs fast: no read-ahead waits.
    cfg.data_wait = Duration::from_millis(1);
    StreamBuffer::new(cfg)
}

proptest! {
    /// Interleaved chunked writes and reads deliver the input verbatim,
    /// regardless of capacity, chunk sizes, or how often the ring wraps.
    #[test]
    fn prop_chunked_roundtrip_across_wraps(
        data in proptest::collection::vec(any::<u8>(), 1..2000),
        capacity in 32usize..256,
        write_chunk in 1usize..96,
        read_chunk in 1usize..96,
    ) {
        let buf = buffer(capacity);
        let mut written = 0usize;
        let mut out = Vec::with_capacity(data.len());
        let mut scratch = vec![0u8; read_chunk];

        while out.len() < data.len() {
            if written < data.len() {
                let end = (written + write_chunk).min(data.len());
                written += buf.write(&data[written..end]);
            }

            let n = buf.read(&mut scratch);
            out.extend_from_slice(&scratch[..n]);

            prop_assert_eq!(buf.unread() + buf.free(), capacity);
        }

        prop_assert_eq!(out, data);
        prop_assert_eq!(buf.unread(), 0);
        prop_assert_eq!(buf.free(), capacity);
    }

    /// The occupancy invariant holds after every operation in an
    /// arbitrary write/read sequence, and reads replay writes in order.
    #[test]
    fn prop_counters_consistent_under_arbitrary_ops(
        ops in proptest::collection::vec((any::<bool>(), 1usize..128), 1..200),
        capacity in 16usize..512,
    ) {
        let buf = buffer(capacity);
        let mut model: Vec<u8> = Vec::new();
        let mut next_byte = 0u8;

        for (is_write, size) in ops {
            if is_write {
                let chunk: Vec<u8> = (0..size)
                    .map(|i| next_byte.wrapping_add(i as u8))
                    .collect();
                let accepted = buf.write(&chunk);
                prop_assert!(accepted <= size);
                model.extend_from_slice(&chunk[..accepted]);
                next_byte = next_byte.wrapping_add(accepted as u8);
            } else {
                let mut out = vec![0u8; size];
                let n = buf.read(&mut out);
                prop_assert!(n <= model.len());
                let expected: Vec<u8> = model.drain(..n).collect();
                prop_assert_eq!(&out[..n], expected.as_slice());
            }

            prop_assert_eq!(buf.unread() + buf.free(), capacity);
            prop_assert_eq!(buf.unread(), model.len());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A seek to any in-range target succeeds once the producer answers,
    /// and re-anchors the read position at the target.
    #[test]
    fn prop_seek_anchors_read_position(
        file_size in 1u64..1_000_000,
        frac in 0.0f64..1.0,
    ) {
        let target = (file_size as f64 * frac) as u64;

        let buf = Arc::new(buffer(4096));
        buf.set_file_size(file_size);

        let (tx, rx) = mpsc::channel::<u64>();
        buf.set_seek_request(move |_session, offset| {
            let _ = tx.send(offset);
        });

        // Stand-in producer: answers the seek request with fresh data.
        let producer_buf = buf.clone();
        let producer = thread::spawn(move || {
            let offset = rx.recv().expect("seek request");
            producer_buf.write(b"fresh data from the new offset");
            offset
        });

        let got = buf.seek(SeekOrigin::Start, target as i64).unwrap();
        prop_assert_eq!(got, target);
        prop_assert_eq!(producer.join().unwrap(), target);
        prop_assert_eq!(buf.absolute_read_pos(), target);

        // The post-seek data is what a reader now sees.
        let mut out = [0u8; 5];
        prop_assert_eq!(buf.read(&mut out), 5);
        prop_assert_eq!(&out, b"fresh");
    }
}
