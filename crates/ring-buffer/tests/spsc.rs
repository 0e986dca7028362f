//! Cross-thread tests: a producer thread and a consumer thread share one ring

use ring_buffer::RingBuffer;
use std::thread;

/// Record whose fields are all derived from one index, so a partially
/// written slot is detectable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Pattern {
    index: u64,
    words: [u64; 3],
}

impl Pattern {
    fn new(index: u64) -> Self {
        Self {
            index,
            words: [!index, index.rotate_left(17), index.wrapping_mul(0x9E37_79B9_7F4A_7C15)],
        }
    }

    fn is_intact(&self) -> bool {
        *self == Pattern::new(self.index)
    }
}

#[test]
fn test_no_torn_or_stale_reads_across_threads() {
    const TOTAL: u64 = 200_000;
    let (mut producer, mut consumer) = RingBuffer::<Pattern>::new(256).unwrap().split();

    let writer = thread::spawn(move || {
        let mut index = 0;
        while index < TOTAL {
            if producer.available_space() == 0 {
                thread::yield_now();
                continue;
            }
            producer.push(Pattern::new(index)).unwrap();
            index += 1;
        }
        producer
    });

    let mut expected = 0u64;
    let mut scratch = vec![Pattern::default(); 97];
    while expected < TOTAL {
        let mut snap = consumer.snapshot();
        let got = consumer.pop_into(&mut snap, &mut scratch);
        for record in &scratch[..got] {
            assert!(record.is_intact(), "torn record {:?}", record);
            assert_eq!(record.index, expected, "stale or reordered record");
            expected += 1;
        }
        if got == 0 {
            thread::yield_now();
        }
    }

    let producer = writer.join().unwrap();
    assert_eq!(producer.desyncs(), 0);
    assert_eq!(consumer.occupied_count(), 0);
}

#[test]
fn test_lost_records_match_desync_count() {
    const TOTAL: u64 = 100_000;
    let (mut producer, mut consumer) = RingBuffer::<Pattern>::new(64).unwrap().split();

    let writer = thread::spawn(move || {
        for index in 0..TOTAL {
            // A full ring drops the record, like a hardware FIFO overrun
            let _ = producer.push(Pattern::new(index));
        }
    });

    let mut seen = 0u64;
    let mut last: Option<u64> = None;
    let mut scratch = vec![Pattern::default(); 16];
    loop {
        let finished = writer.is_finished();
        let mut snap = consumer.snapshot();
        let got = consumer.pop_into(&mut snap, &mut scratch);
        for record in &scratch[..got] {
            assert!(record.is_intact());
            if let Some(prev) = last {
                assert!(record.index > prev);
            }
            last = Some(record.index);
            seen += 1;
        }
        if finished && got == 0 && consumer.occupied_count() == 0 {
            break;
        }
    }
    writer.join().unwrap();

    assert_eq!(seen + consumer.desyncs(), TOTAL);
}
