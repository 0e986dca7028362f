//! Property tests for the SPSC ring buffer

use proptest::prelude::*;
use ring_buffer::{RingBuffer, RingError};

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Pop(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..20).prop_map(Op::Push),
        (0usize..40).prop_map(Op::Pop),
    ]
}

proptest! {
    #[test]
    fn test_capacity_is_power_of_two_or_rejected(capacity in 0usize..5000) {
        match RingBuffer::<u64>::new(capacity) {
            Ok(ring) => {
                prop_assert!(ring.capacity().is_power_of_two());
                prop_assert_eq!(ring.capacity(), capacity);
            }
            Err(err) => {
                prop_assert!(capacity < 2 || !capacity.is_power_of_two());
                prop_assert_eq!(err, RingError::CapacityNotPowerOfTwo(capacity));
            }
        }
    }

    #[test]
    fn test_occupancy_never_exceeds_capacity_minus_one(
        shift in 1u32..7,
        ops in prop::collection::vec(op(), 1..200),
    ) {
        let capacity = 1usize << shift;
        let (mut producer, mut consumer) = RingBuffer::<u64>::new(capacity).unwrap().split();
        let mut next_push = 0u64;
        let mut next_pop = 0u64;
        let mut failed_pushes = 0u64;

        for op in ops {
            match op {
                Op::Push(n) => {
                    for _ in 0..n {
                        if producer.push(next_push).is_ok() {
                            next_push += 1;
                        } else {
                            failed_pushes += 1;
                        }
                    }
                }
                Op::Pop(max) => {
                    let mut snap = consumer.snapshot();
                    let mut out = vec![0u64; max];
                    let got = consumer.pop_into(&mut snap, &mut out);
                    for value in &out[..got] {
                        prop_assert_eq!(*value, next_pop);
                        next_pop += 1;
                    }
                }
            }
            prop_assert!(consumer.occupied_count() <= capacity - 1);
            prop_assert_eq!(
                consumer.occupied_count() + producer.available_space(),
                capacity - 1
            );
            prop_assert_eq!(consumer.occupied_count() as u64, next_push - next_pop);
        }
        prop_assert_eq!(consumer.desyncs(), failed_pushes);
    }
}
