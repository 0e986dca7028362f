//! Criterion benchmarks for the SPSC ring buffer hot paths.
//!
//! The acquisition thread pushes one 32-byte record at a time and the reader
//! pops whole chunks, so both paths are measured with a record of that size.
//!
//! Run with: cargo bench --bench ring_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ring_buffer::RingBuffer;
use std::thread;

type Record = [i32; 8];

/// Push a batch then drain it, single-threaded.
fn push_pop_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_push_pop");

    for batch in [64usize, 1024, 4096] {
        let (mut producer, mut consumer) = RingBuffer::<Record>::new(8192).unwrap().split();
        let mut scratch = vec![Record::default(); batch];

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            b.iter(|| {
                for i in 0..batch {
                    let _ = producer.push(black_box([i as i32; 8]));
                }
                let mut snap = consumer.snapshot();
                black_box(consumer.pop_into(&mut snap, &mut scratch));
            });
        });
    }

    group.finish();
}

/// Reader chunk size against a pre-filled ring.
fn pop_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_pop_chunk");

    for chunk in [1usize, 100, 1024] {
        group.throughput(Throughput::Elements(chunk as u64));
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            let (mut producer, mut consumer) = RingBuffer::<Record>::new(1 << 17).unwrap().split();
            let mut scratch = vec![Record::default(); chunk];
            b.iter(|| {
                if consumer.occupied_count() < chunk {
                    while producer.push([7; 8]).is_ok() {}
                }
                let mut snap = consumer.snapshot();
                black_box(consumer.pop_into(&mut snap, &mut scratch));
            });
        });
    }

    group.finish();
}

/// One producer thread and one consumer thread moving a fixed number of records.
fn cross_thread_transfer(c: &mut Criterion) {
    const RECORDS: usize = 100_000;
    let mut group = c.benchmark_group("ring_buffer_cross_thread");
    group.throughput(Throughput::Elements(RECORDS as u64));
    group.sample_size(20);

    group.bench_function("spsc_100k", |b| {
        b.iter(|| {
            let (mut producer, mut consumer) = RingBuffer::<Record>::new(4096).unwrap().split();
            let writer = thread::spawn(move || {
                let mut sent = 0;
                while sent < RECORDS {
                    if producer.push([sent as i32; 8]).is_ok() {
                        sent += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            });

            let mut received = 0;
            let mut scratch = vec![Record::default(); 512];
            while received < RECORDS {
                let mut snap = consumer.snapshot();
                received += consumer.pop_into(&mut snap, &mut scratch);
            }
            writer.join().unwrap();
            black_box(received)
        });
    });

    group.finish();
}

criterion_group!(benches, push_pop_batch, pop_chunk, cross_thread_transfer);
criterion_main!(benches);
