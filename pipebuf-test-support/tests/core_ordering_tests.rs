//! Memory Ordering Tests for pipebuf
//!
//! These tests verify that both pipe variants hand bytes to readers in
//! the order writers reserved them, under real concurrency.

use pipebuf::{ MpmcPipe, PipeBuffer, SpscPipe };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TEST_DURATION_MILLIS: u64 = 500;
const RECORD: usize = 8;

fn stream_byte(k: u64) -> u8 {
    (k % 251) as u8
}

fn record(writer: u64, seq: u64) -> [u8; RECORD] {
    ((writer << 56) | seq).to_le_bytes()
}

fn parse(bytes: &[u8]) -> (usize, u64) {
    let mut word = [0u8; RECORD];
    word.copy_from_slice(bytes);
    let value = u64::from_le_bytes(word);
    ((value >> 56) as usize, value & ((1 << 56) - 1))
}

/// Test SPSC byte stream ordering through split handles
#[test]
fn test_spsc_stream_ordering() {
    let (mut writer, mut reader) = SpscPipe::new(1024).unwrap().split();
    let running = Arc::new(AtomicBool::new(true));
    let produced = Arc::new(AtomicU64::new(u64::MAX));

    let running_prod = running.clone();
    let produced_w = produced.clone();
    let producer = thread::spawn(move || {
        let mut pos = 0u64;
        let mut chunk = [0u8; 97];
        while running_prod.load(Ordering::Relaxed) {
            for (i, b) in chunk.iter_mut().enumerate() {
                *b = stream_byte(pos + (i as u64));
            }
            let n = writer.write(&chunk);
            if n == 0 {
                std::hint::spin_loop();
            }
            pos += n as u64;
        }
        produced_w.store(pos, Ordering::Release);
        pos
    });

    let consumer = thread::spawn(move || {
        let mut pos = 0u64;
        let mut errors = 0u64;
        let mut buf = [0u8; 61];
        loop {
            let n = reader.read(&mut buf);
            if n == 0 {
                if pos == produced.load(Ordering::Acquire) {
                    break;
                }
                std::hint::spin_loop();
                continue;
            }
            for b in &buf[..n] {
                if *b != stream_byte(pos) {
                    errors += 1;
                }
                pos += 1;
            }
        }
        (pos, errors)
    });

    thread::sleep(Duration::from_millis(TEST_DURATION_MILLIS));
    running.store(false, Ordering::Relaxed);

    let written = producer.join().unwrap();
    let (read, errors) = consumer.join().unwrap();
    println!("SPSC: {} bytes written, {} read, {} errors", written, read, errors);

    assert_eq!(errors, 0, "ordering errors detected");
    assert_eq!(written, read);
}

/// Each writer's records must reach the reader in that writer's order
fn run_per_writer_fifo(pipe: Arc<MpmcPipe>, writers: usize, lock_commit: bool) {
    let running = Arc::new(AtomicBool::new(true));
    let errors = Arc::new(AtomicU64::new(0));
    // records sent by writers that have stopped, and how many stopped
    let sent_total = Arc::new(AtomicU64::new(0));
    let stopped = Arc::new(AtomicU64::new(0));

    let producers: Vec<_> = (0..writers)
        .map(|id| {
            let pipe = pipe.clone();
            let running = running.clone();
            let sent_total = sent_total.clone();
            let stopped = stopped.clone();
            thread::spawn(move || {
                let mut seq = 0u64;
                while running.load(Ordering::Relaxed) {
                    let rec = record(id as u64, seq);
                    let n = if lock_commit {
                        let mut span = pipe.write_lock(RECORD);
                        let n = span.fill_from(&rec);
                        span.commit().unwrap();
                        n
                    } else {
                        pipe.write(&rec)
                    };
                    match n {
                        0 => std::hint::spin_loop(),
                        RECORD => {
                            seq += 1;
                        }
                        short => panic!("record split: {} bytes", short),
                    }
                }
                sent_total.fetch_add(seq, Ordering::AcqRel);
                stopped.fetch_add(1, Ordering::AcqRel);
                seq
            })
        })
        .collect();

    let consumer = {
        let pipe = pipe.clone();
        let errors = errors.clone();
        let sent_total = sent_total.clone();
        let stopped = stopped.clone();
        thread::spawn(move || {
            let mut next = vec![0u64; writers];
            let mut received = 0u64;
            let mut buf = [0u8; RECORD * 16];
            loop {
                let n = pipe.read(&mut buf);
                if n == 0 {
                    // load `stopped` first so `sent_total` is final when it matches
                    let all_stopped = stopped.load(Ordering::Acquire) == (writers as u64);
                    if all_stopped && received == sent_total.load(Ordering::Acquire) {
                        break;
                    }
                    std::hint::spin_loop();
                    continue;
                }
                assert_eq!(n % RECORD, 0, "read split a record");
                for rec in buf[..n].chunks_exact(RECORD) {
                    let (id, seq) = parse(rec);
                    if seq != next[id] {
                        errors.fetch_add(1, Ordering::Relaxed);
                        eprintln!("ORDERING ERROR: writer {} expected={}, got={}", id, next[id], seq);
                    }
                    next[id] = seq + 1;
                    received += 1;
                }
            }
            next
        })
    };

    thread::sleep(Duration::from_millis(TEST_DURATION_MILLIS));
    running.store(false, Ordering::Relaxed);

    let sent: Vec<u64> = producers.into_iter().map(|p| p.join().unwrap()).collect();
    let received = consumer.join().unwrap();

    assert_eq!(errors.load(Ordering::Relaxed), 0, "ordering errors detected");
    assert_eq!(sent, received);
}

#[test]
fn test_mpmc_per_writer_fifo_copy() {
    run_per_writer_fifo(Arc::new(MpmcPipe::new(256).unwrap()), 4, false);
}

#[test]
fn test_mpmc_per_writer_fifo_lock_commit() {
    run_per_writer_fifo(Arc::new(MpmcPipe::new(256).unwrap()), 4, true);
}

#[test]
fn test_mpmc_per_writer_fifo_tight_capacity() {
    // one record of room: every write contends for the whole buffer
    run_per_writer_fifo(Arc::new(MpmcPipe::new(RECORD).unwrap()), 3, true);
}

/// Offsets stay ordered and bounded while many threads hammer the word
#[test]
fn test_mpmc_offsets_bounded_under_load() {
    let pipe = Arc::new(MpmcPipe::new(64).unwrap());
    let running = Arc::new(AtomicBool::new(true));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let pipe = pipe.clone();
            let running = running.clone();
            thread::spawn(move || {
                let mut buf = [i as u8; 24];
                while running.load(Ordering::Relaxed) {
                    if i % 2 == 0 {
                        pipe.write(&buf[..(i + 5)]);
                    } else {
                        pipe.read(&mut buf[..(i + 9)]);
                    }
                }
            })
        })
        .collect();

    let mut samples = 0u64;
    while samples < 200_000 {
        let offsets = pipe.offsets();
        assert!(offsets.is_consistent(64), "inconsistent offsets {:?}", offsets);
        assert!(pipe.len() <= 64);
        samples += 1;
    }

    running.store(false, Ordering::Relaxed);
    for w in workers {
        w.join().unwrap();
    }
    assert!(pipe.offsets().is_quiescent());
}
