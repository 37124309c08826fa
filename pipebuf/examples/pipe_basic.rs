//! Line Relay - MPMC (4 Writers, 2 Readers)
//!
//! Each writer streams 10k `[len][payload]` records with lock/commit,
//! readers copy bytes out and the checksums must agree.

use pipebuf::{ MpmcPipe, PipeBuffer, SpscPipe };
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const PIPE_SIZE: usize = 4096;
const RECORDS_PER_WRITER: usize = 10_000;
const NUM_WRITERS: usize = 4;
const NUM_READERS: usize = 2;

fn main() {
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("  ║  Line Relay - MPMC (4 Writers, 2 Readers)              ║");
    println!("  ╚════════════════════════════════════════════════════════╝\n");

    let pipe = Arc::new(MpmcPipe::new(PIPE_SIZE).unwrap());
    let total_bytes: usize = (0..RECORDS_PER_WRITER).map(|i| 1 + (i % 32)).sum::<usize>() * NUM_WRITERS;
    let received = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let writers: Vec<_> = (0..NUM_WRITERS)
        .map(|id| {
            let pipe = pipe.clone();
            thread::spawn(move || {
                let data: Vec<u8> = (0..RECORDS_PER_WRITER)
                    .flat_map(|i| {
                        let payload_len = i % 32;
                        std::iter::once(payload_len as u8)
                            .chain((0..payload_len).map(move |j| (id * 31 + j) as u8))
                    })
                    .collect();
                let wsum = data.iter().map(|b| *b as u64).sum::<u64>();

                let mut sent = 0;
                while sent < data.len() {
                    let mut span = pipe.write_lock((data.len() - sent).min(64));
                    if span.is_empty() {
                        thread::yield_now();
                        continue;
                    }
                    // span never exceeds what is left, so it fills completely
                    sent += span.fill_from(&data[sent..]);
                    span.commit().unwrap();
                }
                wsum
            })
        })
        .collect();

    let readers: Vec<_> = (0..NUM_READERS)
        .map(|_| {
            let pipe = pipe.clone();
            let received = received.clone();
            thread::spawn(move || {
                let mut rsum = 0u64;
                let mut buf = [0u8; 256];
                while received.load(Ordering::Relaxed) < total_bytes {
                    let n = pipe.read(&mut buf);
                    if n == 0 {
                        std::hint::spin_loop();
                        continue;
                    }
                    rsum += buf[..n].iter().map(|b| *b as u64).sum::<u64>();
                    received.fetch_add(n, Ordering::Relaxed);
                }
                rsum
            })
        })
        .collect();

    let wsum: u64 = writers.into_iter().map(|h| h.join().unwrap()).sum();
    let rsum: u64 = readers.into_iter().map(|h| h.join().unwrap()).sum();
    let duration = start.elapsed();

    println!("Bytes:    {}", total_bytes);
    println!("Checksum: written {} read {}", wsum, rsum);
    println!("Time:     {:?}", duration);
    println!("Result:   {}\n", if wsum == rsum { "✓ OK" } else { "✗ MISMATCH" });

    // SPSC handles: the borrow checker keeps one thread per side
    let (mut tx, mut rx) = SpscPipe::new(64).unwrap().split();
    let sender = thread::spawn(move || {
        for line in ["alpha\n", "beta\n", "gamma\n"] {
            while tx.write(line.as_bytes()) == 0 {
                thread::yield_now();
            }
        }
    });
    sender.join().unwrap();

    let mut out = [0u8; 64];
    let n = rx.read(&mut out);
    print!("SPSC:     {}", String::from_utf8_lossy(&out[..n]));
}
