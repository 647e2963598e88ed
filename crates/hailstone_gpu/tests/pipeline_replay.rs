//! Replays the host side of the stream against a software kernel: sequencers
//! emit interleaved slot batches, a CPU walk produces the counts the shader
//! would, and the tracker consumes them in submission order.

use hailstone_gpu::progress::ProgressStore;
use hailstone_gpu::sequencer::ValueSequencer;
use hailstone_gpu::tracker::{Position, Record, RecordTracker};
use tempfile::TempDir;

/// Total stopping time of `n`.
fn stopping_time(mut n: u128) -> u16 {
    let mut steps = 0u16;
    while n != 1 {
        n = if n & 1 == 0 { n / 2 } else { 3 * n + 1 };
        steps += 1;
    }
    steps
}

fn decode(lane: [u32; 4]) -> u128 {
    lane[0] as u128 | (lane[1] as u128) << 32 | (lane[2] as u128) << 64 | (lane[3] as u128) << 96
}

/// Counts for one emitted batch, packed as the kernel packs them and read
/// back as the host reads them: lane `i` lands in entries `2i` and `2i + 1`.
fn software_kernel(batch: &[[u32; 4]]) -> Vec<u16> {
    let mut counts = Vec::with_capacity(batch.len() * 2);
    for lane in batch {
        let value = decode(*lane);
        counts.push(stopping_time(value));
        counts.push(stopping_time(value + 2));
    }
    counts
}

fn run_rounds(position: Position, slots: u32, width: u32, rounds: u32) -> RecordTracker {
    let mut sequencers: Vec<ValueSequencer> = (0..slots)
        .map(|slot| ValueSequencer::for_slot(position.cur_value, slot, slots, width))
        .collect();
    let mut tracker = RecordTracker::new(position);
    for _ in 0..rounds {
        for sequencer in sequencers.iter_mut() {
            let mut batch = vec![[0u32; 4]; width as usize];
            sequencer.fill(&mut batch);
            tracker.consume(&software_kernel(&batch));
        }
    }
    tracker
}

#[test]
fn replayed_stream_matches_brute_force() {
    let width = 128u32;
    let slots = 4u32;
    let rounds = 4u32;
    let tracker = run_rounds(Position::fresh(), slots, width, rounds);

    // Every record the walked range holds, except 2: it is even and passes
    // while no lookback entry exists yet.
    let end = 2 + (rounds * slots * width * 4) as u128;
    let mut expected = Vec::new();
    let mut best = 0u16;
    for n in 3..end {
        let count = stopping_time(n);
        if count > best {
            expected.push(Record { value: n, count });
            best = count;
        }
    }

    assert_eq!(tracker.records(), expected.as_slice());
    assert_eq!(tracker.position().cur_value, end + 1);
    assert_eq!(tracker.position().cur_count, best);
}

#[test]
fn resume_through_progress_file_is_seamless() {
    let width = 64u32;
    let slots = 2u32;
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("progress"));

    let front = run_rounds(Position::fresh(), slots, width, 2);
    store.save(front.position()).unwrap();
    let resumed = store.load().unwrap();
    assert_eq!(resumed, *front.position());

    let back = run_rounds(resumed, slots, width, 2);
    let straight = run_rounds(Position::fresh(), slots, width, 4);

    assert_eq!(back.position(), straight.position());
    let mut combined = front.records().to_vec();
    combined.extend_from_slice(back.records());
    assert_eq!(combined.as_slice(), straight.records());
}

#[test]
fn saturated_counts_never_panic_or_record() {
    // A count at the u16 ceiling cannot be exceeded; the tracker must treat
    // the plateau as no-record rather than wrap.
    let position = Position {
        cur_value: 3,
        cur_count: u16::MAX,
        val0mod1off: [2, 0, 0],
        val1mod6off: [0, 0, 0],
    };
    let mut tracker = RecordTracker::new(position);
    let appended = tracker.consume(&vec![u16::MAX; 8]);
    assert_eq!(appended, 0);
    assert!(tracker.records().is_empty());
    assert_eq!(tracker.position().cur_count, u16::MAX);
    assert_eq!(tracker.position().val0mod1off, [2, 0, 0]);
    assert_eq!(tracker.position().cur_value, 3 + 16);
}
