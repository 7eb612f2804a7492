//! Deterministic random source with draw recording and replay.
//!
//! Every random decision the engine makes funnels through one
//! [`RecordingRng`]. Runs with the same seed make identical decisions, and a
//! recorded trace of draws can later be followed to detect nondeterminism in
//! the system under test: if a replayed run consumes randomness differently,
//! the draw stream diverges and the divergence is reported with its index.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::FollowTraceError;

struct Inner {
    rng: StdRng,
    recording: bool,
    trace: Vec<u32>,
    follow: Option<Vec<u32>>,
    cursor: usize,
    last: u32,
    desync: Option<FollowTraceError>,
}

/// Seeded random source that can record its draw stream and verify a replay
/// against a previous recording.
pub struct RecordingRng {
    inner: Mutex<Inner>,
    seed: u64,
}

impl RecordingRng {
    pub fn with_seed(seed: u64) -> RecordingRng {
        RecordingRng {
            inner: Mutex::new(Inner {
                rng: StdRng::seed_from_u64(seed),
                recording: false,
                trace: Vec::new(),
                follow: None,
                cursor: 0,
                last: 0,
                desync: None,
            }),
            seed,
        }
    }

    /// Same seed, but every draw is kept for later replay.
    pub fn recording(seed: u64) -> RecordingRng {
        let rng = RecordingRng::with_seed(seed);
        rng.inner.lock().recording = true;
        rng
    }

    /// Replays `seed` while checking each draw against `trace`.
    ///
    /// The first divergent draw is latched and reported by [`Self::desync`];
    /// draws keep returning real values so the caller can stop at a clean
    /// point.
    pub fn following(seed: u64, trace: Vec<u32>) -> RecordingRng {
        let rng = RecordingRng::with_seed(seed);
        rng.inner.lock().follow = Some(trace);
        rng
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn draw(&self) -> u32 {
        let mut inner = self.inner.lock();
        let value = inner.rng.next_u32();
        if inner.recording {
            inner.trace.push(value);
        }
        inner.last = value;
        if inner.desync.is_none() {
            if let Some(follow) = &inner.follow {
                let expected = follow.get(inner.cursor).copied();
                if expected != Some(value) {
                    inner.desync = Some(FollowTraceError {
                        index: inner.cursor,
                        expected,
                        actual: value,
                    });
                }
            }
        }
        inner.cursor += 1;
        value
    }

    pub fn next_u32(&self) -> u32 {
        self.draw()
    }

    pub fn next_u64(&self) -> u64 {
        let high = self.draw() as u64;
        let low = self.draw() as u64;
        (high << 32) | low
    }

    pub fn gen_bool(&self) -> bool {
        self.draw() & 1 == 1
    }

    /// Uniform draw in `[0.0, 1.0)`.
    pub fn gen_f64(&self) -> f64 {
        self.draw() as f64 / (u32::MAX as f64 + 1.0)
    }

    /// Uniform draw in `[0.0, 1.0)` with `f32` precision.
    pub fn gen_f32(&self) -> f32 {
        self.gen_f64() as f32
    }

    /// Uniform index in `[0, bound)`. A zero bound yields zero without
    /// consuming a draw.
    pub fn gen_index(&self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (self.next_u64() % bound as u64) as usize
    }

    /// Uniform draw in `[0, bound)` for positive `bound`.
    pub fn gen_i64_below(&self, bound: i64) -> i64 {
        debug_assert!(bound > 0);
        (self.next_u64() % bound as u64) as i64
    }

    /// Fisher-Yates shuffle driven by this source.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        for index in (1..items.len()).rev() {
            let other = self.gen_index(index + 1);
            items.swap(index, other);
        }
    }

    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            Some(&items[self.gen_index(items.len())])
        }
    }

    /// Derives a seed for an isolated child generator.
    ///
    /// Custom random callbacks run against a child seeded from here so their
    /// draws stay inside the recorded stream.
    pub fn sub_seed(&self) -> u64 {
        self.next_u64()
    }

    /// Number of draws consumed so far.
    pub fn draws(&self) -> usize {
        self.inner.lock().cursor
    }

    /// The most recent draw, zero before any draw.
    pub fn last_draw(&self) -> u32 {
        self.inner.lock().last
    }

    /// The recorded draw stream, empty unless recording was enabled.
    pub fn trace(&self) -> Vec<u32> {
        self.inner.lock().trace.clone()
    }

    /// The first divergence from a followed trace, if any.
    pub fn desync(&self) -> Option<FollowTraceError> {
        self.inner.lock().desync.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_draws() {
        let a = RecordingRng::with_seed(42);
        let b = RecordingRng::with_seed(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let a = RecordingRng::with_seed(1);
        let b = RecordingRng::with_seed(2);
        let draws_a: Vec<u32> = (0..10).map(|_| a.next_u32()).collect();
        let draws_b: Vec<u32> = (0..10).map(|_| b.next_u32()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn recorded_trace_replays_cleanly() {
        let recorder = RecordingRng::recording(7);
        for _ in 0..50 {
            recorder.gen_index(10);
        }
        let trace = recorder.trace();
        assert!(!trace.is_empty());

        let replay = RecordingRng::following(7, trace);
        for _ in 0..50 {
            replay.gen_index(10);
        }
        assert!(replay.desync().is_none());
    }

    #[test]
    fn divergent_replay_latches_first_mismatch() {
        let recorder = RecordingRng::recording(7);
        for _ in 0..10 {
            recorder.next_u32();
        }
        let mut trace = recorder.trace();
        trace[3] = trace[3].wrapping_add(1);

        let replay = RecordingRng::following(7, trace);
        for _ in 0..10 {
            replay.next_u32();
        }
        let desync = replay.desync().unwrap();
        assert_eq!(desync.index, 3);
        assert_eq!(desync.expected, Some(desync.actual.wrapping_add(1)));
    }

    #[test]
    fn replay_past_end_of_trace_is_a_desync() {
        let recorder = RecordingRng::recording(7);
        recorder.next_u32();
        let replay = RecordingRng::following(7, recorder.trace());
        replay.next_u32();
        replay.next_u32();
        let desync = replay.desync().unwrap();
        assert_eq!(desync.index, 1);
        assert_eq!(desync.expected, None);
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let a = RecordingRng::with_seed(9);
        let b = RecordingRng::with_seed(9);
        let mut items_a: Vec<u32> = (0..20).collect();
        let mut items_b: Vec<u32> = (0..20).collect();
        a.shuffle(&mut items_a);
        b.shuffle(&mut items_b);
        assert_eq!(items_a, items_b);
    }

    #[test]
    fn gen_index_respects_bound() {
        let rng = RecordingRng::with_seed(3);
        for _ in 0..1000 {
            assert!(rng.gen_index(7) < 7);
        }
        assert_eq!(rng.gen_index(0), 0);
    }

    #[test]
    fn gen_f64_is_in_unit_interval() {
        let rng = RecordingRng::with_seed(11);
        for _ in 0..1000 {
            let draw = rng.gen_f64();
            assert!((0.0..1.0).contains(&draw));
        }
    }
}
