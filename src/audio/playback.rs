//! # Playback Scheduler
//!
//! Gapless sequential playback of streamed examiner speech. Chunks arrive as
//! raw PCM16 at the output rate and must play back-to-back in arrival order,
//! even when the network delivers them faster or slower than real time.
//!
//! ## Scheduling Rule:
//! A monotonic cursor `next_start` tracks where the next buffer belongs on
//! the output timeline. Each new buffer starts at
//! `max(next_start, clock.now())` and advances the cursor by its duration, so
//! consecutive chunks neither overlap nor leave gaps, and the timeline
//! self-corrects if playback has fallen behind the clock.
//!
//! ## End-of-speech Detection:
//! Scheduled buffers sit in an in-flight set until their end time passes.
//! The set going from 1 to 0 is the only signal that the examiner has
//! finished speaking - the service sends no explicit turn-end audio marker.

use crate::audio::codec;
use crate::error::AppResult;
use std::collections::BTreeMap;
use std::time::Instant;

/// A read-only clock on the output timeline, in seconds.
///
/// Injected so the scheduling rule can be exercised in tests with a manual
/// clock; the session uses [`SessionClock`], anchored at session start.
pub trait OutputClock {
    fn now(&self) -> f64;
}

/// Wall-clock seconds since the session's output context was created.
pub struct SessionClock {
    started: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl OutputClock for SessionClock {
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// A decoded audio buffer with its slot on the output timeline.
#[derive(Debug, Clone)]
pub struct ScheduledChunk {
    /// Monotonic sequence number, used as the in-flight set key
    pub sequence: u64,

    /// Start time on the output timeline (seconds)
    pub start_time: f64,

    /// Buffer duration (seconds)
    pub duration: f64,

    /// Mono float samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
}

/// Schedules inbound PCM chunks on a shared output timeline and tracks which
/// buffers are still playing.
pub struct PlaybackScheduler<C: OutputClock> {
    clock: C,
    sample_rate: u32,
    next_start: f64,
    next_sequence: u64,

    /// In-flight buffers: sequence number → end time on the output timeline
    in_flight: BTreeMap<u64, f64>,
}

impl<C: OutputClock> PlaybackScheduler<C> {
    pub fn new(clock: C, sample_rate: u32) -> Self {
        Self {
            clock,
            sample_rate,
            next_start: 0.0,
            next_sequence: 0,
            in_flight: BTreeMap::new(),
        }
    }

    /// Decode a PCM chunk and assign it the next slot on the timeline.
    ///
    /// Returns `Ok(None)` for zero-duration chunks (nothing to schedule).
    /// A decode failure aborts only this playback event; the caller logs it
    /// and the session keeps running.
    pub fn schedule(&mut self, pcm: &[u8]) -> AppResult<Option<ScheduledChunk>> {
        let mut channels = codec::pcm16_to_float(pcm, 1)?;
        let samples = channels.remove(0);
        if samples.is_empty() {
            return Ok(None);
        }

        let duration = samples.len() as f64 / self.sample_rate as f64;
        let start_time = self.next_start.max(self.clock.now());
        self.next_start = start_time + duration;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.in_flight.insert(sequence, start_time + duration);

        Ok(Some(ScheduledChunk {
            sequence,
            start_time,
            duration,
            samples,
        }))
    }

    /// Earliest end time among in-flight buffers, if any.
    ///
    /// The session loop sleeps until this deadline to learn when playback
    /// finishes without polling.
    pub fn next_deadline(&self) -> Option<f64> {
        self.in_flight.values().cloned().fold(None, |min, end| match min {
            Some(m) if m <= end => Some(m),
            _ => Some(end),
        })
    }

    /// Drop every buffer whose end time has passed.
    ///
    /// Returns true exactly when this call emptied a non-empty set - the
    /// moment the examiner stops speaking.
    pub fn reap_finished(&mut self, now: f64) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        self.in_flight.retain(|_, end| *end > now);
        self.in_flight.is_empty()
    }

    /// Current time on the output timeline.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Number of buffers still scheduled or playing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Manually advanced clock for exercising the scheduling rule.
    #[derive(Clone)]
    struct TestClock(Rc<Cell<f64>>);

    impl TestClock {
        fn new(start: f64) -> Self {
            TestClock(Rc::new(Cell::new(start)))
        }

        fn advance_to(&self, t: f64) {
            self.0.set(t);
        }
    }

    impl OutputClock for TestClock {
        fn now(&self) -> f64 {
            self.0.get()
        }
    }

    fn pcm_of_samples(count: usize) -> Vec<u8> {
        vec![0u8; count * 2]
    }

    #[test]
    fn test_chunks_schedule_back_to_back() {
        let clock = TestClock::new(1.0);
        let mut scheduler = PlaybackScheduler::new(clock, 24_000);

        // Three chunks of 0.5s, 0.25s, 1.0s submitted before the first ends
        let c1 = scheduler.schedule(&pcm_of_samples(12_000)).unwrap().unwrap();
        let c2 = scheduler.schedule(&pcm_of_samples(6_000)).unwrap().unwrap();
        let c3 = scheduler.schedule(&pcm_of_samples(24_000)).unwrap().unwrap();

        assert_eq!(c1.start_time, 1.0);
        assert_eq!(c2.start_time, c1.start_time + c1.duration);
        assert_eq!(c3.start_time, c2.start_time + c2.duration);
        assert_eq!((c1.sequence, c2.sequence, c3.sequence), (0, 1, 2));
        assert_eq!(scheduler.in_flight(), 3);
    }

    #[test]
    fn test_cursor_self_corrects_when_behind_clock() {
        let clock = TestClock::new(0.0);
        let mut scheduler = PlaybackScheduler::new(clock.clone(), 24_000);

        let c1 = scheduler.schedule(&pcm_of_samples(2_400)).unwrap().unwrap();
        assert_eq!(c1.start_time, 0.0);

        // A long silent gap: the next chunk must not start in the past
        clock.advance_to(5.0);
        let c2 = scheduler.schedule(&pcm_of_samples(2_400)).unwrap().unwrap();
        assert_eq!(c2.start_time, 5.0);
    }

    #[test]
    fn test_zero_duration_chunk_skipped() {
        let clock = TestClock::new(0.0);
        let mut scheduler = PlaybackScheduler::new(clock, 24_000);
        assert!(scheduler.schedule(&[]).unwrap().is_none());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_malformed_chunk_aborts_only_that_event() {
        let clock = TestClock::new(0.0);
        let mut scheduler = PlaybackScheduler::new(clock, 24_000);
        assert!(scheduler.schedule(&[0u8; 3]).is_err());

        // Scheduler still works afterwards
        assert!(scheduler.schedule(&pcm_of_samples(100)).unwrap().is_some());
    }

    #[test]
    fn test_set_empties_only_when_last_buffer_finishes() {
        let clock = TestClock::new(0.0);
        let mut scheduler = PlaybackScheduler::new(clock.clone(), 24_000);

        // Two 0.5s chunks: ends at 0.5 and 1.0
        scheduler.schedule(&pcm_of_samples(12_000)).unwrap();
        scheduler.schedule(&pcm_of_samples(12_000)).unwrap();

        // First buffer ends: set shrinks 2 → 1, no end-of-speech yet
        assert!(!scheduler.reap_finished(0.6));
        assert_eq!(scheduler.in_flight(), 1);

        // Second buffer ends: 1 → 0 signals the examiner stopped
        assert!(scheduler.reap_finished(1.1));
        assert!(scheduler.is_idle());

        // Reaping an already-empty set is not a new signal
        assert!(!scheduler.reap_finished(2.0));
    }

    #[test]
    fn test_next_deadline_tracks_earliest_end() {
        let clock = TestClock::new(0.0);
        let mut scheduler = PlaybackScheduler::new(clock, 24_000);
        assert!(scheduler.next_deadline().is_none());

        scheduler.schedule(&pcm_of_samples(12_000)).unwrap(); // ends 0.5
        scheduler.schedule(&pcm_of_samples(12_000)).unwrap(); // ends 1.0
        assert_eq!(scheduler.next_deadline(), Some(0.5));

        scheduler.reap_finished(0.6);
        assert_eq!(scheduler.next_deadline(), Some(1.0));
    }
}
