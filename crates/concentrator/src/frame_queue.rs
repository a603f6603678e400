//! FrameQueue - pending frames ordered by destination timestamp
//!
//! One mutex guards the ordered list, the timestamp index and the
//! last-published watermark. It is held only for single structural
//! mutations, never while a frame is being filled or published.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::Ticks;
use serde::Serialize;
use tracing::trace;

use crate::frame::TrackingFrame;
use crate::strategy::FrameStrategy;

/// Queue entry as reported by [`crate::Concentrator::queue_state`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedFrame {
    pub timestamp: Ticks,
    pub samples: usize,
    pub published: bool,
}

#[derive(Debug)]
struct QueueState {
    /// Ascending by timestamp, no duplicates
    frames: VecDeque<Arc<TrackingFrame>>,
    index: HashMap<Ticks, Arc<TrackingFrame>>,
    last_published: Ticks,
    frames_per_second: u32,
    ticks_per_frame: f64,
    time_resolution: i64,
    round_to_nearest: bool,
}

impl QueueState {
    fn bucketing(&self) -> Bucketing {
        Bucketing {
            ticks_per_frame: self.ticks_per_frame,
            time_resolution: self.time_resolution,
            round_to_nearest: self.round_to_nearest,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FrameQueue {
    state: Mutex<QueueState>,
    strategy: Arc<dyn FrameStrategy>,
}

/// How sample timestamps are bucketed into frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Bucketing {
    pub ticks_per_frame: f64,
    pub time_resolution: i64,
    pub round_to_nearest: bool,
}

/// Maps a sample timestamp to its frame's destination timestamp.
///
/// With a resolution above one tick the timestamp is truncated to that
/// resolution inside its second and then rounded up to the next frame
/// boundary. In round-to-nearest mode the resolution is ignored and the
/// nearest boundary wins instead. Boundaries sit at
/// `round(k * ticks_per_frame)` so that they do not drift across the second.
pub(crate) fn destination_ticks(ticks: Ticks, bucketing: Bucketing) -> Ticks {
    let Bucketing {
        ticks_per_frame,
        time_resolution,
        round_to_nearest,
    } = bucketing;
    let boundary = |k: i64| (k as f64 * ticks_per_frame).round() as i64;
    let base = ticks.base_of_second().value();
    let beyond = ticks.distance_beyond_second();

    if round_to_nearest {
        let frame = (beyond as f64 / ticks_per_frame).round() as i64;
        return Ticks::new(base.saturating_add(boundary(frame)));
    }

    if time_resolution <= 1 {
        return ticks;
    }

    let truncated = beyond - beyond % time_resolution;
    let mut frame = (truncated as f64 / ticks_per_frame) as i64;
    if boundary(frame) < truncated {
        frame += 1;
    }

    Ticks::new(base.saturating_add(boundary(frame)))
}

/// Position of a frame timestamp within its second, `0..frames_per_second`.
pub(crate) fn frame_index(timestamp: Ticks, frames_per_second: u32, bucketing: Bucketing) -> u32 {
    let Bucketing {
        ticks_per_frame,
        time_resolution,
        round_to_nearest,
    } = bucketing;
    let offset = if time_resolution > 1 && !round_to_nearest {
        time_resolution / 2
    } else {
        1
    };
    let beyond = timestamp.distance_beyond_second() + offset;
    let index = (beyond as f64 / ticks_per_frame) as u32;
    index.min(frames_per_second.saturating_sub(1))
}

impl FrameQueue {
    pub fn new(frames_per_second: u32, time_resolution: i64, strategy: Arc<dyn FrameStrategy>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                index: HashMap::new(),
                last_published: Ticks::ZERO,
                frames_per_second,
                ticks_per_frame: Ticks::PER_SECOND as f64 / f64::from(frames_per_second),
                time_resolution,
                round_to_nearest: false,
            }),
            strategy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn strategy(&self) -> &dyn FrameStrategy {
        self.strategy.as_ref()
    }

    /// Recomputes frame spacing; a no-op when the rate is unchanged.
    pub fn set_frames_per_second(&self, frames_per_second: u32) {
        let mut state = self.lock();
        if state.frames_per_second == frames_per_second {
            return;
        }
        state.frames_per_second = frames_per_second;
        state.ticks_per_frame = Ticks::PER_SECOND as f64 / f64::from(frames_per_second);
    }

    pub fn ticks_per_frame(&self) -> f64 {
        self.lock().ticks_per_frame
    }

    pub fn set_time_resolution(&self, time_resolution: i64) {
        self.lock().time_resolution = time_resolution;
    }

    pub fn set_round_to_nearest(&self, round_to_nearest: bool) {
        self.lock().round_to_nearest = round_to_nearest;
    }

    pub fn last_published(&self) -> Ticks {
        self.lock().last_published
    }

    /// Returns the frame for `ticks`, creating it on first use.
    ///
    /// A new frame remembers `now` as its creation time. `None` when the
    /// destination is at or before the last published frame.
    pub fn get_frame(&self, ticks: Ticks, now: Ticks) -> Option<Arc<TrackingFrame>> {
        let mut state = self.lock();
        let destination = destination_ticks(ticks, state.bucketing());

        if destination <= state.last_published {
            return None;
        }

        if let Some(frame) = state.index.get(&destination) {
            return Some(frame.clone());
        }

        let mut created = self.strategy.create_frame(destination);
        created.timestamp = destination;
        let frame = Arc::new(TrackingFrame::new(created, now));

        // New frames almost always belong at the tail.
        let position = state
            .frames
            .iter()
            .rposition(|queued| queued.timestamp() < destination)
            .map_or(0, |i| i + 1);
        state.frames.insert(position, frame.clone());
        state.index.insert(destination, frame.clone());

        trace!(
            destination = destination.value(),
            position,
            queued = state.frames.len(),
            "created frame"
        );
        Some(frame)
    }

    /// Earliest pending frame.
    pub fn head(&self) -> Option<Arc<TrackingFrame>> {
        self.lock().frames.front().cloned()
    }

    /// Claims `frame` for publication.
    ///
    /// Succeeds only while `frame` is still the head; afterwards no sample
    /// can be routed to it or to any earlier destination.
    pub fn begin_publish(&self, frame: &Arc<TrackingFrame>) -> bool {
        let mut state = self.lock();
        let is_head = state
            .frames
            .front()
            .is_some_and(|head| Arc::ptr_eq(head, frame));
        if is_head {
            state.last_published = frame.timestamp();
        }
        is_head
    }

    /// Removes the head frame.
    pub fn pop(&self) -> Option<Arc<TrackingFrame>> {
        let mut state = self.lock();
        let frame = state.frames.pop_front()?;
        state.index.remove(&frame.timestamp());
        Some(frame)
    }

    pub fn frame_index(&self, timestamp: Ticks) -> u32 {
        let state = self.lock();
        frame_index(timestamp, state.frames_per_second, state.bucketing())
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Drops every pending frame and resets the watermark.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.frames.clear();
        state.index.clear();
        state.last_published = Ticks::ZERO;
    }

    pub fn snapshot(&self) -> Vec<QueuedFrame> {
        let frames: Vec<_> = self.lock().frames.iter().cloned().collect();
        frames
            .iter()
            .map(|frame| QueuedFrame {
                timestamp: frame.timestamp(),
                samples: frame.sample_count(),
                published: frame.is_published(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::DefaultFrameStrategy;
    use contracts::{DownsamplingMethod, Sample};
    use rand::seq::SliceRandom;

    const BASE: i64 = 638_000_000_000_000_000;
    const TPF_30: f64 = Ticks::PER_SECOND as f64 / 30.0;

    fn queue(time_resolution: i64) -> FrameQueue {
        FrameQueue::new(30, time_resolution, Arc::new(DefaultFrameStrategy))
    }

    fn at(offset: i64) -> Ticks {
        Ticks::new(BASE + offset)
    }

    fn truncating(time_resolution: i64) -> Bucketing {
        Bucketing {
            ticks_per_frame: TPF_30,
            time_resolution,
            round_to_nearest: false,
        }
    }

    fn nearest() -> Bucketing {
        Bucketing {
            round_to_nearest: true,
            ..truncating(Ticks::PER_MILLISECOND)
        }
    }

    #[test]
    fn test_raw_resolution_keeps_timestamp() {
        assert_eq!(destination_ticks(at(1234), truncating(0)), at(1234));
        assert_eq!(destination_ticks(at(1234), truncating(1)), at(1234));
    }

    #[test]
    fn test_rounds_up_to_frame_boundary() {
        let ms = Ticks::PER_MILLISECOND;
        // Exactly on a boundary stays put
        assert_eq!(destination_ticks(at(0), truncating(ms)), at(0));
        assert_eq!(destination_ticks(at(333_333), truncating(1)), at(333_333));
        // 1 ms into the second rounds up to frame 1
        assert_eq!(destination_ticks(at(ms), truncating(ms)), at(333_333));
        // 34 ms -> frame 2 boundary at 66.67 ms
        assert_eq!(destination_ticks(at(34 * ms), truncating(ms)), at(666_667));
        // Past the last frame rolls into the next second
        assert_eq!(
            destination_ticks(at(999 * ms), truncating(ms)),
            at(Ticks::PER_SECOND)
        );
    }

    #[test]
    fn test_every_frame_timestamp_maps_to_itself() {
        for k in 0..30 {
            let exact = at((k as f64 * TPF_30).round() as i64);
            assert_eq!(destination_ticks(exact, truncating(Ticks::PER_MILLISECOND / 10)), exact);
        }
    }

    #[test]
    fn test_frame_index() {
        for k in 0..30u32 {
            let ts = at((f64::from(k) * TPF_30).round() as i64);
            assert_eq!(frame_index(ts, 30, truncating(0)), k);
        }
        // Truncated timestamps are centred within the resolution
        assert_eq!(frame_index(at(333_000), 30, truncating(1000)), 1);
        assert_eq!(frame_index(at(Ticks::PER_SECOND - 1), 30, truncating(0)), 29);
    }

    #[test]
    fn test_get_frame_creates_once_and_keeps_order() {
        let queue = queue(0);
        let mut offsets: Vec<i64> = (0..50).map(|i| i * 1000).collect();
        offsets.shuffle(&mut rand::rng());

        for &offset in &offsets {
            assert!(queue.get_frame(at(offset), Ticks::ZERO).is_some());
        }
        let again = queue.get_frame(at(7000), Ticks::ZERO).unwrap();
        let first = queue.get_frame(at(7000), Ticks::ZERO).unwrap();
        assert!(Arc::ptr_eq(&again, &first));

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert!(snapshot.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(queue.head().unwrap().timestamp(), at(0));
    }

    #[test]
    fn test_rejects_destination_at_or_before_last_published() {
        let queue = queue(0);
        let head = queue.get_frame(at(100), Ticks::ZERO).unwrap();
        queue.get_frame(at(200), Ticks::ZERO).unwrap();

        assert!(queue.begin_publish(&head));
        assert_eq!(queue.last_published(), at(100));
        assert!(queue.get_frame(at(100), Ticks::ZERO).is_none());
        assert!(queue.get_frame(at(50), Ticks::ZERO).is_none());
        assert!(queue.get_frame(at(150), Ticks::ZERO).is_some());

        queue.pop();
        assert_eq!(queue.head().unwrap().timestamp(), at(150));
    }

    #[test]
    fn test_begin_publish_requires_head() {
        let queue = queue(0);
        let later = queue.get_frame(at(500), Ticks::ZERO).unwrap();
        let stale_head = queue.head().unwrap();
        // An earlier frame arrives after the head was read
        queue.get_frame(at(400), Ticks::ZERO).unwrap();

        assert!(!queue.begin_publish(&stale_head));
        assert!(Arc::ptr_eq(&stale_head, &later));
        assert_eq!(queue.last_published(), Ticks::ZERO);
    }

    #[test]
    fn test_clear_resets_watermark() {
        let queue = queue(0);
        let head = queue.get_frame(at(100), Ticks::ZERO).unwrap();
        head.try_assign(
            Sample::new("PMU_A:FREQ", at(100), 60.0),
            queue.strategy(),
            DownsamplingMethod::LastReceived,
        )
        .unwrap();
        queue.begin_publish(&head);
        queue.clear();

        assert_eq!(queue.len(), 0);
        assert!(queue.head().is_none());
        assert!(queue.get_frame(at(100), Ticks::ZERO).is_some());
    }

    #[test]
    fn test_same_frame_rate_is_noop() {
        let queue = queue(0);
        let before = queue.ticks_per_frame().to_bits();
        queue.set_frames_per_second(30);
        assert_eq!(queue.ticks_per_frame().to_bits(), before);
        queue.set_frames_per_second(60);
        assert!((queue.ticks_per_frame() - TPF_30 / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_to_nearest_picks_closest_boundary() {
        let ms = Ticks::PER_MILLISECOND;
        // 10 ms sits nearer frame 0 than frame 1 at 33.3 ms
        assert_eq!(destination_ticks(at(10 * ms), nearest()), at(0));
        assert_eq!(destination_ticks(at(20 * ms), nearest()), at(333_333));
        // Sub-resolution offsets are not truncated first
        assert_eq!(destination_ticks(at(333_400), nearest()), at(333_333));
        assert_eq!(destination_ticks(at(998 * ms), nearest()), at(Ticks::PER_SECOND));
        assert_eq!(frame_index(at(333_333), 30, nearest()), 1);
    }

    #[test]
    fn test_round_to_nearest_queue_setting() {
        let queue = FrameQueue::new(30, Ticks::PER_MILLISECOND, Arc::new(DefaultFrameStrategy));
        queue.set_round_to_nearest(true);
        let frame = queue.get_frame(at(10 * Ticks::PER_MILLISECOND), at(-5)).unwrap();
        assert_eq!(frame.timestamp(), at(0));
        assert_eq!(frame.created(), at(-5));
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let coarse = truncating(Ticks::PER_MILLISECOND);
        assert!(destination_ticks(Ticks::new(i64::MAX), coarse) <= Ticks::new(i64::MAX));
        assert!(destination_ticks(Ticks::new(i64::MIN), coarse) <= Ticks::new(i64::MIN + Ticks::PER_SECOND));
        destination_ticks(Ticks::new(i64::MAX), nearest());
    }
}
