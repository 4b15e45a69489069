//! The capture → detect → transform → send loop.

use std::{thread, time::Duration};

use crate::{
    config::CaptureConfig,
    error::RelayError,
    pipeline::{FrameSource, LandmarkDetector, Preview, PreviewEvent},
    sender::LandmarkSink,
    transform::CoordinateConvention,
    types::{Detection, TrackingMode},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    QuitRequested,
    WindowClosed,
    SourceEnded,
    FrameLimit,
    CaptureFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped(StopReason),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub frames: u64,
    pub detections: u64,
    pub datagrams: u64,
    pub read_failures: u64,
    pub stop_reason: Option<StopReason>,
}

/// Consecutive-failure counter with exponential backoff.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_failures: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    failures: u32,
}

impl RetryPolicy {
    pub fn new(max_failures: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            initial_backoff,
            max_backoff,
            failures: 0,
        }
    }

    pub fn from_config(cfg: &CaptureConfig) -> Self {
        Self::new(
            cfg.max_consecutive_failures,
            cfg.initial_backoff(),
            cfg.max_backoff(),
        )
    }

    /// Records a failure. Returns the delay before the next attempt, or `None`
    /// once the failure budget is spent.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.max_failures {
            return None;
        }
        let shift = (self.failures - 1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << shift);
        Some(delay.min(self.max_backoff))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

pub struct Relay<S, D, K, P> {
    mode: TrackingMode,
    convention: CoordinateConvention,
    source: S,
    detector: D,
    sink: K,
    preview: P,
    retry: RetryPolicy,
    max_frames: Option<u64>,
    state: RunState,
    summary: RelaySummary,
}

impl<S, D, K, P> Relay<S, D, K, P>
where
    S: FrameSource,
    D: LandmarkDetector,
    K: LandmarkSink,
    P: Preview,
{
    pub fn new(
        mode: TrackingMode,
        convention: CoordinateConvention,
        source: S,
        detector: D,
        sink: K,
        preview: P,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            mode,
            convention,
            source,
            detector,
            sink,
            preview,
            retry,
            max_frames: None,
            state: RunState::Running,
            summary: RelaySummary::default(),
        }
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn summary(&self) -> &RelaySummary {
        &self.summary
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Runs until stopped. Source, detector, sink and preview are dropped with
    /// `self` on every return path.
    pub fn run(mut self) -> Result<RelaySummary, RelayError> {
        log::info!(
            "{} tracking started ({} coordinates)",
            self.mode,
            self.convention.label()
        );

        while self.state == RunState::Running {
            self.step()?;
        }

        if let RunState::Stopped(reason) = self.state {
            log::info!(
                "{} tracking stopped ({reason:?}) after {} frames, {} datagrams",
                self.mode,
                self.summary.frames,
                self.summary.datagrams
            );
        }
        Ok(self.summary.clone())
    }

    /// One loop iteration. Returns the state after the iteration.
    pub fn step(&mut self) -> Result<RunState, RelayError> {
        if let RunState::Stopped(_) = self.state {
            return Ok(self.state);
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) if frame.is_well_formed() => frame,
            Ok(Some(frame)) => {
                let err = anyhow::anyhow!(
                    "malformed frame {}x{} with {} bytes",
                    frame.width,
                    frame.height,
                    frame.rgba.len()
                );
                return self.handle_read_failure(err);
            }
            Ok(None) => {
                self.stop(StopReason::SourceEnded);
                return Ok(self.state);
            }
            Err(err) => return self.handle_read_failure(err),
        };
        self.retry.reset();
        self.summary.frames += 1;

        let detection = match self.detector.detect(&frame) {
            Ok(detection) => detection,
            Err(err) => {
                log::warn!("{} detection failed: {err:?}", self.mode);
                None
            }
        };

        if let Some(detection) = &detection {
            self.forward(detection, frame.width, frame.height)?;
        }

        match self.preview.present(&frame, detection.as_ref(), self.mode) {
            PreviewEvent::Continue => {}
            PreviewEvent::Quit => self.stop(StopReason::QuitRequested),
            PreviewEvent::Closed => self.stop(StopReason::WindowClosed),
        }

        if self.state == RunState::Running
            && self
                .max_frames
                .is_some_and(|limit| self.summary.frames >= limit)
        {
            self.stop(StopReason::FrameLimit);
        }

        Ok(self.state)
    }

    fn forward(&mut self, detection: &Detection, width: u32, height: u32) -> Result<(), RelayError> {
        let expected = self.mode.landmark_count();
        if detection.landmarks.len() != expected {
            log::warn!(
                "dropping {} detection with {} landmarks, expected {expected}",
                self.mode,
                detection.landmarks.len()
            );
            return Ok(());
        }
        self.summary.detections += 1;

        let transformed = self
            .convention
            .apply_all(&detection.landmarks, width, height);
        match self.sink.publish(self.mode, &transformed) {
            Ok(()) => {
                self.summary.datagrams += 1;
                Ok(())
            }
            Err(RelayError::Wire(err)) => {
                log::warn!("dropping {} landmarks: {err}", self.mode);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn handle_read_failure(&mut self, err: anyhow::Error) -> Result<RunState, RelayError> {
        self.summary.read_failures += 1;
        match self.retry.record_failure() {
            Some(delay) => {
                log::warn!(
                    "frame read failed ({} in a row), retrying in {delay:?}: {err:?}",
                    self.retry.failures()
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                Ok(self.state)
            }
            None => {
                let failures = self.retry.failures();
                log::error!("frame read failed {failures} times in a row: {err:?}");
                self.stop(StopReason::CaptureFailed);
                Err(RelayError::CaptureFailed { failures })
            }
        }
    }

    fn stop(&mut self, reason: StopReason) {
        self.state = RunState::Stopped(reason);
        self.summary.stop_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::VecDeque, rc::Rc};

    use super::*;
    use crate::{
        pipeline::HeadlessPreview,
        types::{Frame, Landmark},
    };

    enum Scripted {
        Frame,
        Fail,
    }

    struct ScriptedSource {
        script: VecDeque<Scripted>,
    }

    impl ScriptedSource {
        fn frames(n: usize) -> Self {
            Self {
                script: (0..n).map(|_| Scripted::Frame).collect(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            match self.script.pop_front() {
                Some(Scripted::Frame) => Ok(Some(Frame::new(vec![0; 640 * 480 * 4], 640, 480))),
                Some(Scripted::Fail) => Err(anyhow::anyhow!("no frame")),
                None => Ok(None),
            }
        }
    }

    /// Detects on every frame whose index is in `hits`.
    struct PatternDetector {
        hits: Vec<bool>,
        calls: usize,
        count: usize,
    }

    impl LandmarkDetector for PatternDetector {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Option<Detection>> {
            let hit = self.hits.get(self.calls).copied().unwrap_or(false);
            self.calls += 1;
            Ok(hit.then(|| Detection {
                landmarks: (0..self.count)
                    .map(|i| Landmark::new(i as f32 / self.count as f32, 0.5, 0.0))
                    .collect(),
                confidence: 1.0,
            }))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Vec<Landmark>>,
    }

    impl LandmarkSink for RecordingSink {
        fn publish(&mut self, _mode: TrackingMode, landmarks: &[Landmark]) -> Result<(), RelayError> {
            self.sent.push(landmarks.to_vec());
            Ok(())
        }
    }

    fn no_wait_retry(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn sends_only_for_frames_with_detections() {
        let hits = vec![true, false, true, false, false, true];
        let mut relay = Relay::new(
            TrackingMode::Hand,
            CoordinateConvention::Raw,
            ScriptedSource::frames(hits.len()),
            PatternDetector {
                hits,
                calls: 0,
                count: 21,
            },
            RecordingSink::default(),
            HeadlessPreview,
            no_wait_retry(3),
        );

        while relay.step().unwrap() == RunState::Running {}

        assert_eq!(relay.state(), RunState::Stopped(StopReason::SourceEnded));
        assert_eq!(relay.summary().frames, 6);
        assert_eq!(relay.summary().detections, 3);
        assert_eq!(relay.summary().datagrams, 3);
        assert_eq!(relay.sink().sent.len(), 3);
    }

    #[test]
    fn wrong_landmark_count_is_dropped() {
        let mut relay = Relay::new(
            TrackingMode::Pose,
            CoordinateConvention::Raw,
            ScriptedSource::frames(1),
            PatternDetector {
                hits: vec![true],
                calls: 0,
                count: 21,
            },
            RecordingSink::default(),
            HeadlessPreview,
            no_wait_retry(3),
        );
        relay.step().unwrap();
        assert!(relay.sink().sent.is_empty());
    }

    #[test]
    fn ordering_is_preserved_through_the_loop() {
        for (mode, count) in [(TrackingMode::Hand, 21), (TrackingMode::Pose, 33)] {
            let mut relay = Relay::new(
                mode,
                CoordinateConvention::Raw,
                ScriptedSource::frames(1),
                PatternDetector {
                    hits: vec![true],
                    calls: 0,
                    count,
                },
                RecordingSink::default(),
                HeadlessPreview,
                no_wait_retry(3),
            );
            relay.step().unwrap();
            let sent = &relay.sink().sent[0];
            assert_eq!(sent.len(), count);
            for (i, lm) in sent.iter().enumerate() {
                assert_eq!(lm.x, i as f32 / count as f32);
            }
        }
    }

    #[test]
    fn intermittent_failures_are_retried() {
        let source = ScriptedSource {
            script: VecDeque::from(vec![
                Scripted::Fail,
                Scripted::Fail,
                Scripted::Frame,
                Scripted::Fail,
                Scripted::Fail,
                Scripted::Frame,
            ]),
        };
        let relay = Relay::new(
            TrackingMode::Hand,
            CoordinateConvention::Raw,
            source,
            PatternDetector {
                hits: vec![],
                calls: 0,
                count: 21,
            },
            RecordingSink::default(),
            HeadlessPreview,
            no_wait_retry(3),
        );
        let summary = relay.run().unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.read_failures, 4);
        assert_eq!(summary.stop_reason, Some(StopReason::SourceEnded));
    }

    #[test]
    fn persistent_failures_stop_the_loop() {
        let source = ScriptedSource {
            script: (0..10).map(|_| Scripted::Fail).collect(),
        };
        let relay = Relay::new(
            TrackingMode::Hand,
            CoordinateConvention::Raw,
            source,
            PatternDetector {
                hits: vec![],
                calls: 0,
                count: 21,
            },
            RecordingSink::default(),
            HeadlessPreview,
            no_wait_retry(4),
        );
        match relay.run() {
            Err(RelayError::CaptureFailed { failures }) => assert_eq!(failures, 4),
            other => panic!("expected capture failure, got {other:?}"),
        }
    }

    #[test]
    fn frame_limit_stops_early() {
        let relay = Relay::new(
            TrackingMode::Hand,
            CoordinateConvention::Raw,
            ScriptedSource::frames(10),
            PatternDetector {
                hits: vec![true; 10],
                calls: 0,
                count: 21,
            },
            RecordingSink::default(),
            HeadlessPreview,
            no_wait_retry(3),
        )
        .with_max_frames(Some(4));
        let summary = relay.run().unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.datagrams, 4);
        assert_eq!(summary.stop_reason, Some(StopReason::FrameLimit));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut retry = RetryPolicy::new(
            10,
            Duration::from_millis(5),
            Duration::from_millis(30),
        );
        assert_eq!(retry.record_failure(), Some(Duration::from_millis(5)));
        assert_eq!(retry.record_failure(), Some(Duration::from_millis(10)));
        assert_eq!(retry.record_failure(), Some(Duration::from_millis(20)));
        assert_eq!(retry.record_failure(), Some(Duration::from_millis(30)));
        retry.reset();
        assert_eq!(retry.record_failure(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn budget_of_one_fails_immediately() {
        let mut retry = RetryPolicy::new(1, Duration::ZERO, Duration::ZERO);
        assert_eq!(retry.record_failure(), None);
    }

    /// Raises its flag when the owner is dropped.
    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    fn drop_flag() -> (DropFlag, Rc<Cell<bool>>) {
        let flag = Rc::new(Cell::new(false));
        (DropFlag(flag.clone()), flag)
    }

    /// Yields `remaining` frames (or fails every read) and counts reads.
    struct CountingSource {
        remaining: usize,
        fail: bool,
        reads: Rc<Cell<usize>>,
        _alive: DropFlag,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            self.reads.set(self.reads.get() + 1);
            if self.fail {
                return Err(anyhow::anyhow!("camera unplugged"));
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Frame::new(vec![0; 8 * 8 * 4], 8, 8)))
        }
    }

    struct FlaggedSink {
        _alive: DropFlag,
    }

    impl LandmarkSink for FlaggedSink {
        fn publish(&mut self, _mode: TrackingMode, _landmarks: &[Landmark]) -> Result<(), RelayError> {
            Ok(())
        }
    }

    /// Returns `event` from the `stop_at`-th call on, `Continue` before.
    struct ScriptedPreview {
        stop_at: usize,
        event: PreviewEvent,
        shown: usize,
        _alive: DropFlag,
    }

    impl Preview for ScriptedPreview {
        fn present(&mut self, _: &Frame, _: Option<&Detection>, _: TrackingMode) -> PreviewEvent {
            self.shown += 1;
            if self.shown >= self.stop_at {
                self.event
            } else {
                PreviewEvent::Continue
            }
        }
    }

    struct Flags {
        source: Rc<Cell<bool>>,
        sink: Rc<Cell<bool>>,
        preview: Rc<Cell<bool>>,
        reads: Rc<Cell<usize>>,
    }

    impl Flags {
        fn all_dropped(&self) -> bool {
            self.source.get() && self.sink.get() && self.preview.get()
        }
    }

    fn flagged_relay(
        frames: usize,
        fail: bool,
        stop_at: usize,
        event: PreviewEvent,
        retry: RetryPolicy,
    ) -> (
        Relay<CountingSource, PatternDetector, FlaggedSink, ScriptedPreview>,
        Flags,
    ) {
        let (source_alive, source) = drop_flag();
        let (sink_alive, sink) = drop_flag();
        let (preview_alive, preview) = drop_flag();
        let reads = Rc::new(Cell::new(0));
        let relay = Relay::new(
            TrackingMode::Hand,
            CoordinateConvention::Raw,
            CountingSource {
                remaining: frames,
                fail,
                reads: reads.clone(),
                _alive: source_alive,
            },
            PatternDetector {
                hits: vec![],
                calls: 0,
                count: 21,
            },
            FlaggedSink { _alive: sink_alive },
            ScriptedPreview {
                stop_at,
                event,
                shown: 0,
                _alive: preview_alive,
            },
            retry,
        );
        let flags = Flags {
            source,
            sink,
            preview,
            reads,
        };
        (relay, flags)
    }

    #[test]
    fn quit_key_stops_and_releases_everything() {
        let (relay, flags) = flagged_relay(10, false, 3, PreviewEvent::Quit, no_wait_retry(3));
        assert!(!flags.all_dropped());

        let summary = relay.run().unwrap();
        assert_eq!(summary.stop_reason, Some(StopReason::QuitRequested));
        assert_eq!(summary.frames, 3);
        assert_eq!(flags.reads.get(), 3);
        assert!(flags.all_dropped());
    }

    #[test]
    fn closed_window_stops_without_reading_more() {
        let (relay, flags) = flagged_relay(10, false, 1, PreviewEvent::Closed, no_wait_retry(3));

        let summary = relay.run().unwrap();
        assert_eq!(summary.stop_reason, Some(StopReason::WindowClosed));
        assert_eq!(summary.frames, 1);
        assert_eq!(flags.reads.get(), 1);
        assert!(flags.all_dropped());
    }

    #[test]
    fn stepping_after_quit_is_a_no_op() {
        let (mut relay, flags) = flagged_relay(10, false, 1, PreviewEvent::Quit, no_wait_retry(3));
        assert_eq!(
            relay.step().unwrap(),
            RunState::Stopped(StopReason::QuitRequested)
        );
        assert_eq!(
            relay.step().unwrap(),
            RunState::Stopped(StopReason::QuitRequested)
        );
        assert_eq!(flags.reads.get(), 1);
    }

    #[test]
    fn capture_failure_still_releases_everything() {
        let (relay, flags) = flagged_relay(0, true, usize::MAX, PreviewEvent::Quit, no_wait_retry(3));

        assert!(matches!(
            relay.run(),
            Err(RelayError::CaptureFailed { failures: 3 })
        ));
        assert_eq!(flags.reads.get(), 3);
        assert!(flags.all_dropped());
    }

    #[test]
    fn finished_source_releases_everything() {
        let (relay, flags) = flagged_relay(2, false, usize::MAX, PreviewEvent::Quit, no_wait_retry(3));

        let summary = relay.run().unwrap();
        assert_eq!(summary.stop_reason, Some(StopReason::SourceEnded));
        assert_eq!(flags.reads.get(), 3);
        assert!(flags.all_dropped());
    }
}
