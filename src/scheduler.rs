//! The frame loop.
//!
//! A [`FrameScheduler`] pulls one spectrum frame per display refresh, runs
//! peak detection on it and hands both to a [`FrameConsumer`]. Ticks run on
//! the calling thread, one at a time; the only suspension point is the
//! [`RefreshClock`] wait between two ticks.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{ConfigError, FrequencyMap, Peak, PeakDetector};

pub const DEFAULT_REFRESH_RATE: f32 = 60.0;

/// Produces spectrum frames on demand.
pub trait FrameSource {
    fn sample_rate(&self) -> f32;
    /// Frame length. Must not change over the lifetime of the source.
    fn bin_count(&self) -> usize;
    /// Overwrites `frame`, which is exactly `bin_count()` long, with the current spectrum.
    fn fill_frame(&mut self, frame: &mut [u8]);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn sample_rate(&self) -> f32 {
        (**self).sample_rate()
    }
    fn bin_count(&self) -> usize {
        (**self).bin_count()
    }
    fn fill_frame(&mut self, frame: &mut [u8]) {
        (**self).fill_frame(frame)
    }
}

/// Receives every frame together with its peaks.
///
/// This is where rendering and note or percussion classification plug in.
/// Only an `Err` from [`on_tick`](Self::on_tick) is contained; a panic ends the loop.
pub trait FrameConsumer {
    type Error: fmt::Display;
    /// Called once when a session starts running.
    fn on_start(&mut self, _frequencies: &FrequencyMap) {}
    /// Called once per tick. An error is reported and the loop keeps going.
    fn on_tick(&mut self, frame: &[u8], peaks: &[Peak]) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Identifies one scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickHandle(u64);

impl TickHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// What a call to [`FrameScheduler::on_refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran and the consumer accepted it.
    Completed(TickHandle),
    /// The tick ran but the consumer returned an error.
    CallbackFailed(TickHandle),
    /// Nothing was scheduled.
    NotRunning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub last_error: Option<String>,
}

/// Requests a stop from inside a callback or from another thread.
///
/// The request is honoured at the next tick boundary: a tick in flight still
/// finishes, and nothing is scheduled after it. Requests made before the
/// scheduler starts are discarded.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Blocks until the display is ready for the next frame.
pub trait RefreshClock {
    fn wait_for_refresh(&mut self);
}

impl<C: RefreshClock + ?Sized> RefreshClock for &mut C {
    fn wait_for_refresh(&mut self) {
        (**self).wait_for_refresh()
    }
}

/// Paces ticks at a fixed rate. After an overrun the schedule restarts from
/// now instead of firing the missed refreshes back to back.
#[derive(Debug, Clone)]
pub struct IntervalClock {
    interval: Duration,
    next: Option<Instant>,
}

impl IntervalClock {
    pub fn new(interval: Duration) -> Self {
        IntervalClock {
            interval,
            next: None,
        }
    }
    pub fn from_rate(hz: f32) -> Result<Self, ConfigError> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(ConfigError::RefreshRate(hz));
        }
        let interval =
            Duration::try_from_secs_f32(1.0 / hz).map_err(|_| ConfigError::RefreshRate(hz))?;
        Ok(Self::new(interval))
    }
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(Duration::from_secs_f32(1.0 / DEFAULT_REFRESH_RATE))
    }
}

impl RefreshClock for IntervalClock {
    fn wait_for_refresh(&mut self) {
        let now = Instant::now();
        let deadline = match self.next {
            Some(deadline) if deadline > now => {
                thread::sleep(deadline - now);
                deadline
            }
            _ => now,
        };
        self.next = Some(deadline + self.interval);
    }
}

pub struct FrameScheduler<S, C> {
    source: S,
    consumer: C,
    detector: PeakDetector,
    state: SchedulerState,
    pending: Option<TickHandle>,
    next_handle: u64,
    stop: StopHandle,
    frame: Vec<u8>,
    peaks: Vec<Peak>,
    stats: TickStats,
}

impl<S, C> FrameScheduler<S, C>
where
    S: FrameSource,
    C: FrameConsumer,
{
    pub fn new(source: S, consumer: C, detector: PeakDetector) -> Self {
        let frame = vec![0; source.bin_count()];
        FrameScheduler {
            source,
            consumer,
            detector,
            state: SchedulerState::Idle,
            pending: None,
            next_handle: 0,
            stop: StopHandle::default(),
            frame,
            peaks: Vec::new(),
            stats: TickStats::default(),
        }
    }
    pub fn state(&self) -> SchedulerState {
        self.state
    }
    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }
    /// The tick that will run on the next refresh, if any.
    pub fn pending(&self) -> Option<TickHandle> {
        self.pending
    }
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
    pub fn detector(&self) -> &PeakDetector {
        &self.detector
    }
    pub fn source(&self) -> &S {
        &self.source
    }
    pub fn consumer(&self) -> &C {
        &self.consumer
    }
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }
    /// Moves from idle to running and schedules the first tick.
    ///
    /// Does nothing once started, including after a stop.
    pub fn start(&mut self) {
        if self.state != SchedulerState::Idle {
            return;
        }
        self.stop.clear();
        self.state = SchedulerState::Running;
        self.schedule();
        debug!(bins = self.frame.len(), "frame scheduler started");
    }
    /// Stops for good and cancels the pending tick. Does nothing unless running.
    pub fn stop(&mut self) {
        if self.state != SchedulerState::Running {
            return;
        }
        self.state = SchedulerState::Stopped;
        self.pending = None;
        debug!(
            ticks = self.stats.ticks,
            failed = self.stats.failed_ticks,
            "frame scheduler stopped"
        );
    }
    /// Runs the pending tick, if any, then schedules the next one.
    pub fn on_refresh(&mut self) -> TickOutcome {
        if self.stop.is_stop_requested() {
            self.stop();
        }
        let handle = match (self.state, self.pending.take()) {
            (SchedulerState::Running, Some(handle)) => handle,
            _ => return TickOutcome::NotRunning,
        };
        let outcome = self.tick(handle);
        if self.stop.is_stop_requested() {
            self.stop();
        } else if self.is_running() {
            self.schedule();
        }
        outcome
    }
    /// Starts the scheduler and ticks once per refresh of `clock` until stopped.
    pub fn run<K: RefreshClock>(&mut self, mut clock: K) -> &TickStats {
        self.start();
        while self.is_running() {
            clock.wait_for_refresh();
            self.on_refresh();
        }
        &self.stats
    }
    fn schedule(&mut self) {
        let handle = TickHandle(self.next_handle);
        self.next_handle += 1;
        self.pending = Some(handle);
    }
    fn tick(&mut self, handle: TickHandle) -> TickOutcome {
        self.source.fill_frame(&mut self.frame);
        self.detector.detect_into(&self.frame, &mut self.peaks);
        self.stats.ticks += 1;
        trace!(tick = handle.0, peaks = self.peaks.len(), "tick");
        match self.consumer.on_tick(&self.frame, &self.peaks) {
            Ok(()) => TickOutcome::Completed(handle),
            Err(err) => {
                warn!(tick = handle.0, "frame callback failed: {}", err);
                self.stats.failed_ticks += 1;
                self.stats.last_error = Some(err.to_string());
                TickOutcome::CallbackFailed(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp {
        bins: usize,
        pulls: usize,
    }

    impl FrameSource for Ramp {
        fn sample_rate(&self) -> f32 {
            8000.0
        }
        fn bin_count(&self) -> usize {
            self.bins
        }
        fn fill_frame(&mut self, frame: &mut [u8]) {
            self.pulls += 1;
            for b in frame.iter_mut() {
                *b = 0;
            }
            frame[self.pulls % frame.len()] = 100;
        }
    }

    #[derive(Default)]
    struct Record(Vec<Vec<Peak>>);

    impl FrameConsumer for Record {
        type Error = String;
        fn on_tick(&mut self, _frame: &[u8], peaks: &[Peak]) -> Result<(), String> {
            self.0.push(peaks.to_vec());
            Ok(())
        }
    }

    fn scheduler(bins: usize) -> FrameScheduler<Ramp, Record> {
        FrameScheduler::new(
            Ramp { bins, pulls: 0 },
            Record::default(),
            PeakDetector::new(4).unwrap(),
        )
    }

    #[test]
    fn idle_until_started() {
        let mut s = scheduler(16);
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.pending(), None);
        assert_eq!(s.on_refresh(), TickOutcome::NotRunning);
        assert_eq!(s.source().pulls, 0);
    }

    #[test]
    fn stop_before_start_is_ignored() {
        let mut s = scheduler(16);
        s.stop();
        assert_eq!(s.state(), SchedulerState::Idle);
        s.start();
        assert!(s.is_running());
    }

    #[test]
    fn each_refresh_runs_one_tick() {
        let mut s = scheduler(16);
        s.start();
        let first = s.pending().unwrap();
        assert_eq!(s.on_refresh(), TickOutcome::Completed(first));
        let second = s.pending().unwrap();
        assert!(second > first);
        assert_eq!(s.source().pulls, 1);
        assert_eq!(s.consumer().0.len(), 1);
        assert_eq!(s.consumer().0[0][0].position, 1);
    }

    #[test]
    fn start_twice_keeps_single_pending_tick() {
        let mut s = scheduler(16);
        s.start();
        let pending = s.pending();
        s.start();
        assert_eq!(s.pending(), pending);
        s.on_refresh();
        assert_eq!(s.stats().ticks, 1);
    }

    #[test]
    fn stopped_is_terminal() {
        let mut s = scheduler(16);
        s.start();
        s.on_refresh();
        s.stop();
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(s.pending(), None);
        assert_eq!(s.on_refresh(), TickOutcome::NotRunning);
        s.start();
        s.stop();
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(s.stats().ticks, 1);
    }

    #[test]
    fn stop_handle_cancels_pending_tick() {
        let mut s = scheduler(16);
        s.start();
        s.stop_handle().request_stop();
        assert_eq!(s.on_refresh(), TickOutcome::NotRunning);
        assert_eq!(s.state(), SchedulerState::Stopped);
        assert_eq!(s.source().pulls, 0);
    }

    #[test]
    fn stop_request_while_idle_is_ignored() {
        let mut s = scheduler(16);
        s.stop_handle().request_stop();
        s.start();
        assert!(matches!(s.on_refresh(), TickOutcome::Completed(_)));
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.stats().ticks, 1);
    }

    #[test]
    fn refresh_rate_must_be_positive() {
        assert_eq!(
            IntervalClock::from_rate(0.0).unwrap_err(),
            ConfigError::RefreshRate(0.0)
        );
        assert!(IntervalClock::from_rate(f32::INFINITY).is_err());
        assert_eq!(
            IntervalClock::from_rate(1e-30).unwrap_err(),
            ConfigError::RefreshRate(1e-30)
        );
        let clock = IntervalClock::from_rate(50.0).unwrap();
        assert!((clock.interval().as_secs_f64() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn interval_clock_paces_ticks() {
        let mut clock = IntervalClock::new(Duration::from_millis(5));
        let start = Instant::now();
        for _ in 0..4 {
            clock.wait_for_refresh();
        }
        // first wait returns immediately
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
