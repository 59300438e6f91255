use tracing::debug;

use crate::{
    AnalyserConfig, ConfigError, FrameConsumer, FrameScheduler, FrameSource, FrequencyMap,
    IntervalClock, Peak, PeakDetector, RefreshClock, SchedulerState, StopHandle, TickOutcome,
    TickStats, DEFAULT_PEAK_SPACING, DEFAULT_REFRESH_RATE,
};
#[cfg(feature = "input")]
use crate::{AcquisitionError, Microphone};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Minimum distance, in bins, between independently reported peaks.
    pub peak_spacing: usize,
    /// Ticks per second when the session paces itself.
    pub refresh_rate: f32,
    /// Only used when the session opens its own input device.
    pub analyser: AnalyserConfig,
    /// Log every tick's peaks, in hertz, at debug level.
    pub debug_visualization: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            peak_spacing: DEFAULT_PEAK_SPACING,
            refresh_rate: DEFAULT_REFRESH_RATE,
            analyser: AnalyserConfig::default(),
            debug_visualization: false,
        }
    }
}

impl SessionConfig {
    pub fn peak_spacing(self, peak_spacing: usize) -> Self {
        SessionConfig {
            peak_spacing,
            ..self
        }
    }
    pub fn refresh_rate(self, refresh_rate: f32) -> Self {
        SessionConfig {
            refresh_rate,
            ..self
        }
    }
    pub fn analyser(self, analyser: AnalyserConfig) -> Self {
        SessionConfig { analyser, ..self }
    }
    pub fn debug_visualization(self, debug_visualization: bool) -> Self {
        SessionConfig {
            debug_visualization,
            ..self
        }
    }
}

/// One capture-and-analysis lifetime.
///
/// Owns the source, the consumer, the frequency table and the frame loop.
/// All configuration is checked in [`Session::new`], so nothing inside a
/// running session can fail on bad settings.
pub struct Session<S, C> {
    sample_rate: f32,
    frequencies: FrequencyMap,
    clock: IntervalClock,
    scheduler: FrameScheduler<S, PeakLog<C>>,
}

impl<S, C> Session<S, C>
where
    S: FrameSource,
    C: FrameConsumer,
{
    pub fn new(source: S, consumer: C, config: &SessionConfig) -> Result<Self, ConfigError> {
        let detector = PeakDetector::new(config.peak_spacing)?;
        let clock = IntervalClock::from_rate(config.refresh_rate)?;
        let sample_rate = source.sample_rate();
        let frequencies = FrequencyMap::build(sample_rate, source.bin_count())?;
        let consumer = PeakLog {
            inner: consumer,
            frequencies: frequencies.clone(),
            enabled: config.debug_visualization,
        };
        debug!(
            sample_rate,
            bins = frequencies.len(),
            spacing = detector.spacing(),
            "session created"
        );
        Ok(Session {
            sample_rate,
            frequencies,
            clock,
            scheduler: FrameScheduler::new(source, consumer, detector),
        })
    }
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
    pub fn bin_count(&self) -> usize {
        self.frequencies.len()
    }
    pub fn frequencies(&self) -> &FrequencyMap {
        &self.frequencies
    }
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }
    pub fn stats(&self) -> &TickStats {
        self.scheduler.stats()
    }
    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }
    pub fn source(&self) -> &S {
        self.scheduler.source()
    }
    pub fn consumer(&self) -> &C {
        &self.scheduler.consumer().inner
    }
    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.scheduler.consumer_mut().inner
    }
    /// Starts the frame loop, telling the consumer about the frequency table first.
    pub fn start(&mut self) {
        if self.scheduler.state() != SchedulerState::Idle {
            return;
        }
        self.scheduler.consumer_mut().on_start(&self.frequencies);
        self.scheduler.start();
    }
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }
    /// Runs one tick, for hosts that drive refreshes themselves.
    pub fn on_refresh(&mut self) -> TickOutcome {
        self.scheduler.on_refresh()
    }
    /// Runs at the configured refresh rate until stopped.
    pub fn run(&mut self) -> &TickStats {
        self.start();
        self.scheduler.run(&mut self.clock)
    }
    /// Runs with an external refresh clock until stopped.
    pub fn run_with<K: RefreshClock>(&mut self, clock: K) -> &TickStats {
        self.start();
        self.scheduler.run(clock)
    }
}

#[cfg(feature = "input")]
impl<C> Session<Microphone, C>
where
    C: FrameConsumer,
{
    /// Opens the default input device. On failure nothing is started.
    pub fn from_default_device(
        consumer: C,
        config: &SessionConfig,
    ) -> Result<Self, AcquisitionError> {
        let microphone = Microphone::from_default_device(config.analyser)?;
        Ok(Session::new(microphone, consumer, config)?)
    }
}

struct PeakLog<C> {
    inner: C,
    frequencies: FrequencyMap,
    enabled: bool,
}

impl<C: FrameConsumer> FrameConsumer for PeakLog<C> {
    type Error = C::Error;
    fn on_start(&mut self, frequencies: &FrequencyMap) {
        self.inner.on_start(frequencies)
    }
    fn on_tick(&mut self, frame: &[u8], peaks: &[Peak]) -> Result<(), Self::Error> {
        if self.enabled {
            let hz: Vec<f32> = peaks
                .iter()
                .filter_map(|p| self.frequencies.peak_frequency(p))
                .collect();
            debug!(peaks = ?hz, "frame peaks");
        }
        self.inner.on_tick(frame, peaks)
    }
}
