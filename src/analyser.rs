//! Turns a stream of time-domain samples into byte spectrum frames.
//!
//! The conversion follows the usual analyser-node recipe: Blackman window,
//! forward FFT, magnitudes scaled by the transform size, exponential
//! smoothing across frames, then decibels mapped linearly onto `0..=255`
//! between a floor and a ceiling.

use std::{collections::VecDeque, f32::consts::PI, sync::Arc};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::ConfigError;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_MIN_DECIBELS: f32 = -90.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -10.0;
pub const DEFAULT_SMOOTHING: f32 = 0.85;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32768;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserConfig {
    /// Transform length. Frames have half as many bins.
    pub fft_size: usize,
    /// Level mapped to byte 0.
    pub min_decibels: f32,
    /// Level mapped to byte 255.
    pub max_decibels: f32,
    /// Weight of the previous frame when smoothing, `0` disables it.
    pub smoothing: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        AnalyserConfig {
            fft_size: DEFAULT_FFT_SIZE,
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl AnalyserConfig {
    pub fn fft_size(self, fft_size: usize) -> Self {
        AnalyserConfig { fft_size, ..self }
    }
    pub fn decibels(self, min_decibels: f32, max_decibels: f32) -> Self {
        AnalyserConfig {
            min_decibels,
            max_decibels,
            ..self
        }
    }
    pub fn smoothing(self, smoothing: f32) -> Self {
        AnalyserConfig { smoothing, ..self }
    }
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(ConfigError::FftSize(self.fft_size));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(ConfigError::DecibelRange {
                min: self.min_decibels,
                max: self.max_decibels,
            });
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::Smoothing(self.smoothing));
        }
        Ok(())
    }
}

pub struct ByteAnalyser {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl ByteAnalyser {
    pub fn new(config: AnalyserConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let size = config.fft_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let mut history = VecDeque::with_capacity(size);
        history.resize(size, 0.0);
        Ok(ByteAnalyser {
            config,
            fft,
            window: blackman(size),
            history,
            smoothed: vec![0.0; config.bin_count()],
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch,
        })
    }
    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }
    pub fn bin_count(&self) -> usize {
        self.config.bin_count()
    }
    /// Appends mono samples, keeping only the most recent `fft_size` of them.
    pub fn push_samples<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = f32>,
    {
        for s in samples {
            if self.history.len() == self.config.fft_size {
                self.history.pop_front();
            }
            self.history.push_back(s);
        }
    }
    /// Writes the current spectrum into `frame`, one byte per bin.
    ///
    /// Every call advances the smoothing state. Bins beyond `frame.len()`
    /// are computed but not written.
    pub fn byte_frequency_data(&mut self, frame: &mut [u8]) {
        let size = self.config.fft_size;
        for ((slot, &s), &w) in self.buffer.iter_mut().zip(&self.history).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let tau = self.config.smoothing;
        let min = self.config.min_decibels;
        let scale = 255.0 / (self.config.max_decibels - min);
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() / size as f32;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
            if let Some(byte) = frame.get_mut(k) {
                let db = 20.0 * smoothed.log10();
                *byte = (scale * (db - min)).floor().clamp(0.0, 255.0) as u8;
            }
        }
    }
    /// Forgets buffered samples and smoothing history.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

fn blackman(size: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;
    (0..size)
        .map(|n| {
            let x = 2.0 * PI * n as f32 / size as f32;
            A0 - A1 * x.cos() + A2 * (2.0 * x).cos()
        })
        .collect()
}
