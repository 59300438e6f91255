use std::{ops::Deref, sync::Arc};

use crate::{ConfigError, Peak};

/// The frequency, in hertz, represented by each bin of a spectrum frame.
///
/// Bin `i` maps to `((sample_rate / 2) / bin_count) * (i + 1)`, so the last
/// bin always sits on the Nyquist frequency. The table is built once per
/// session and shared by cloning.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyMap {
    hz: Arc<[f32]>,
    interval: f32,
}

impl FrequencyMap {
    pub fn build(sample_rate: f32, bin_count: usize) -> Result<Self, ConfigError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::SampleRate(sample_rate));
        }
        if bin_count == 0 {
            return Err(ConfigError::BinCount);
        }
        let interval = (sample_rate / 2.0) / bin_count as f32;
        let hz = (0..bin_count).map(|i| interval * (i + 1) as f32).collect();
        Ok(FrequencyMap { hz, interval })
    }
    /// Width of one bin in hertz.
    pub fn interval(&self) -> f32 {
        self.interval
    }
    pub fn max_frequency(&self) -> f32 {
        self.hz[self.hz.len() - 1]
    }
    pub fn frequency(&self, bin: usize) -> Option<f32> {
        self.hz.get(bin).copied()
    }
    pub fn peak_frequency(&self, peak: &Peak) -> Option<f32> {
        self.frequency(peak.position)
    }
    /// The bin whose frequency is closest to `hz`, or `None` outside the
    /// represented range.
    ///
    /// Use this to express a spacing given in hertz as a bin count.
    pub fn bin_for(&self, hz: f32) -> Option<usize> {
        if !hz.is_finite() || hz < 0.0 || hz > self.max_frequency() + self.interval / 2.0 {
            return None;
        }
        let bin = (hz / self.interval).round() as usize;
        Some(bin.saturating_sub(1).min(self.hz.len() - 1))
    }
    pub fn as_slice(&self) -> &[f32] {
        &self.hz
    }
}

impl Deref for FrequencyMap {
    type Target = [f32];
    fn deref(&self) -> &Self::Target {
        &self.hz
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn cd_quality_map() {
        let map = FrequencyMap::build(44100.0, 1024).unwrap();
        assert_eq!(map.len(), 1024);
        assert!(map.windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(map[1023], 22050.0, max_relative = 1e-6);
        assert_relative_eq!(map.max_frequency(), 22050.0, max_relative = 1e-6);
        assert_relative_eq!(map.interval(), 22050.0 / 1024.0);
        assert_relative_eq!(map[0], map.interval());
    }

    #[test]
    fn single_bin() {
        let map = FrequencyMap::build(8000.0, 1).unwrap();
        assert_eq!(map.as_slice(), &[4000.0]);
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert_eq!(
            FrequencyMap::build(0.0, 1024),
            Err(ConfigError::SampleRate(0.0))
        );
        assert_eq!(
            FrequencyMap::build(-48000.0, 1024),
            Err(ConfigError::SampleRate(-48000.0))
        );
        assert!(matches!(
            FrequencyMap::build(f32::NAN, 1024),
            Err(ConfigError::SampleRate(_))
        ));
        assert_eq!(FrequencyMap::build(48000.0, 0), Err(ConfigError::BinCount));
    }

    #[test]
    fn lookups() {
        let map = FrequencyMap::build(48000.0, 1024).unwrap();
        assert_eq!(map.frequency(1024), None);
        let peak = Peak {
            position: 511,
            magnitude: 200,
        };
        assert_relative_eq!(map.peak_frequency(&peak).unwrap(), 12000.0);
    }

    #[test]
    fn bin_for_rounds_to_nearest() {
        let map = FrequencyMap::build(48000.0, 1024).unwrap();
        // 23.4375 Hz per bin
        assert_eq!(map.bin_for(23.4375), Some(0));
        assert_eq!(map.bin_for(12000.0), Some(511));
        assert_eq!(map.bin_for(12010.0), Some(511));
        assert_eq!(map.bin_for(24000.0), Some(1023));
        assert_eq!(map.bin_for(0.0), Some(0));
        assert_eq!(map.bin_for(30000.0), None);
        assert_eq!(map.bin_for(-1.0), None);
    }
}
