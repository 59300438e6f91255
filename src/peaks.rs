use crate::ConfigError;

/// Minimum distance, in bins, between two independently reported peaks.
pub const DEFAULT_PEAK_SPACING: usize = 10;

/// A locally dominant bin of a spectrum frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peak {
    pub position: usize,
    pub magnitude: u8,
}

/// Finds locally dominant bins in byte spectrum frames.
///
/// A bin is a candidate when it is strictly greater than both neighbours.
/// Candidates closer than `spacing` bins collapse into the strongest one,
/// while well separated candidates are all reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakDetector {
    spacing: usize,
}

impl Default for PeakDetector {
    fn default() -> Self {
        PeakDetector {
            spacing: DEFAULT_PEAK_SPACING,
        }
    }
}

impl PeakDetector {
    pub fn new(spacing: usize) -> Result<Self, ConfigError> {
        if spacing == 0 {
            return Err(ConfigError::PeakSpacing);
        }
        Ok(PeakDetector { spacing })
    }
    pub fn spacing(&self) -> usize {
        self.spacing
    }
    /// Detects the peaks of `frame`, in ascending position order.
    pub fn detect(&self, frame: &[u8]) -> Vec<Peak> {
        let mut peaks = Vec::new();
        self.detect_into(frame, &mut peaks);
        peaks
    }
    /// Like [`detect`](Self::detect), but reuses `peaks` as the output buffer.
    pub fn detect_into(&self, frame: &[u8], peaks: &mut Vec<Peak>) {
        peaks.clear();
        let len = frame.len();
        // The most recently recorded peak, and whether it is still the tail of `peaks`.
        let mut last: Option<Peak> = None;
        let mut last_recorded = false;
        for (i, &value) in frame.iter().enumerate() {
            let above_prev = i == 0 || value > frame[i - 1];
            let above_next = i + 1 == len || value > frame[i + 1];
            let (far, dominates) = match last {
                None => (true, true),
                Some(p) => (
                    i - p.position >= self.spacing,
                    p.magnitude == 0 || value > p.magnitude,
                ),
            };
            if !far && dominates && last_recorded {
                peaks.pop();
                last_recorded = false;
            }
            if above_prev && above_next && (far || dominates) {
                let peak = Peak {
                    position: i,
                    magnitude: value,
                };
                peaks.push(peak);
                last = Some(peak);
                last_recorded = true;
            }
        }
    }
}
