use std::convert::Infallible;

use peakline::*;
use tracing_subscriber::EnvFilter;

/// Prints the frequency of the strongest peak of every frame.
struct Dominant {
    frequencies: Option<FrequencyMap>,
}

impl FrameConsumer for Dominant {
    type Error = Infallible;
    fn on_start(&mut self, frequencies: &FrequencyMap) {
        self.frequencies = Some(frequencies.clone());
    }
    fn on_tick(&mut self, _frame: &[u8], peaks: &[Peak]) -> Result<(), Infallible> {
        let strongest = peaks.iter().max_by_key(|p| p.magnitude);
        if let (Some(peak), Some(frequencies)) = (strongest, &self.frequencies) {
            if let Some(hz) = frequencies.peak_frequency(peak) {
                println!("{:>8.1} Hz ({})", hz, peak.magnitude);
            }
        }
        Ok(())
    }
}

fn main() -> Result<(), AcquisitionError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SessionConfig::default().refresh_rate(30.0);
    let mut session = Session::from_default_device(Dominant { frequencies: None }, &config)?;
    session.run();
    Ok(())
}
