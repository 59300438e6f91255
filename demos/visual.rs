use std::{convert::Infallible, env};

use peakline::*;
use tracing_subscriber::EnvFilter;

const SEGMENTS: usize = 32;

/// Draws the spectrum as horizontal bars, one per group of bins, and marks
/// groups holding a peak.
struct Bars;

impl FrameConsumer for Bars {
    type Error = Infallible;
    fn on_tick(&mut self, frame: &[u8], peaks: &[Peak]) -> Result<(), Infallible> {
        let group = (frame.len() / SEGMENTS).max(1);
        println!("-----------------------------------------");
        for (i, bins) in frame.chunks(group).take(SEGMENTS).enumerate() {
            let level = bins.iter().copied().max().unwrap_or(0) as usize;
            let range = i * group..(i + 1) * group;
            let marker = if peaks.iter().any(|p| range.contains(&p.position)) {
                '*'
            } else {
                ' '
            };
            println!("{}{:#^2$}", marker, "", level / 4);
        }
        Ok(())
    }
}

fn main() -> Result<(), AcquisitionError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // `visual debug` also logs every frame's peaks in hertz
    let debug = env::args().nth(1).map_or(false, |arg| arg == "debug");
    let config = SessionConfig::default()
        .refresh_rate(5.0)
        .debug_visualization(debug);
    let mut session = Session::from_default_device(Bars, &config)?;
    session.run();
    Ok(())
}
