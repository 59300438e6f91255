//! Spectrum peak detection for live audio.
//!
//! A [`Session`] pulls one byte spectrum frame per display refresh from a
//! [`FrameSource`], finds its locally dominant bins with a [`PeakDetector`]
//! and pushes frame and peaks to a [`FrameConsumer`]. With the default
//! `input` feature, [`Microphone`] provides frames from a cpal input device.

mod analyser;
mod error;
mod frequency;
#[cfg(feature = "input")]
mod input;
mod peaks;
mod scheduler;
mod session;

pub use analyser::*;
pub use error::*;
pub use frequency::*;
#[cfg(feature = "input")]
pub use input::*;
pub use peaks::*;
pub use scheduler::*;
pub use session::*;

#[cfg(feature = "input")]
pub use cpal;
