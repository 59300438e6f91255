use std::sync::mpsc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, InputCallbackInfo, Sample, SampleFormat, Stream, StreamConfig, StreamError,
    SupportedStreamConfig,
};
use tracing::{error, info};

use crate::{AcquisitionError, AnalyserConfig, ByteAnalyser, FrameSource};

pub type BuildMicrophoneResult = Result<Microphone, AcquisitionError>;

/// A live input device exposed as a source of byte spectrum frames.
///
/// Only the first channel of the device is analysed.
pub struct Microphone {
    _stream: Stream,
    recv: mpsc::Receiver<f32>,
    analyser: ByteAnalyser,
    sample_rate: u32,
    channels: u16,
}

pub struct MicrophoneBuilder<'a> {
    pub analyser: AnalyserConfig,
    pub device: Option<&'a Device>,
    pub config: Option<SupportedStreamConfig>,
}

impl<'a> MicrophoneBuilder<'a> {
    pub fn analyser(self, analyser: AnalyserConfig) -> Self {
        MicrophoneBuilder { analyser, ..self }
    }
    pub fn device(self, device: &'a Device) -> Self {
        MicrophoneBuilder {
            device: Some(device),
            ..self
        }
    }
    pub fn config(self, config: SupportedStreamConfig) -> Self {
        MicrophoneBuilder {
            config: Some(config),
            ..self
        }
    }
    pub fn build(self) -> BuildMicrophoneResult {
        let analyser = ByteAnalyser::new(self.analyser)?;
        let default_device;
        let device = if let Some(device) = self.device {
            device
        } else {
            let host = cpal::default_host();
            default_device = host
                .default_input_device()
                .ok_or(AcquisitionError::NoDevice)?;
            &default_device
        };
        let config = if let Some(config) = self.config {
            config
        } else {
            let mut supported_configs_range = device.supported_input_configs()?;
            supported_configs_range
                .next()
                .ok_or(AcquisitionError::NoConfig)?
                .with_max_sample_rate()
        };
        let err_fn = |err: StreamError| error!("input stream error: {}", err);
        let sample_format = config.sample_format();
        let config: StreamConfig = config.into();
        let channels = config.channels.max(1) as usize;
        // Holds about a second of audio while the source is not being polled.
        let capacity = (config.sample_rate.0 as usize).max(analyser.config().fft_size);
        let (send, recv) = mpsc::sync_channel(capacity);
        macro_rules! input_stream {
            ($sample:ty) => {
                device.build_input_stream(
                    &config,
                    move |data: &[$sample], _: &InputCallbackInfo| {
                        forward_first_channel(data, channels, &send)
                    },
                    err_fn,
                )
            };
        }
        let stream = match sample_format {
            SampleFormat::F32 => input_stream!(f32),
            SampleFormat::I16 => input_stream!(i16),
            SampleFormat::U16 => input_stream!(u16),
        }?;

        stream.play()?;

        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            fft_size = analyser.config().fft_size,
            "opened input device"
        );

        Ok(Microphone {
            _stream: stream,
            recv,
            analyser,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        })
    }
}

/// Sends the first channel of interleaved `data`. Samples that do not fit in
/// the channel are dropped.
fn forward_first_channel<T: Sample>(data: &[T], channels: usize, send: &mpsc::SyncSender<f32>) {
    for frame in data.chunks(channels.max(1)) {
        if send.try_send(frame[0].to_f32()).is_err() {
            break;
        }
    }
}

impl Microphone {
    pub fn builder<'a>() -> MicrophoneBuilder<'a> {
        MicrophoneBuilder {
            analyser: AnalyserConfig::default(),
            device: None,
            config: None,
        }
    }
    pub fn from_default_device(analyser: AnalyserConfig) -> BuildMicrophoneResult {
        Self::builder().analyser(analyser).build()
    }
    pub fn channels(&self) -> u16 {
        self.channels
    }
    pub fn analyser_config(&self) -> &AnalyserConfig {
        self.analyser.config()
    }
}

impl FrameSource for Microphone {
    fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }
    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }
    fn fill_frame(&mut self, frame: &mut [u8]) {
        self.analyser.push_samples(self.recv.try_iter());
        self.analyser.byte_frequency_data(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_first_channel_only() {
        let (send, recv) = mpsc::sync_channel(16);
        forward_first_channel(&[0.1f32, -1.0, 0.2, -1.0, 0.3, -1.0], 2, &send);
        assert_eq!(recv.try_iter().collect::<Vec<_>>(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn full_channel_drops_samples() {
        let (send, recv) = mpsc::sync_channel(4);
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();
        forward_first_channel(&data, 1, &send);
        forward_first_channel(&data, 1, &send);
        assert_eq!(recv.try_iter().collect::<Vec<_>>(), vec![0.0, 1.0, 2.0, 3.0]);

        // draining makes room again
        forward_first_channel(&[7.0f32], 1, &send);
        assert_eq!(recv.try_iter().collect::<Vec<_>>(), vec![7.0]);
    }

    #[test]
    fn disconnected_receiver_is_harmless() {
        let (send, recv) = mpsc::sync_channel(4);
        drop(recv);
        forward_first_channel(&[1.0f32, 2.0], 1, &send);
    }
}
