//! Realtime output stream on the default device

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Name, sample rate and channel count of the default output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

fn default_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig), AudioOutputError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioOutputError::NoDevices)?;

    let supported_config = device
        .default_output_config()
        .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

    Ok((device, supported_config))
}

/// Query the default output device without opening a stream
pub fn default_output_info() -> Result<OutputDeviceInfo, AudioOutputError> {
    let (device, config) = default_device()?;
    Ok(OutputDeviceInfo {
        name: device.name().unwrap_or_default(),
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// Output stream that pulls interleaved frames from a render callback
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    info: OutputDeviceInfo,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    /// Open the default device; `render` receives `(buffer, sample_rate, channels)`
    pub fn start<F>(mut render: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let (device, supported_config) = default_device()?;

        let info = OutputDeviceInfo {
            name: device.name().unwrap_or_default(),
            sample_rate: supported_config.sample_rate().0,
            channels: supported_config.channels(),
        };
        let sample_rate = info.sample_rate;
        let channels = info.channels;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let config: StreamConfig = supported_config.into();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stop_clone.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }
                    render(data, sample_rate, channels);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(device = %info.name, sample_rate, channels, "Started realtime output stream");

        Ok(Self { stop_flag, info, _stream: stream })
    }

    pub fn info(&self) -> &OutputDeviceInfo {
        &self.info
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
