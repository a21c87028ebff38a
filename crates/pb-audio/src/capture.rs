use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use pb_core::config::AudioConfig;
use pb_core::packet::CaptureStatus;

use crate::assembler::BlockAssembler;
use crate::error::AudioError;

/// An input device as listed by `list_input_devices`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the host's input device list.
    pub index: usize,
    /// Device name as reported by the host.
    pub name: String,
    /// `true` for the host's default input.
    pub is_default: bool,
}

/// List the input devices of the default host.
///
/// # Errors
/// Returns an error if the host cannot enumerate its devices.
pub fn list_input_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .context("cannot enumerate input devices")?
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| format!("<device {index}>"));
            let is_default = default_name.as_deref() == Some(name.as_str());
            DeviceInfo {
                index,
                name,
                is_default,
            }
        })
        .collect();
    Ok(devices)
}

/// Find the device a selector refers to: a list index, or a
/// case-insensitive name substring.
fn select_device(host: &cpal::Host, selector: Option<&str>) -> Result<cpal::Device> {
    let Some(selector) = selector else {
        return host
            .default_input_device()
            .ok_or_else(|| AudioError::NoInputDevice.into());
    };

    let mut devices = host
        .input_devices()
        .context("cannot enumerate input devices")?;

    if let Ok(index) = selector.parse::<usize>() {
        return devices
            .nth(index)
            .ok_or_else(|| AudioError::DeviceNotFound(selector.to_string()).into());
    }

    let needle = selector.to_lowercase();
    devices
        .find(|d| d.name().is_ok_and(|n| n.to_lowercase().contains(&needle)))
        .ok_or_else(|| AudioError::DeviceNotFound(selector.to_string()).into())
}

/// Live audio capture via cpal.
///
/// The input callback regroups device buffers into fixed blocks and hands
/// each one, with its capture timestamp in seconds since the stream's
/// first callback, to `on_block`. `on_block` runs on the audio thread: it
/// must not block.
///
/// # Example
/// ```no_run
/// use pb_audio::capture::AudioCapture;
/// use pb_core::config::AudioConfig;
///
/// let capture = AudioCapture::start(&AudioConfig::default(), |block, t, _status| {
///     let _ = (block.len(), t);
/// })
/// .unwrap();
/// capture.stop().unwrap();
/// ```
pub struct AudioCapture {
    stream: cpal::Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the configured input device and start capturing.
    ///
    /// # Errors
    /// Returns an error if the device is missing or refuses the
    /// configured format.
    pub fn start<F>(config: &AudioConfig, mut on_block: F) -> Result<Self>
    where
        F: FnMut(&[f32], f64, CaptureStatus) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = select_device(&host, config.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let fault = Arc::new(AtomicBool::new(false));
        let fault_writer = Arc::clone(&fault);

        let mut assembler = BlockAssembler::new(
            config.block_size,
            usize::from(config.channels),
            config.sample_rate,
        );
        let mut origin: Option<cpal::StreamInstant> = None;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], info: &cpal::InputCallbackInfo| {
                    let captured = info.timestamp().capture;
                    let start = *origin.get_or_insert(captured);
                    let t = captured
                        .duration_since(&start)
                        .map_or(0.0, |d| d.as_secs_f64());
                    let status = CaptureStatus {
                        stream_fault: fault.swap(false, Ordering::Relaxed),
                    };
                    assembler.push_interleaved(data, t, status, &mut on_block);
                },
                move |err| {
                    log::error!("Audio stream error: {err}");
                    fault_writer.store(true, Ordering::Relaxed);
                },
                None,
            )
            .with_context(|| {
                format!(
                    "device '{device_name}' refused {} ch @ {} Hz f32",
                    config.channels, config.sample_rate
                )
            })?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        log::info!(
            "Capturing from '{device_name}' ({} ch @ {} Hz, {}-frame blocks)",
            config.channels,
            config.sample_rate,
            config.block_size
        );

        Ok(Self {
            stream,
            device_name,
            sample_rate: config.sample_rate,
            channels: config.channels,
        })
    }

    /// Stop the stream and release the device. No block is delivered once
    /// this returns.
    ///
    /// # Errors
    /// Returns an error if the host refuses to pause the stream; the device
    /// is released regardless.
    pub fn stop(self) -> Result<()> {
        let paused = self.stream.pause();
        drop(self.stream);
        log::info!("Capture from '{}' stopped", self.device_name);
        paused.map_err(|e| AudioError::StreamError(e.to_string()).into())
    }

    /// Name of the capture device.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The sample rate of the capture stream.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channels opened on the device.
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }
}
