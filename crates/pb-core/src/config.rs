use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Complete pipeline configuration, fixed for the lifetime of the process.
///
/// Built once at startup (defaults, then TOML file, then CLI overrides),
/// validated, and passed by reference to every component.
///
/// # Example
/// ```
/// use pb_core::config::PipelineConfig;
/// let config = PipelineConfig::default();
/// assert_eq!(config.bands.count, 32);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Capture parameters.
    pub audio: AudioConfig,
    /// Log-spaced banding parameters.
    pub bands: BandConfig,
    /// Tempo tracking parameters.
    pub tempo: TempoConfig,
    /// Producer/consumer handoff parameters.
    pub stream: StreamConfig,
    /// Packet transport parameters.
    pub transport: TransportConfig,
}

/// Capture parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Sample rate requested from the input device, in Hz.
    pub sample_rate: u32,
    /// Frames per analysis block. Also the FFT size (no zero-padding).
    pub block_size: usize,
    /// Channels opened on the device. Only channel 0 is analysed.
    pub channels: u16,
    /// Input device, by index in `--list-devices` or by name substring.
    /// `None` = host default.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 1024,
            channels: 1,
            device: None,
        }
    }
}

/// Log-spaced banding parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BandConfig {
    /// Number of output bands.
    pub count: usize,
    /// Lower edge of the first band, in Hz.
    pub min_freq: f64,
    /// Upper edge of the last band, in Hz. Clamped to Nyquist.
    pub max_freq: f64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            count: 32,
            min_freq: 30.0,
            max_freq: 18_000.0,
        }
    }
}

/// Tempo tracking parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TempoConfig {
    /// Length of the onset-energy history, in seconds.
    pub window_seconds: f64,
    /// Slowest tempo considered.
    pub min_bpm: f64,
    /// Fastest tempo considered.
    pub max_bpm: f64,
    /// Minimum wall-clock time between two autocorrelation passes, in seconds.
    pub update_interval: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            window_seconds: 12.0,
            min_bpm: 60.0,
            max_bpm: 180.0,
            update_interval: 1.0,
        }
    }
}

/// Producer/consumer handoff parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Queued blocks above which the consumer warns that it is falling
    /// behind. The queue itself is unbounded.
    pub backlog_warning: usize,
    /// Consumer sleep when the queue is empty, in microseconds.
    pub poll_interval_us: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backlog_warning: 512,
            poll_interval_us: 500,
        }
    }
}

impl StreamConfig {
    /// Consumer idle sleep as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}

/// Encoding used on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `{"t": .., "bpm": .., "bands": [..]}` datagrams.
    #[default]
    Json,
    /// Compact checksummed bridge frames.
    Frame,
}

impl std::str::FromStr for WireFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "frame" | "binary" => Ok(Self::Frame),
            other => Err(CoreError::Config(format!("unknown wire format '{other}'"))),
        }
    }
}

/// Packet transport parameters.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TransportConfig {
    /// `host:port` of the bridge.
    pub destination: String,
    /// Datagram encoding.
    pub wire: WireFormat,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            destination: "192.168.4.2:5005".to_string(),
            wire: WireFormat::Json,
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    ///
    /// These are startup-fatal: the real-time loop never starts on an
    /// invalid configuration.
    ///
    /// # Errors
    /// Returns `CoreError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), CoreError> {
        let a = &self.audio;
        if a.sample_rate == 0 {
            return Err(CoreError::Config("audio.sample_rate must be > 0".into()));
        }
        if a.block_size < 2 {
            return Err(CoreError::Config("audio.block_size must be >= 2".into()));
        }
        if a.channels == 0 {
            return Err(CoreError::Config("audio.channels must be > 0".into()));
        }

        let b = &self.bands;
        if b.count == 0 {
            return Err(CoreError::Config("bands.count must be > 0".into()));
        }
        if !is_positive(b.min_freq) {
            return Err(CoreError::Config("bands.min_freq must be > 0".into()));
        }
        if b.min_freq >= b.max_freq {
            return Err(CoreError::Config(format!(
                "bands.min_freq ({}) must be below bands.max_freq ({})",
                b.min_freq, b.max_freq
            )));
        }

        let t = &self.tempo;
        if !is_positive(t.window_seconds) {
            return Err(CoreError::Config("tempo.window_seconds must be > 0".into()));
        }
        if !is_positive(t.min_bpm) || t.min_bpm >= t.max_bpm {
            return Err(CoreError::Config(format!(
                "tempo range [{}, {}] is empty or non-positive",
                t.min_bpm, t.max_bpm
            )));
        }
        if !t.update_interval.is_finite() || t.update_interval < 0.0 {
            return Err(CoreError::Config("tempo.update_interval must be >= 0".into()));
        }

        if self.stream.backlog_warning == 0 {
            return Err(CoreError::Config("stream.backlog_warning must be > 0".into()));
        }
        if self.transport.destination.is_empty() {
            return Err(CoreError::Config("transport.destination is empty".into()));
        }
        Ok(())
    }

    /// Seconds covered by one analysis block.
    #[must_use]
    pub fn block_duration(&self) -> f64 {
        self.audio.block_size as f64 / f64::from(self.audio.sample_rate.max(1))
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Intermediate TOML structure, every section optional.
#[derive(Deserialize)]
struct ConfigFile {
    audio: Option<AudioSection>,
    bands: Option<BandSection>,
    tempo: Option<TempoSection>,
    stream: Option<StreamSection>,
    transport: Option<TransportSection>,
}

#[derive(Deserialize)]
struct AudioSection {
    sample_rate: Option<u32>,
    block_size: Option<usize>,
    channels: Option<u16>,
    device: Option<String>,
}

#[derive(Deserialize)]
struct BandSection {
    count: Option<usize>,
    min_freq: Option<f64>,
    max_freq: Option<f64>,
}

#[derive(Deserialize)]
struct TempoSection {
    window_seconds: Option<f64>,
    min_bpm: Option<f64>,
    max_bpm: Option<f64>,
    update_interval: Option<f64>,
}

#[derive(Deserialize)]
struct StreamSection {
    backlog_warning: Option<usize>,
    poll_interval_us: Option<u64>,
}

#[derive(Deserialize)]
struct TransportSection {
    destination: Option<String>,
    wire: Option<WireFormat>,
}

/// Parse TOML text and merge it over the defaults.
///
/// The result is not validated; callers validate after applying any
/// overrides of their own.
///
/// # Errors
/// Returns an error if the text is not valid TOML for this layout.
///
/// # Example
/// ```
/// use pb_core::config::parse_config;
/// let config = parse_config("[bands]\ncount = 16\n").unwrap();
/// assert_eq!(config.bands.count, 16);
/// assert_eq!(config.audio.block_size, 1024);
/// ```
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let file: ConfigFile = toml::from_str(content).context("TOML parse error")?;
    let mut config = PipelineConfig::default();

    if let Some(a) = file.audio {
        if let Some(v) = a.sample_rate {
            config.audio.sample_rate = v;
        }
        if let Some(v) = a.block_size {
            config.audio.block_size = v;
        }
        if let Some(v) = a.channels {
            config.audio.channels = v;
        }
        if a.device.is_some() {
            config.audio.device = a.device;
        }
    }

    if let Some(b) = file.bands {
        if let Some(v) = b.count {
            config.bands.count = v;
        }
        if let Some(v) = b.min_freq {
            config.bands.min_freq = v;
        }
        if let Some(v) = b.max_freq {
            config.bands.max_freq = v;
        }
    }

    if let Some(t) = file.tempo {
        if let Some(v) = t.window_seconds {
            config.tempo.window_seconds = v;
        }
        if let Some(v) = t.min_bpm {
            config.tempo.min_bpm = v;
        }
        if let Some(v) = t.max_bpm {
            config.tempo.max_bpm = v;
        }
        if let Some(v) = t.update_interval {
            config.tempo.update_interval = v;
        }
    }

    if let Some(s) = file.stream {
        if let Some(v) = s.backlog_warning {
            config.stream.backlog_warning = v;
        }
        if let Some(v) = s.poll_interval_us {
            config.stream.poll_interval_us = v;
        }
    }

    if let Some(t) = file.transport {
        if let Some(v) = t.destination {
            config.transport.destination = v;
        }
        if let Some(v) = t.wire {
            config.transport.wire = v;
        }
    }

    Ok(config)
}

/// Load a TOML file and merge it over the defaults.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
/// ```no_run
/// use pb_core::config::load_config;
/// use std::path::Path;
/// let config = load_config(Path::new("config/pulsebridge.toml")).unwrap();
/// ```
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config = parse_config(&content)
        .with_context(|| format!("invalid config in {}", path.display()))?;
    log::debug!("config loaded from {}", path.display());
    Ok(config)
}
