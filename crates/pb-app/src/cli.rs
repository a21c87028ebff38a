use std::path::PathBuf;

use clap::Parser;
use pb_core::config::{PipelineConfig, WireFormat};

/// Default config location, used when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "config/pulsebridge.toml";

/// pulsebridge: stream band energies and tempo from an audio input to an LED bridge.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file. Default: config/pulsebridge.toml, or
    /// built-in defaults if that file is missing.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Input device: list index or name substring (see --list-devices).
    #[arg(short, long)]
    pub device: Option<String>,

    /// Bridge address, host:port.
    #[arg(long)]
    pub dest: Option<String>,

    /// Wire format: json or frame.
    #[arg(long)]
    pub wire: Option<WireFormat>,

    /// Capture sample rate in Hz.
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Frames per analysis block.
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Print the available input devices and exit.
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Config file to load and whether the user named it explicitly.
    #[must_use]
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        }
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(ref device) = self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(ref dest) = self.dest {
            config.transport.destination.clone_from(dest);
        }
        if let Some(wire) = self.wire {
            config.transport.wire = wire;
        }
        if let Some(rate) = self.sample_rate {
            config.audio.sample_rate = rate;
        }
        if let Some(size) = self.block_size {
            config.audio.block_size = size;
        }
    }
}
