use anyhow::Result;
use clap::Parser;
use pb_core::config::PipelineConfig;
use pb_core::error::CoreError;
use pb_net::UdpSink;

pub mod cli;
pub mod pipeline;

fn main() -> Result<()> {
    // 1. CLI
    let cli = cli::Cli::parse();

    // 2. Logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Device listing short-circuits everything else
    if cli.list_devices {
        return list_devices();
    }

    // 4. Config + CLI overrides
    let mut config = resolve_config(&cli)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    // 5. Transport
    let sink = UdpSink::from_config(&config.transport)?;

    // 6. Stream until Ctrl-C
    pipeline::run(&config, sink)?;
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = pb_audio::capture::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{:>3}: {}{marker}", device.index, device.name);
    }
    Ok(())
}

/// Load the configuration file. A missing default file falls back to
/// built-in defaults; a missing file named with `--config` is an error.
fn resolve_config(cli: &cli::Cli) -> Result<PipelineConfig> {
    let (path, explicit) = cli.config_path();
    if path.exists() {
        pb_core::config::load_config(&path)
    } else if explicit {
        Err(CoreError::FileNotFound {
            path: path.display().to_string(),
        }
        .into())
    } else {
        log::warn!("Config not found: {}. Using defaults.", path.display());
        Ok(PipelineConfig::default())
    }
}
