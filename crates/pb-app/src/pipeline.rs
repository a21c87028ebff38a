use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use pb_audio::capture::AudioCapture;
use pb_audio::stream::{PumpSummary, pipeline};
use pb_core::config::PipelineConfig;
use pb_core::traits::PacketSink;

/// Capture, analyse and stream until Ctrl-C.
///
/// The audio callback analyses each block and enqueues it; this thread
/// drains the queue, tracks tempo and sends packets through `sink`.
///
/// # Errors
/// Returns an error if the signal handler cannot be installed or the
/// capture device cannot be opened.
pub fn run<S: PacketSink>(config: &PipelineConfig, sink: S) -> Result<PumpSummary> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::Relaxed))
        .context("cannot install Ctrl-C handler")?;

    let (mut producer, mut pump) = pipeline(config, sink);
    let capture = AudioCapture::start(&config.audio, move |samples, t, status| {
        producer.process(samples, t, status);
    })?;
    log::info!(
        "Streaming {} bands from '{}' ({:.1} ms blocks), Ctrl-C to stop",
        config.bands.count,
        capture.device_name(),
        config.block_duration() * 1000.0
    );

    pump.run(&running);

    if let Err(e) = capture.stop() {
        log::warn!("Capture did not stop cleanly: {e}");
    }
    pump.drain();

    let summary = pump.summary();
    log::info!(
        "Session ended: {} sent, {} failed, peak backlog {} blocks, {} flagged, last BPM {}",
        summary.sent,
        summary.failed,
        summary.max_backlog,
        summary.flagged,
        pump.tempo()
            .bpm()
            .map_or_else(|| "unknown".to_string(), |b| format!("{b:.1}"))
    );
    Ok(summary)
}
