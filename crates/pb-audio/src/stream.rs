use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use flume::{Receiver, Sender};
use pb_core::config::PipelineConfig;
use pb_core::packet::{AnalyzedBlock, CaptureStatus, ResultPacket};
use pb_core::traits::PacketSink;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::analyzer::SpectralAnalyzer;
use crate::tempo::TempoTracker;

/// Band buffers parked between the consumer and the audio callback.
const RECYCLE_SLOTS: usize = 64;

/// Counters written by the audio callback and reported by the consumer.
///
/// All fields are atomic: the callback never takes a lock.
#[derive(Debug, Default)]
pub struct StreamStats {
    /// Blocks the capture boundary flagged.
    flagged: AtomicU64,
}

impl StreamStats {
    /// Flagged blocks so far.
    #[must_use]
    pub fn flagged(&self) -> u64 {
        self.flagged.load(Ordering::Relaxed)
    }
}

/// Audio-callback half of the pipeline.
///
/// Analyses each block and sends the result on an unbounded channel, so it
/// never waits on the consumer and never drops a block. A stalled consumer
/// only delays packets. Band vectors come back from the consumer through a
/// small ring and are refilled in place.
pub struct BlockProducer {
    analyzer: SpectralAnalyzer,
    tx: Sender<AnalyzedBlock>,
    spare: Consumer<Vec<f32>>,
    stats: Arc<StreamStats>,
}

impl BlockProducer {
    /// Analyse one block and enqueue it.
    ///
    /// Returns `false` only once the consumer is gone.
    pub fn process(&mut self, samples: &[f32], timestamp: f64, status: CaptureStatus) -> bool {
        if status.is_flagged() {
            self.stats.flagged.fetch_add(1, Ordering::Relaxed);
        }

        let bands = self.spare.pop().unwrap_or_default();
        let block = self.analyzer.analyze_into(samples, timestamp, bands);
        self.tx.send(block).is_ok()
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }
}

/// Totals kept by the consumer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Packets the sink accepted.
    pub sent: u64,
    /// Packets the sink rejected.
    pub failed: u64,
    /// Deepest queue seen at the start of a drain, in blocks.
    pub max_backlog: usize,
    /// Blocks flagged by the capture boundary.
    pub flagged: u64,
}

/// Consumer half of the pipeline.
///
/// Drains analysed blocks in FIFO order, feeds their onset energy to the
/// tempo tracker, pairs each with the current (rate-limited) BPM and hands
/// the packet to the sink. Owns the tempo tracker, so autocorrelation never
/// runs on the audio callback. The queue is lossless, so the tracker sees
/// every block's onset in capture order however late it drains.
pub struct PacketPump<S> {
    rx: Receiver<AnalyzedBlock>,
    recycle: Producer<Vec<f32>>,
    tempo: TempoTracker,
    update_interval: Duration,
    poll_interval: Duration,
    backlog_warning: usize,
    sink: S,
    stats: Arc<StreamStats>,
    sent: u64,
    failed: u64,
    max_backlog: usize,
    behind: bool,
    reported_flagged: u64,
}

impl<S: PacketSink> PacketPump<S> {
    /// Send every block currently queued. Returns how many were handled.
    pub fn drain(&mut self) -> usize {
        self.check_backlog();

        let mut handled = 0;
        while let Ok(block) = self.rx.try_recv() {
            self.tempo.add_sample(block.onset, block.timestamp);
            let bpm = self.tempo.get_bpm(self.update_interval);
            let packet = ResultPacket::from_block(block, bpm);

            match self.sink.send(&packet) {
                Ok(()) => self.sent += 1,
                Err(e) => {
                    self.failed += 1;
                    log::warn!("packet t={:.3}s not sent: {e}", packet.t);
                }
            }
            // A full ring frees the buffer here instead
            let _ = self.recycle.push(packet.bands);
            handled += 1;
        }
        self.report_flagged();
        handled
    }

    /// Drain until `running` goes false, sleeping `poll_interval` whenever
    /// the queue is empty. Returns without a final drain: stop the capture
    /// first, then call `drain` once more.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            if self.drain() == 0 {
                thread::sleep(self.poll_interval);
            }
        }
    }

    /// Current totals.
    #[must_use]
    pub fn summary(&self) -> PumpSummary {
        PumpSummary {
            sent: self.sent,
            failed: self.failed,
            max_backlog: self.max_backlog,
            flagged: self.stats.flagged(),
        }
    }

    /// Tempo tracker state.
    #[must_use]
    pub fn tempo(&self) -> &TempoTracker {
        &self.tempo
    }

    /// The sink, for inspection.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Warn once when the queue grows past `backlog_warning`, and again
    /// after it has fallen back under half of it.
    fn check_backlog(&mut self) {
        let depth = self.rx.len();
        self.max_backlog = self.max_backlog.max(depth);

        if !self.behind && depth > self.backlog_warning {
            log::warn!("consumer is {depth} blocks behind the capture, packets are delayed");
            self.behind = true;
        } else if self.behind && depth <= self.backlog_warning / 2 {
            log::info!("consumer caught up ({depth} blocks queued)");
            self.behind = false;
        }
    }

    /// Log capture faults reported since the last drain.
    fn report_flagged(&mut self) {
        let flagged = self.stats.flagged();
        if flagged > self.reported_flagged {
            log::warn!(
                "capture reported {} faulty block(s) ({flagged} total), processed anyway",
                flagged - self.reported_flagged
            );
            self.reported_flagged = flagged;
        }
    }
}

/// Build both halves of the pipeline around an unbounded block queue.
///
/// The producer goes to the audio callback, the pump stays on the consumer
/// thread.
///
/// # Panics
/// Panics if `audio.block_size` is 0; validate the configuration first.
///
/// # Example
/// ```
/// use pb_audio::stream::pipeline;
/// use pb_core::config::PipelineConfig;
/// use pb_core::packet::{CaptureStatus, ResultPacket};
/// use pb_core::traits::PacketSink;
///
/// struct Collect(Vec<ResultPacket>);
/// impl PacketSink for Collect {
///     type Error = std::convert::Infallible;
///     fn send(&mut self, p: &ResultPacket) -> Result<(), Self::Error> {
///         self.0.push(p.clone());
///         Ok(())
///     }
/// }
///
/// let (mut producer, mut pump) = pipeline(&PipelineConfig::default(), Collect(Vec::new()));
/// producer.process(&[0.0; 1024], 0.0, CaptureStatus::OK);
/// assert_eq!(pump.drain(), 1);
/// ```
#[must_use]
pub fn pipeline<S: PacketSink>(
    config: &PipelineConfig,
    sink: S,
) -> (BlockProducer, PacketPump<S>) {
    let (tx, rx) = flume::unbounded();
    let (recycle, spare) = RingBuffer::new(RECYCLE_SLOTS);
    let stats = Arc::new(StreamStats::default());
    let update_interval =
        Duration::try_from_secs_f64(config.tempo.update_interval).unwrap_or(Duration::ZERO);

    let producer = BlockProducer {
        analyzer: SpectralAnalyzer::from_config(config),
        tx,
        spare,
        stats: Arc::clone(&stats),
    };
    let pump = PacketPump {
        rx,
        recycle,
        tempo: TempoTracker::from_config(&config.tempo),
        update_interval,
        poll_interval: config.stream.poll_interval(),
        backlog_warning: config.stream.backlog_warning,
        sink,
        stats,
        sent: 0,
        failed: 0,
        max_backlog: 0,
        behind: false,
        reported_flagged: 0,
    };
    (producer, pump)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[derive(Default)]
    struct Collect(Vec<ResultPacket>);

    impl PacketSink for Collect {
        type Error = Infallible;

        fn send(&mut self, packet: &ResultPacket) -> Result<(), Self::Error> {
            self.0.push(packet.clone());
            Ok(())
        }
    }

    /// Rejects every other packet.
    #[derive(Default)]
    struct Flaky {
        calls: usize,
        accepted: Vec<f64>,
    }

    impl PacketSink for Flaky {
        type Error = String;

        fn send(&mut self, packet: &ResultPacket) -> Result<(), Self::Error> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err("link down".to_string());
            }
            self.accepted.push(packet.t);
            Ok(())
        }
    }

    fn block_period(config: &PipelineConfig) -> f64 {
        config.block_duration()
    }

    #[test]
    fn second_of_silence_gives_zero_bands_and_no_bpm() {
        let mut config = PipelineConfig::default();
        config.audio.block_size = 44_100;
        let (mut producer, mut pump) = pipeline(&config, Collect::default());

        assert!(producer.process(&vec![0.0; 44_100], 0.5, CaptureStatus::OK));
        assert_eq!(pump.drain(), 1);

        let packets = &pump.sink().0;
        assert_eq!(packets.len(), 1);
        assert!((packets[0].t - 0.5).abs() < f64::EPSILON);
        assert_eq!(packets[0].bpm, None);
        assert_eq!(packets[0].bands.len(), 32);
        assert!(packets[0].bands.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn queue_preserves_order_without_loss() {
        let config = PipelineConfig::default();
        let (mut producer, mut pump) = pipeline(&config, Collect::default());
        let dt = block_period(&config);

        for i in 0..100 {
            assert!(producer.process(&[0.0; 1024], i as f64 * dt, CaptureStatus::OK));
        }
        assert_eq!(pump.drain(), 100);
        assert_eq!(pump.drain(), 0);

        let stamps: Vec<f64> = pump.sink().0.iter().map(|p| p.t).collect();
        assert_eq!(stamps.len(), 100);
        for (i, t) in stamps.iter().enumerate() {
            assert!((t - i as f64 * dt).abs() < 1e-12);
        }
    }

    #[test]
    fn interleaved_produce_and_drain_keeps_fifo() {
        let config = PipelineConfig::default();
        let (mut producer, mut pump) = pipeline(&config, Collect::default());

        let mut t = 0.0;
        for round in 0..10 {
            for _ in 0..=round {
                producer.process(&[0.0; 1024], t, CaptureStatus::OK);
                t += 1.0;
            }
            pump.drain();
        }
        let stamps: Vec<f64> = pump.sink().0.iter().map(|p| p.t).collect();
        assert_eq!(stamps.len(), 55);
        assert!(stamps.windows(2).all(|w| (w[1] - w[0] - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn items_cross_threads_in_order() {
        let config = PipelineConfig::default();
        let (mut producer, mut pump) = pipeline(&config, Collect::default());

        let handle = thread::spawn(move || {
            for i in 0..200 {
                assert!(producer.process(&[0.0; 1024], f64::from(i), CaptureStatus::OK));
            }
        });
        while pump.sink().0.len() < 200 {
            if pump.drain() == 0 {
                thread::yield_now();
            }
        }
        handle.join().unwrap();

        let stamps: Vec<f64> = pump.sink().0.iter().map(|p| p.t).collect();
        assert_eq!(stamps, (0..200).map(f64::from).collect::<Vec<_>>());
    }

    /// Feed a click track (a loud block every 22 blocks) and drain after
    /// every `drain_every` blocks. Returns the BPM of the last packet, the
    /// totals and the tracker length.
    fn click_track(
        drain_every: usize,
        config: &PipelineConfig,
    ) -> (Option<f64>, PumpSummary, usize) {
        let (mut producer, mut pump) = pipeline(config, Collect::default());
        let dt = block_period(config);

        for i in 0..560 {
            let level = if i % 22 == 0 { 0.5 } else { 0.01 };
            assert!(producer.process(&[level; 1024], i as f64 * dt, CaptureStatus::OK));
            if (i + 1) % drain_every == 0 {
                pump.drain();
            }
        }
        pump.drain();

        assert_eq!(pump.sink().0.len(), 560);
        let bpm = pump.sink().0.last().and_then(|p| p.bpm);
        (bpm, pump.summary(), pump.tempo().len())
    }

    #[test]
    fn stalled_consumer_loses_no_onsets() {
        let mut config = PipelineConfig::default();
        config.tempo.update_interval = 0.0;
        config.stream.backlog_warning = 64;

        let (steady_bpm, steady, steady_len) = click_track(1, &config);
        let (stalled_bpm, stalled, stalled_len) = click_track(100, &config);

        assert_eq!(steady.max_backlog, 1);
        assert_eq!(stalled.max_backlog, 100);
        assert_eq!(stalled.sent, 560);
        assert_eq!(stalled_len, steady_len);
        assert!(stalled_bpm.is_some());
        assert_eq!(stalled_bpm, steady_bpm);

        let expected = 60.0 / (22.0 * block_period(&config));
        let bpm = stalled_bpm.unwrap();
        assert!((bpm - expected).abs() < 2.0, "got {bpm}, expected {expected}");
    }

    #[test]
    fn flagged_blocks_are_still_sent() {
        let config = PipelineConfig::default();
        let (mut producer, mut pump) = pipeline(&config, Collect::default());
        let fault = CaptureStatus { stream_fault: true };

        assert!(producer.process(&[0.1; 1024], 0.0, fault));
        assert_eq!(pump.drain(), 1);
        assert_eq!(pump.summary().flagged, 1);
        assert_eq!(pump.sink().0.len(), 1);
    }

    #[test]
    fn send_failures_do_not_stop_the_pump() {
        let config = PipelineConfig::default();
        let (mut producer, mut pump) = pipeline(&config, Flaky::default());

        for i in 0..6 {
            producer.process(&[0.0; 1024], f64::from(i), CaptureStatus::OK);
        }
        assert_eq!(pump.drain(), 6);
        let summary = pump.summary();
        assert_eq!(summary.sent, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(pump.sink().accepted, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn click_track_reaches_packets_as_bpm() {
        let mut config = PipelineConfig::default();
        config.tempo.update_interval = 0.0;
        let (bpm, _, _) = click_track(1, &config);

        let expected = 60.0 / (22.0 * block_period(&config));
        let bpm = bpm.unwrap();
        assert!((bpm - expected).abs() < 2.0, "got {bpm}, expected {expected}");
    }

    #[test]
    fn silence_after_estimate_keeps_cached_bpm() {
        let mut config = PipelineConfig::default();
        // Long enough that the first estimate stays cached for the whole test
        config.tempo.update_interval = 3600.0;
        let (mut producer, mut pump) = pipeline(&config, Collect::default());
        let dt = block_period(&config);

        for i in 0..560 {
            let level = if i % 22 == 0 { 0.5 } else { 0.01 };
            producer.process(&[level; 1024], f64::from(i) * dt, CaptureStatus::OK);
        }
        pump.drain();
        let cached = pump.tempo().bpm();
        assert!(cached.is_some());

        let t = 560.0 * dt;
        producer.process(&vec![0.0; 44_100], t, CaptureStatus::OK);
        assert_eq!(pump.drain(), 1);

        let last = pump.sink().0.last().unwrap();
        assert!((last.t - t).abs() < f64::EPSILON);
        assert_eq!(last.bpm, cached);
        assert_eq!(last.bands.len(), 32);
        assert!(last.bands.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn run_returns_once_stopped() {
        let config = PipelineConfig::default();
        let (mut producer, mut pump) = pipeline(&config, Collect::default());
        producer.process(&[0.0; 1024], 0.0, CaptureStatus::OK);

        let running = AtomicBool::new(false);
        pump.run(&running);
        assert_eq!(pump.drain(), 1);
    }
}
