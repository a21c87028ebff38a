use std::collections::VecDeque;
use std::time::{Duration, Instant};

use pb_core::config::TempoConfig;

/// Fewest onset samples an estimate is attempted with.
pub const MIN_SAMPLES: usize = 10;

/// Below this magnitude a DC-removed envelope counts as flat.
const FLAT_TOLERANCE: f64 = 1e-8;

/// One onset-energy observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnsetSample {
    /// Block energy (RMS).
    pub energy: f32,
    /// Capture time, in seconds.
    pub timestamp: f64,
}

/// Rolling tempo estimate from a sliding window of onset energies.
///
/// The envelope is DC-removed and autocorrelated; the strongest lag within
/// the configured BPM range gives the tempo. Autocorrelation is the
/// expensive path, so `get_bpm` recomputes at most once per
/// `min_update_interval` and serves the cached value in between.
///
/// # Example
/// ```
/// use pb_audio::tempo::TempoTracker;
/// use std::time::Duration;
///
/// let mut tracker = TempoTracker::new(12.0, 60.0, 180.0);
/// tracker.add_sample(0.2, 0.0);
/// assert_eq!(tracker.get_bpm(Duration::from_secs(1)), None);
/// ```
pub struct TempoTracker {
    /// Onset samples, oldest first, timestamps non-decreasing.
    samples: VecDeque<OnsetSample>,
    window_seconds: f64,
    min_bpm: f64,
    max_bpm: f64,
    /// Last successful estimate.
    last_bpm: Option<f64>,
    /// When `last_bpm` was computed.
    last_update: Option<Instant>,
    /// Reused DC-removed envelope.
    scratch: Vec<f64>,
}

impl TempoTracker {
    /// Create a tracker keeping `window_seconds` of history and searching
    /// tempos in `[min_bpm, max_bpm]`.
    #[must_use]
    pub fn new(window_seconds: f64, min_bpm: f64, max_bpm: f64) -> Self {
        Self {
            samples: VecDeque::with_capacity(1024),
            window_seconds,
            min_bpm,
            max_bpm,
            last_bpm: None,
            last_update: None,
            scratch: Vec::new(),
        }
    }

    /// Create a tracker from the `[tempo]` configuration section.
    #[must_use]
    pub fn from_config(config: &TempoConfig) -> Self {
        Self::new(config.window_seconds, config.min_bpm, config.max_bpm)
    }

    /// Append an onset sample and evict everything more than
    /// `window_seconds` older than it.
    ///
    /// A timestamp earlier than the newest retained one means the capture
    /// clock jumped back; the window restarts from this sample.
    pub fn add_sample(&mut self, energy: f32, timestamp: f64) {
        if let Some(newest) = self.samples.back()
            && timestamp < newest.timestamp
        {
            log::debug!(
                "onset clock went back ({:.3}s -> {timestamp:.3}s), restarting tempo window",
                newest.timestamp
            );
            self.samples.clear();
        }

        self.samples.push_back(OnsetSample { energy, timestamp });

        while let Some(oldest) = self.samples.front() {
            if timestamp - oldest.timestamp > self.window_seconds {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Latest tempo estimate, recomputed if `min_update_interval` has
    /// elapsed since the last successful computation.
    ///
    /// Returns `None` only until the first estimate succeeds; afterwards a
    /// failed recomputation (too few samples, flat envelope, lag range too
    /// narrow) keeps serving the previous value.
    pub fn get_bpm(&mut self, min_update_interval: Duration) -> Option<f64> {
        self.get_bpm_at(Instant::now(), min_update_interval)
    }

    /// `get_bpm` against an explicit wall-clock instant.
    pub fn get_bpm_at(&mut self, now: Instant, min_update_interval: Duration) -> Option<f64> {
        if let Some(last) = self.last_update
            && now.duration_since(last) < min_update_interval
        {
            return self.last_bpm;
        }

        if let Some(bpm) = self.estimate() {
            log::debug!("tempo estimate {bpm:.1} BPM from {} samples", self.samples.len());
            self.last_bpm = Some(bpm);
            self.last_update = Some(now);
        }
        self.last_bpm
    }

    /// Cached estimate, without recomputing.
    #[must_use]
    pub fn bpm(&self) -> Option<f64> {
        self.last_bpm
    }

    /// Number of onset samples in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// `true` if no onset sample is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamps of the oldest and newest retained samples.
    #[must_use]
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((
            self.samples.front()?.timestamp,
            self.samples.back()?.timestamp,
        ))
    }

    /// Autocorrelation tempo estimate over the current window.
    fn estimate(&mut self) -> Option<f64> {
        let n = self.samples.len();
        if n < MIN_SAMPLES {
            return None;
        }

        // Envelope rate from the mean spacing of consecutive samples
        let (first, last) = self.time_span()?;
        let mean_dt = (last - first) / (n - 1) as f64;
        if mean_dt.is_nan() || mean_dt <= 0.0 {
            return None;
        }
        let env_rate = 1.0 / mean_dt;

        let mean = self
            .samples
            .iter()
            .map(|s| f64::from(s.energy))
            .sum::<f64>()
            / n as f64;
        self.scratch.clear();
        self.scratch
            .extend(self.samples.iter().map(|s| f64::from(s.energy) - mean));
        if self.scratch.iter().all(|x| x.abs() <= FLAT_TOLERANCE) {
            return None;
        }

        let min_lag = ((env_rate * 60.0 / self.max_bpm) as usize).max(1);
        let max_lag = ((env_rate * 60.0 / self.min_bpm) as usize).min(n - 1);
        if min_lag >= max_lag {
            return None;
        }

        // First maximum wins, so ties favour the shorter lag (faster tempo)
        let mut best_lag = min_lag;
        let mut best = f64::NEG_INFINITY;
        for lag in min_lag..max_lag {
            let c = autocorrelation(&self.scratch, lag);
            if c > best {
                best = c;
                best_lag = lag;
            }
        }

        Some(60.0 * env_rate / best_lag as f64)
    }
}

/// Unnormalized autocorrelation of `x` at a non-negative `lag`.
fn autocorrelation(x: &[f64], lag: usize) -> f64 {
    x.iter().zip(x.iter().skip(lag)).map(|(a, b)| a * b).sum()
}
