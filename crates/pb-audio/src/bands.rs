use std::ops::Range;

/// Half-open range of FFT magnitude bins that make up one band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandRange {
    /// First bin, inclusive.
    pub start: usize,
    /// Last bin, exclusive.
    pub end: usize,
}

impl BandRange {
    /// Number of bins in the band.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// `true` if the band covers no bin.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The band as a slice range.
    #[must_use]
    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Map `count` log-spaced bands between `min_freq` and `max_freq` onto the
/// bins of a real FFT of `fft_size` samples.
///
/// `max_freq` is clamped to Nyquist. Band `i` starts at the first bin whose
/// frequency is `>=` its lower edge and ends before the first bin whose
/// frequency is `>` its upper edge. A band too narrow for the FFT resolution
/// collapses to a single bin. Nothing is rejected: degenerate inputs yield
/// degenerate but well-formed ranges.
///
/// # Example
/// ```
/// use pb_audio::bands::map_bands;
/// let bands = map_bands(32, 30.0, 18_000.0, 44_100.0, 1024);
/// assert_eq!(bands.len(), 32);
/// assert!(bands.iter().all(|b| !b.is_empty() && b.end <= 513));
/// ```
#[must_use]
pub fn map_bands(
    count: usize,
    min_freq: f64,
    max_freq: f64,
    sample_rate: f64,
    fft_size: usize,
) -> Vec<BandRange> {
    let fft_size = fft_size.max(2);
    let sample_rate = if sample_rate > 0.0 { sample_rate } else { 1.0 };
    let max_freq = max_freq.min(sample_rate / 2.0);
    let min_freq = min_freq.max(f64::MIN_POSITIVE);

    // Bin centre frequencies of a one-sided spectrum
    let bin_hz = sample_rate / fft_size as f64;
    let freqs: Vec<f64> = (0..=fft_size / 2).map(|k| k as f64 * bin_hz).collect();
    let last_bin = freqs.len() - 1;

    let log_min = min_freq.log10();
    let log_max = max_freq.log10();
    let edge = |i: usize| 10f64.powf(log_min + (log_max - log_min) * i as f64 / count as f64);

    (0..count)
        .map(|i| {
            let (lo, hi) = (edge(i), edge(i + 1));
            let start = freqs.partition_point(|&f| f < lo).min(last_bin);
            let mut end = freqs.partition_point(|&f| f <= hi);
            if end <= start {
                end = (start + 1).min(freqs.len());
            }
            BandRange { start, end }
        })
        .collect()
}
