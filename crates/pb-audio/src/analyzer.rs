use pb_core::config::PipelineConfig;
use pb_core::packet::AnalyzedBlock;

use crate::bands::{BandRange, map_bands};
use crate::fft::FftPipeline;

/// Per-block spectral analysis: windowed FFT, log-spaced band means,
/// max-normalization, and an RMS onset value.
///
/// Holds only precomputed state (window, FFT plan, band ranges), so the
/// result for a block never depends on earlier blocks.
///
/// # Example
/// ```
/// use pb_audio::analyzer::SpectralAnalyzer;
/// use pb_core::config::PipelineConfig;
///
/// let mut analyzer = SpectralAnalyzer::from_config(&PipelineConfig::default());
/// let block = analyzer.analyze(&[0.0; 1024], 0.0);
/// assert_eq!(block.bands.len(), 32);
/// assert!(block.bands.iter().all(|&b| b == 0.0));
/// ```
pub struct SpectralAnalyzer {
    fft: FftPipeline,
    bands: Vec<BandRange>,
}

impl SpectralAnalyzer {
    /// Build an analyzer for `block_size`-sample blocks.
    ///
    /// # Panics
    /// Panics if `block_size` is 0.
    #[must_use]
    pub fn new(
        block_size: usize,
        sample_rate: u32,
        band_count: usize,
        min_freq: f64,
        max_freq: f64,
    ) -> Self {
        let bands = map_bands(
            band_count,
            min_freq,
            max_freq,
            f64::from(sample_rate),
            block_size,
        );
        Self {
            fft: FftPipeline::new(block_size),
            bands,
        }
    }

    /// Build an analyzer from a validated configuration.
    ///
    /// # Panics
    /// Panics if `audio.block_size` is 0.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.audio.block_size,
            config.audio.sample_rate,
            config.bands.count,
            config.bands.min_freq,
            config.bands.max_freq,
        )
    }

    /// Band ranges in use, one per output band.
    #[must_use]
    pub fn band_ranges(&self) -> &[BandRange] {
        &self.bands
    }

    /// Analyse one block of mono samples captured at `timestamp`.
    pub fn analyze(&mut self, samples: &[f32], timestamp: f64) -> AnalyzedBlock {
        self.analyze_into(samples, timestamp, Vec::with_capacity(self.bands.len()))
    }

    /// Like `analyze`, writing the bands into a recycled buffer.
    ///
    /// `bands` is cleared first; no allocation happens once its capacity
    /// covers the band count.
    pub fn analyze_into(
        &mut self,
        samples: &[f32],
        timestamp: f64,
        mut bands: Vec<f32>,
    ) -> AnalyzedBlock {
        let spectrum = self.fft.process(samples);

        bands.clear();
        bands.extend(self.bands.iter().map(|range| {
            let bins = spectrum.get(range.as_range()).unwrap_or(&[]);
            if bins.is_empty() {
                0.0
            } else {
                bins.iter().sum::<f32>() / bins.len() as f32
            }
        }));
        normalize_to_peak(&mut bands);

        AnalyzedBlock {
            timestamp,
            bands,
            onset: rms(samples),
        }
    }
}

/// Divide every value by the largest one. All-zero input stays all-zero.
fn normalize_to_peak(values: &mut [f32]) {
    let peak = values.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 {
        for v in values.iter_mut() {
            *v /= peak;
        }
    }
}

/// Root-mean-square of the raw (unwindowed) block.
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
