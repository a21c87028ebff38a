use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// FFT pipeline: Hann-windowed real FFT using realfft.
///
/// Pre-allocates the FFT plan, scratch and magnitude buffers so that
/// `process` never allocates.
///
/// # Example
/// ```
/// use pb_audio::fft::FftPipeline;
/// let fft = FftPipeline::new(1024);
/// assert_eq!(fft.spectrum_len(), 513);
/// ```
pub struct FftPipeline {
    fft_size: usize,
    input_buf: Vec<f32>,
    spectrum_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    /// Hann window coefficients (symmetric).
    window: Vec<f32>,
}

impl FftPipeline {
    /// Create a new FFT pipeline with the given window size.
    ///
    /// # Panics
    /// Panics if `size` is 0.
    #[must_use]
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "FFT size must be > 0");

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);

        let input_buf = plan.make_input_vec();
        let spectrum_buf = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let magnitudes = vec![0.0; spectrum_buf.len()];

        Self {
            fft_size: size,
            input_buf,
            spectrum_buf,
            scratch,
            magnitudes,
            plan,
            window: hann_window(size),
        }
    }

    /// Window `samples` and return the one-sided magnitude spectrum
    /// (N/2+1 bins).
    ///
    /// Short input is zero-padded, long input truncated to the FFT size.
    ///
    /// # Example
    /// ```
    /// use pb_audio::fft::FftPipeline;
    /// let mut fft = FftPipeline::new(256);
    /// let samples = vec![0.0f32; 256];
    /// let spectrum = fft.process(&samples);
    /// assert_eq!(spectrum.len(), 129); // N/2 + 1
    /// ```
    pub fn process(&mut self, samples: &[f32]) -> &[f32] {
        let n = self.fft_size.min(samples.len());

        for (i, slot) in self.input_buf.iter_mut().enumerate() {
            *slot = if i < n {
                samples[i] * self.window[i]
            } else {
                0.0
            };
        }

        if self
            .plan
            .process_with_scratch(
                &mut self.input_buf,
                &mut self.spectrum_buf,
                &mut self.scratch,
            )
            .is_err()
        {
            self.magnitudes.fill(0.0);
            return &self.magnitudes;
        }

        for (mag, c) in self.magnitudes.iter_mut().zip(self.spectrum_buf.iter()) {
            *mag = c.norm();
        }
        &self.magnitudes
    }

    /// FFT window size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced by `process`.
    #[must_use]
    pub fn spectrum_len(&self) -> usize {
        self.magnitudes.len()
    }
}

/// Symmetric Hann window, zero at both ends.
fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size as f32 - 1.0)).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_is_symmetric_and_peaks_in_the_middle() {
        let w = hann_window(9);
        assert!(w[0].abs() < 1e-6);
        assert!(w[8].abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[2] - w[6]).abs() < 1e-6);
    }

    #[test]
    fn silence_has_flat_zero_spectrum() {
        let mut fft = FftPipeline::new(512);
        let spectrum = fft.process(&[0.0; 512]);
        assert_eq!(spectrum.len(), 257);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn bin_centred_sine_peaks_at_its_bin() {
        let n = 1024;
        let mut fft = FftPipeline::new(n);
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 64.0 * i as f32 / n as f32).sin())
            .collect();
        let spectrum = fft.process(&samples);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(64));
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut fft = FftPipeline::new(64);
        let spectrum = fft.process(&[1.0; 10]);
        assert_eq!(spectrum.len(), 33);
        assert!(spectrum[0] > 0.0);
    }
}
