use pb_core::packet::CaptureStatus;

/// Regroups device callback buffers into fixed-size analysis blocks.
///
/// Devices deliver buffers of whatever length they like; the analysis wants
/// exactly `block_size` mono frames. Channel 0 of each interleaved frame is
/// kept. Each completed block is stamped with the capture time of its first
/// frame. The block buffer is allocated once.
///
/// # Example
/// ```
/// use pb_audio::assembler::BlockAssembler;
/// use pb_core::packet::CaptureStatus;
///
/// let mut assembler = BlockAssembler::new(4, 1, 1000);
/// let mut blocks = Vec::new();
/// assembler.push_interleaved(&[0.1; 10], 0.0, CaptureStatus::OK, |b, t, _| {
///     blocks.push((b.to_vec(), t));
/// });
/// assert_eq!(blocks.len(), 2);
/// ```
pub struct BlockAssembler {
    block: Vec<f32>,
    block_size: usize,
    channels: usize,
    sample_rate: f64,
    /// Capture time of `block[0]`.
    block_start: f64,
    /// Status accumulated since the last emitted block.
    pending_status: CaptureStatus,
}

impl BlockAssembler {
    /// Create an assembler for `block_size`-frame blocks of `channels`
    /// interleaved channels at `sample_rate` Hz.
    #[must_use]
    pub fn new(block_size: usize, channels: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            block: Vec::with_capacity(block_size),
            block_size,
            channels: channels.max(1),
            sample_rate: f64::from(sample_rate.max(1)),
            block_start: 0.0,
            pending_status: CaptureStatus::OK,
        }
    }

    /// Feed one device buffer captured at `capture_time` seconds.
    ///
    /// `on_block(samples, timestamp, status)` is called for every block
    /// completed by this buffer. Trailing frames stay buffered for the next
    /// call; an incomplete trailing frame is ignored.
    pub fn push_interleaved<F>(
        &mut self,
        data: &[f32],
        capture_time: f64,
        status: CaptureStatus,
        mut on_block: F,
    ) where
        F: FnMut(&[f32], f64, CaptureStatus),
    {
        self.pending_status.stream_fault |= status.stream_fault;

        for (i, frame) in data.chunks_exact(self.channels).enumerate() {
            if self.block.is_empty() {
                self.block_start = capture_time + i as f64 / self.sample_rate;
            }
            self.block.push(frame[0]);

            if self.block.len() == self.block_size {
                on_block(&self.block, self.block_start, self.pending_status);
                self.pending_status = CaptureStatus::OK;
                self.block.clear();
            }
        }
    }

    /// Frames waiting for the next block.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.block.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(
        assembler: &mut BlockAssembler,
        data: &[f32],
        t: f64,
        status: CaptureStatus,
    ) -> Vec<(Vec<f32>, f64, CaptureStatus)> {
        let mut out = Vec::new();
        assembler.push_interleaved(data, t, status, |b, ts, s| out.push((b.to_vec(), ts, s)));
        out
    }

    #[test]
    fn blocks_span_callback_buffers() {
        let mut assembler = BlockAssembler::new(4, 1, 4);
        let first = collect(&mut assembler, &[1.0, 2.0, 3.0], 0.0, CaptureStatus::OK);
        assert!(first.is_empty());
        assert_eq!(assembler.buffered(), 3);

        let second = collect(&mut assembler, &[4.0, 5.0, 6.0], 0.75, CaptureStatus::OK);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(second[0].1.abs() < f64::EPSILON);
        assert_eq!(assembler.buffered(), 2);
    }

    #[test]
    fn block_timestamp_offsets_within_buffer() {
        // 10 frames per second, blocks of 2
        let mut assembler = BlockAssembler::new(2, 1, 10);
        let blocks = collect(&mut assembler, &[0.0; 6], 5.0, CaptureStatus::OK);
        let stamps: Vec<f64> = blocks.iter().map(|b| b.1).collect();
        assert_eq!(stamps.len(), 3);
        assert!((stamps[0] - 5.0).abs() < 1e-12);
        assert!((stamps[1] - 5.2).abs() < 1e-12);
        assert!((stamps[2] - 5.4).abs() < 1e-12);
    }

    #[test]
    fn keeps_channel_zero_only() {
        let mut assembler = BlockAssembler::new(3, 2, 44_100);
        let blocks = collect(
            &mut assembler,
            &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0],
            0.0,
            CaptureStatus::OK,
        );
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].0, vec![1.0, 2.0, 3.0]);
        // Dangling half frame is dropped
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn status_carries_to_next_block_then_clears() {
        let mut assembler = BlockAssembler::new(4, 1, 44_100);
        let fault = CaptureStatus { stream_fault: true };
        assert!(collect(&mut assembler, &[0.0; 2], 0.0, fault).is_empty());
        let blocks = collect(&mut assembler, &[0.0; 2], 0.1, CaptureStatus::OK);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].2.is_flagged());

        let blocks = collect(&mut assembler, &[0.0; 4], 0.2, CaptureStatus::OK);
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].2.is_flagged());
    }
}
