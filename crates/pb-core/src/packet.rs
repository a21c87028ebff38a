use serde::Serialize;

/// Status reported by the capture boundary alongside a block.
///
/// Non-fatal: a flagged block is still analysed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStatus {
    /// The device stream reported an error since the previous block.
    pub stream_fault: bool,
}

impl CaptureStatus {
    /// No condition reported.
    pub const OK: Self = Self {
        stream_fault: false,
    };

    /// `true` if any flag is raised.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.stream_fault
    }
}

/// One analysed block, moved from the audio callback to the consumer.
///
/// Never mutated after it is enqueued.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzedBlock {
    /// Capture timestamp of the block's first frame, in seconds.
    pub timestamp: f64,
    /// Normalized band energies (max = 1.0, or all zero on silence).
    pub bands: Vec<f32>,
    /// RMS of the raw block, fed to the tempo tracker.
    pub onset: f32,
}

/// Record handed to the transport, one per analysed block.
///
/// Serializes as `{"t": .., "bpm": .. | null, "bands": [..]}`.
///
/// # Example
/// ```
/// use pb_core::packet::ResultPacket;
/// let packet = ResultPacket { t: 1.5, bpm: None, bands: vec![0.0; 32] };
/// assert_eq!(packet.bands.len(), 32);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultPacket {
    /// Capture timestamp, in seconds.
    pub t: f64,
    /// Latest tempo estimate, if any.
    pub bpm: Option<f64>,
    /// Normalized band energies in [0, 1].
    pub bands: Vec<f32>,
}

impl ResultPacket {
    /// Pair an analysed block with the current tempo estimate.
    #[must_use]
    pub fn from_block(block: AnalyzedBlock, bpm: Option<f64>) -> Self {
        Self {
            t: block.timestamp,
            bpm,
            bands: block.bands,
        }
    }
}
