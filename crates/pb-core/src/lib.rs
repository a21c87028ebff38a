/// Configuration, packet types, and shared seams for pulsebridge.
///
/// This crate holds everything the audio pipeline and the transport need to
/// agree on, without depending on either of them.

pub mod config;
pub mod error;
pub mod packet;
pub mod traits;

pub use config::PipelineConfig;
pub use error::CoreError;
pub use packet::{AnalyzedBlock, CaptureStatus, ResultPacket};
pub use traits::PacketSink;
