// Audio capture, spectral banding, and tempo tracking for pulsebridge.

pub mod analyzer;
pub mod assembler;
pub mod bands;
pub mod capture;
pub mod error;
pub mod fft;
pub mod stream;
pub mod tempo;

pub use analyzer::SpectralAnalyzer;
pub use bands::{BandRange, map_bands};
pub use error::AudioError;
pub use stream::{BlockProducer, PacketPump, pipeline};
pub use tempo::TempoTracker;
