// Packet encodings and the UDP transport toward the LED bridge.

pub mod error;
pub mod frame;
pub mod json;
pub mod udp;

pub use error::NetError;
pub use frame::BridgeFrame;
pub use udp::UdpSink;
