use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use pb_core::config::{TransportConfig, WireFormat};
use pb_core::packet::ResultPacket;
use pb_core::traits::PacketSink;

use crate::error::NetError;
use crate::frame::BridgeFrame;
use crate::json::encode_json;

/// Fire-and-forget UDP transport toward the bridge.
///
/// One datagram per packet. The encode buffer is reused across sends.
pub struct UdpSink {
    socket: UdpSocket,
    destination: SocketAddr,
    wire: WireFormat,
    frame_id: u16,
    buf: Vec<u8>,
}

impl UdpSink {
    /// Bind an ephemeral local port and resolve `destination`.
    ///
    /// # Errors
    /// Returns `NetError::Resolve` if the destination has no address, or
    /// `NetError::Io` if the socket cannot be bound.
    pub fn connect(destination: &str, wire: WireFormat) -> Result<Self, NetError> {
        let addr = destination
            .to_socket_addrs()
            .map_err(|e| NetError::Resolve(format!("{destination}: {e}")))?
            .next()
            .ok_or_else(|| NetError::Resolve(destination.to_string()))?;

        let bind: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)?;
        log::info!("Sending {wire:?} packets to {addr}");

        Ok(Self {
            socket,
            destination: addr,
            wire,
            frame_id: 0,
            buf: Vec::with_capacity(1024),
        })
    }

    /// Build a sink from the `[transport]` section.
    ///
    /// # Errors
    /// See [`UdpSink::connect`].
    pub fn from_config(config: &TransportConfig) -> Result<Self, NetError> {
        Self::connect(&config.destination, config.wire)
    }

    /// Resolved destination address.
    #[must_use]
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Local address the socket is bound to.
    ///
    /// # Errors
    /// Returns the OS error if the address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSink for UdpSink {
    type Error = NetError;

    fn send(&mut self, packet: &ResultPacket) -> Result<(), NetError> {
        self.buf.clear();
        match self.wire {
            WireFormat::Json => encode_json(packet, &mut self.buf)?,
            WireFormat::Frame => {
                BridgeFrame::from_packet(self.frame_id, packet).encode(&mut self.buf);
                self.frame_id = self.frame_id.wrapping_add(1);
            }
        }
        self.socket.send_to(&self.buf, self.destination)?;
        Ok(())
    }
}
