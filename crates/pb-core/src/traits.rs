use crate::packet::ResultPacket;

/// Destination for assembled result packets.
///
/// Implemented by the UDP transports in `pb-net`. A failed send is reported
/// to the caller and never retried: the next packet is attempted on its own.
///
/// # Example
/// ```
/// use pb_core::traits::PacketSink;
/// use pb_core::packet::ResultPacket;
///
/// struct Collect(Vec<ResultPacket>);
/// impl PacketSink for Collect {
///     type Error = std::convert::Infallible;
///     fn send(&mut self, packet: &ResultPacket) -> Result<(), Self::Error> {
///         self.0.push(packet.clone());
///         Ok(())
///     }
/// }
/// ```
pub trait PacketSink {
    /// Error produced by a failed send.
    type Error: std::fmt::Display;

    /// Emit one packet.
    ///
    /// # Errors
    /// Returns the transport's error; the pipeline logs it and continues.
    fn send(&mut self, packet: &ResultPacket) -> Result<(), Self::Error>;
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    type Error = S::Error;

    fn send(&mut self, packet: &ResultPacket) -> Result<(), Self::Error> {
        (**self).send(packet)
    }
}
