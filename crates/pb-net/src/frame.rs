use pb_core::packet::ResultPacket;

use crate::error::NetError;

/// First start byte of a bridge frame.
pub const FRAME_START_1: u8 = 0xAA;
/// Second start byte of a bridge frame.
pub const FRAME_START_2: u8 = 0x55;
/// Start bytes, frame id and BPM field.
const HEADER_LEN: usize = 6;

/// Compact frame understood by the LED bridge.
///
/// Layout, little-endian:
///
/// | offset | size | field                                   |
/// |--------|------|-----------------------------------------|
/// | 0      | 2    | `0xAA 0x55`                             |
/// | 2      | 2    | frame id (wrapping counter)             |
/// | 4      | 2    | BPM × 10, rounded, 0 if unknown         |
/// | 6      | N    | bands, `round(clamp(v, 0, 1) · 255)`    |
/// | 6+N    | 1    | checksum: sum of bytes 2..6+N, mod 256  |
///
/// # Example
/// ```
/// use pb_core::packet::ResultPacket;
/// use pb_net::frame::BridgeFrame;
///
/// let packet = ResultPacket { t: 0.0, bpm: Some(128.3), bands: vec![1.0, 0.0] };
/// let frame = BridgeFrame::from_packet(7, &packet);
/// assert_eq!(frame.bpm_times10, 1283);
/// assert_eq!(frame.bands, vec![255, 0]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeFrame {
    /// Wrapping frame counter.
    pub frame_id: u16,
    /// Tempo in tenths of a BPM, 0 when unknown.
    pub bpm_times10: u16,
    /// Band magnitudes scaled to a byte.
    pub bands: Vec<u8>,
}

impl BridgeFrame {
    /// Quantize a packet into a frame.
    #[must_use]
    pub fn from_packet(frame_id: u16, packet: &ResultPacket) -> Self {
        Self {
            frame_id,
            bpm_times10: quantize_bpm(packet.bpm),
            bands: packet.bands.iter().map(|&v| quantize_band(v)).collect(),
        }
    }

    /// Tempo carried by the frame, `None` when the BPM field is 0.
    #[must_use]
    pub fn bpm(&self) -> Option<f64> {
        (self.bpm_times10 > 0).then(|| f64::from(self.bpm_times10) / 10.0)
    }

    /// Encoded length for `band_count` bands.
    #[must_use]
    pub fn encoded_len(band_count: usize) -> usize {
        HEADER_LEN + band_count + 1
    }

    /// Append the wire bytes to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.reserve(Self::encoded_len(self.bands.len()));
        out.extend_from_slice(&[FRAME_START_1, FRAME_START_2]);
        out.extend_from_slice(&self.frame_id.to_le_bytes());
        out.extend_from_slice(&self.bpm_times10.to_le_bytes());
        out.extend_from_slice(&self.bands);
        let checksum = checksum(&out[start + 2..]);
        out.push(checksum);
    }

    /// Parse a frame carrying `band_count` bands.
    ///
    /// # Errors
    /// Returns `NetError::Frame` on a wrong length, missing start bytes or
    /// checksum mismatch.
    pub fn decode(bytes: &[u8], band_count: usize) -> Result<Self, NetError> {
        let expected = Self::encoded_len(band_count);
        if bytes.len() != expected {
            return Err(NetError::Frame(format!(
                "expected {expected} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != FRAME_START_1 || bytes[1] != FRAME_START_2 {
            return Err(NetError::Frame(format!(
                "bad start bytes {:#04x} {:#04x}",
                bytes[0], bytes[1]
            )));
        }

        let body = &bytes[2..expected - 1];
        let sent = bytes[expected - 1];
        let computed = checksum(body);
        if sent != computed {
            return Err(NetError::Frame(format!(
                "checksum {sent:#04x}, computed {computed:#04x}"
            )));
        }

        Ok(Self {
            frame_id: u16::from_le_bytes([bytes[2], bytes[3]]),
            bpm_times10: u16::from_le_bytes([bytes[4], bytes[5]]),
            bands: bytes[HEADER_LEN..expected - 1].to_vec(),
        })
    }
}

/// Tenths of a BPM, saturating at `u16::MAX`; 0 for unknown or non-positive.
fn quantize_bpm(bpm: Option<f64>) -> u16 {
    match bpm {
        Some(v) if v > 0.0 => (v * 10.0).min(f64::from(u16::MAX)).round() as u16,
        _ => 0,
    }
}

fn quantize_band(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(bpm: Option<f64>, bands: Vec<f32>) -> ResultPacket {
        ResultPacket { t: 0.0, bpm, bands }
    }

    #[test]
    fn layout_matches_bridge() {
        let frame = BridgeFrame::from_packet(0x0102, &packet(Some(120.0), vec![1.0, 0.5, 0.0]));
        let mut out = Vec::new();
        frame.encode(&mut out);

        assert_eq!(out.len(), BridgeFrame::encoded_len(3));
        assert_eq!(&out[..2], &[0xAA, 0x55]);
        assert_eq!(&out[2..4], &[0x02, 0x01]);
        // 1200 = 0x04B0
        assert_eq!(&out[4..6], &[0xB0, 0x04]);
        assert_eq!(&out[6..9], &[255, 128, 0]);
        let sum: u32 = out[2..9].iter().map(|&b| u32::from(b)).sum();
        assert_eq!(out[9], (sum % 256) as u8);
    }

    #[test]
    fn decode_recovers_encoded_frame() {
        let frame = BridgeFrame::from_packet(65_535, &packet(Some(97.46), vec![0.2; 32]));
        let mut out = Vec::new();
        frame.encode(&mut out);
        let decoded = BridgeFrame::decode(&out, 32).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.bpm(), Some(97.5));
    }

    #[test]
    fn quantization_edges() {
        assert_eq!(quantize_bpm(None), 0);
        assert_eq!(quantize_bpm(Some(-5.0)), 0);
        assert_eq!(quantize_bpm(Some(f64::NAN)), 0);
        assert_eq!(quantize_bpm(Some(1e9)), u16::MAX);
        assert_eq!(quantize_bpm(Some(128.34)), 1283);

        assert_eq!(quantize_band(-0.5), 0);
        assert_eq!(quantize_band(2.0), 255);
        assert_eq!(quantize_band(f32::NAN), 0);
    }

    #[test]
    fn unknown_bpm_decodes_to_none() {
        let frame = BridgeFrame::from_packet(1, &packet(None, vec![0.0; 4]));
        assert_eq!(frame.bpm(), None);
    }

    #[test]
    fn corrupted_frames_are_rejected() {
        let frame = BridgeFrame::from_packet(9, &packet(Some(140.0), vec![0.7; 8]));
        let mut out = Vec::new();
        frame.encode(&mut out);

        assert!(BridgeFrame::decode(&out, 7).is_err());
        assert!(BridgeFrame::decode(&out[..out.len() - 1], 8).is_err());

        let mut bad_start = out.clone();
        bad_start[0] = 0x00;
        assert!(BridgeFrame::decode(&bad_start, 8).is_err());

        let mut bad_sum = out.clone();
        bad_sum[7] ^= 0x01;
        assert!(BridgeFrame::decode(&bad_sum, 8).is_err());
    }
}
