use pb_core::packet::ResultPacket;

use crate::error::NetError;

/// Encode a packet as the bridge's JSON record, appending to `out`.
///
/// `bpm` is `null` until a tempo estimate exists.
///
/// # Errors
/// Returns `NetError::Json` if serialization fails.
///
/// # Example
/// ```
/// use pb_core::packet::ResultPacket;
/// use pb_net::json::encode_json;
///
/// let mut out = Vec::new();
/// encode_json(&ResultPacket { t: 1.0, bpm: None, bands: vec![1.0] }, &mut out).unwrap();
/// assert_eq!(out, br#"{"t":1.0,"bpm":null,"bands":[1.0]}"#);
/// ```
pub fn encode_json(packet: &ResultPacket, out: &mut Vec<u8>) -> Result<(), NetError> {
    serde_json::to_writer(out, packet)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(packet: &ResultPacket) -> serde_json::Value {
        let mut out = Vec::new();
        encode_json(packet, &mut out).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn record_has_exactly_three_fields() {
        let value = encode(&ResultPacket {
            t: 12.5,
            bpm: Some(128.0),
            bands: vec![0.25; 32],
        });
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["t"].as_f64(), Some(12.5));
        assert_eq!(obj["bpm"].as_f64(), Some(128.0));
        assert_eq!(obj["bands"].as_array().map(Vec::len), Some(32));
    }

    #[test]
    fn missing_bpm_is_null() {
        let value = encode(&ResultPacket {
            t: 0.0,
            bpm: None,
            bands: vec![0.0; 32],
        });
        assert!(value["bpm"].is_null());
    }

    #[test]
    fn encoding_appends() {
        let mut out = b"x".to_vec();
        encode_json(&ResultPacket { t: 0.0, bpm: None, bands: vec![] }, &mut out).unwrap();
        assert!(out.starts_with(b"x{"));
    }
}
