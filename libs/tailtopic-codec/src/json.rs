use tailtopic_api::{DecodeError, Decoder};

/// Decodes payloads as JSON documents.
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, DecodeError> {
        let s = std::str::from_utf8(payload)?;
        let value: serde_json::Value = serde_json::from_str(s)?;
        Ok(value)
    }
}
