use tailtopic_api::{DecodeError, Decoder};

/// Decodes payloads as UTF-8 text.
pub struct PlainDecoder;

impl Decoder for PlainDecoder {
    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, DecodeError> {
        let s = std::str::from_utf8(payload)?;
        Ok(serde_json::Value::String(s.to_string()))
    }

    /// Empty string, so degraded slots stay printable.
    fn fallback(&self) -> serde_json::Value {
        serde_json::Value::String(String::new())
    }
}
