use crate::error::DecodeError;

/// Turns a raw payload into an application value.
///
/// Implementations must be stateless: many partition workers invoke the same
/// decoder concurrently.
pub trait Decoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<serde_json::Value, DecodeError>;

    /// Value forwarded in place of a payload that failed to decode.
    fn fallback(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
