/// One decoded application value delivered on the aggregated stream.
/// The engine never interprets `value` — its shape is decoder-defined.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub value: serde_json::Value,
}

impl Message {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }
}

/// Raw payload read from one partition, before decoding.
/// Opaque bytes — only the decoder interprets their contents.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}
