mod json;
mod plain;

use std::sync::Arc;

use tailtopic_api::Decoder;

pub use json::JsonDecoder;
pub use plain::PlainDecoder;

/// Resolve a decoder by name.
pub fn create_decoder(name: &str) -> Result<Arc<dyn Decoder>, String> {
    match name {
        "plain" => Ok(Arc::new(PlainDecoder)),
        "json" => Ok(Arc::new(JsonDecoder)),
        other => Err(format!(
            "unknown decoder '{other}' (expected 'plain' or 'json')"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_decoders() {
        assert!(create_decoder("plain").is_ok());
        assert!(create_decoder("json").is_ok());
    }

    #[test]
    fn rejects_unknown_decoder() {
        assert!(create_decoder("avro").is_err());
    }
}
