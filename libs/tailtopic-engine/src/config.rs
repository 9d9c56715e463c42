use tailtopic_api::OffsetPolicy;

/// Immutable settings for one consume invocation.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Topic to tail.
    pub topic: String,
    /// Broker bootstrap address, `host:port`.
    pub broker: String,
    /// Starting read position for every partition stream.
    pub offset: OffsetPolicy,
}
