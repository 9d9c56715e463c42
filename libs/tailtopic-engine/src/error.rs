use tailtopic_api::BrokerError;

/// Fatal consume failures. Everything else (open, decode, close failures)
/// is reported through tracing and never reaches the caller's result.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("broker connection: {0}")]
    Connection(BrokerError),

    #[error("partition discovery: {0}")]
    Discovery(BrokerError),
}
