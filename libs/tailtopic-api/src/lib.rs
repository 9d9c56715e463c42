pub mod broker;
pub mod decoder;
pub mod error;
pub mod message;
pub mod offset;

pub use broker::{BrokerClient, BrokerConnector, PartitionId, PartitionStop, PartitionStream};
pub use decoder::Decoder;
pub use error::{BrokerError, DecodeError};
pub use message::{Message, RawMessage};
pub use offset::OffsetPolicy;
