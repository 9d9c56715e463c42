use std::future::Future;
use std::pin::Pin;

use crate::error::BrokerError;
use crate::message::RawMessage;
use crate::offset::OffsetPolicy;

/// Partition identifier within a topic.
pub type PartitionId = i32;

/// Opens broker clients. Injected into the orchestrator at construction;
/// invoked once per consume invocation with the configured broker address.
pub trait BrokerConnector: Send + Sync {
    fn connect(
        &self,
        broker: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerClient>, BrokerError>> + Send + '_>>;
}

/// One connected broker client: partition discovery, per-partition streams,
/// teardown.
pub trait BrokerClient: Send + Sync {
    /// List the partitions of `topic`, in broker order.
    fn partitions(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, BrokerError>> + Send + '_>>;

    /// Open a message stream over one partition, starting at `offset`.
    fn open(
        &self,
        topic: &str,
        partition: PartitionId,
        offset: OffsetPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, BrokerError>> + Send + '_>>;

    /// Release the client. Failures are non-fatal to the consume operation.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>>;
}

/// Lazy sequence of raw messages from one partition.
pub trait PartitionStream: Send {
    /// Next raw message; `None` when the stream has ended (naturally, by
    /// broker-side termination, or after a stop request drained).
    fn next_raw(&mut self) -> Pin<Box<dyn Future<Output = Option<RawMessage>> + Send + '_>>;

    /// Split off the stop control so a shutdown listener can hold it while
    /// the worker owns the stream.
    fn stop_handle(&self) -> Box<dyn PartitionStop>;
}

/// Asynchronous, best-effort stop request for one partition stream.
/// Does not wait for the stream to actually stop.
pub trait PartitionStop: Send + Sync {
    fn request_stop(&self);
}
