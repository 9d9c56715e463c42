//! Kafka binding for the broker capability, built on rdkafka.
//!
//! Partition discovery goes through a blocking metadata probe; each opened
//! partition gets its own `StreamConsumer` with an explicit single-partition
//! assignment, so streams never rebalance against each other.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::{Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;

use tailtopic_api::{
    BrokerClient, BrokerConnector, BrokerError, OffsetPolicy, PartitionId, PartitionStop,
    PartitionStream, RawMessage,
};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

fn starting_offset(policy: OffsetPolicy) -> Offset {
    match policy {
        OffsetPolicy::Earliest => Offset::Beginning,
        OffsetPolicy::Latest => Offset::End,
    }
}

/// Opens `KafkaClient`s against a bootstrap broker.
pub struct KafkaConnector;

impl BrokerConnector for KafkaConnector {
    fn connect(
        &self,
        broker: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerClient>, BrokerError>> + Send + '_>>
    {
        let broker = broker.to_string();
        Box::pin(async move {
            let mut cfg = ClientConfig::new();
            cfg.set("bootstrap.servers", broker.as_str());
            // No consumer group semantics: assignments are explicit and
            // offsets are never committed (tailing has no replay contract).
            cfg.set("group.id", format!("tailtopic-{}", std::process::id()));
            cfg.set("enable.auto.commit", "false");
            cfg.set("session.timeout.ms", "6000");

            let probe: BaseConsumer = cfg
                .create()
                .map_err(|e| BrokerError::new(e.to_string()).with_context("create consumer"))?;
            let probe = Arc::new(probe);

            // Reachability check: a cluster metadata fetch fails when the
            // bootstrap broker cannot be reached.
            let check = Arc::clone(&probe);
            tokio::task::spawn_blocking(move || check.fetch_metadata(None, METADATA_TIMEOUT))
                .await
                .map_err(|e| BrokerError::new(e.to_string()))?
                .map_err(|e| {
                    BrokerError::new(e.to_string()).with_context(format!("broker {broker}"))
                })?;

            Ok(Box::new(KafkaClient { cfg, probe }) as Box<dyn BrokerClient>)
        })
    }
}

/// One connected Kafka client: metadata probe plus the client config used to
/// derive per-partition stream consumers.
pub struct KafkaClient {
    cfg: ClientConfig,
    probe: Arc<BaseConsumer>,
}

impl BrokerClient for KafkaClient {
    fn partitions(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, BrokerError>> + Send + '_>> {
        let topic = topic.to_string();
        let probe = Arc::clone(&self.probe);
        Box::pin(async move {
            let fetch_topic = topic.clone();
            let metadata = tokio::task::spawn_blocking(move || {
                probe.fetch_metadata(Some(&fetch_topic), METADATA_TIMEOUT)
            })
            .await
            .map_err(|e| BrokerError::new(e.to_string()))?
            .map_err(|e| BrokerError::new(e.to_string()).with_context(&topic))?;

            let topic_metadata = metadata
                .topics()
                .first()
                .ok_or_else(|| BrokerError::new(format!("no metadata for topic '{topic}'")))?;
            if let Some(e) = topic_metadata.error() {
                return Err(BrokerError::new(format!("{e:?}")).with_context(&topic));
            }

            let partitions: Vec<PartitionId> =
                topic_metadata.partitions().iter().map(|p| p.id()).collect();
            if partitions.is_empty() {
                return Err(BrokerError::new(format!(
                    "topic '{topic}' has no partitions (unknown topic?)"
                )));
            }
            Ok(partitions)
        })
    }

    fn open(
        &self,
        topic: &str,
        partition: PartitionId,
        offset: OffsetPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, BrokerError>> + Send + '_>>
    {
        let topic = topic.to_string();
        let cfg = self.cfg.clone();
        Box::pin(async move {
            let ctx = format!("{topic}/{partition}");
            let consumer: StreamConsumer = cfg
                .create()
                .map_err(|e| BrokerError::new(e.to_string()).with_context(&ctx))?;

            let mut assignment = TopicPartitionList::new();
            assignment
                .add_partition_offset(&topic, partition, starting_offset(offset))
                .map_err(|e| BrokerError::new(e.to_string()).with_context(&ctx))?;
            consumer
                .assign(&assignment)
                .map_err(|e| BrokerError::new(e.to_string()).with_context(&ctx))?;

            tracing::debug!(topic = %topic, partition, offset = %offset, "opened partition stream");
            Ok(Box::new(KafkaPartitionStream {
                consumer,
                partition,
                stop: CancellationToken::new(),
            }) as Box<dyn PartitionStream>)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
        // rdkafka consumers release their broker connections on drop; there
        // is nothing to flush for a consume-only client.
        Box::pin(async { Ok(()) })
    }
}

/// One partition's message stream: a dedicated `StreamConsumer` plus the
/// stop token shared with its shutdown listener.
struct KafkaPartitionStream {
    consumer: StreamConsumer,
    partition: PartitionId,
    stop: CancellationToken,
}

impl PartitionStream for KafkaPartitionStream {
    fn next_raw(&mut self) -> Pin<Box<dyn Future<Output = Option<RawMessage>> + Send + '_>> {
        Box::pin(async move {
            tokio::select! {
                _ = self.stop.cancelled() => None,
                result = self.consumer.recv() => match result {
                    Ok(message) => Some(RawMessage::new(
                        message.payload().map(|p| p.to_vec()).unwrap_or_default(),
                    )),
                    Err(e) => {
                        tracing::error!(partition = self.partition, error = %e, "partition stream terminated");
                        None
                    }
                },
            }
        })
    }

    fn stop_handle(&self) -> Box<dyn PartitionStop> {
        Box::new(KafkaPartitionStop(self.stop.clone()))
    }
}

struct KafkaPartitionStop(CancellationToken);

impl PartitionStop for KafkaPartitionStop {
    fn request_stop(&self) {
        self.0.cancel();
    }
}
