use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tailtopic_api::{
    BrokerConnector, Decoder, Message, PartitionId, PartitionStop, PartitionStream,
};

use crate::config::ConsumerConfig;
use crate::error::ConsumeError;

/// Multi-partition topic consumer.
///
/// Discovers the partitions of one topic, pumps each through the decoder in
/// its own task, and fans everything into a single outbound channel.
/// Per-partition order is preserved; cross-partition interleaving is not.
pub struct TopicConsumer {
    config: ConsumerConfig,
    connector: Arc<dyn BrokerConnector>,
    decoder: Arc<dyn Decoder>,
}

impl std::fmt::Debug for TopicConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicConsumer")
            .field("config", &self.config)
            .finish()
    }
}

impl TopicConsumer {
    pub fn new(
        config: ConsumerConfig,
        connector: Arc<dyn BrokerConnector>,
        decoder: Arc<dyn Decoder>,
    ) -> Self {
        Self {
            config,
            connector,
            decoder,
        }
    }

    /// Consume the configured topic until every partition stream ends.
    ///
    /// Messages are delivered on `outbound`, which closes once the last
    /// partition worker has finished. Cancelling `closing` asks every
    /// partition stream to stop; a worker may still forward already-buffered
    /// messages before its stream actually ends.
    ///
    /// Only connection and discovery failures are fatal. A partition that
    /// fails to open is skipped; the others keep delivering.
    pub async fn consume(
        &self,
        outbound: mpsc::Sender<Message>,
        closing: CancellationToken,
    ) -> Result<(), ConsumeError> {
        let client = self
            .connector
            .connect(&self.config.broker)
            .await
            .map_err(ConsumeError::Connection)?;

        let partitions = match client.partitions(&self.config.topic).await {
            Ok(partitions) => partitions,
            Err(e) => {
                // Release the probe connection before bailing out.
                if let Err(close_err) = client.close().await {
                    tracing::warn!(error = %close_err, "failed to close broker client");
                }
                return Err(ConsumeError::Discovery(e));
            }
        };
        tracing::info!(
            topic = %self.config.topic,
            partitions = partitions.len(),
            offset = %self.config.offset,
            "discovered partitions"
        );

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut listeners: Vec<JoinHandle<()>> = Vec::new();
        for partition in partitions {
            let stream = match client
                .open(&self.config.topic, partition, self.config.offset)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    // One bad partition must not block the others.
                    tracing::error!(partition, error = %e, "failed to open partition stream");
                    continue;
                }
            };

            listeners.push(spawn_shutdown_listener(
                closing.clone(),
                stream.stop_handle(),
            ));
            workers.push(spawn_partition_worker(
                partition,
                stream,
                self.decoder.clone(),
                outbound.clone(),
            ));
        }

        // Counted join: block until every started worker has finished.
        for worker in workers {
            let _ = worker.await;
        }

        // Close the aggregated stream. Workers dropped their sender clones
        // when they finished; this is the last one.
        drop(outbound);

        // Listeners still pending on a signal that never fired have nothing
        // left to stop.
        for listener in listeners {
            listener.abort();
        }

        if let Err(e) = client.close().await {
            tracing::warn!(error = %e, "failed to close broker client");
        }

        Ok(())
    }
}

/// Pump one partition stream to completion.
///
/// A payload that fails to decode is reported and forwarded as the decoder's
/// fallback value — it degrades the slot, it does not drop it.
fn spawn_partition_worker(
    partition: PartitionId,
    mut stream: Box<dyn PartitionStream>,
    decoder: Arc<dyn Decoder>,
    outbound: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = stream.next_raw().await {
            let value = match decoder.decode(&raw.payload) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        partition,
                        payload = %String::from_utf8_lossy(&raw.payload),
                        error = %e,
                        "failed to decode message"
                    );
                    decoder.fallback()
                }
            };
            // Receiver gone — nobody is draining, stop pumping.
            if outbound.send(Message::new(value)).await.is_err() {
                break;
            }
        }
        tracing::debug!(partition, "partition worker finished");
    })
}

/// Wait for the closing signal, then ask one partition stream to stop.
/// Best-effort: issues the request and ends without waiting for the stream.
fn spawn_shutdown_listener(
    closing: CancellationToken,
    stop: Box<dyn PartitionStop>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        closing.cancelled().await;
        stop.request_stop();
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use tailtopic_codec::JsonDecoder;

    use tailtopic_api::{BrokerClient, BrokerError, OffsetPolicy, RawMessage};

    use super::*;

    struct TokenStop(CancellationToken);

    impl PartitionStop for TokenStop {
        fn request_stop(&self) {
            self.0.cancel();
        }
    }

    /// Replays a fixed list of payloads. With `endless`, it then behaves
    /// like a live partition with no traffic: blocks until stopped.
    struct ScriptedStream {
        items: std::vec::IntoIter<Vec<u8>>,
        endless: bool,
        stop: CancellationToken,
    }

    impl PartitionStream for ScriptedStream {
        fn next_raw(&mut self) -> Pin<Box<dyn Future<Output = Option<RawMessage>> + Send + '_>> {
            Box::pin(async move {
                if let Some(payload) = self.items.next() {
                    return Some(RawMessage::new(payload));
                }
                if self.endless {
                    self.stop.cancelled().await;
                }
                None
            })
        }

        fn stop_handle(&self) -> Box<dyn PartitionStop> {
            Box::new(TokenStop(self.stop.clone()))
        }
    }

    #[derive(Default)]
    struct ScriptedBroker {
        partitions: Vec<PartitionId>,
        payloads: HashMap<PartitionId, Vec<Vec<u8>>>,
        fail_discovery: bool,
        fail_open: Vec<PartitionId>,
        fail_close: bool,
        endless: Vec<PartitionId>,
    }

    impl ScriptedBroker {
        fn with_payloads(payloads: Vec<(PartitionId, Vec<Vec<u8>>)>) -> Self {
            Self {
                partitions: payloads.iter().map(|(p, _)| *p).collect(),
                payloads: payloads.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl BrokerClient for ScriptedBroker {
        fn partitions(
            &self,
            _topic: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<PartitionId>, BrokerError>> + Send + '_>>
        {
            let result = if self.fail_discovery {
                Err(BrokerError::new("unknown topic"))
            } else {
                Ok(self.partitions.clone())
            };
            Box::pin(async move { result })
        }

        fn open(
            &self,
            _topic: &str,
            partition: PartitionId,
            _offset: OffsetPolicy,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PartitionStream>, BrokerError>> + Send + '_>>
        {
            let result = if self.fail_open.contains(&partition) {
                Err(BrokerError::new("not leader for partition"))
            } else {
                let items = self.payloads.get(&partition).cloned().unwrap_or_default();
                Ok(Box::new(ScriptedStream {
                    items: items.into_iter(),
                    endless: self.endless.contains(&partition),
                    stop: CancellationToken::new(),
                }) as Box<dyn PartitionStream>)
            };
            Box::pin(async move { result })
        }

        fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BrokerError>> + Send + '_>> {
            let fail = self.fail_close;
            Box::pin(async move {
                if fail {
                    Err(BrokerError::new("broker went away"))
                } else {
                    Ok(())
                }
            })
        }
    }

    /// Hands out its scripted broker on the first connect.
    struct ScriptedConnector {
        client: Mutex<Option<ScriptedBroker>>,
        refuse: bool,
    }

    impl ScriptedConnector {
        fn new(client: ScriptedBroker) -> Self {
            Self {
                client: Mutex::new(Some(client)),
                refuse: false,
            }
        }

        fn refusing() -> Self {
            Self {
                client: Mutex::new(None),
                refuse: true,
            }
        }
    }

    impl BrokerConnector for ScriptedConnector {
        fn connect(
            &self,
            _broker: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn BrokerClient>, BrokerError>> + Send + '_>>
        {
            let result = if self.refuse {
                Err(BrokerError::new("connection refused"))
            } else {
                let client = self
                    .client
                    .lock()
                    .unwrap()
                    .take()
                    .expect("connect called once");
                Ok(Box::new(client) as Box<dyn BrokerClient>)
            };
            Box::pin(async move { result })
        }
    }

    fn consumer(connector: ScriptedConnector) -> TopicConsumer {
        TopicConsumer::new(
            ConsumerConfig {
                topic: "quotes".into(),
                broker: "localhost:9092".into(),
                offset: OffsetPolicy::Earliest,
            },
            Arc::new(connector),
            Arc::new(JsonDecoder),
        )
    }

    fn payload(partition: PartitionId, seq: usize) -> Vec<u8> {
        json!({ "partition": partition, "seq": seq }).to_string().into_bytes()
    }

    async fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
        let mut out = Vec::new();
        while let Some(message) = rx.recv().await {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn delivers_every_message_from_every_partition_in_order() {
        let broker = ScriptedBroker::with_payloads(vec![
            (0, (0..2).map(|i| payload(0, i)).collect()),
            (1, (0..3).map(|i| payload(1, i)).collect()),
            (2, (0..4).map(|i| payload(2, i)).collect()),
        ]);
        let consumer = consumer(ScriptedConnector::new(broker));

        let (tx, mut rx) = mpsc::channel(4);
        let closing = CancellationToken::new();
        let handle = tokio::spawn(async move { consumer.consume(tx, closing).await });

        let messages = drain(&mut rx).await;
        assert_eq!(messages.len(), 9);
        handle.await.unwrap().unwrap();

        // Per-partition order survives the fan-in.
        for partition in 0..3i64 {
            let seqs: Vec<i64> = messages
                .iter()
                .filter(|m| m.value["partition"] == json!(partition))
                .map(|m| m.value["seq"].as_i64().unwrap())
                .collect();
            let mut sorted = seqs.clone();
            sorted.sort_unstable();
            assert_eq!(seqs, sorted, "partition {partition} out of order");
        }
    }

    #[tokio::test]
    async fn open_failure_skips_only_that_partition() {
        let mut broker = ScriptedBroker::with_payloads(vec![
            (0, (0..3).map(|i| payload(0, i)).collect()),
            (1, (0..3).map(|i| payload(1, i)).collect()),
            (2, (0..3).map(|i| payload(2, i)).collect()),
        ]);
        broker.fail_open = vec![1];
        let consumer = consumer(ScriptedConnector::new(broker));

        let (tx, mut rx) = mpsc::channel(4);
        let handle =
            tokio::spawn(async move { consumer.consume(tx, CancellationToken::new()).await });

        let messages = drain(&mut rx).await;
        assert_eq!(messages.len(), 6);
        assert!(
            messages.iter().all(|m| m.value["partition"] != json!(1)),
            "skipped partition must not deliver"
        );
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn decode_failure_degrades_the_message_instead_of_dropping_it() {
        let broker = ScriptedBroker::with_payloads(vec![(
            0,
            vec![
                payload(0, 0),
                b"{definitely not json".to_vec(),
                payload(0, 2),
            ],
        )]);
        let consumer = consumer(ScriptedConnector::new(broker));

        let (tx, mut rx) = mpsc::channel(4);
        let handle =
            tokio::spawn(async move { consumer.consume(tx, CancellationToken::new()).await });

        let messages = drain(&mut rx).await;
        assert_eq!(messages.len(), 3, "bad payload still occupies its slot");
        assert_eq!(messages[1].value, serde_json::Value::Null);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn discovery_failure_is_fatal_and_still_closes_outbound() {
        let mut broker = ScriptedBroker::with_payloads(vec![(0, vec![payload(0, 0)])]);
        broker.fail_discovery = true;
        let consumer = consumer(ScriptedConnector::new(broker));

        let (tx, mut rx) = mpsc::channel(4);
        let result = consumer.consume(tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(ConsumeError::Discovery(_))));
        assert!(rx.recv().await.is_none(), "no message may ever be written");
    }

    #[tokio::test]
    async fn connection_failure_is_fatal() {
        let consumer = consumer(ScriptedConnector::refusing());

        let (tx, mut rx) = mpsc::channel(4);
        let result = consumer.consume(tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(ConsumeError::Connection(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closing_signal_stops_live_partitions() {
        let mut broker = ScriptedBroker::with_payloads(vec![
            (0, (0..2).map(|i| payload(0, i)).collect()),
            (1, (0..2).map(|i| payload(1, i)).collect()),
        ]);
        broker.endless = vec![0, 1];
        let consumer = consumer(ScriptedConnector::new(broker));

        let (tx, mut rx) = mpsc::channel(4);
        let closing = CancellationToken::new();
        let signal = closing.clone();
        let handle = tokio::spawn(async move { consumer.consume(tx, closing).await });

        for _ in 0..4 {
            rx.recv().await.expect("buffered message");
        }
        signal.cancel();

        let remaining = tokio::time::timeout(Duration::from_secs(5), drain(&mut rx))
            .await
            .expect("outbound must close after the closing signal");
        assert!(remaining.is_empty());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_failure_does_not_change_the_result() {
        let mut broker = ScriptedBroker::with_payloads(vec![(0, vec![payload(0, 0)])]);
        broker.fail_close = true;
        let consumer = consumer(ScriptedConnector::new(broker));

        let (tx, mut rx) = mpsc::channel(4);
        let handle =
            tokio::spawn(async move { consumer.consume(tx, CancellationToken::new()).await });

        assert_eq!(drain(&mut rx).await.len(), 1);
        handle.await.unwrap().unwrap();
    }
}
