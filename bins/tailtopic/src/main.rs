use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tailtopic_api::OffsetPolicy;
use tailtopic_engine::{ConsumerConfig, TopicConsumer};
use tailtopic_kafka::KafkaConnector;

#[derive(Parser)]
#[command(name = "tailtopic", about = "Tail all partitions of a Kafka topic")]
struct Cli {
    /// Topic to tail.
    #[arg(long, env = "TAILTOPIC_TOPIC")]
    topic: String,

    /// Broker bootstrap address.
    #[arg(long, default_value = "localhost:9092", env = "TAILTOPIC_BROKER")]
    broker: String,

    /// Starting read position: 'earliest' or 'latest'.
    #[arg(long, default_value = "latest", env = "TAILTOPIC_OFFSET")]
    offset: String,

    /// Payload decoder: 'plain' or 'json'.
    #[arg(long, default_value = "plain", env = "TAILTOPIC_DECODER")]
    decoder: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let offset: OffsetPolicy = match cli.offset.parse() {
        Ok(offset) => offset,
        Err(e) => {
            tracing::error!(error = %e, "invalid offset policy");
            std::process::exit(2);
        }
    };
    let decoder = match tailtopic_codec::create_decoder(&cli.decoder) {
        Ok(decoder) => decoder,
        Err(e) => {
            tracing::error!(error = %e, "invalid decoder");
            std::process::exit(2);
        }
    };

    let consumer = TopicConsumer::new(
        ConsumerConfig {
            topic: cli.topic.clone(),
            broker: cli.broker.clone(),
            offset,
        },
        Arc::new(KafkaConnector),
        decoder,
    );

    let (tx, mut rx) = mpsc::channel(1024);
    let closing = CancellationToken::new();

    tracing::info!(
        topic = %cli.topic,
        broker = %cli.broker,
        offset = %offset,
        "tailing topic, press Ctrl+C to stop"
    );

    let consume = tokio::spawn({
        let closing = closing.clone();
        async move { consumer.consume(tx, closing).await }
    });

    // Print until the aggregated stream closes; Ctrl+C requests the close
    // and the loop then drains whatever the workers still forward.
    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => print_value(&message.value),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                closing.cancel();
            }
        }
    }

    match consume.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "consume failed");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "consumer task panicked");
            std::process::exit(1);
        }
    }
}

fn print_value(value: &serde_json::Value) {
    match value {
        serde_json::Value::String(s) => println!("{s}"),
        other => println!("{other}"),
    }
}
