// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Publishes a batch of messages.
//!
//! Two modes:
//! - queue mode (default): N persistent task messages ("TASK #1"..) to a
//!   durable queue through the default exchange
//! - exchange mode (`--exchange`): N messages with randomized
//!   `subject.severity` routing keys to a named exchange

use amqp_patterns::{
    channel::new_amqp_channel,
    config::Config,
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    publisher::{AmqpPublisher, OutboundMessage, Publisher},
    queue::QueueDefinition,
    topology::{AmqpTopology, Topology},
};
use clap::{Parser, ValueEnum};
use opentelemetry::Context;
use rand::seq::SliceRandom;
use tracing::info;

const SUBJECTS: [&str; 4] = ["kernel", "module", "lib", "app"];
const SEVERITIES: [&str; 3] = ["info", "warning", "error"];

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExchangeType {
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeType> for ExchangeKind {
    fn from(t: ExchangeType) -> ExchangeKind {
        match t {
            ExchangeType::Direct => ExchangeKind::Direct,
            ExchangeType::Fanout => ExchangeKind::Fanout,
            ExchangeType::Topic => ExchangeKind::Topic,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "producer", about = "Publish a batch of messages")]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 5672)]
    port: u16,
    #[arg(long, default_value = "guest")]
    user: String,
    #[arg(long, default_value = "guest")]
    password: String,

    /// Destination queue (queue mode).
    #[arg(long, default_value = "some_queue")]
    queue: String,

    /// Publish to this exchange instead of a queue.
    #[arg(long)]
    exchange: Option<String>,

    /// Exchange type when --exchange is given.
    #[arg(long, value_enum, default_value_t = ExchangeType::Topic)]
    exchange_type: ExchangeType,

    /// Fixed routing key; random `subject.severity` when omitted.
    #[arg(long)]
    routing_key: Option<String>,

    /// Message body; generated per message when omitted.
    #[arg(long)]
    body: Option<String>,

    /// How many messages to publish.
    #[arg(long, default_value_t = 10)]
    count: u32,
}

#[tokio::main]
async fn main() -> Result<(), AmqpError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = Config::new("producer")
        .endpoint(&args.host, args.port)
        .credentials(&args.user, &args.password);

    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let publisher = AmqpPublisher::new(channel.clone());
    let ctx = Context::current();

    match &args.exchange {
        None => {
            let queue = QueueDefinition::new(&args.queue).durable();
            AmqpTopology::new(channel.clone())
                .queue(&queue)
                .install()
                .await?;

            for i in 1..=args.count {
                let body = args.body.clone().unwrap_or_else(|| format!("TASK #{}", i));
                let msg = OutboundMessage::to_queue(&args.queue, body.as_bytes()).persistent();
                publisher.publish(&ctx, &msg).await?;
                info!("sent: {}", body);
            }
        }
        Some(exchange) => {
            let def = ExchangeDefinition::new(exchange).kind(args.exchange_type.into());
            AmqpTopology::new(channel.clone())
                .exchange(&def)
                .install()
                .await?;

            let mut rng = rand::thread_rng();
            for i in 1..=args.count {
                let routing_key = args.routing_key.clone().unwrap_or_else(|| {
                    format!(
                        "{}.{}",
                        SUBJECTS.choose(&mut rng).unwrap(),
                        SEVERITIES.choose(&mut rng).unwrap()
                    )
                });
                let body = args
                    .body
                    .clone()
                    .unwrap_or_else(|| format!("emitting {}: {}", i, routing_key));

                let msg =
                    OutboundMessage::to_exchange(exchange, &routing_key, body.as_bytes())
                        .persistent();
                publisher.publish(&ctx, &msg).await?;
                info!("sent: {} [{}]", i, routing_key);
            }
        }
    }

    Ok(())
}
