// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Consumes and processes task messages with fair dispatch.
//!
//! Processing cost is simulated: one second of sleep per `.` in the body.
//! With the default prefetch of 1 a busy worker receives nothing new until
//! it acknowledges its current message, so running several workers spreads
//! the load onto whichever one is free.
//!
//! With `--exchange` the worker binds a server-named exclusive queue to the
//! exchange using the given binding keys or patterns, acting as a
//! fanout/direct/topic collector.

use amqp_patterns::{
    channel::new_amqp_channel,
    config::Config,
    dispatcher::{AmqpDispatcher, Dispatcher},
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    handler::{ConsumerHandler, ConsumerMessage, Outcome},
    queue::{QueueBinding, QueueDefinition},
    topology::{AmqpTopology, Topology},
};
use async_trait::async_trait;
use clap::{Parser, ValueEnum};
use opentelemetry::Context;
use std::{sync::Arc, time::Duration};
use tracing::info;

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
#[command(name = "worker", about = "Consume and process task messages")]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 5672)]
    port: u16,
    #[arg(long, default_value = "guest")]
    user: String,
    #[arg(long, default_value = "guest")]
    password: String,

    /// Queue to consume (queue mode).
    #[arg(long, default_value = "some_queue")]
    queue: String,

    /// Collect from this exchange via a server-named queue instead.
    #[arg(long)]
    exchange: Option<String>,

    /// Exchange type when --exchange is given.
    #[arg(long, value_enum, default_value_t = ExchangeType::Topic)]
    exchange_type: ExchangeType,

    /// Binding keys or patterns for the exchange (repeatable).
    #[arg(long = "bind-key")]
    bind_keys: Vec<String>,

    /// Let the broker mark deliveries acknowledged on arrival.
    #[arg(long)]
    auto_ack: bool,

    /// Max unacknowledged deliveries outstanding; 1 = strict fair dispatch.
    #[arg(long, default_value_t = 1)]
    prefetch: u16,
}

struct TaskHandler;

#[async_trait]
impl ConsumerHandler for TaskHandler {
    async fn exec(&self, _ctx: &Context, msg: &ConsumerMessage) -> Result<Outcome, AmqpError> {
        let body = String::from_utf8_lossy(&msg.data);
        info!(
            redelivered = msg.redelivered,
            "received: [{}] {}", msg.routing_key, body
        );

        // each `.` marker costs one second of simulated work
        let delay = body.matches('.').count() as u64;
        tokio::time::sleep(Duration::from_secs(delay)).await;

        info!("done");
        Ok(Outcome::Ack)
    }
}

#[tokio::main]
async fn main() -> Result<(), AmqpError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = Config::new("worker")
        .endpoint(&args.host, args.port)
        .credentials(&args.user, &args.password)
        .prefetch(args.prefetch);

    let (_conn, channel) = new_amqp_channel(&cfg).await?;

    let queue_def = match &args.exchange {
        None => {
            let queue = QueueDefinition::new(&args.queue).durable();
            AmqpTopology::new(channel.clone())
                .queue(&queue)
                .install()
                .await?;
            queue
        }
        Some(exchange) => {
            let exchange_def = ExchangeDefinition::new(exchange).kind(args.exchange_type.into());
            let anon = QueueDefinition::server_named().exclusive();
            let name = amqp_patterns::topology::declare_queue(&channel, &anon).await?;

            let queue = QueueDefinition::new(&name).exclusive();

            // fanout needs no key but still needs one binding
            let keys = if args.bind_keys.is_empty() {
                vec![String::new()]
            } else {
                args.bind_keys.clone()
            };
            let bindings: Vec<QueueBinding> = keys
                .iter()
                .map(|key| QueueBinding::new(&name).exchange(exchange).routing_key(key))
                .collect();

            let mut topology = AmqpTopology::new(channel.clone()).exchange(&exchange_def);
            for binding in &bindings {
                topology = topology.queue_binding(binding);
            }
            topology.install().await?;

            queue
        }
    };

    info!("waiting for messages on: {}", queue_def.name());

    AmqpDispatcher::new(channel)
        .qos(cfg.prefetch_count)
        .register(&queue_def, Arc::new(TaskHandler), args.auto_ack)
        .consume_blocking()
        .await
}
