// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Answers RPC requests indefinitely.
//!
//! Consumes the well-known request queue with QoS=1; the demo service
//! appends `+` to the request body. Each accepted request produces exactly
//! one response, published to the caller's reply queue with the request's
//! correlation id.

use amqp_patterns::{
    channel::new_amqp_channel,
    config::Config,
    dispatcher::{AmqpDispatcher, Dispatcher},
    errors::AmqpError,
    queue::QueueDefinition,
    rpc::{RpcServerHandler, RpcService},
    topology::{AmqpTopology, Topology},
};
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rpc-server", about = "Answer RPC requests")]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 5672)]
    port: u16,
    #[arg(long, default_value = "guest")]
    user: String,
    #[arg(long, default_value = "guest")]
    password: String,

    /// Well-known request queue.
    #[arg(long, default_value = "rpc_queue")]
    queue: String,
}

/// Demo service: the response is the request body with `+` appended.
struct AppendPlus;

#[async_trait]
impl RpcService for AppendPlus {
    async fn respond(&self, request: &[u8]) -> Vec<u8> {
        let mut response = request.to_vec();
        response.push(b'+');
        info!(
            "answering: {} -> {}",
            String::from_utf8_lossy(request),
            String::from_utf8_lossy(&response)
        );
        response
    }
}

#[tokio::main]
async fn main() -> Result<(), AmqpError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = Config::new("rpc-server")
        .endpoint(&args.host, args.port)
        .credentials(&args.user, &args.password);

    let (_conn, channel) = new_amqp_channel(&cfg).await?;

    let queue = QueueDefinition::new(&args.queue);
    AmqpTopology::new(channel.clone())
        .queue(&queue)
        .install()
        .await?;

    info!("awaiting rpc requests on: {}", args.queue);

    let handler = RpcServerHandler::new(channel.clone(), Arc::new(AppendPlus));

    AmqpDispatcher::new(channel)
        .qos(1)
        .register(&queue, handler, false)
        .consume_blocking()
        .await
}
