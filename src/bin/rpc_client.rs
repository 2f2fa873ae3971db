// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Issues one RPC call and prints the response.
//!
//! Declares a private reply queue, publishes the request with a fresh
//! correlation id, and blocks until the matching response or the reply
//! timeout. A timeout is recoverable: rerunning retries with a new id.

use amqp_patterns::{
    channel::new_amqp_channel, config::Config, errors::AmqpError, rpc::RpcClient,
};
use clap::Parser;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rpc-client", about = "Issue one RPC call")]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 5672)]
    port: u16,
    #[arg(long, default_value = "guest")]
    user: String,
    #[arg(long, default_value = "guest")]
    password: String,

    /// Routing key of the server's request queue.
    #[arg(long, default_value = "rpc_queue")]
    routing_key: String,

    /// Request body.
    #[arg(long, default_value = "RPC")]
    body: String,

    /// Reply timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AmqpError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cfg = Config::new("rpc-client")
        .endpoint(&args.host, args.port)
        .credentials(&args.user, &args.password)
        .rpc_timeout(Duration::from_secs(args.timeout_secs));

    let (_conn, channel) = new_amqp_channel(&cfg).await?;
    let client = RpcClient::new(channel, cfg.rpc_timeout).await?;

    info!("sent: {}", args.body);
    let response = client.call(&args.routing_key, args.body.as_bytes()).await?;

    println!("RESPONSE: {}", String::from_utf8_lossy(&response));

    Ok(())
}
