// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation and management of AMQP connections and
//! channels. It provides functionality to establish a connection to the
//! RabbitMQ server and create communication channels for message publishing
//! and consuming. Connection and channel failures are fatal to process
//! startup and are surfaced as `ConnectionError`/`ChannelError`.

use crate::{config::Config, errors::AmqpError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// Creates a new AMQP channel for communication with RabbitMQ.
///
/// This function establishes a connection to RabbitMQ using the parameters
/// in `cfg`, then creates a channel on that connection. Both the connection
/// and channel are wrapped in Arc for thread-safe sharing.
///
/// # Example
/// ```ignore
/// let (conn, channel) = new_amqp_channel(&cfg).await?;
/// ```
pub async fn new_amqp_channel(cfg: &Config) -> Result<(Arc<Connection>, Arc<Channel>), AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app_name.clone()));

    let conn = match Connection::connect(&cfg.amqp_uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError {})
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError {})
        }
    }
}

/// Creates an additional channel on an existing connection.
///
/// Handler execution on a channel is strictly sequential, so independent
/// consumers that should run in parallel each get their own channel.
pub async fn new_channel(conn: &Connection) -> Result<Arc<Channel>, AmqpError> {
    match conn.create_channel().await {
        Ok(c) => Ok(Arc::new(c)),
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError {})
        }
    }
}
