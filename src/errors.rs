// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! The `AmqpError` enum covers every failure mode of this messaging layer:
//! connection and channel setup, topology declaration, publishing, consuming,
//! acknowledgment, and RPC. Connection and topology errors are fatal to
//! process startup; `HandlerFault` ends one consumer loop; `RpcTimeout` is
//! recoverable by retrying the call with a fresh correlation id.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Redeclaring an exchange or queue with parameters that conflict with
    /// the existing declaration (broker PRECONDITION_FAILED)
    #[error("conflicting redeclaration of `{0}`")]
    TopologyConflict(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindingExchangeToQueueError(String, String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    ConsumerDeclarationError(String),

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// A message handler raised an unexpected fault; the affected consumer
    /// loop terminates without requeueing the in-flight message
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// No matching RPC response arrived within the configured deadline
    #[error("rpc call timed out")]
    RpcTimeout,
}
