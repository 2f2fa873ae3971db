// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module provides functionality for defining and creating RabbitMQ
//! topology components: exchanges, queues, and the bindings between them.
//! All declarations are idempotent when the parameters match the existing
//! entity; redeclaring with conflicting parameters surfaces the broker's
//! PRECONDITION_FAILED as [`AmqpError::TopologyConflict`].
//!
//! The main components are:
//! - `Topology` trait: interface for topology registration and install
//! - `AmqpTopology`: RabbitMQ implementation of the trait
//! - [`declare_queue`]: one-off declaration that returns the broker-assigned
//!   name, used for server-named reply queues

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, error};

/// AMQP reply code for a declaration that conflicts with an existing entity.
const PRECONDITION_FAILED: u16 = 406;

/// Trait defining the interface for topology management.
///
/// Exchanges, queues, and bindings are registered first and then created on
/// the broker in one `install` pass.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: &'tp ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: &'tp QueueBinding) -> Self;

    /// Installs the topology to the RabbitMQ server.
    ///
    /// Creates all exchanges and queues, then sets up all bindings. The
    /// broker mutates its routing table; no local state is kept beyond the
    /// registered definitions.
    async fn install(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Topology trait.
pub struct AmqpTopology<'tp> {
    channel: Arc<Channel>,
    pub(crate) queues: HashMap<&'tp str, &'tp QueueDefinition>,
    pub(crate) queues_binding: Vec<&'tp QueueBinding<'tp>>,
    pub(crate) exchanges: Vec<&'tp ExchangeDefinition<'tp>>,
}

impl<'tp> AmqpTopology<'tp> {
    /// Creates a new AmqpTopology on the given channel.
    pub fn new(channel: Arc<Channel>) -> AmqpTopology<'tp> {
        AmqpTopology {
            channel,
            queues: HashMap::default(),
            queues_binding: vec![],
            exchanges: vec![],
        }
    }
}

#[async_trait]
impl<'tp> Topology<'tp> for AmqpTopology<'tp> {
    fn exchange(mut self, def: &'tp ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.insert(&def.name, def);
        self
    }

    fn queue_binding(mut self, binding: &'tp QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    async fn install(&self) -> Result<(), AmqpError> {
        self.install_exchanges().await?;
        self.install_queues().await?;
        self.install_bindings().await
    }
}

impl<'tp> AmqpTopology<'tp> {
    /// Creates all exchanges defined in the topology.
    async fn install_exchanges(&self) -> Result<(), AmqpError> {
        for exch in self.exchanges.clone() {
            debug!("creating exchange: {}", exch.name);

            match self
                .channel
                .exchange_declare(
                    exch.name,
                    exch.kind.into(),
                    ExchangeDeclareOptions {
                        passive: false,
                        durable: exch.durable,
                        auto_delete: exch.delete,
                        internal: false,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = exch.name,
                        "error to declare the exchange"
                    );
                    Err(classify_declare_error(
                        &err,
                        exch.name,
                        AmqpError::DeclareExchangeError(exch.name.to_owned()),
                    ))
                }
                _ => Ok(()),
            }?;

            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    /// Creates all queues defined in the topology.
    async fn install_queues(&self) -> Result<(), AmqpError> {
        for (name, def) in self.queues.clone() {
            debug!("creating queue: {}", name);
            declare_queue(&self.channel, def).await?;
            debug!("queue: {} was created", name);
        }

        Ok(())
    }

    /// Sets up queue-to-exchange bindings.
    async fn install_bindings(&self) -> Result<(), AmqpError> {
        for binding in self.queues_binding.clone() {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );

            match self
                .channel
                .queue_bind(
                    binding.queue_name,
                    binding.exchange_name,
                    binding.routing_key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error to bind queue to exchange");

                    Err(AmqpError::BindingExchangeToQueueError(
                        binding.exchange_name.to_owned(),
                        binding.queue_name.to_owned(),
                    ))
                }
                _ => Ok(()),
            }?;
        }

        debug!("queues were bound");

        Ok(())
    }
}

/// Declares a single queue and returns the broker-assigned name.
///
/// For server-named queues (empty name in the definition) the returned name
/// is the broker-generated unique one; for named queues it echoes the
/// definition's name.
pub async fn declare_queue(channel: &Channel, def: &QueueDefinition) -> Result<String, AmqpError> {
    match channel
        .queue_declare(
            &def.name,
            QueueDeclareOptions {
                passive: false,
                durable: def.durable,
                exclusive: def.exclusive,
                auto_delete: def.delete,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(queue) => Ok(queue.name().as_str().to_owned()),
        Err(err) => {
            error!(error = err.to_string(), name = def.name, "failure to declare queue");
            Err(classify_declare_error(
                &err,
                &def.name,
                AmqpError::DeclareQueueError(def.name.clone()),
            ))
        }
    }
}

/// Maps a broker PRECONDITION_FAILED to `TopologyConflict`; anything else
/// keeps the operation-specific error.
fn classify_declare_error(err: &lapin::Error, name: &str, fallback: AmqpError) -> AmqpError {
    if is_precondition_failed(err) {
        AmqpError::TopologyConflict(name.to_owned())
    } else {
        fallback
    }
}

fn is_precondition_failed(err: &lapin::Error) -> bool {
    matches!(err, lapin::Error::ProtocolError(e) if e.get_id() == PRECONDITION_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::{protocol::AMQPError, types::ShortString};

    #[test]
    fn precondition_failed_maps_to_topology_conflict() {
        let amqp_err = AMQPError::from_id(
            PRECONDITION_FAILED,
            ShortString::from("PRECONDITION_FAILED - inequivalent arg 'durable'"),
        )
        .unwrap();
        let err = lapin::Error::ProtocolError(amqp_err);

        let mapped = classify_declare_error(
            &err,
            "some_queue",
            AmqpError::DeclareQueueError("some_queue".to_owned()),
        );
        assert_eq!(mapped, AmqpError::TopologyConflict("some_queue".to_owned()));
    }

    #[test]
    fn other_protocol_errors_keep_the_declare_error() {
        // 404 NOT_FOUND is a declare failure, not a conflicting redeclare
        let amqp_err =
            AMQPError::from_id(404, ShortString::from("NOT_FOUND - no exchange 'logs'")).unwrap();
        let err = lapin::Error::ProtocolError(amqp_err);

        let mapped = classify_declare_error(
            &err,
            "logs",
            AmqpError::DeclareExchangeError("logs".to_owned()),
        );
        assert_eq!(mapped, AmqpError::DeclareExchangeError("logs".to_owned()));
    }

    #[test]
    fn classify_keeps_fallback_for_non_protocol_errors() {
        let err = lapin::Error::ChannelsLimitReached;
        let mapped = classify_declare_error(
            &err,
            "jobs",
            AmqpError::DeclareQueueError("jobs".to_owned()),
        );
        assert_eq!(mapped, AmqpError::DeclareQueueError("jobs".to_owned()));
    }
}
