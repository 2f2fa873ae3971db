// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Dispatcher
//!
//! Consumer-side controller: configures fair-dispatch QoS, registers
//! handlers on queues, and runs the consume loops. With the default
//! prefetch of 1 the broker withholds the next delivery until the current
//! one is acknowledged, so work goes to whichever consumer is free.
//!
//! A handler fault aborts only the affected consumer's loop; sibling loops
//! registered on other queues run to their own completion. Per-message
//! retry is deliberately absent — redelivery is the broker's job once the
//! channel closes.

use crate::{
    consumer::consume,
    errors::AmqpError,
    handler::ConsumerHandler,
    queue::QueueDefinition,
};
use async_trait::async_trait;
use futures_util::{future::join_all, StreamExt};
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel,
};
use opentelemetry::global;
use std::sync::Arc;
use tracing::error;

/// Associates one queue with its handler and acknowledgment mode.
#[derive(Clone)]
pub struct ConsumerBinding {
    pub(crate) queue_def: QueueDefinition,
    pub(crate) handler: Arc<dyn ConsumerHandler>,
    pub(crate) auto_ack: bool,
}

/// Trait defining the consumer-side dispatch interface.
#[async_trait]
pub trait Dispatcher {
    /// Registers a handler for a queue.
    ///
    /// With `auto_ack` the broker marks deliveries acknowledged on arrival
    /// and failures are never redelivered — choose it only for idempotent
    /// or low-value streams. Without it the handler's [`Outcome`] settles
    /// each delivery explicitly.
    ///
    /// [`Outcome`]: crate::handler::Outcome
    fn register(
        self,
        def: &QueueDefinition,
        handler: Arc<dyn ConsumerHandler>,
        auto_ack: bool,
    ) -> Self;

    /// Starts consuming and blocks until every registered loop ends.
    async fn consume_blocking(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Dispatcher trait.
pub struct AmqpDispatcher {
    channel: Arc<Channel>,
    prefetch_count: u16,
    pub(crate) bindings: Vec<ConsumerBinding>,
}

impl AmqpDispatcher {
    /// Creates a new dispatcher with strict fair dispatch (prefetch 1).
    pub fn new(channel: Arc<Channel>) -> Self {
        AmqpDispatcher {
            channel,
            prefetch_count: 1,
            bindings: vec![],
        }
    }

    /// Overrides the unacknowledged-delivery budget for this channel.
    pub fn qos(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }
}

#[async_trait]
impl Dispatcher for AmqpDispatcher {
    fn register(
        mut self,
        def: &QueueDefinition,
        handler: Arc<dyn ConsumerHandler>,
        auto_ack: bool,
    ) -> Self {
        self.bindings.push(ConsumerBinding {
            queue_def: def.clone(),
            handler,
            auto_ack,
        });
        self
    }

    async fn consume_blocking(&self) -> Result<(), AmqpError> {
        match self.bindings.len() {
            0 => Err(AmqpError::ConsumerDeclarationError(
                "no handler registered".to_owned(),
            )),
            1 => self.consume_blocking_single().await,
            _ => self.consume_blocking_multi().await,
        }
    }
}

impl AmqpDispatcher {
    /// Applies the channel QoS budget before any consumer starts.
    async fn setup_qos(&self) -> Result<(), AmqpError> {
        self.channel
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to configure qos");
                AmqpError::QoSDeclarationError(self.prefetch_count.to_string())
            })
    }

    /// Consumes messages from the single registered queue.
    ///
    /// Blocks until the delivery stream closes (consumer cancelled or
    /// channel closed) or a handler fault aborts the loop.
    pub async fn consume_blocking_single(&self) -> Result<(), AmqpError> {
        self.setup_qos().await?;

        let binding = self.bindings.first().ok_or_else(|| {
            AmqpError::ConsumerDeclarationError("no handler registered".to_owned())
        })?;

        let channel = self.channel.clone();
        let binding = binding.clone();

        let spawned = tokio::spawn(run_consumer_loop(channel, binding)).await;

        match spawned {
            Ok(result) => result,
            Err(_) => Err(AmqpError::ConsumerError("consumer task panicked".to_owned())),
        }
    }

    /// Consumes messages from every registered queue in parallel.
    ///
    /// Each queue gets its own loop; a fault in one does not stop the
    /// others. The first fault observed is returned once all loops ended.
    pub async fn consume_blocking_multi(&self) -> Result<(), AmqpError> {
        self.setup_qos().await?;

        let mut spawns = vec![];
        for binding in &self.bindings {
            spawns.push(tokio::spawn(run_consumer_loop(
                self.channel.clone(),
                binding.clone(),
            )));
        }

        let mut first_failure = None;
        for res in join_all(spawns).await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(error = err.to_string(), "consumer loop ended with error");
                    first_failure.get_or_insert(err);
                }
                Err(_) => {
                    error!("tokio process error");
                    first_failure.get_or_insert(AmqpError::InternalError);
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// One consumer's loop: register on the queue, then process deliveries
/// strictly in sequence until the stream closes or a fault aborts it.
async fn run_consumer_loop(
    channel: Arc<Channel>,
    binding: ConsumerBinding,
) -> Result<(), AmqpError> {
    let queue = binding.queue_def.name().to_owned();

    let mut consumer = match channel
        .basic_consume(
            &queue,
            &queue,
            BasicConsumeOptions {
                no_local: false,
                no_ack: binding.auto_ack,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to create the consumer");
            Err(AmqpError::ConsumerDeclarationError(queue.clone()))
        }
        Ok(c) => Ok(c),
    }?;

    let tracer = global::tracer("amqp consumer");

    while let Some(result) = consumer.next().await {
        match result {
            Ok(delivery) => {
                consume(&tracer, &delivery, &queue, &binding.handler, binding.auto_ack).await?
            }
            Err(err) => {
                error!(error = err.to_string(), "error receiving delivery");
                return Err(AmqpError::ConsumerError(queue));
            }
        }
    }

    Ok(())
}
