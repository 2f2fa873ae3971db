// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Builds outbound messages and publishes them to a named exchange with a
//! routing key. The empty exchange name is the broker's default exchange,
//! which routes straight to the queue whose name equals the routing key —
//! the mechanism behind simple point-to-point delivery. Publishing is
//! fire-and-forget; delivery confirmation is out of scope.

use crate::{errors::AmqpError, otel::TracePropagator};
use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::{global, Context};
use std::{collections::BTreeMap, sync::Arc};
use tracing::error;
use uuid::Uuid;

/// Delivery mode requesting durable storage of the message body.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// An outbound message envelope: opaque body plus routing and metadata.
///
/// Immutable once handed to [`Publisher::publish`]. `persistent` is only
/// meaningful when the destination queue is durable; the combination of a
/// transient queue and a persistent message is accepted but the guarantee
/// does not survive queue loss.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) data: Vec<u8>,
    pub(crate) persistent: bool,
    pub(crate) correlation_id: Option<String>,
    pub(crate) reply_to: Option<String>,
}

impl OutboundMessage {
    /// A message routed through the default exchange straight to `queue`.
    pub fn to_queue(queue: &str, data: &[u8]) -> Self {
        OutboundMessage::to_exchange("", queue, data)
    }

    /// A message published to `exchange` with the given routing key.
    pub fn to_exchange(exchange: &str, routing_key: &str, data: &[u8]) -> Self {
        OutboundMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            data: data.to_vec(),
            persistent: false,
            correlation_id: None,
            reply_to: None,
        }
    }

    /// Requests durable storage of the message body.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_owned());
        self
    }

    pub fn reply_to(mut self, queue: &str) -> Self {
        self.reply_to = Some(queue.to_owned());
        self
    }
}

/// Publishes outbound messages to the broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, ctx: &Context, msg: &OutboundMessage) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Publisher trait.
///
/// Propagates the OpenTelemetry trace context in the message headers and
/// stamps every message with a fresh uuid message id.
pub struct AmqpPublisher {
    channel: Arc<Channel>,
}

impl AmqpPublisher {
    pub fn new(channel: Arc<Channel>) -> Arc<AmqpPublisher> {
        Arc::new(AmqpPublisher { channel })
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, ctx: &Context, msg: &OutboundMessage) -> Result<(), AmqpError> {
        let mut headers = BTreeMap::<ShortString, AMQPValue>::default();

        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(ctx, &mut TracePropagator::new(&mut headers))
        });

        match self
            .channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.data,
                build_properties(msg, headers),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}

/// Renders the AMQP properties for an outbound message.
fn build_properties(
    msg: &OutboundMessage,
    headers: BTreeMap<ShortString, AMQPValue>,
) -> BasicProperties {
    let mut props = BasicProperties::default()
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(headers));

    if msg.persistent {
        props = props.with_delivery_mode(DELIVERY_MODE_PERSISTENT);
    }

    if let Some(id) = &msg.correlation_id {
        props = props.with_correlation_id(ShortString::from(id.clone()));
    }

    if let Some(queue) = &msg.reply_to {
        props = props.with_reply_to(ShortString::from(queue.clone()));
    }

    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_exchange_routes_by_queue_name() {
        let msg = OutboundMessage::to_queue("some_queue", b"TASK #1");
        assert_eq!(msg.exchange, "");
        assert_eq!(msg.routing_key, "some_queue");
        assert!(!msg.persistent);
    }

    #[test]
    fn persistent_flag_sets_delivery_mode() {
        let msg = OutboundMessage::to_queue("some_queue", b"TASK #1").persistent();
        let props = build_properties(&msg, BTreeMap::default());
        assert_eq!(*props.delivery_mode(), Some(2));
    }

    #[test]
    fn transient_message_leaves_delivery_mode_unset() {
        let msg = OutboundMessage::to_exchange("logs", "", b"x");
        let props = build_properties(&msg, BTreeMap::default());
        assert_eq!(*props.delivery_mode(), None);
    }

    #[test]
    fn rpc_metadata_lands_in_properties() {
        let msg = OutboundMessage::to_queue("rpc_queue", b"RPC")
            .correlation_id("abc-123")
            .reply_to("amq.gen-reply");
        let props = build_properties(&msg, BTreeMap::default());

        assert_eq!(props.correlation_id().as_ref().map(|s| s.as_str()), Some("abc-123"));
        assert_eq!(props.reply_to().as_ref().map(|s| s.as_str()), Some("amq.gen-reply"));
        assert!(props.message_id().is_some());
    }
}
