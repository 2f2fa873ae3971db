// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handler Contract
//!
//! A handler receives one delivery at a time and returns an explicit
//! [`Outcome`]: acknowledgment is a return contract, not a side effect
//! buried in a callback. Returning `Err` is an unhandled fault and
//! terminates the owning consumer loop.

use async_trait::async_trait;
use opentelemetry::Context;

use crate::errors::AmqpError;

#[cfg(test)]
use mockall::automock;

/// What the dispatcher should do with a delivery after the handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Acknowledge the delivery; the broker removes it from the queue.
    Ack,
    /// Negatively acknowledge; `requeue` controls whether the broker makes
    /// the delivery available again or drops it.
    Reject { requeue: bool },
}

/// An inbound message as seen by a handler.
///
/// The body is opaque bytes; delivery metadata needed by servers (routing
/// key, correlation id, reply-to) rides along. The delivery tag stays with
/// the dispatcher, which is the only place acks happen.
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub queue: String,
    pub routing_key: String,
    pub data: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub redelivered: bool,
}

impl ConsumerMessage {
    pub fn new(queue: &str, routing_key: &str, data: &[u8]) -> Self {
        ConsumerMessage {
            queue: queue.to_owned(),
            routing_key: routing_key.to_owned(),
            data: data.to_vec(),
            correlation_id: None,
            reply_to: None,
            redelivered: false,
        }
    }
}

/// Processes deliveries from one queue.
///
/// With QoS=1 the dispatcher runs `exec` to completion before the broker
/// hands over the next message, so implementations never see two
/// invocations on the same channel concurrently.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<Outcome, AmqpError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fresh_message_carries_no_delivery_metadata() {
        let msg = ConsumerMessage::new("some_queue", "some_queue", b"TASK #1");
        assert!(!msg.redelivered);
        assert!(msg.correlation_id.is_none());
        assert!(msg.reply_to.is_none());
    }

    #[tokio::test]
    async fn handler_outcome_is_an_explicit_return() {
        let mut mock = MockConsumerHandler::new();
        mock.expect_exec()
            .returning(|_, _| Ok(Outcome::Reject { requeue: false }));

        let handler: Arc<dyn ConsumerHandler> = Arc::new(mock);
        let msg = ConsumerMessage::new("some_queue", "some_queue", b"TASK #1");

        let outcome = handler.exec(&Context::new(), &msg).await.unwrap();
        assert_eq!(outcome, Outcome::Reject { requeue: false });
    }

    #[tokio::test]
    async fn handler_fault_surfaces_as_error() {
        let mut mock = MockConsumerHandler::new();
        mock.expect_exec()
            .returning(|_, _| Err(AmqpError::InternalError));

        let msg = ConsumerMessage::new("some_queue", "some_queue", b"TASK #2");
        let result = mock.exec(&Context::new(), &msg).await;
        assert!(result.is_err());
    }
}
