// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Processing
//!
//! Runs the registered handler for one delivery and settles it according to
//! the returned [`Outcome`]: ack, or nack with the requested requeue flag.
//! A handler fault is not settled here at all; it propagates as
//! `HandlerFault` and ends the owning consumer loop, leaving the in-flight
//! delivery to the broker's redelivery-on-disconnect behavior.

use crate::{
    errors::AmqpError,
    handler::{ConsumerHandler, ConsumerMessage, Outcome},
    otel,
};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    protocol::basic::AMQPProperties,
};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::{borrow::Cow, sync::Arc};
use tracing::{debug, error};

/// How a delivery gets settled after its handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckAction {
    /// Auto-ack mode: the broker marked the delivery acknowledged on
    /// delivery, nothing left to do.
    None,
    Ack,
    Nack { requeue: bool },
}

/// Maps a handler outcome to the settle action, honoring the ack mode.
pub(crate) fn ack_action(outcome: Outcome, auto_ack: bool) -> AckAction {
    if auto_ack {
        return AckAction::None;
    }

    match outcome {
        Outcome::Ack => AckAction::Ack,
        Outcome::Reject { requeue } => AckAction::Nack { requeue },
    }
}

/// Pulls the RPC-relevant metadata out of delivery properties.
pub(crate) fn extract_metadata(props: &AMQPProperties) -> (Option<String>, Option<String>) {
    let correlation_id = props.correlation_id().as_ref().map(|s| s.to_string());
    let reply_to = props.reply_to().as_ref().map(|s| s.to_string());
    (correlation_id, reply_to)
}

/// Consumes and processes a single delivery.
///
/// Opens a consumer span, hands the message to the handler, then settles
/// the delivery tag exactly once based on the outcome.
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    delivery: &Delivery,
    queue: &str,
    handler: &Arc<dyn ConsumerHandler>,
    auto_ack: bool,
) -> Result<(), AmqpError> {
    let routing_key = delivery.routing_key.as_str();
    let (ctx, mut span) = otel::new_span(&delivery.properties, tracer, routing_key);

    debug!(
        "received delivery from queue: {} - exchange: {}",
        queue,
        delivery.exchange.as_str(),
    );

    let (correlation_id, reply_to) = extract_metadata(&delivery.properties);

    let mut msg = ConsumerMessage::new(queue, routing_key, &delivery.data);
    msg.correlation_id = correlation_id;
    msg.reply_to = reply_to;
    msg.redelivered = delivery.redelivered;

    let outcome = match handler.exec(&ctx, &msg).await {
        Ok(outcome) => outcome,
        Err(err) => {
            let fault = AmqpError::HandlerFault(err.to_string());
            error!(error = err.to_string(), "handler fault, ending consumer loop");
            span.record_error(&fault);
            span.set_status(Status::Error {
                description: Cow::from("handler fault"),
            });
            return Err(fault);
        }
    };

    match ack_action(outcome, auto_ack) {
        AckAction::None => {
            span.set_status(Status::Ok);
            Ok(())
        }
        AckAction::Ack => match delivery.ack(BasicAckOptions { multiple: false }).await {
            Err(e) => {
                error!("error whiling ack msg");
                span.record_error(&e);
                span.set_status(Status::Error {
                    description: Cow::from("error to ack msg"),
                });
                Err(AmqpError::AckMessageError)
            }
            _ => {
                debug!("message successfully processed");
                span.set_status(Status::Ok);
                Ok(())
            }
        },
        AckAction::Nack { requeue } => match delivery
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
        {
            Err(e) => {
                error!("error whiling nack msg");
                span.record_error(&e);
                span.set_status(Status::Error {
                    description: Cow::from("error to nack msg"),
                });
                Err(AmqpError::NackMessageError)
            }
            _ => {
                span.set_status(Status::Ok);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::{types::ShortString, BasicProperties};

    #[test]
    fn explicit_ack_mode_settles_by_outcome() {
        assert_eq!(ack_action(Outcome::Ack, false), AckAction::Ack);
        assert_eq!(
            ack_action(Outcome::Reject { requeue: true }, false),
            AckAction::Nack { requeue: true }
        );
        assert_eq!(
            ack_action(Outcome::Reject { requeue: false }, false),
            AckAction::Nack { requeue: false }
        );
    }

    #[test]
    fn auto_ack_mode_never_settles_again() {
        // the broker already considers the delivery acknowledged
        assert_eq!(ack_action(Outcome::Ack, true), AckAction::None);
        assert_eq!(
            ack_action(Outcome::Reject { requeue: true }, true),
            AckAction::None
        );
    }

    #[test]
    fn metadata_extraction_reads_rpc_properties() {
        let props = BasicProperties::default()
            .with_correlation_id(ShortString::from("id-1"))
            .with_reply_to(ShortString::from("amq.gen-xyz"));

        let (correlation_id, reply_to) = extract_metadata(&props);
        assert_eq!(correlation_id.as_deref(), Some("id-1"));
        assert_eq!(reply_to.as_deref(), Some("amq.gen-xyz"));
    }

    #[test]
    fn metadata_extraction_tolerates_absent_properties() {
        let (correlation_id, reply_to) = extract_metadata(&BasicProperties::default());
        assert!(correlation_id.is_none());
        assert!(reply_to.is_none());
    }
}
