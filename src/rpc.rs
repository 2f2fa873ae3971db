// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RPC over the Broker
//!
//! Request/response on top of plain queues. The client owns one exclusive,
//! server-named reply queue for its whole session and correlates responses
//! to callers through a pending-call table keyed by a fresh uuid per call.
//! The server consumes a well-known queue with QoS=1 and publishes exactly
//! one response per request, addressed by the request's `reply_to` and
//! stamped with its `correlation_id`.
//!
//! A reply whose correlation id is unknown, already resolved, or absent is
//! acknowledged and dropped silently: it belongs to a different, stale, or
//! foreign call. That is also the policy for spoofed replies — origin is
//! not verified.

use crate::{
    errors::AmqpError,
    handler::{ConsumerHandler, ConsumerMessage, Outcome},
    publisher::{AmqpPublisher, OutboundMessage, Publisher},
    queue::QueueDefinition,
    topology,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions},
    types::FieldTable,
    Channel,
};
use opentelemetry::Context;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Calls awaiting their response, keyed by correlation id.
///
/// Each slot resolves exactly once; resolving an absent or already-resolved
/// id is a no-op. Ids are never reused while outstanding — they are fresh
/// uuids, and a timed-out id is simply abandoned.
#[derive(Default)]
pub struct PendingCalls {
    slots: Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        PendingCalls::default()
    }

    /// Registers a call and hands back the receiver its response arrives on.
    pub fn register(&self, correlation_id: &str) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.slots
            .lock()
            .expect("pending-call table poisoned")
            .insert(correlation_id.to_owned(), tx);
        rx
    }

    /// Resolves a call with the response body.
    ///
    /// Returns whether a waiting caller was found; unknown ids resolve
    /// nothing and the body is dropped.
    pub fn resolve(&self, correlation_id: &str, body: Vec<u8>) -> bool {
        let slot = self
            .slots
            .lock()
            .expect("pending-call table poisoned")
            .remove(correlation_id);

        match slot {
            Some(tx) => tx.send(body).is_ok(),
            None => false,
        }
    }

    /// Forgets a call that timed out; a late response will miss the table
    /// and be dropped by `resolve`.
    pub fn abandon(&self, correlation_id: &str) {
        self.slots
            .lock()
            .expect("pending-call table poisoned")
            .remove(correlation_id);
    }

    #[cfg(test)]
    fn outstanding(&self) -> usize {
        self.slots.lock().expect("pending-call table poisoned").len()
    }
}

/// Client side of the RPC pattern.
///
/// One instance per session; `call` may be invoked concurrently, each call
/// getting its own correlation id and result slot.
pub struct RpcClient {
    publisher: Arc<AmqpPublisher>,
    reply_queue: String,
    pending: Arc<PendingCalls>,
    timeout: Duration,
}

impl RpcClient {
    /// Declares the session's exclusive reply queue and starts the loop
    /// that resolves incoming responses against the pending-call table.
    pub async fn new(channel: Arc<Channel>, timeout: Duration) -> Result<Arc<RpcClient>, AmqpError> {
        let reply_def = QueueDefinition::server_named().exclusive();
        let reply_queue = topology::declare_queue(&channel, &reply_def).await?;
        debug!("reply queue declared: {}", reply_queue);

        let pending = Arc::new(PendingCalls::new());

        tokio::spawn(run_reply_loop(
            channel.clone(),
            reply_queue.clone(),
            pending.clone(),
        ));

        Ok(Arc::new(RpcClient {
            publisher: AmqpPublisher::new(channel),
            reply_queue,
            pending,
            timeout,
        }))
    }

    /// Issues one call and blocks until the matching response or timeout.
    ///
    /// On timeout the correlation id is abandoned and `RpcTimeout`
    /// returned; retrying makes a new call with a new id.
    pub async fn call(&self, routing_key: &str, request: &[u8]) -> Result<Vec<u8>, AmqpError> {
        let correlation_id = Uuid::new_v4().to_string();
        let rx = self.pending.register(&correlation_id);

        let msg = OutboundMessage::to_queue(routing_key, request)
            .correlation_id(&correlation_id)
            .reply_to(&self.reply_queue);

        if let Err(err) = self.publisher.publish(&Context::current(), &msg).await {
            self.pending.abandon(&correlation_id);
            return Err(err);
        }

        match await_reply(rx, self.timeout).await {
            Err(AmqpError::RpcTimeout) => {
                self.pending.abandon(&correlation_id);
                Err(AmqpError::RpcTimeout)
            }
            other => other,
        }
    }

    /// The broker-assigned name of this session's reply queue.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }
}

/// Waits on a result slot, converting expiry into `RpcTimeout` and a
/// dropped sender (reply loop gone) into a consumer error.
async fn await_reply(
    rx: oneshot::Receiver<Vec<u8>>,
    timeout: Duration,
) -> Result<Vec<u8>, AmqpError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(body)) => Ok(body),
        Ok(Err(_)) => Err(AmqpError::ConsumerError("reply loop ended".to_owned())),
        Err(_) => Err(AmqpError::RpcTimeout),
    }
}

/// Services the reply queue: every delivery is acked, matching responses
/// resolve their caller, the rest are dropped silently.
async fn run_reply_loop(channel: Arc<Channel>, reply_queue: String, pending: Arc<PendingCalls>) {
    let mut consumer = match channel
        .basic_consume(
            &reply_queue,
            "rpc-client",
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(c) => c,
        Err(err) => {
            error!(error = err.to_string(), "failure to consume reply queue");
            return;
        }
    };

    while let Some(result) = consumer.next().await {
        let delivery = match result {
            Ok(d) => d,
            Err(err) => {
                error!(error = err.to_string(), "error receiving reply");
                return;
            }
        };

        if let Err(err) = delivery.ack(BasicAckOptions { multiple: false }).await {
            error!(error = err.to_string(), "error whiling ack reply");
        }

        match delivery.properties.correlation_id() {
            Some(id) => {
                if !pending.resolve(id.as_str(), delivery.data.clone()) {
                    debug!("dropping reply with unknown correlation id: {}", id);
                }
            }
            None => debug!("dropping reply without correlation id"),
        }
    }
}

/// Computes the response body for one request.
#[async_trait]
pub trait RpcService: Send + Sync {
    async fn respond(&self, request: &[u8]) -> Vec<u8>;
}

/// Consumer handler wrapping an [`RpcService`]: publishes the response to
/// the request's reply queue, then acknowledges the request.
pub struct RpcServerHandler {
    publisher: Arc<AmqpPublisher>,
    service: Arc<dyn RpcService>,
}

impl RpcServerHandler {
    pub fn new(channel: Arc<Channel>, service: Arc<dyn RpcService>) -> Arc<RpcServerHandler> {
        Arc::new(RpcServerHandler {
            publisher: AmqpPublisher::new(channel),
            service,
        })
    }
}

/// Addresses a response at the request's reply queue with its correlation
/// id. `None` when the request lacks either field — such a request cannot
/// be answered and is acked away.
fn response_message(request: &ConsumerMessage, response: &[u8]) -> Option<OutboundMessage> {
    let correlation_id = request.correlation_id.as_deref()?;
    let reply_to = request.reply_to.as_deref()?;

    Some(
        OutboundMessage::to_queue(reply_to, response).correlation_id(correlation_id),
    )
}

#[async_trait]
impl ConsumerHandler for RpcServerHandler {
    async fn exec(&self, ctx: &Context, msg: &ConsumerMessage) -> Result<Outcome, AmqpError> {
        let response = self.service.respond(&msg.data).await;

        let Some(out) = response_message(msg, &response) else {
            warn!("request without reply_to/correlation_id, discarding");
            return Ok(Outcome::Ack);
        };

        // Response goes out before the request is settled, so exactly one
        // response exists per acknowledged request.
        self.publisher.publish(ctx, &out).await?;

        Ok(Outcome::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matching_response_resolves_waiting_caller() {
        let pending = PendingCalls::new();
        let rx = pending.register("id-1");

        assert!(pending.resolve("id-1", b"RPC+".to_vec()));
        assert_eq!(rx.await.unwrap(), b"RPC+".to_vec());
        assert_eq!(pending.outstanding(), 0);
    }

    #[tokio::test]
    async fn unknown_correlation_id_is_a_noop() {
        let pending = PendingCalls::new();
        let _rx = pending.register("id-1");

        assert!(!pending.resolve("id-other", b"stale".to_vec()));
        assert_eq!(pending.outstanding(), 1);
    }

    #[tokio::test]
    async fn each_call_resolves_only_with_its_own_response() {
        let pending = PendingCalls::new();
        let rx_a = pending.register("call-a");
        let rx_b = pending.register("call-b");

        // arrival order inverted relative to registration
        assert!(pending.resolve("call-b", b"B".to_vec()));
        assert!(pending.resolve("call-a", b"A".to_vec()));

        assert_eq!(rx_a.await.unwrap(), b"A".to_vec());
        assert_eq!(rx_b.await.unwrap(), b"B".to_vec());
    }

    #[tokio::test]
    async fn resolving_twice_is_a_noop() {
        let pending = PendingCalls::new();
        let rx = pending.register("id-1");

        assert!(pending.resolve("id-1", b"first".to_vec()));
        assert!(!pending.resolve("id-1", b"second".to_vec()));
        assert_eq!(rx.await.unwrap(), b"first".to_vec());
    }

    #[tokio::test]
    async fn abandoned_call_drops_late_response() {
        let pending = PendingCalls::new();
        let mut rx = pending.register("id-1");

        pending.abandon("id-1");
        assert!(!pending.resolve("id-1", b"late".to_vec()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn await_reply_times_out_instead_of_hanging() {
        let pending = PendingCalls::new();
        let rx = pending.register("id-1");

        let result = await_reply(rx, Duration::from_secs(5)).await;
        assert_eq!(result, Err(AmqpError::RpcTimeout));
    }

    #[test]
    fn response_addressing_follows_the_request() {
        let mut request = ConsumerMessage::new("rpc_queue", "rpc_queue", b"RPC");
        request.correlation_id = Some("id-1".to_owned());
        request.reply_to = Some("amq.gen-reply".to_owned());

        let out = response_message(&request, b"RPC+").unwrap();
        assert_eq!(out.routing_key, "amq.gen-reply");
        assert_eq!(out.exchange, "");
        assert_eq!(out.correlation_id.as_deref(), Some("id-1"));
        assert_eq!(out.data, b"RPC+".to_vec());
    }

    #[test]
    fn unanswerable_request_yields_no_response() {
        let request = ConsumerMessage::new("rpc_queue", "rpc_queue", b"RPC");
        assert!(response_message(&request, b"RPC+").is_none());

        let mut only_reply_to = request.clone();
        only_reply_to.reply_to = Some("amq.gen-reply".to_owned());
        assert!(response_message(&only_reply_to, b"RPC+").is_none());
    }
}
