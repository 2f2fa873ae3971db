// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management
//!
//! Types for defining RabbitMQ queues and for binding them to exchanges.
//! A queue with an empty name requests a broker-generated unique name; the
//! assigned name comes back from `queue_declare` and is the handle used for
//! consuming and for RPC reply routing.

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// Builder-style. Durable queues survive broker restart; exclusive queues
/// belong to one connection and are destroyed when it closes; auto-delete
/// queues are destroyed when the last consumer disconnects.
#[derive(Debug, Clone, Default)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// Defaults to a non-durable, non-exclusive queue.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            delete: false,
            exclusive: false,
        }
    }

    /// Requests a broker-generated unique queue name.
    pub fn server_named() -> QueueDefinition {
        QueueDefinition::new("")
    }

    /// The configured name; empty until the broker assigns one for
    /// server-named queues.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when the last consumer disconnects.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// Configuration for binding a queue to an exchange.
///
/// The routing key is an exact key for direct exchanges, a wildcard pattern
/// for topic exchanges, and ignored by fanout exchanges.
pub struct QueueBinding<'qeb> {
    pub(crate) queue_name: &'qeb str,
    pub(crate) exchange_name: &'qeb str,
    pub(crate) routing_key: &'qeb str,
}

impl<'qeb> QueueBinding<'qeb> {
    /// Creates a new queue binding for the given queue.
    ///
    /// The exchange name and routing key default to empty and should be set
    /// with `exchange` and `routing_key`.
    pub fn new(queue: &'qeb str) -> QueueBinding<'qeb> {
        QueueBinding {
            queue_name: queue,
            exchange_name: "",
            routing_key: "",
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &'qeb str) -> Self {
        self.exchange_name = exchange;
        self
    }

    /// Sets the routing key or pattern for the binding.
    pub fn routing_key(mut self, key: &'qeb str) -> Self {
        self.routing_key = key;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_named_queue_starts_unnamed() {
        let def = QueueDefinition::server_named().exclusive();
        assert_eq!(def.name(), "");
        assert!(def.exclusive);
        assert!(!def.durable);
    }

    #[test]
    fn builder_sets_flags() {
        let def = QueueDefinition::new("some_queue").durable();
        assert_eq!(def.name(), "some_queue");
        assert!(def.durable);
        assert!(!def.delete);
    }
}
