// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management
//!
//! Types for defining RabbitMQ exchanges and for reasoning about their
//! routing behavior. Three exchange kinds are supported:
//!
//! - Direct: routes to queues whose binding key equals the routing key
//! - Fanout: broadcasts to all bound queues, routing key ignored
//! - Topic: routes on `.`-delimited wildcard patterns (`*` one word,
//!   `#` zero or more words)
//!
//! Routing is enforced by the broker; the local [`binding_matches`] helper
//! mirrors the broker's semantics so bindings and routing keys can be
//! checked without a live broker.

/// Represents the types of exchanges available in RabbitMQ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// Definition of a RabbitMQ exchange with its configuration parameters.
///
/// Builder-style; redeclaring an exchange with an identical definition is a
/// no-op on the broker, while redeclaring with a different kind or flags
/// fails with `TopologyConflict`.
#[derive(Debug, Clone)]
pub struct ExchangeDefinition<'ex> {
    pub(crate) name: &'ex str,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
}

impl<'ex> ExchangeDefinition<'ex> {
    /// Creates a new exchange definition with the given name.
    ///
    /// Defaults to a non-durable direct exchange.
    pub fn new(name: &'ex str) -> ExchangeDefinition<'ex> {
        ExchangeDefinition {
            name,
            kind: ExchangeKind::Direct,
            durable: false,
            delete: false,
        }
    }

    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange type to Direct.
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Sets the exchange type to Fanout.
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange type to Topic.
    pub fn topic(mut self) -> Self {
        self.kind = ExchangeKind::Topic;
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }
}

/// Whether a binding with `pattern` receives a message published with
/// `routing_key` under the given exchange kind.
///
/// This mirrors the broker's routing table: direct matches on string
/// equality, fanout matches unconditionally, topic matches word-wise with
/// wildcards.
pub fn binding_matches(kind: ExchangeKind, pattern: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Direct => pattern == routing_key,
        ExchangeKind::Fanout => true,
        ExchangeKind::Topic => topic_matches(pattern, routing_key),
    }
}

/// Topic pattern match: both sides split on `.`; `*` consumes exactly one
/// word, `#` consumes zero or more words (trailing or interior).
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(&"#") => {
            // `#` either matches nothing or absorbs one word and stays
            words_match(&pattern[1..], key)
                || (!key.is_empty() && words_match(pattern, &key[1..]))
        }
        Some(&"*") => !key.is_empty() && words_match(&pattern[1..], &key[1..]),
        Some(word) => key.first() == Some(word) && words_match(&pattern[1..], &key[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_requires_exact_key() {
        assert!(binding_matches(ExchangeKind::Direct, "error", "error"));
        assert!(!binding_matches(ExchangeKind::Direct, "warning", "info"));
        assert!(!binding_matches(ExchangeKind::Direct, "error", "info"));
    }

    #[test]
    fn fanout_ignores_routing_key() {
        assert!(binding_matches(ExchangeKind::Fanout, "", "anything.at.all"));
        assert!(binding_matches(ExchangeKind::Fanout, "unused", ""));
    }

    #[test]
    fn topic_star_matches_exactly_one_word() {
        assert!(topic_matches("kernel.*", "kernel.error"));
        assert!(topic_matches("kernel.*", "kernel.info"));
        assert!(!topic_matches("kernel.*", "module.error"));
        assert!(!topic_matches("kernel.*", "kernel"));
        assert!(!topic_matches("kernel.*", "kernel.error.fatal"));
    }

    #[test]
    fn topic_hash_matches_zero_or_more_words() {
        assert!(topic_matches("#", "kernel.error"));
        assert!(topic_matches("kernel.#", "kernel"));
        assert!(topic_matches("kernel.#", "kernel.error.fatal"));
        assert!(topic_matches("#.error", "kernel.error"));
        assert!(topic_matches("#.error", "error"));
        assert!(!topic_matches("#.error", "kernel.info"));
    }

    #[test]
    fn topic_interior_hash() {
        assert!(topic_matches("app.#.failed", "app.job.import.failed"));
        assert!(topic_matches("app.#.failed", "app.failed"));
        assert!(!topic_matches("app.#.failed", "app.job.succeeded"));
    }

    #[test]
    fn topic_literal_words_must_align() {
        assert!(topic_matches("a.b.c", "a.b.c"));
        assert!(!topic_matches("a.b.c", "a.b"));
        assert!(!topic_matches("a.b", "a.b.c"));
    }
}
