// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration
//!
//! Trace-context propagation through AMQP message headers: the publisher
//! injects the current context into outgoing headers, and the consumer
//! extracts it and opens a `Consumer` span per delivery. No exporter is
//! wired here; with none configured the global noop tracer applies.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global::{BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

/// Adapter for injecting and extracting OpenTelemetry context from AMQP
/// message headers.
pub(crate) struct TracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> TracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for TracePropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

impl Extractor for TracePropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Extracts the trace context from delivery properties and opens a consumer
/// span named after the routing key.
pub(crate) fn new_span(
    props: &AMQPProperties,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let mut headers = props
        .headers()
        .clone()
        .unwrap_or_default()
        .inner()
        .clone();

    let ctx = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&TracePropagator::new(&mut headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_headers_extract_back() {
        let mut headers = BTreeMap::default();

        TracePropagator::new(&mut headers).set("TraceParent", "00-abc-def-01".to_owned());

        let reader = TracePropagator::new(&mut headers);
        // keys are lowercased on the way in
        assert_eq!(reader.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(reader.keys(), vec!["traceparent"]);
    }

    #[test]
    fn non_string_headers_are_skipped() {
        let mut headers = BTreeMap::default();
        headers.insert(ShortString::from("count"), AMQPValue::LongInt(3));

        let reader = TracePropagator::new(&mut headers);
        assert_eq!(reader.get("count"), None);
    }
}
