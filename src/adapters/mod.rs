//! Adapters Layer
//!
//! Outbound implementations of the domain ports: the wire, and the metrics
//! sinks.

pub mod outbound;
