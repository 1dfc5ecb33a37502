//! rpc-broker probe
//!
//! Builds a client from `RPC_BROKER_*` environment variables, sends a batch
//! of requests through it and prints the per-host load/weight snapshot.

use bytes::Bytes;
use rpc_broker::adapters::outbound::{Codec, PrometheusExporter, TracingObserver};
use rpc_broker::config::{load_config, read_env};
use rpc_broker::domain::ports::Broker;
use rpc_broker::ClientBuilder;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Serialize)]
struct ProbeReport {
    requests: usize,
    succeeded: usize,
    failed: usize,
    elapsed_ms: u128,
    hosts: Vec<rpc_broker::HostSnapshot>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let debug = std::env::var("DEBUG").is_ok();
    let log_level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let cfg = load_config()?;
    let requests: usize = read_env("RPC_BROKER_PROBE_REQUESTS")?.unwrap_or(10);

    let codec = cfg
        .codec
        .as_deref()
        .and_then(|c| c.parse::<Codec>().ok());
    let payload = std::env::var("RPC_BROKER_PROBE_PAYLOAD")
        .unwrap_or_else(|_| default_payload(codec).to_string());

    let exporter = Arc::new(PrometheusExporter::default());
    let client = ClientBuilder::from_config(cfg)
        .report_to(Arc::new(TracingObserver))
        .report_to(exporter.clone())
        .export_loads_to(exporter.clone())
        .build()?;

    tracing::info!(hosts = ?client.hosts(), requests, "probing");

    let started = Instant::now();
    let mut succeeded = 0;
    for i in 0..requests {
        match client.send(Bytes::from(payload.clone())).await {
            Ok(reply) => {
                succeeded += 1;
                tracing::debug!(request = i, bytes = reply.len(), "reply");
            }
            Err(e) => tracing::warn!(request = i, error = %e, "request failed"),
        }
    }

    let report = ProbeReport {
        requests,
        succeeded,
        failed: requests - succeeded,
        elapsed_ms: started.elapsed().as_millis(),
        hosts: client.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if debug {
        print!("{}", exporter.export_prometheus());
    }

    client.close();
    Ok(())
}

fn default_payload(codec: Option<Codec>) -> &'static str {
    match codec {
        Some(Codec::Http) => "GET / HTTP/1.1\r\nHost: probe\r\nContent-Length: 0\r\n\r\n",
        _ => "ping",
    }
}
