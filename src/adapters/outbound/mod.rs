mod codec;
mod prometheus_exporter;
mod tcp_connector;
mod tracing_observer;

pub use codec::{Codec, CodecError, MAX_FRAME_SIZE};
pub use prometheus_exporter::{PathMetrics, PrometheusExporter};
pub use tcp_connector::{TcpConnector, TransportOptions};
pub use tracing_observer::TracingObserver;
