mod broker;
mod gauge_registry;
mod sample_observer;
mod transport;

pub use broker::Broker;
pub use gauge_registry::{GaugeFn, GaugeRegistry};
pub use sample_observer::SampleObserver;
pub use transport::{Connection, Connector};
