mod load_balancer;

pub use load_balancer::{Selection, WeightedSelector};
