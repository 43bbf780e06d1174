pub mod adapter;
pub mod broker;

pub use adapter::{AudioGraphAdapter, ConnectOutcome, GraphError};
pub use broker::GraphBroker;
