pub mod config;
pub mod hosts;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
