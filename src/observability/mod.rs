//! Observability for cassmap
//!
//! - Structured logging through `tracing`, tagged with an `event` field
//! - Lock-free counters per engine
//!
//! The library never installs a subscriber.

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{EngineMetrics, MetricsSnapshot};
