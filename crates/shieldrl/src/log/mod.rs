//! Metric logging.

mod console;
mod logger;
mod tracker;

pub use console::ConsoleLogger;
pub use logger::{CompositeLogger, MetricLogger, NoOpLogger};
pub use tracker::EpochTracker;
