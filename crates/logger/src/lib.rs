//! Shared tracing setup for the domain monitor binaries.

mod subscriber;

pub use subscriber::{init, init_with_level};
pub use tracing::level_filters::LevelFilter;
