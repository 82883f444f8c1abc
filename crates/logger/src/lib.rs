//! Process-wide `tracing` setup shared by the workspace binaries.

mod subscriber;

pub use subscriber::{LogFormat, init};
pub use tracing::level_filters::LevelFilter;
