//! # bitprop
//!
//! Driver for `bitprop-core`: loads circuits, schedules node updates and
//! reports marginals. Exposed as a library so integration tests can drive
//! the same code paths as the binary.

pub mod cli;
pub mod config;
pub mod description;
pub mod driver;

pub use config::{RunConfig, Schedule, UpdateMode};
pub use description::{GraphDescription, LoadedGraph};
pub use driver::{Driver, RunReport};
