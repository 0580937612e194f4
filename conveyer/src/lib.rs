//! In-process string-processing conveyer.
//!
//! A [`pipeline::Conveyer`] owns a registry of named, bounded channels of text and a list of
//! stages wired against those names. Running the conveyer starts every stage concurrently; stages
//! talk to each other only through channels and stop together when one of them fails or the
//! caller requests shutdown.

pub mod channel;
pub mod concurrency;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod stage;
pub mod workers;

pub use conveyer_config::shared::{ConveyerConfig, ErrorPolicy};
