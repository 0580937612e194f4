//! Configuration types and loading for conveyer binaries.

pub mod environment;
mod load;
pub mod shared;

pub use load::{LoadConfigError, load_config, load_config_from};
