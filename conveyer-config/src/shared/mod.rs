//! Configuration types shared by the conveyer library and its binaries.

mod base;
mod cli;
mod conveyer;

pub use base::ValidationError;
pub use cli::CliConfig;
pub use conveyer::{ConveyerConfig, ErrorPolicy};
