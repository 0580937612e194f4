//! Built-in stage workers.
//!
//! Each worker matches one [`crate::stage::Stage`] shape and can be passed directly to the
//! corresponding `register_*` method of [`crate::pipeline::Conveyer`].

pub mod decorator;
pub mod multiplexer;
pub mod separator;

pub use decorator::decorator;
pub use multiplexer::multiplexer;
pub use separator::separator;
