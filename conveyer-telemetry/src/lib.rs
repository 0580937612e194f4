//! Logging setup shared by conveyer binaries and tests.

pub mod tracing;
