//! Concurrency primitives used to coordinate conveyer stages.
//!
//! Stages never share state directly: they exchange values through [`crate::channel::Channel`]s
//! and stop cooperatively when the [`shutdown`] signal of their run fires. Every blocking channel
//! operation inside a stage is raced against that signal, so a cancelled run never leaves a stage
//! stuck on a full or empty channel.

pub mod shutdown;
