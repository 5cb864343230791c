//! Observability utilities for the profiler itself.
//!
//! # Module Structure
//!
//! - [`events`]: Profiler lifecycle events with zero-allocation emit
//! - [`logging`]: Tracing subscriber setup with file/console layers
//!
//! Event emission borrows its fields and checks a single `AtomicBool` to pick
//! the log level, so the instrumented hot path stays allocation free.

pub mod events;
pub mod logging;
