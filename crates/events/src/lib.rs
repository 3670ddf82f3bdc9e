//! # Openbell Events
//!
//! This crate provides the in-process event bus and the typed messages that
//! travel over it: market ticks, order updates, and diagnostics.
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the
//! definitive language for everything the engine announces while running.

// Declare the modules that make up this crate.
pub mod bus;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use bus::{DEFAULT_CAPACITY, EventBus};
pub use messages::{AlgoStatusUpdate, Diagnostic, ErrorMessage, LogLevel, LogMessage};
