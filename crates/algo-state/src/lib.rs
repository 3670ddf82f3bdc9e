//! # Openbell Algo State
//!
//! The daily strategy lock. One algo selection per owner per trading day,
//! idempotent relocks, and restart recovery through the store.

pub mod error;
pub mod machine;

pub use error::AlgoStateError;
pub use machine::{AlgoStateMachine, StrategyHandle};
