//! # Openbell Risk Gate
//!
//! Pre-trade risk checks and per-owner daily counters. Every order attempt,
//! paper or live, must pass `RiskGate::check_trade_allowed` before it reaches
//! a broker.

pub mod error;
pub mod gate;

pub use error::RiskRejection;
pub use gate::{RiskCounters, RiskGate};
