//! # Openbell Executor Crate
//!
//! This crate is the virtual execution engine for paper trading. It accepts
//! order requests, prices them off the live market data, enforces the margin
//! rule, and applies fills to the owner's position and wallet through the
//! store.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** The `ledger` module is a pure
//!   calculator: given a position, a wallet, and a fill, it returns what
//!   they become and what PnL was realized, without touching any state. The
//!   `PaperBroker` decides when a fill happens and commits the result
//!   atomically. This separation is what keeps the netting rules testable
//!   on their own.
//! - **Full-fill model:** Paper orders fill completely or not at all. MARKET
//!   orders fill at the last traded price on placement; LIMIT orders rest
//!   until a sweep finds the market through their limit, and then fill at
//!   the limit.
//!
//! ## Public API
//!
//! - `PaperBroker`: the virtual execution engine.
//! - `Placement`: an accepted order plus the PnL its fill realized.
//! - `ledger`: the pure netting, margin, and wallet arithmetic.
//! - `ExecutorError`: the specific error types this crate returns.

// Declare the modules that constitute this crate.
pub mod error;
pub mod ledger;
pub mod paper;

// Re-export the key components to provide a clean, public-facing API.
pub use error::ExecutorError;
pub use ledger::LedgerEntry;
pub use paper::{PaperBroker, Placement};
