//! # Openbell Store Crate
//!
//! This crate is the persistence seam for the engine. Every durable fact
//! about a trading day (the algo lock, orders, executions, positions, the
//! paper wallet, risk limit snapshots, operational events) goes through the
//! `Store` trait defined here.
//!
//! ## Architectural Principles
//!
//! - **Keyed queries only:** The trait exposes simple lookups and writes.
//!   Anything resembling business logic (netting, dedup decisions, status
//!   mapping) belongs to the callers, so every implementation behaves
//!   identically.
//! - **Atomic fills:** `record_fill` is the one compound write in the
//!   system. Implementations commit it all-or-nothing, which is what keeps
//!   the wallet/position ledger consistent when anything fails mid-fill.
//! - **Two backends:** `MemoryStore` for paper sessions and tests,
//!   `PgStore` (sqlx runtime API, embedded migrations) when durability
//!   matters.
//!
//! ## Public API
//!
//! - `Store`: The persistence trait the rest of the engine depends on.
//! - `MemoryStore` / `PgStore`: The two implementations.
//! - `connect` / `run_migrations`: Pool setup utilities for Postgres.
//! - `StoreError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod interface;
pub mod memory;
pub mod postgres;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::StoreError;
pub use interface::{FillRecord, Store};
pub use memory::MemoryStore;
pub use postgres::PgStore;
