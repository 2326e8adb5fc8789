//! Shared types and pure ledger logic for the material ledger
//!
//! This crate holds the domain model, the FIFO planner and input validation.
//! It performs no I/O so that the backend and the WASM client compute costs
//! exactly the same way.

pub mod amount;
pub mod expiry;
pub mod fifo;
pub mod models;
pub mod validation;

pub use amount::*;
pub use expiry::*;
pub use fifo::*;
pub use models::*;
pub use validation::*;
