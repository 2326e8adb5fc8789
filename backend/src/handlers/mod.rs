//! HTTP handlers for the material ledger API

mod health;
mod ledger;
mod material;

pub use health::*;
pub use ledger::*;
pub use material::*;
