//! Business logic services for the material ledger

pub mod ledger;
pub mod material;

pub use ledger::LedgerService;
pub use material::MaterialService;
