//! Domain models for the material ledger

mod batch;
mod cost_detail;
mod material;
mod movement;
mod status;

pub use batch::*;
pub use cost_detail::*;
pub use material::*;
pub use movement::*;
pub use status::*;
