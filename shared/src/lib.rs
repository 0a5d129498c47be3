//! Domain core for the hospital warehouse
//!
//! Lot ledger, stock aggregation, movement validation and the approval
//! workflow. Shared between the backend and the browser (via WASM) so both
//! sides validate with the same rules.

pub mod ledger;
pub mod models;
pub mod stock;
pub mod validation;
pub mod workflow;

pub use ledger::*;
pub use models::*;
pub use stock::*;
pub use validation::*;
pub use workflow::*;
