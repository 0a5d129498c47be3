//! Business logic services for the hospital warehouse

pub mod catalog;
pub mod ledger;
pub mod movement;

pub use catalog::CatalogService;
pub use ledger::LedgerService;
pub use movement::MovementService;
