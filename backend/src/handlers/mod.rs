//! HTTP handlers for the hospital warehouse API

pub mod documents;
pub mod health;
pub mod items;
pub mod lots;

pub use documents::*;
pub use health::*;
pub use items::*;
pub use lots::*;
