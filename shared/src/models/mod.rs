//! Domain models for the hospital warehouse

mod item;
mod lot;
mod movement;

pub use item::*;
pub use lot::*;
pub use movement::*;
