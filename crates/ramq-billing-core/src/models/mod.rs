//! Domain models for the RAMQ billing assistant.

mod catalog;
mod encounter;
mod suggestion;

pub use catalog::*;
pub use encounter::*;
pub use suggestion::*;
