//! Error types shared across everhook crates.

mod bus;
mod hook;
mod module;

pub use bus::*;
pub use hook::*;
pub use module::*;
