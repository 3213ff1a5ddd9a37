//! Common types.

mod common;
mod ids;

pub use common::*;
pub use ids::*;
