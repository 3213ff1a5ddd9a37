//! Module manifests, states and descriptors.

mod manifest;
mod state;

pub use manifest::*;
pub use state::*;
