//! # Everhook Protocols
//!
//! Types shared between the interception engine, the module lifecycle and
//! the host binary. Contains no behavior beyond small helpers.
//!
//! - [`ModuleManifest`] / [`ModuleDescriptor`] - what a module is and where it is
//! - [`ExtensionPoint`] - typed names for bus dispatch
//! - [`HookId`] / [`SubscriptionId`] - ids held by module descriptors
//! - Error enums for hooks, modules and the bus

pub mod error;
pub mod module;
pub mod points;
pub mod types;

pub use error::{BusError, HookError, ModuleError};
pub use module::{
    Dependencies, DependencySpec, ModuleDescriptor, ModuleFailure, ModuleManifest, ModulePhase,
    ModuleState,
};
pub use points::ExtensionPoint;
pub use types::*;
