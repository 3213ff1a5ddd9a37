//! # Everhook Core
//!
//! Runtime patching engine for a closed host application.
//!
//! ## Components
//!
//! - [`HostRuntime`] - the host's method table and dispatch
//! - [`HookManager`] - detours, instruction rewrites and their chains
//! - [`ExtensionBus`] - typed multicast extension points
//! - [`LifecycleController`] - module phases, dependency order and teardown
//! - [`Kernel`] - owns all of the above

pub mod bus;
pub mod hook;
pub mod kernel;
pub mod lifecycle;
pub mod module;
pub mod runtime;
pub mod scope;

pub use bus::{ExtensionBus, SubscriptionHandle, SubscriptionRecord};
pub use hook::{
    HookHandle, HookKind, HookManager, HookRecord, Redirection, RemoveReport, Replacement,
    RewriteFn, Trampoline,
};
pub use kernel::{Kernel, KernelSnapshot, KernelState};
pub use lifecycle::{LifecycleController, UnloadReport};
pub use module::{Module, ModuleContext};
pub use runtime::{HostRuntime, MethodImpl, NativeFn};
pub use scope::{ModuleScope, ScopeGuard};
