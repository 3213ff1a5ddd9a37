//! Kernel: the process-wide registries with explicit construction and
//! teardown.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use strum::Display;
use tracing::{info, warn};

use everhook_protocols::{ModuleDescriptor, ModuleError};

use crate::bus::{ExtensionBus, SubscriptionRecord};
use crate::hook::{HookManager, HookRecord};
use crate::lifecycle::{LifecycleController, UnloadReport};
use crate::module::Module;
use crate::runtime::HostRuntime;
use crate::scope::ModuleScope;

/// Kernel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum KernelState {
    /// Initial state, modules may be registered.
    Created = 0,
    /// Loading modules.
    Booting = 1,
    /// Modules loaded, host running.
    Running = 2,
    /// Unloading modules.
    ShuttingDown = 3,
    /// Stopped.
    Stopped = 4,
}

impl From<u8> for KernelState {
    fn from(v: u8) -> Self {
        match v {
            0 => KernelState::Created,
            1 => KernelState::Booting,
            2 => KernelState::Running,
            3 => KernelState::ShuttingDown,
            4 => KernelState::Stopped,
            _ => KernelState::Created,
        }
    }
}

/// Everything a crash report needs about the patched process.
#[derive(Debug, Clone, Serialize)]
pub struct KernelSnapshot {
    pub state: KernelState,
    pub hooks: Vec<HookRecord>,
    pub subscriptions: Vec<SubscriptionRecord>,
    pub modules: Vec<ModuleDescriptor>,
}

/// Owns the runtime, the hook manager, the bus and the module lifecycle.
pub struct Kernel {
    state: AtomicU8,
    runtime: Arc<HostRuntime>,
    scope: Arc<ModuleScope>,
    hooks: Arc<HookManager>,
    bus: Arc<ExtensionBus>,
    lifecycle: Arc<LifecycleController>,
    work_dir: PathBuf,
}

impl Kernel {
    /// Create a kernel over an already populated host runtime.
    pub fn new(runtime: Arc<HostRuntime>, work_dir: PathBuf) -> Self {
        let scope = Arc::new(ModuleScope::new());
        let hooks = Arc::new(HookManager::new(Arc::clone(&runtime), Arc::clone(&scope)));
        let bus = Arc::new(ExtensionBus::new(Arc::clone(&scope)));
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&hooks),
            Arc::clone(&bus),
            Arc::clone(&scope),
            work_dir.clone(),
        ));
        Self {
            state: AtomicU8::new(KernelState::Created as u8),
            runtime,
            scope,
            hooks,
            bus,
            lifecycle,
            work_dir,
        }
    }

    /// Get kernel state.
    pub fn state(&self) -> KernelState {
        KernelState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == KernelState::Running
    }

    /// Register a module for the next boot.
    pub fn register_module(&self, module: Box<dyn Module>) -> Result<(), ModuleError> {
        self.lifecycle.register(module)
    }

    /// Load every module and run the first content load.
    ///
    /// Module failures do not fail the boot; they are returned so the caller
    /// can report them.
    pub fn boot(&self) -> Result<Vec<ModuleError>, ModuleError> {
        self.transition(KernelState::Created, KernelState::Booting)?;
        info!(modules = self.lifecycle.len(), "Kernel booting...");

        let mut failures = self.lifecycle.load_all();
        failures.extend(self.lifecycle.load_content_all(true));
        for failure in &failures {
            warn!("Module failure during boot: {}", failure);
        }

        self.state.store(KernelState::Running as u8, Ordering::SeqCst);
        info!(hooks = self.hooks.len(), subscriptions = self.bus.len(), "Kernel running");
        Ok(failures)
    }

    /// Run `load_content` again on every loaded module.
    pub fn reload_content(&self) -> Vec<ModuleError> {
        info!("Reloading module content");
        self.lifecycle.load_content_all(false)
    }

    /// Unload every module in reverse load order.
    pub fn shutdown(&self) -> Result<Vec<UnloadReport>, ModuleError> {
        self.transition(KernelState::Running, KernelState::ShuttingDown)?;
        info!("Kernel shutting down...");

        let reports = self.lifecycle.unload_all();
        let leaked: usize = reports
            .iter()
            .map(|r| r.leaked_hooks.len() + r.leaked_subscriptions.len())
            .sum();
        if leaked > 0 {
            warn!(leaked, "Modules left hooks or subscriptions behind");
        }

        self.state.store(KernelState::Stopped as u8, Ordering::SeqCst);
        info!("Kernel stopped");
        Ok(reports)
    }

    /// Stop all hook and subscription changes. Used once a fatal failure is
    /// being handled.
    pub fn freeze(&self) {
        self.hooks.freeze();
        self.bus.freeze();
    }

    pub fn snapshot(&self) -> KernelSnapshot {
        KernelSnapshot {
            state: self.state(),
            hooks: self.hooks.snapshot(),
            subscriptions: self.bus.snapshot(),
            modules: self.lifecycle.descriptors(),
        }
    }

    fn transition(&self, from: KernelState, to: KernelState) -> Result<(), ModuleError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|current| {
                ModuleError::Custom(format!(
                    "Cannot move kernel to {:?} from state: {:?}",
                    to,
                    KernelState::from(current)
                ))
            })
    }

    pub fn runtime(&self) -> &Arc<HostRuntime> {
        &self.runtime
    }

    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    pub fn bus(&self) -> &Arc<ExtensionBus> {
        &self.bus
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    pub fn scope(&self) -> &Arc<ModuleScope> {
        &self.scope
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
