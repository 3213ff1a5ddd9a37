//! Module lifecycle controller.
//!
//! Drives every registered module through
//! `Discovered → SettingsLoaded → Loaded → ContentLoaded → Unloaded`.
//!
//! - Load order follows required and optional dependencies, registration
//!   order otherwise
//! - Each phase runs with the module as the current scope, so hooks and
//!   subscriptions it creates are attributed to it
//! - A module whose phase returns an error or panics is torn down at once;
//!   the other modules carry on
//! - After `unload` the controller removes whatever the module left behind

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use everhook_il::Exception;
use everhook_protocols::{
    HookId, ModuleDescriptor, ModuleError, ModuleFailure, ModuleManifest, ModulePhase, ModuleState,
    SubscriptionId,
};

use crate::bus::ExtensionBus;
use crate::hook::HookManager;
use crate::module::{Module, ModuleContext};
use crate::scope::ModuleScope;

struct Slot {
    /// `None` while one of the module's phases is running.
    module: Option<Box<dyn Module>>,
    descriptor: ModuleDescriptor,
    /// Set once any phase has been called.
    entered: bool,
    /// `unload` was requested while a phase was running.
    unload_requested: bool,
}

/// Outcome of unloading one module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnloadReport {
    pub module: String,
    /// Hooks the module did not remove itself.
    pub leaked_hooks: Vec<HookId>,
    /// Subscriptions the module did not remove itself.
    pub leaked_subscriptions: Vec<SubscriptionId>,
    /// The module was unloaded before; nothing was done.
    pub already_unloaded: bool,
    /// A phase of the module was running; it unloads once that phase returns.
    pub deferred: bool,
}

impl UnloadReport {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.leaked_hooks.is_empty() && self.leaked_subscriptions.is_empty()
    }
}

/// Owns the registered modules and their descriptors.
pub struct LifecycleController {
    slots: Mutex<Vec<Slot>>,
    load_order: Mutex<Vec<String>>,
    disabled: Mutex<HashSet<String>>,
    settings: Mutex<HashMap<String, serde_json::Value>>,
    hooks: Arc<HookManager>,
    bus: Arc<ExtensionBus>,
    scope: Arc<ModuleScope>,
    work_dir: PathBuf,
}

impl LifecycleController {
    pub fn new(
        hooks: Arc<HookManager>,
        bus: Arc<ExtensionBus>,
        scope: Arc<ModuleScope>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            load_order: Mutex::new(Vec::new()),
            disabled: Mutex::new(HashSet::new()),
            settings: Mutex::new(HashMap::new()),
            hooks,
            bus,
            scope,
            work_dir,
        }
    }

    /// Register a module. It stays `Discovered` until [`load_all`](Self::load_all).
    pub fn register(&self, module: Box<dyn Module>) -> Result<(), ModuleError> {
        let manifest = module.manifest().clone();
        let mut slots = self.slots.lock();
        if slots.iter().any(|s| s.descriptor.id() == manifest.id) {
            return Err(ModuleError::AlreadyRegistered(manifest.id));
        }
        info!("Discovered module: {} v{}", manifest.id, manifest.version);
        slots.push(Slot {
            module: Some(module),
            descriptor: ModuleDescriptor::new(manifest),
            entered: false,
            unload_requested: false,
        });
        Ok(())
    }

    /// Skip `id` on the next load.
    pub fn disable(&self, id: impl Into<String>) {
        self.disabled.lock().insert(id.into());
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.lock().contains(id)
    }

    /// Settings table handed to the module through [`ModuleContext::settings`].
    pub fn set_settings(&self, id: impl Into<String>, settings: serde_json::Value) {
        self.settings.lock().insert(id.into(), settings);
    }

    /// Replace the settings of `id` and run its `load_settings` again if it is
    /// loaded. A module that has not loaded yet picks them up on its load.
    ///
    /// A failing reload tears the module down like any other failed phase.
    pub fn reload_settings(&self, id: &str, settings: serde_json::Value) -> Result<(), ModuleError> {
        let state = self.state(id).ok_or_else(|| ModuleError::NotFound(id.to_string()))?;
        self.set_settings(id, settings);
        if !state.is_active() {
            debug!(module = id, state = %state, "Settings stored for next load");
            return Ok(());
        }
        info!(module = id, "Reloading module settings");
        self.run_phase(id, ModulePhase::LoadSettings, false)
    }

    /// Loads every `Discovered` module up to `Loaded`.
    ///
    /// Returns the failures; failed modules end up `Unloaded` with their
    /// failure recorded in the descriptor.
    pub fn load_all(&self) -> Vec<ModuleError> {
        let (order, rejected) = self.resolve_order();
        let mut failures = Vec::new();

        for (id, err) in rejected {
            self.reject(&id, &err);
            failures.push(err);
        }

        for id in order {
            self.load_order.lock().push(id.clone());
            if let Some(dependency) = self.inactive_dependency(&id) {
                let err = ModuleError::DependencyNotSatisfied {
                    module: id.clone(),
                    dependency,
                };
                self.reject(&id, &err);
                failures.push(err);
                continue;
            }
            if let Err(e) = self.load_one(&id) {
                failures.push(e);
            }
        }

        info!(
            loaded = self.count(ModuleState::Loaded),
            failed = failures.len(),
            "Module load pass finished"
        );
        failures
    }

    fn load_one(&self, id: &str) -> Result<(), ModuleError> {
        info!(module = id, "Loading module");
        let steps = [
            (ModulePhase::LoadSettings, Some(ModuleState::SettingsLoaded)),
            (ModulePhase::Load, None),
            (ModulePhase::Initialize, None),
            (ModulePhase::InputInitialize, Some(ModuleState::Loaded)),
        ];
        for (phase, reached) in steps {
            self.run_phase(id, phase, true)?;
            if self.state(id) == Some(ModuleState::Unloaded) {
                return Ok(());
            }
            if let Some(state) = reached {
                self.advance(id, state)?;
            }
        }
        info!(module = id, "Module loaded");
        Ok(())
    }

    /// Runs `load_content` on loaded modules in load order.
    ///
    /// `Loaded` modules get their first content load and move to
    /// `ContentLoaded`. With `first_load == false`, modules that already are
    /// `ContentLoaded` are called again as a reload.
    pub fn load_content_all(&self, first_load: bool) -> Vec<ModuleError> {
        let order = self.load_order.lock().clone();
        let mut failures = Vec::new();
        for id in order {
            let first = match self.state(&id) {
                Some(ModuleState::Loaded) => true,
                Some(ModuleState::ContentLoaded) if !first_load => false,
                _ => continue,
            };
            if let Err(e) = self.run_phase(&id, ModulePhase::LoadContent, first) {
                failures.push(e);
                continue;
            }
            if first && self.state(&id) == Some(ModuleState::Loaded) {
                if let Err(e) = self.advance(&id, ModuleState::ContentLoaded) {
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Unloads one module and removes anything it left attributed to it.
    ///
    /// Unloading an unloaded module does nothing. Asking while one of the
    /// module's own phases runs defers the unload until that phase returns.
    pub fn unload(&self, id: &str) -> Result<UnloadReport, ModuleError> {
        {
            let mut slots = self.slots.lock();
            let slot = find_mut(&mut slots, id)?;
            if slot.descriptor.state == ModuleState::Unloaded {
                debug!(module = id, "Module already unloaded");
                return Ok(UnloadReport {
                    already_unloaded: true,
                    ..UnloadReport::new(id)
                });
            }
            if slot.module.is_none() {
                info!(module = id, "Module is running a phase, unload deferred");
                slot.unload_requested = true;
                return Ok(UnloadReport {
                    deferred: true,
                    ..UnloadReport::new(id)
                });
            }
        }
        Ok(self.unload_now(id))
    }

    /// Unloads every module, in reverse load order.
    pub fn unload_all(&self) -> Vec<UnloadReport> {
        let order = self.load_order.lock().clone();
        let mut reports = Vec::new();
        for id in order.iter().rev() {
            match self.unload(id) {
                Ok(report) if !report.already_unloaded => reports.push(report),
                Ok(_) => {}
                Err(e) => warn!("Failed to unload {}: {}", id, e),
            }
        }

        // Never loaded: disabled or registered after the last load pass.
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.descriptor.state != ModuleState::Unloaded && !slot.entered {
                slot.descriptor.state = ModuleState::Unloaded;
            }
        }
        reports
    }

    fn unload_now(&self, id: &str) -> UnloadReport {
        let entered = self.with_slot(id, |s| s.entered).unwrap_or(false);
        if entered {
            if let Err(e) = self.run_phase(id, ModulePhase::Unload, false) {
                warn!(module = id, "Module unload failed: {}", e);
            }
        }

        let mut report = UnloadReport::new(id);
        for handle in self.hooks.owned_by(id) {
            warn!(
                module = id,
                hook = %handle.id(),
                target = %handle.target(),
                "Removing hook left behind by module"
            );
            match self.hooks.remove(&handle) {
                Ok(removed) => {
                    for other in &removed.deactivated {
                        warn!(module = id, hook = %other.id(), "Rewrite stopped applying");
                    }
                }
                Err(e) => warn!(module = id, "Could not remove hook: {}", e),
            }
            report.leaked_hooks.push(handle.id());
        }
        for handle in self.bus.owned_by(id) {
            warn!(
                module = id,
                subscription = %handle.id(),
                point = handle.point(),
                "Removing subscription left behind by module"
            );
            if let Err(e) = self.bus.unsubscribe(&handle) {
                warn!(module = id, "Could not remove subscription: {}", e);
            }
            report.leaked_subscriptions.push(handle.id());
        }

        self.with_slot(id, |slot| {
            slot.descriptor.state = ModuleState::Unloaded;
            slot.unload_requested = false;
            self.refresh(slot);
        });
        info!(
            module = id,
            leaked_hooks = report.leaked_hooks.len(),
            leaked_subscriptions = report.leaked_subscriptions.len(),
            "Module unloaded"
        );
        report
    }

    /// Runs one phase of `id` outside every controller lock.
    fn run_phase(&self, id: &str, phase: ModulePhase, first_load: bool) -> Result<(), ModuleError> {
        let mut module = {
            let mut slots = self.slots.lock();
            let slot = find_mut(&mut slots, id)?;
            let module = slot.module.take().ok_or_else(|| {
                ModuleError::Custom(format!("Module {id} is already running a phase"))
            })?;
            slot.entered = true;
            module
        };
        let ctx = self.context(id);

        debug!(module = id, phase = %phase, "Running module phase");
        let outcome = {
            let _scope = self.scope.enter(id);
            catch_unwind(AssertUnwindSafe(|| {
                call_phase(module.as_mut(), phase, &ctx, first_load)
            }))
        };

        let unload_requested = self
            .with_slot(id, |slot| {
                slot.module = Some(module);
                self.refresh(slot);
                std::mem::take(&mut slot.unload_requested)
            })
            .unwrap_or(false);

        let message = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(format!(
                "panicked: {}",
                Exception::from_panic(payload.as_ref()).message
            )),
        };

        match message {
            None => {
                if unload_requested && phase != ModulePhase::Unload {
                    self.unload_now(id);
                }
                Ok(())
            }
            Some(message) if phase == ModulePhase::Unload => {
                Err(ModuleError::load_failure(id, phase, message))
            }
            Some(message) => {
                error!(module = id, phase = %phase, "Module failed: {}", message);
                self.with_slot(id, |slot| {
                    slot.descriptor.failure = Some(ModuleFailure::new(phase, message.clone()));
                });
                self.unload_now(id);
                Err(ModuleError::load_failure(id, phase, message))
            }
        }
    }

    /// Marks a module that never ran as failed.
    fn reject(&self, id: &str, err: &ModuleError) {
        error!(module = id, "Module not loaded: {}", err);
        self.with_slot(id, |slot| {
            slot.descriptor.failure = Some(ModuleFailure::new(ModulePhase::Load, err.to_string()));
            slot.descriptor.state = ModuleState::Unloaded;
        });
    }

    fn advance(&self, id: &str, next: ModuleState) -> Result<(), ModuleError> {
        let mut slots = self.slots.lock();
        let slot = find_mut(&mut slots, id)?;
        let from = slot.descriptor.state;
        if !from.can_advance_to(next) {
            return Err(ModuleError::InvalidTransition {
                module: id.to_string(),
                from,
                to: next,
            });
        }
        debug!(module = id, from = %from, to = %next, "Module state changed");
        slot.descriptor.state = next;
        Ok(())
    }

    /// Discovered, enabled modules in load order, and the ones that cannot
    /// load at all.
    fn resolve_order(&self) -> (Vec<String>, Vec<(String, ModuleError)>) {
        let slots = self.slots.lock();
        let disabled = self.disabled.lock().clone();
        let mut rejected = Vec::new();

        let mut candidates: Vec<&ModuleManifest> = Vec::new();
        for slot in slots.iter() {
            if slot.descriptor.state != ModuleState::Discovered {
                continue;
            }
            if disabled.contains(slot.descriptor.id()) {
                info!(module = slot.descriptor.id(), "Module is disabled, skipping");
                continue;
            }
            candidates.push(&slot.descriptor.manifest);
        }

        // Rejections can cascade to dependents, so repeat until stable.
        loop {
            let ids: HashSet<String> = candidates.iter().map(|m| m.id.clone()).collect();
            let before = candidates.len();
            candidates.retain(|m| match unsatisfied(m, &slots, &ids) {
                Some(dependency) => {
                    rejected.push((
                        m.id.clone(),
                        ModuleError::DependencyNotSatisfied {
                            module: m.id.clone(),
                            dependency,
                        },
                    ));
                    false
                }
                None => true,
            });
            if candidates.len() == before {
                break;
            }
        }

        let ids: HashSet<String> = candidates.iter().map(|m| m.id.clone()).collect();
        let mut placed: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        while let Some(next) = candidates.iter().find(|m| {
            !placed.contains(m.id.as_str())
                && m
                    .dependencies
                    .ids()
                    .all(|d| placed.contains(d) || !ids.contains(d))
        }) {
            placed.insert(next.id.as_str());
            order.push(next.id.clone());
        }

        for m in candidates.iter().filter(|m| !placed.contains(m.id.as_str())) {
            rejected.push((m.id.clone(), ModuleError::DependencyCycle(m.id.clone())));
        }

        debug!(order = ?order, "Resolved module load order");
        (order, rejected)
    }

    /// A required dependency of `id` that is not loaded.
    fn inactive_dependency(&self, id: &str) -> Option<String> {
        let slots = self.slots.lock();
        let slot = slots.iter().find(|s| s.descriptor.id() == id)?;
        slot.descriptor
            .manifest
            .dependencies
            .required
            .iter()
            .find(|dep| {
                !slots
                    .iter()
                    .any(|s| s.descriptor.id() == dep.id && s.descriptor.state.is_active())
            })
            .map(|dep| dep.id.clone())
    }

    fn context(&self, id: &str) -> ModuleContext {
        ModuleContext {
            module_id: id.to_string(),
            settings: self
                .settings
                .lock()
                .get(id)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            work_dir: self.work_dir.clone(),
            hooks: Arc::clone(&self.hooks),
            bus: Arc::clone(&self.bus),
            runtime: Arc::clone(self.hooks.runtime()),
        }
    }

    fn refresh(&self, slot: &mut Slot) {
        let id = slot.descriptor.manifest.id.as_str();
        slot.descriptor.hooks = self.hooks.owned_by(id).iter().map(|h| h.id()).collect();
        slot.descriptor.subscriptions = self.bus.owned_by(id).iter().map(|h| h.id()).collect();
    }

    fn with_slot<R>(&self, id: &str, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots.iter_mut().find(|s| s.descriptor.id() == id).map(f)
    }

    fn count(&self, state: ModuleState) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|s| s.descriptor.state == state)
            .count()
    }

    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.with_slot(id, |s| s.descriptor.state)
    }

    pub fn descriptor(&self, id: &str) -> Option<ModuleDescriptor> {
        self.with_slot(id, |s| s.descriptor.clone())
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.slots
            .lock()
            .iter()
            .map(|s| s.descriptor.clone())
            .collect()
    }

    /// Ids in the order they were loaded.
    pub fn load_order(&self) -> Vec<String> {
        self.load_order.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Borrow a registered module, for downcasting through
    /// [`Module::as_any`]. `None` while one of its phases runs.
    pub fn with_module<R>(&self, id: &str, f: impl FnOnce(&dyn Module) -> R) -> Option<R> {
        let slots = self.slots.lock();
        let slot = slots.iter().find(|s| s.descriptor.id() == id)?;
        slot.module.as_deref().map(f)
    }
}

fn find_mut<'s>(slots: &'s mut [Slot], id: &str) -> Result<&'s mut Slot, ModuleError> {
    slots
        .iter_mut()
        .find(|s| s.descriptor.id() == id)
        .ok_or_else(|| ModuleError::NotFound(id.to_string()))
}

fn call_phase(
    module: &mut dyn Module,
    phase: ModulePhase,
    ctx: &ModuleContext,
    first_load: bool,
) -> Result<(), ModuleError> {
    match phase {
        ModulePhase::LoadSettings => module.load_settings(ctx),
        ModulePhase::Load => module.load(ctx),
        ModulePhase::Initialize => module.initialize(ctx),
        ModulePhase::InputInitialize => module.on_input_initialize(ctx),
        ModulePhase::LoadContent => module.load_content(ctx, first_load),
        ModulePhase::Unload => module.unload(ctx),
    }
}

/// First required dependency of `manifest` that cannot be satisfied.
fn unsatisfied(
    manifest: &ModuleManifest,
    slots: &[Slot],
    candidates: &HashSet<String>,
) -> Option<String> {
    for dep in &manifest.dependencies.required {
        let Some(slot) = slots.iter().find(|s| s.descriptor.id() == dep.id) else {
            return Some(dep.id.clone());
        };
        let available = candidates.contains(dep.id.as_str()) || slot.descriptor.state.is_active();
        if !available {
            return Some(dep.id.clone());
        }
        if let Some(minimum) = &dep.version {
            if !slot.descriptor.manifest.version.satisfies(minimum) {
                return Some(format!("{} >= {}", dep.id, minimum));
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
