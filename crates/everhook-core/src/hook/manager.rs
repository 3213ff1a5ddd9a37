//! Hook manager: installs, chains and removes hooks.

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use everhook_il::{CursorError, Exception, ILCursor, MethodBody, MethodId, Value};
use everhook_protocols::{HookError, HookId};

use super::{HookHandle, HookKind, HookRecord, Redirection, RemoveReport, Replacement, Trampoline};
use crate::runtime::{HostRuntime, MethodImpl};
use crate::scope::ModuleScope;

/// Instruction-level edit applied to a working copy of a method body.
pub type RewriteFn = Arc<dyn Fn(&mut ILCursor<'_>) -> Result<(), CursorError> + Send + Sync>;

#[derive(Default)]
struct Chain {
    detours: Vec<(HookId, Replacement)>,
    rewrites: Vec<(HookId, RewriteFn)>,
    /// Pristine body with every rewrite applied; `None` without rewrites.
    rewritten: Option<Arc<MethodBody>>,
    /// Bumped whenever the rewrite list changes.
    generation: u64,
}

impl Chain {
    fn is_empty(&self) -> bool {
        self.detours.is_empty() && self.rewrites.is_empty()
    }
}

/// Owns every hook record and the per-method chains.
///
/// No lock is held while a rewrite function runs, and none is held while a
/// hooked method executes.
pub struct HookManager {
    runtime: Arc<HostRuntime>,
    scope: Arc<ModuleScope>,
    records: DashMap<HookId, HookRecord>,
    chains: Mutex<HashMap<MethodId, Chain>>,
    rewriting: Mutex<HashSet<MethodId>>,
    next_id: AtomicU64,
    frozen: AtomicBool,
}

/// Marks a method as being rewritten until dropped.
struct RewriteGuard<'m> {
    set: &'m Mutex<HashSet<MethodId>>,
    target: MethodId,
}

impl Drop for RewriteGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.target);
    }
}

impl HookManager {
    pub fn new(runtime: Arc<HostRuntime>, scope: Arc<ModuleScope>) -> Self {
        Self {
            runtime,
            scope,
            records: DashMap::new(),
            chains: Mutex::new(HashMap::new()),
            rewriting: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn runtime(&self) -> &Arc<HostRuntime> {
        &self.runtime
    }

    /// Puts `replacement` in front of `target`.
    ///
    /// Every later call to `target`, from any call site, enters the chain.
    /// Detours run in install order: the first installed runs first and its
    /// trampoline leads to the next one, the last one's trampoline leads to
    /// the original.
    pub fn install<F>(&self, target: &MethodId, replacement: F) -> Result<HookHandle, HookError>
    where
        F: Fn(&Trampoline<'_>, &[Value]) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        self.check_installable(target)?;
        if self.rewriting.lock().contains(target) {
            return Err(HookError::conflict(
                target,
                "a rewrite of this method is in progress",
            ));
        }

        let id = self.next_id();
        let mut chains = self.chains.lock();
        chains
            .entry(target.clone())
            .or_default()
            .detours
            .push((id, Arc::new(replacement)));
        self.commit(&mut chains, target);
        drop(chains);

        self.record(id, target, HookKind::Detour);
        Ok(HookHandle::new(id, target.clone()))
    }

    /// Edits the body of `target` through an [`ILCursor`].
    ///
    /// `rewrite` works on a copy of the current effective body, which already
    /// carries every earlier rewrite. The copy is validated before it goes
    /// live; on any failure the method is left exactly as it was.
    pub fn install_il<F>(&self, target: &MethodId, rewrite: F) -> Result<HookHandle, HookError>
    where
        F: Fn(&mut ILCursor<'_>) -> Result<(), CursorError> + Send + Sync + 'static,
    {
        self.check_installable(target)?;
        let pristine = match self.runtime.pristine(target) {
            Some(MethodImpl::Body(body)) => body,
            Some(MethodImpl::Native(_)) => {
                return Err(HookError::conflict(
                    target,
                    "native method has no instruction body",
                ));
            }
            None => return Err(HookError::HookTargetNotFound(target.clone())),
        };
        let _guard = self.begin_rewrite(target)?;

        let (base, generation) = {
            let chains = self.chains.lock();
            match chains.get(target) {
                Some(chain) => (
                    chain.rewritten.clone().unwrap_or_else(|| Arc::clone(&pristine)),
                    chain.generation,
                ),
                None => (pristine, 0),
            }
        };

        let rewrite: RewriteFn = Arc::new(rewrite);
        let body = apply_rewrite(&base, &rewrite)
            .map_err(|reason| HookError::conflict(target, reason))?;

        let mut chains = self.chains.lock();
        if chains.get(target).map_or(0, |c| c.generation) != generation {
            return Err(HookError::conflict(
                target,
                "method body changed while the rewrite ran",
            ));
        }
        let id = self.next_id();
        let chain = chains.entry(target.clone()).or_default();
        chain.rewrites.push((id, rewrite));
        chain.rewritten = Some(Arc::new(body));
        chain.generation += 1;
        self.commit(&mut chains, target);
        drop(chains);

        self.record(id, target, HookKind::Rewrite);
        Ok(HookHandle::new(id, target.clone()))
    }

    /// Removes a hook. The remaining links keep their order.
    ///
    /// Removing a rewrite rebuilds the body from the pristine one with the
    /// remaining rewrites. Those that no longer apply are marked inactive and
    /// listed in the report. Removing the last hook of a method restores the
    /// pristine method.
    pub fn remove(&self, handle: &HookHandle) -> Result<RemoveReport, HookError> {
        let target = handle.target();
        if self.is_frozen() {
            return Err(HookError::conflict(target, "hook state is frozen"));
        }
        let kind = self.records.get(&handle.id()).map(|r| r.kind);
        if kind == Some(HookKind::Rewrite) && self.rewriting.lock().contains(target) {
            return Err(HookError::conflict(
                target,
                "a rewrite of this method is in progress",
            ));
        }
        let Some((_, record)) = self.records.remove(&handle.id()) else {
            warn!(hook = %handle.id(), target = %target, "Hook already removed");
            return Err(HookError::AlreadyRemoved(handle.id()));
        };

        let mut report = RemoveReport::default();
        match record.kind {
            HookKind::Detour => {
                let mut chains = self.chains.lock();
                if let Some(chain) = chains.get_mut(target) {
                    chain.detours.retain(|(id, _)| *id != record.id);
                }
                self.commit(&mut chains, target);
            }
            HookKind::Rewrite => report.deactivated = self.remove_rewrite(target, record.id),
        }

        info!(
            hook = %record.id,
            target = %target,
            kind = %record.kind,
            owner = record.owner.as_deref().unwrap_or("-"),
            "Hook removed"
        );
        Ok(report)
    }

    /// Returns the rewrites that stopped applying.
    fn remove_rewrite(&self, target: &MethodId, id: HookId) -> Vec<HookHandle> {
        let _guard = self.begin_rewrite(target).ok();
        let (remaining, generation) = {
            let mut chains = self.chains.lock();
            let Some(chain) = chains.get_mut(target) else {
                return Vec::new();
            };
            chain.rewrites.retain(|(r, _)| *r != id);
            chain.generation += 1;
            (chain.rewrites.clone(), chain.generation)
        };

        let (rebuilt, skipped) = self.rebuild(target, &remaining);

        let mut chains = self.chains.lock();
        let mut deactivated = Vec::new();
        if let Some(chain) = chains.get_mut(target) {
            if chain.generation == generation {
                chain.rewritten = rebuilt;
                for (r, _) in &remaining {
                    let Some(mut record) = self.records.get_mut(r) else {
                        continue;
                    };
                    let active = !skipped.contains(r);
                    if record.active && !active {
                        deactivated.push(HookHandle::new(*r, target.clone()));
                    }
                    record.active = active;
                }
            }
        }
        self.commit(&mut chains, target);
        deactivated
    }

    /// Pristine body with `rewrites` applied in order, and the rewrites that
    /// no longer apply and were skipped.
    fn rebuild(
        &self,
        target: &MethodId,
        rewrites: &[(HookId, RewriteFn)],
    ) -> (Option<Arc<MethodBody>>, Vec<HookId>) {
        let mut skipped = Vec::new();
        if rewrites.is_empty() {
            return (None, skipped);
        }
        let Some(pristine) = self.runtime.pristine(target).and_then(|m| m.body().cloned()) else {
            return (None, skipped);
        };
        let mut current = (*pristine).clone();
        for (id, rewrite) in rewrites {
            match apply_rewrite(&current, rewrite) {
                Ok(body) => current = body,
                Err(reason) => {
                    warn!(hook = %id, target = %target, "Rewrite no longer applies, marking it inactive: {}", reason);
                    skipped.push(*id);
                }
            }
        }
        (Some(Arc::new(current)), skipped)
    }

    /// Rebuilds and publishes the redirection of `target` from its chain.
    fn commit(&self, chains: &mut HashMap<MethodId, Chain>, target: &MethodId) {
        let redirection = match chains.get(target) {
            Some(chain) if !chain.is_empty() => {
                let original = match &chain.rewritten {
                    Some(body) => Some(MethodImpl::Body(Arc::clone(body))),
                    None => self.runtime.pristine(target),
                };
                original.map(|original| {
                    Arc::new(Redirection {
                        target: target.clone(),
                        links: chain.detours.clone(),
                        original,
                    })
                })
            }
            _ => {
                chains.remove(target);
                None
            }
        };
        debug!(
            target = %target,
            redirected = redirection.is_some(),
            "Publishing redirection"
        );
        self.runtime.set_redirection(target, redirection);
    }

    fn check_installable(&self, target: &MethodId) -> Result<(), HookError> {
        if self.is_frozen() {
            return Err(HookError::conflict(target, "hook state is frozen"));
        }
        if !self.runtime.contains(target) {
            return Err(HookError::HookTargetNotFound(target.clone()));
        }
        Ok(())
    }

    fn begin_rewrite(&self, target: &MethodId) -> Result<RewriteGuard<'_>, HookError> {
        if !self.rewriting.lock().insert(target.clone()) {
            return Err(HookError::conflict(
                target,
                "a rewrite of this method is in progress",
            ));
        }
        Ok(RewriteGuard {
            set: &self.rewriting,
            target: target.clone(),
        })
    }

    fn next_id(&self) -> HookId {
        HookId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, id: HookId, target: &MethodId, kind: HookKind) {
        let owner = self.scope.current();
        info!(
            hook = %id,
            target = %target,
            kind = %kind,
            owner = owner.as_deref().unwrap_or("-"),
            "Hook installed"
        );
        self.records.insert(
            id,
            HookRecord {
                id,
                target: target.clone(),
                kind,
                sequence: id.0,
                active: true,
                owner,
                installed_at: Utc::now(),
            },
        );
    }

    /// Every hook record in install order, inactive rewrites included.
    pub fn snapshot(&self) -> Vec<HookRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.id);
        records
    }

    /// Hooks attributed to `module`, in install order.
    pub fn owned_by(&self, module: &str) -> Vec<HookHandle> {
        let mut owned: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.owner.as_deref() == Some(module))
            .map(|r| HookHandle::new(r.id, r.target.clone()))
            .collect();
        owned.sort_by_key(|h| h.id());
        owned
    }

    pub fn handle(&self, id: HookId) -> Option<HookHandle> {
        self.records
            .get(&id)
            .map(|r| HookHandle::new(r.id, r.target.clone()))
    }

    /// Ids of the hooks on `target` that take effect, in install order.
    pub fn chain(&self, target: &MethodId) -> Vec<HookId> {
        let mut ids: Vec<_> = self
            .records
            .iter()
            .filter(|r| &r.target == target && r.active)
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    /// The body calls to `target` currently execute after all detours, if the
    /// method has one.
    pub fn effective_body(&self, target: &MethodId) -> Option<Arc<MethodBody>> {
        let rewritten = self
            .chains
            .lock()
            .get(target)
            .and_then(|c| c.rewritten.clone());
        rewritten.or_else(|| self.runtime.pristine(target)?.body().cloned())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Logs every installed hook, for crash diagnostics.
    pub fn log_active_hooks(&self) {
        let records = self.snapshot();
        if records.is_empty() {
            info!("No active hooks");
            return;
        }
        let inactive = records.iter().filter(|r| !r.active).count();
        info!("{} active hook(s):", records.len() - inactive);
        for r in records {
            info!(
                "  {} {} on {} (owner: {}){}",
                r.id,
                r.kind,
                r.target,
                r.owner.as_deref().unwrap_or("-"),
                if r.active { "" } else { " [inactive]" }
            );
        }
    }

    /// Rejects every later install and remove.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            info!("Hook state frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

/// Runs `rewrite` on a copy of `base` and validates the result.
fn apply_rewrite(base: &MethodBody, rewrite: &RewriteFn) -> Result<MethodBody, String> {
    let mut working = base.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut cursor = ILCursor::new(&mut working);
        rewrite(&mut cursor)
    }));
    match outcome {
        Err(payload) => Err(format!(
            "rewrite panicked: {}",
            Exception::from_panic(payload.as_ref()).message
        )),
        Ok(Err(e)) => Err(format!("rewrite failed: {e}")),
        Ok(Ok(())) => {
            working
                .validate()
                .map_err(|e| format!("rewritten body is invalid: {e}"))?;
            Ok(working)
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
