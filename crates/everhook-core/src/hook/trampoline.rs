//! Per-method redirection and the trampoline that walks its chain.

use std::sync::Arc;

use everhook_il::{Exception, MethodId, Value};
use everhook_protocols::HookId;

use crate::runtime::{HostRuntime, MethodImpl};

/// Replacement entry point of a detour. Call [`Trampoline::call`] to forward
/// to the next link; return without calling it to short-circuit.
pub type Replacement =
    Arc<dyn Fn(&Trampoline<'_>, &[Value]) -> Result<Value, Exception> + Send + Sync>;

/// The single physical redirection of one method.
///
/// Immutable once published. Install and remove build a new one and swap it
/// into the runtime, so a call that already entered the chain finishes on the
/// version it started with.
pub struct Redirection {
    pub(crate) target: MethodId,
    /// Detours in ascending install order.
    pub(crate) links: Vec<(HookId, Replacement)>,
    /// What the last link forwards to: the pristine method or the body
    /// produced by the installed rewrites.
    pub(crate) original: MethodImpl,
}

impl Redirection {
    pub fn target(&self) -> &MethodId {
        &self.target
    }

    pub fn hook_ids(&self) -> impl Iterator<Item = HookId> + '_ {
        self.links.iter().map(|(id, _)| *id)
    }
}

/// Position inside a redirection chain, handed to each replacement.
pub struct Trampoline<'r> {
    runtime: &'r HostRuntime,
    redirection: &'r Redirection,
    next: usize,
}

impl<'r> Trampoline<'r> {
    pub(crate) fn new(runtime: &'r HostRuntime, redirection: &'r Redirection) -> Self {
        Self {
            runtime,
            redirection,
            next: 0,
        }
    }

    /// Runs the rest of the chain: the next detour if there is one, otherwise
    /// the original method.
    pub fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        match self.redirection.links.get(self.next) {
            Some((_, replacement)) => {
                let next = Trampoline {
                    runtime: self.runtime,
                    redirection: self.redirection,
                    next: self.next + 1,
                };
                replacement(&next, args)
            }
            None => self.runtime.run(&self.redirection.original, args),
        }
    }

    /// The hooked method.
    pub fn target(&self) -> &MethodId {
        &self.redirection.target
    }

    /// The runtime, for calling other host methods from a replacement.
    pub fn runtime(&self) -> &HostRuntime {
        self.runtime
    }
}
