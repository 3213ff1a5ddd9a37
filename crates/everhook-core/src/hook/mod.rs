//! Method interception: detours, instruction rewrites and their chains.
//!
//! Every hooked method has exactly one [`Redirection`] in the runtime. It
//! holds the detours in install order and the body produced by all installed
//! rewrites. Installing or removing a hook rebuilds the redirection; removing
//! the last hook drops it and the pristine method is back.
//!
//! The two kinds are layered, not interleaved: detours always run outside the
//! rewritten body, whichever was installed first. Install order only orders
//! detours among detours and rewrites among rewrites.
//!
//! Rewrites are reapplied to the pristine body whenever one of them is
//! removed. A rewrite that no longer applies stays registered but is marked
//! inactive until a later rebuild applies it again.

mod manager;
mod trampoline;

pub use manager::{HookManager, RewriteFn};
pub use trampoline::{Redirection, Replacement, Trampoline};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use everhook_il::MethodId;
use everhook_protocols::HookId;

/// How a hook changes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// Replacement function in front of the method.
    Detour,
    /// In-place edit of the method body.
    Rewrite,
}

/// Bookkeeping for one installed hook.
#[derive(Debug, Clone, Serialize)]
pub struct HookRecord {
    pub id: HookId,
    pub target: MethodId,
    pub kind: HookKind,
    /// Install sequence number; each kind runs in ascending order.
    pub sequence: u64,
    /// `false` for a rewrite that failed to reapply after another hook on
    /// the same method was removed.
    pub active: bool,
    /// Module that was current when the hook was installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub installed_at: DateTime<Utc>,
}

/// What removing a hook did to the rest of its method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveReport {
    /// Rewrites on the same method that stopped applying and are now inactive.
    pub deactivated: Vec<HookHandle>,
}

impl RemoveReport {
    pub fn is_clean(&self) -> bool {
        self.deactivated.is_empty()
    }
}

/// Returned by install; pass it back to remove the hook.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookHandle {
    id: HookId,
    target: MethodId,
}

impl HookHandle {
    pub(crate) fn new(id: HookId, target: MethodId) -> Self {
        Self { id, target }
    }

    pub fn id(&self) -> HookId {
        self.id
    }

    pub fn target(&self) -> &MethodId {
        &self.target
    }
}
