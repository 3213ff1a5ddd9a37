//! Hook installation errors.

use everhook_il::MethodId;
use thiserror::Error;

use crate::types::HookId;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook target not found: {0}")]
    HookTargetNotFound(MethodId),

    #[error("Cannot patch {target}: {reason}")]
    PatchConflict { target: MethodId, reason: String },

    #[error("Hook already removed: {0}")]
    AlreadyRemoved(HookId),
}

impl HookError {
    pub fn conflict(target: &MethodId, reason: impl Into<String>) -> Self {
        HookError::PatchConflict {
            target: target.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use everhook_il::Signature;

    fn target() -> MethodId {
        MethodId::new("Game.Spikes", "Render", Signature::instance(0))
    }

    #[test]
    fn test_target_not_found_error() {
        let err = HookError::HookTargetNotFound(target());
        let display = err.to_string();
        assert!(display.contains("not found"));
        assert!(display.contains("Game.Spikes::Render"));
    }

    #[test]
    fn test_conflict_error() {
        let err = HookError::conflict(&target(), "method is native");
        let display = err.to_string();
        assert!(display.contains("Cannot patch"));
        assert!(display.contains("method is native"));
    }

    #[test]
    fn test_already_removed_error() {
        let err = HookError::AlreadyRemoved(HookId(4));
        assert_eq!(err.to_string(), "Hook already removed: hook#4");
    }
}
