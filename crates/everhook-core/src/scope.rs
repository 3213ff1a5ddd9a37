//! Ambient "current module" used to attribute hooks and subscriptions.

use std::sync::Arc;

use parking_lot::Mutex;

/// Tracks which module, if any, is running a lifecycle phase right now.
#[derive(Debug, Default)]
pub struct ModuleScope {
    current: Mutex<Option<String>>,
}

impl ModuleScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Makes `module` current until the guard drops; the previous value is
    /// restored then, so nested phases unwind correctly.
    pub fn enter(self: &Arc<Self>, module: &str) -> ScopeGuard {
        let previous = self.current.lock().replace(module.to_string());
        ScopeGuard {
            scope: Arc::clone(self),
            previous,
        }
    }
}

/// Restores the previous current module on drop.
#[must_use = "the module scope ends when the guard is dropped"]
pub struct ScopeGuard {
    scope: Arc<ModuleScope>,
    previous: Option<String>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        *self.scope.current.lock() = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_restore() {
        let scope = Arc::new(ModuleScope::new());
        assert_eq!(scope.current(), None);
        {
            let _outer = scope.enter("a");
            assert_eq!(scope.current().as_deref(), Some("a"));
            {
                let _inner = scope.enter("b");
                assert_eq!(scope.current().as_deref(), Some("b"));
            }
            assert_eq!(scope.current().as_deref(), Some("a"));
        }
        assert_eq!(scope.current(), None);
    }

    #[test]
    fn test_restored_on_panic() {
        let scope = Arc::new(ModuleScope::new());
        let s = Arc::clone(&scope);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _g = s.enter("crashy");
            panic!("phase failed");
        }));
        assert!(result.is_err());
        assert_eq!(scope.current(), None);
    }
}
