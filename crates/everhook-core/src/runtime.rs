//! Host runtime: the method table every call goes through.
//!
//! Each host method is either an instruction body run by the interpreter or a
//! native Rust function. The table keeps the pristine definition of every
//! method; redirections installed by the hook manager sit in a separate map and
//! take precedence at dispatch. Removing the last redirection therefore
//! restores the pristine method without touching the table.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use everhook_il::{Dispatcher, Exception, MethodBody, MethodId, ValidationError, Value, execute};

use crate::hook::{Redirection, Trampoline};

/// Native method implementation. Receives the runtime so it can call back
/// into other host methods.
pub type NativeFn = Arc<dyn Fn(&HostRuntime, &[Value]) -> Result<Value, Exception> + Send + Sync>;

/// Definition of a host method.
#[derive(Clone)]
pub enum MethodImpl {
    Body(Arc<MethodBody>),
    Native(NativeFn),
}

impl MethodImpl {
    pub fn body(&self) -> Option<&Arc<MethodBody>> {
        match self {
            MethodImpl::Body(b) => Some(b),
            MethodImpl::Native(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, MethodImpl::Native(_))
    }
}

impl std::fmt::Debug for MethodImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodImpl::Body(b) => write!(f, "Body({} instructions)", b.len()),
            MethodImpl::Native(_) => write!(f, "Native"),
        }
    }
}

/// The host application's method table.
#[derive(Default)]
pub struct HostRuntime {
    methods: DashMap<MethodId, MethodImpl>,
    redirections: RwLock<HashMap<MethodId, Arc<Redirection>>>,
}

impl HostRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines (or redefines) a method from an instruction body. The body is
    /// validated first.
    pub fn define_body(&self, body: MethodBody) -> Result<(), ValidationError> {
        body.validate()?;
        let id = body.method().clone();
        debug!(method = %id, instructions = body.len(), "Defining method body");
        self.methods.insert(id, MethodImpl::Body(Arc::new(body)));
        Ok(())
    }

    /// Defines a native method.
    pub fn define_native<F>(&self, id: MethodId, f: F)
    where
        F: Fn(&HostRuntime, &[Value]) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        debug!(method = %id, "Defining native method");
        self.methods.insert(id, MethodImpl::Native(Arc::new(f)));
    }

    pub fn contains(&self, id: &MethodId) -> bool {
        self.methods.contains_key(id)
    }

    /// The method as defined, ignoring redirections.
    pub fn pristine(&self, id: &MethodId) -> Option<MethodImpl> {
        self.methods.get(id).map(|m| m.value().clone())
    }

    /// All defined methods, sorted.
    pub fn methods(&self) -> Vec<MethodId> {
        let mut ids: Vec<_> = self.methods.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Finds a method by `Type::Name`, ignoring the signature.
    pub fn find(&self, declaring_type: &str, name: &str) -> Option<MethodId> {
        self.methods()
            .into_iter()
            .find(|m| m.declaring_type() == declaring_type && m.name() == name)
    }

    pub fn is_redirected(&self, id: &MethodId) -> bool {
        self.redirections.read().contains_key(id)
    }

    pub(crate) fn set_redirection(&self, id: &MethodId, redirection: Option<Arc<Redirection>>) {
        let mut map = self.redirections.write();
        match redirection {
            Some(r) => {
                map.insert(id.clone(), r);
            }
            None => {
                map.remove(id);
            }
        }
    }

    /// Calls a method through its redirection, if any.
    ///
    /// The redirection in place when the call starts is used for the whole
    /// call, so installs and removals made meanwhile only affect later calls.
    pub fn invoke(&self, id: &MethodId, args: &[Value]) -> Result<Value, Exception> {
        check_arity(id, args)?;
        let redirection = self.redirections.read().get(id).cloned();
        match redirection {
            Some(r) => Trampoline::new(self, &r).call(args),
            None => self.invoke_original(id, args),
        }
    }

    /// Calls the pristine definition, bypassing redirections.
    pub fn invoke_original(&self, id: &MethodId, args: &[Value]) -> Result<Value, Exception> {
        check_arity(id, args)?;
        let method = self
            .pristine(id)
            .ok_or_else(|| Exception::missing_method(id.to_string()))?;
        self.run(&method, args)
    }

    pub(crate) fn run(&self, method: &MethodImpl, args: &[Value]) -> Result<Value, Exception> {
        match method {
            MethodImpl::Body(body) => execute(body, args, self),
            MethodImpl::Native(f) => f(self, args),
        }
    }
}

impl Dispatcher for HostRuntime {
    fn dispatch(&self, method: &MethodId, args: &[Value]) -> Result<Value, Exception> {
        self.invoke(method, args)
    }
}

fn check_arity(id: &MethodId, args: &[Value]) -> Result<(), Exception> {
    let expected = id.signature().arg_count();
    if args.len() == expected {
        Ok(())
    } else {
        Err(Exception::invalid_program(format!(
            "{id} expects {expected} argument(s), got {}",
            args.len()
        )))
    }
}
