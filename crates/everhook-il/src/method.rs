//! Method identities.
//!
//! A [`MethodId`] names a host method by its declaring type, its name and its
//! [`Signature`]. Two ids are the same method only if all three match, so an
//! overload with a different arity is a different target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a method's call frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    /// Instance methods receive the object as argument 0.
    pub has_this: bool,
    /// Declared parameters, not counting `this`.
    pub params: u8,
    /// Whether the method leaves a value on the caller's stack.
    pub returns: bool,
}

impl Signature {
    /// A static method returning nothing.
    pub const fn new(params: u8) -> Self {
        Self {
            has_this: false,
            params,
            returns: false,
        }
    }

    /// An instance method returning nothing.
    pub const fn instance(params: u8) -> Self {
        Self {
            has_this: true,
            params,
            returns: false,
        }
    }

    pub const fn returning(mut self) -> Self {
        self.returns = true;
        self
    }

    /// Number of argument slots including `this`.
    pub const fn arg_count(&self) -> usize {
        self.params as usize + if self.has_this { 1 } else { 0 }
    }
}

/// Stable identity of a host method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId {
    declaring_type: String,
    name: String,
    signature: Signature,
}

impl MethodId {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        signature: Signature,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            signature,
        }
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// `Type::Name`, without the signature.
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ret = if self.signature.returns { "value" } else { "void" };
        write!(f, "{} {}::{}(", ret, self.declaring_type, self.name)?;
        let mut first = true;
        if self.signature.has_this {
            write!(f, "this")?;
            first = false;
        }
        for i in 0..self.signature.params {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "arg{i}")?;
            first = false;
        }
        write!(f, ")")
    }
}
