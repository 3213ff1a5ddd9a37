//! Errors raised while editing or validating method bodies.

use thiserror::Error;

use crate::instruction::{Label, OperandKind};
use crate::method::MethodId;

/// Errors from [`crate::ILCursor`] edits.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("{opcode} expects a {expected:?} operand, found {found:?}")]
    OperandMismatch {
        opcode: &'static str,
        expected: OperandKind,
        found: OperandKind,
    },

    #[error("callvirt target has no `this`: {0}")]
    StaticCallvirt(MethodId),

    #[error("no matching instruction found in {method}")]
    NoMatch { method: MethodId },

    #[error("cursor is at the end of {method}")]
    AtEnd { method: MethodId },

    #[error("label {0} does not belong to this body")]
    UnknownLabel(Label),

    #[error("instruction at index {index} is referenced by a label or exception region")]
    InstructionReferenced { index: usize },

    #[error("index {index} is out of range (body has {len} instructions)")]
    OutOfRange { index: usize, len: usize },

    #[error("invalid method body: {0}")]
    Invalid(#[from] ValidationError),

    #[error("{0}")]
    Custom(String),
}

/// Structural problems found by [`crate::MethodBody::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("method body is empty")]
    Empty,

    #[error("stack underflow at {index}: needs {needed}, has {available}")]
    StackUnderflow {
        index: usize,
        needed: usize,
        available: usize,
    },

    #[error("inconsistent stack depth at {index}: {expected} vs {found}")]
    StackMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("ret at {index} leaves {depth} value(s) on the stack, expected {expected}")]
    UnbalancedReturn {
        index: usize,
        depth: usize,
        expected: usize,
    },

    #[error("execution falls off the end after index {index}")]
    FallsOffEnd { index: usize },

    #[error("label {label} used at {index} is never marked")]
    UnmarkedLabel { label: Label, index: usize },

    #[error("label {0} is not defined in this body")]
    UndefinedLabel(Label),

    #[error("argument {arg} at {index} is out of range")]
    ArgOutOfRange { index: usize, arg: u16 },

    #[error("local {local} at {index} is out of range")]
    LocalOutOfRange { index: usize, local: u16 },

    #[error("exception region {region} is malformed: {reason}")]
    BadRegion { region: usize, reason: &'static str },
}
