//! # Everhook IL
//!
//! Language-neutral method bodies for the everhook interception engine.
//!
//! ## Components
//!
//! - [`Instruction`] / [`OpCode`] - the stack-machine instruction set
//! - [`MethodBody`] - instructions, labels, exception regions and validation
//! - [`ILCursor`] - pattern search and in-place editing of a body
//! - [`execute`] - interpreter that runs a body against a [`Dispatcher`]

pub mod body;
pub mod cursor;
pub mod error;
pub mod exception;
pub mod instruction;
pub mod interpreter;
pub mod method;
pub mod value;

pub use body::{ExceptionRegion, MethodBody};
pub use cursor::{ILCursor, Matcher, MoveType};
pub use error::{CursorError, ValidationError};
pub use exception::Exception;
pub use instruction::{
    FlowType, InstrId, Instruction, Label, OpCode, Operand, OperandKind, StackBehavior,
};
pub use interpreter::{Dispatcher, execute};
pub use method::{MethodId, Signature};
pub use value::Value;
