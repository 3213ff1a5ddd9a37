//! Instruction representation, operand types and per-opcode metadata.
//!
//! The instruction set is a small stack machine modelled after CIL: arguments
//! and locals are loaded onto an evaluation stack, calls pop their arguments
//! and push their result, branches target [`Label`]s. Every [`OpCode`] expects
//! exactly one [`OperandKind`]; [`Instruction::new`] rejects any other operand
//! so a body can never hold a malformed instruction.
//!
//! Each instruction placed into a body receives an [`InstrId`] that never
//! changes for its lifetime. Labels and exception regions point at ids rather
//! than indices, which is what keeps them valid across insertions.

use std::fmt;
use std::sync::Arc;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::CursorError;
use crate::method::MethodId;
use crate::value::Value;

/// Operation performed by an instruction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum OpCode {
    Nop,
    /// Push argument slot.
    Ldarg,
    /// Pop into argument slot.
    Starg,
    /// Push local slot.
    Ldloc,
    /// Pop into local slot.
    Stloc,
    /// Push an int, float or bool constant.
    Ldc,
    /// Push a string constant.
    Ldstr,
    Dup,
    Pop,
    Add,
    Sub,
    Mul,
    Ceq,
    Cgt,
    Clt,
    Not,
    Br,
    Brtrue,
    Brfalse,
    /// Empty the stack and branch out of a protected region.
    Leave,
    Call,
    /// Instance call; the signature must carry `this`.
    Callvirt,
    Ret,
    /// Pop a message and raise it as an exception.
    Throw,
}

/// Operand shape an opcode expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Constant,
    String,
    Arg,
    Local,
    Label,
    Method,
}

/// Control-flow behavior of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction.
    Next,
    /// Unconditional branch.
    Branch,
    /// Branch or fall through.
    ConditionalBranch,
    /// Branch after clearing the stack.
    Leave,
    Return,
    Throw,
}

impl OpCode {
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::Ldarg | OpCode::Starg => OperandKind::Arg,
            OpCode::Ldloc | OpCode::Stloc => OperandKind::Local,
            OpCode::Ldc => OperandKind::Constant,
            OpCode::Ldstr => OperandKind::String,
            OpCode::Br | OpCode::Brtrue | OpCode::Brfalse | OpCode::Leave => OperandKind::Label,
            OpCode::Call | OpCode::Callvirt => OperandKind::Method,
            _ => OperandKind::None,
        }
    }

    pub const fn flow(self) -> FlowType {
        match self {
            OpCode::Br => FlowType::Branch,
            OpCode::Brtrue | OpCode::Brfalse => FlowType::ConditionalBranch,
            OpCode::Leave => FlowType::Leave,
            OpCode::Ret => FlowType::Return,
            OpCode::Throw => FlowType::Throw,
            _ => FlowType::Next,
        }
    }

    /// Mnemonic as it appears in listings.
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }
}

/// Forward or backward branch target, owned by one method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_L{}", self.0)
    }
}

/// Identity of an instruction inside its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Arc<str>),
    Arg(u16),
    Local(u16),
    Label(Label),
    Method(MethodId),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Int(_) | Operand::Float(_) | Operand::Bool(_) => OperandKind::Constant,
            Operand::Str(_) => OperandKind::String,
            Operand::Arg(_) => OperandKind::Arg,
            Operand::Local(_) => OperandKind::Local,
            Operand::Label(_) => OperandKind::Label,
            Operand::Method(_) => OperandKind::Method,
        }
    }

    /// Constant operands as the value they push.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Operand::Int(i) => Some(Value::Int(*i)),
            Operand::Float(f) => Some(Value::Float(*f)),
            Operand::Bool(b) => Some(Value::Bool(*b)),
            Operand::Str(s) => Some(Value::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int(i) => write!(f, "{i}"),
            Operand::Float(x) => write!(f, "{x}"),
            Operand::Bool(b) => write!(f, "{b}"),
            Operand::Str(s) => write!(f, "\"{s}\""),
            Operand::Arg(a) => write!(f, "{a}"),
            Operand::Local(l) => write!(f, "V_{l}"),
            Operand::Label(l) => write!(f, "{l}"),
            Operand::Method(m) => write!(f, "{m}"),
        }
    }
}

/// Values an instruction pops and pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    pub pops: usize,
    pub pushes: usize,
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    opcode: OpCode,
    operand: Operand,
}

impl Instruction {
    /// Creates an instruction, checking the operand against the opcode.
    pub fn new(opcode: OpCode, operand: Operand) -> Result<Self, CursorError> {
        if opcode.operand_kind() != operand.kind() {
            return Err(CursorError::OperandMismatch {
                opcode: opcode.mnemonic(),
                expected: opcode.operand_kind(),
                found: operand.kind(),
            });
        }
        if opcode == OpCode::Callvirt {
            if let Operand::Method(m) = &operand {
                if !m.signature().has_this {
                    return Err(CursorError::StaticCallvirt(m.clone()));
                }
            }
        }
        Ok(Self { opcode, operand })
    }

    /// Instructions without an operand.
    pub fn simple(opcode: OpCode) -> Result<Self, CursorError> {
        Self::new(opcode, Operand::None)
    }

    pub fn nop() -> Self {
        Self {
            opcode: OpCode::Nop,
            operand: Operand::None,
        }
    }

    pub fn ret() -> Self {
        Self {
            opcode: OpCode::Ret,
            operand: Operand::None,
        }
    }

    pub fn pop() -> Self {
        Self {
            opcode: OpCode::Pop,
            operand: Operand::None,
        }
    }

    pub fn ldarg(index: u16) -> Self {
        Self {
            opcode: OpCode::Ldarg,
            operand: Operand::Arg(index),
        }
    }

    pub fn ldloc(index: u16) -> Self {
        Self {
            opcode: OpCode::Ldloc,
            operand: Operand::Local(index),
        }
    }

    pub fn stloc(index: u16) -> Self {
        Self {
            opcode: OpCode::Stloc,
            operand: Operand::Local(index),
        }
    }

    pub fn ldc_int(value: i64) -> Self {
        Self {
            opcode: OpCode::Ldc,
            operand: Operand::Int(value),
        }
    }

    pub fn ldc_bool(value: bool) -> Self {
        Self {
            opcode: OpCode::Ldc,
            operand: Operand::Bool(value),
        }
    }

    pub fn ldstr(value: &str) -> Self {
        Self {
            opcode: OpCode::Ldstr,
            operand: Operand::Str(Arc::from(value)),
        }
    }

    pub fn call(method: MethodId) -> Self {
        Self {
            opcode: OpCode::Call,
            operand: Operand::Method(method),
        }
    }

    pub fn callvirt(method: MethodId) -> Result<Self, CursorError> {
        Self::new(OpCode::Callvirt, Operand::Method(method))
    }

    pub fn branch(opcode: OpCode, label: Label) -> Result<Self, CursorError> {
        Self::new(opcode, Operand::Label(label))
    }

    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Replaces the opcode, keeping the operand. Fails if the operand no
    /// longer fits.
    pub fn set_opcode(&mut self, opcode: OpCode) -> Result<(), CursorError> {
        let replaced = Instruction::new(opcode, self.operand.clone())?;
        *self = replaced;
        Ok(())
    }

    /// Replaces the operand, keeping the opcode.
    pub fn set_operand(&mut self, operand: Operand) -> Result<(), CursorError> {
        let replaced = Instruction::new(self.opcode, operand)?;
        *self = replaced;
        Ok(())
    }

    pub fn method(&self) -> Option<&MethodId> {
        match &self.operand {
            Operand::Method(m) => Some(m),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<Label> {
        match self.operand {
            Operand::Label(l) => Some(l),
            _ => None,
        }
    }

    /// Stack effect inside a method whose signature returns `method_returns`.
    pub fn stack_behavior(&self, method_returns: bool) -> StackBehavior {
        let (pops, pushes) = match self.opcode {
            OpCode::Nop | OpCode::Br | OpCode::Leave => (0, 0),
            OpCode::Ldarg | OpCode::Ldloc | OpCode::Ldc | OpCode::Ldstr => (0, 1),
            OpCode::Starg | OpCode::Stloc | OpCode::Pop => (1, 0),
            OpCode::Dup => (1, 2),
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Ceq | OpCode::Cgt | OpCode::Clt => {
                (2, 1)
            }
            OpCode::Not => (1, 1),
            OpCode::Brtrue | OpCode::Brfalse | OpCode::Throw => (1, 0),
            OpCode::Call | OpCode::Callvirt => match &self.operand {
                Operand::Method(m) => {
                    let sig = m.signature();
                    (sig.arg_count(), usize::from(sig.returns))
                }
                _ => (0, 0),
            },
            OpCode::Ret => (usize::from(method_returns), 0),
        };
        StackBehavior { pops, pushes }
    }

    pub fn match_opcode(&self, opcode: OpCode) -> bool {
        self.opcode == opcode
    }

    /// `call` to `Type::name`, any signature.
    pub fn match_call(&self, declaring_type: &str, name: &str) -> bool {
        self.opcode == OpCode::Call && self.match_method_name(declaring_type, name)
    }

    /// `callvirt` to `Type::name`, any signature.
    pub fn match_callvirt(&self, declaring_type: &str, name: &str) -> bool {
        self.opcode == OpCode::Callvirt && self.match_method_name(declaring_type, name)
    }

    /// Either call form to exactly `method`.
    pub fn match_call_to(&self, method: &MethodId) -> bool {
        matches!(self.opcode, OpCode::Call | OpCode::Callvirt) && self.method() == Some(method)
    }

    pub fn match_ldarg(&self, index: u16) -> bool {
        self.opcode == OpCode::Ldarg && self.operand == Operand::Arg(index)
    }

    pub fn match_ldstr(&self, value: &str) -> bool {
        self.opcode == OpCode::Ldstr && matches!(&self.operand, Operand::Str(s) if &**s == value)
    }

    pub fn match_ldc_int(&self, value: i64) -> bool {
        self.opcode == OpCode::Ldc && self.operand == Operand::Int(value)
    }

    pub fn match_ret(&self) -> bool {
        self.opcode == OpCode::Ret
    }

    fn match_method_name(&self, declaring_type: &str, name: &str) -> bool {
        self.method()
            .is_some_and(|m| m.declaring_type() == declaring_type && m.name() == name)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            _ => write!(f, "{} {}", self.opcode, self.operand),
        }
    }
}
