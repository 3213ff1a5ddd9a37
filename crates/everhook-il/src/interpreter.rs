//! Executes method bodies.
//!
//! Calls are not resolved here: every `call`/`callvirt` goes through the
//! [`Dispatcher`], which is where the host runtime applies redirections.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::trace;

use crate::body::{MethodBody, ResolvedRegion};
use crate::exception::Exception;
use crate::instruction::{OpCode, Operand};
use crate::method::MethodId;
use crate::value::Value;

/// Resolves calls made by an executing body.
pub trait Dispatcher {
    fn dispatch(&self, method: &MethodId, args: &[Value]) -> Result<Value, Exception>;
}

struct Frame<'b> {
    body: &'b MethodBody,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    regions: Vec<ResolvedRegion>,
}

enum Step {
    Next,
    Jump(usize),
    Return(Value),
}

/// Runs `body` with `args` and returns its result (`Value::Unit` for methods
/// without a return value).
///
/// An exception escaping an instruction inside a protected region clears the
/// stack, pushes the exception message and continues at the region's handler.
/// Exceptions with no enclosing region propagate to the caller with the
/// method appended to their trace.
pub fn execute(
    body: &MethodBody,
    args: &[Value],
    dispatcher: &dyn Dispatcher,
) -> Result<Value, Exception> {
    let sig = body.method().signature();
    if args.len() != sig.arg_count() {
        return Err(Exception::invalid_program(format!(
            "{} expects {} argument(s), got {}",
            body.method(),
            sig.arg_count(),
            args.len()
        )));
    }

    let mut frame = Frame {
        body,
        args: args.to_vec(),
        locals: vec![Value::Unit; usize::from(body.locals())],
        stack: Vec::new(),
        regions: body.resolved_regions(),
    };

    let mut pc = 0usize;
    loop {
        match frame.step(pc, dispatcher) {
            Ok(Step::Next) => pc += 1,
            Ok(Step::Jump(target)) => pc = target,
            Ok(Step::Return(value)) => return Ok(value),
            Err(mut exc) => match frame.handler_for(pc) {
                Some(handler) => {
                    trace!(method = %body.method(), pc, handler, "exception caught: {}", exc);
                    frame.stack.clear();
                    frame.stack.push(Value::from(exc.message.as_str()));
                    pc = handler;
                }
                None => {
                    exc.push_frame(body.method().full_name());
                    return Err(exc);
                }
            },
        }
    }
}

impl Frame<'_> {
    fn step(&mut self, pc: usize, dispatcher: &dyn Dispatcher) -> Result<Step, Exception> {
        let body = self.body;
        let instr = body.instruction(pc).ok_or_else(|| {
            Exception::invalid_program(format!("{} ran past its last instruction", body.method()))
        })?;

        match (instr.opcode(), instr.operand()) {
            (OpCode::Nop, _) => {}
            (OpCode::Ldarg, Operand::Arg(a)) => {
                let v = self.slot(&self.args, *a, "argument")?;
                self.stack.push(v);
            }
            (OpCode::Starg, Operand::Arg(a)) => {
                let v = self.pop()?;
                let slot = self
                    .args
                    .get_mut(usize::from(*a))
                    .ok_or_else(|| Exception::invalid_program(format!("no argument {a}")))?;
                *slot = v;
            }
            (OpCode::Ldloc, Operand::Local(l)) => {
                let v = self.slot(&self.locals, *l, "local")?;
                self.stack.push(v);
            }
            (OpCode::Stloc, Operand::Local(l)) => {
                let v = self.pop()?;
                let slot = self
                    .locals
                    .get_mut(usize::from(*l))
                    .ok_or_else(|| Exception::invalid_program(format!("no local {l}")))?;
                *slot = v;
            }
            (OpCode::Ldc | OpCode::Ldstr, operand) => {
                let v = operand
                    .as_value()
                    .ok_or_else(|| Exception::invalid_program("constant without a value"))?;
                self.stack.push(v);
            }
            (OpCode::Dup, _) => {
                let v = self.pop()?;
                self.stack.push(v.clone());
                self.stack.push(v);
            }
            (OpCode::Pop, _) => {
                self.pop()?;
            }
            (op @ (OpCode::Add | OpCode::Sub | OpCode::Mul), _) => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(arithmetic(op, &a, &b)?);
            }
            (OpCode::Ceq, _) => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(a == b));
            }
            (op @ (OpCode::Cgt | OpCode::Clt), _) => {
                let b = self.pop()?;
                let a = self.pop()?;
                let ord = compare(&a, &b)?;
                let wanted = if op == OpCode::Cgt { Ordering::Greater } else { Ordering::Less };
                self.stack.push(Value::Bool(ord == wanted));
            }
            (OpCode::Not, _) => {
                let v = self.pop()?;
                self.stack.push(Value::Bool(!v.is_truthy()));
            }
            (OpCode::Br, _) => return Ok(Step::Jump(self.branch_target(pc)?)),
            (op @ (OpCode::Brtrue | OpCode::Brfalse), _) => {
                let v = self.pop()?;
                if v.is_truthy() == (op == OpCode::Brtrue) {
                    return Ok(Step::Jump(self.branch_target(pc)?));
                }
            }
            (OpCode::Leave, _) => {
                self.stack.clear();
                return Ok(Step::Jump(self.branch_target(pc)?));
            }
            (op @ (OpCode::Call | OpCode::Callvirt), Operand::Method(method)) => {
                let sig = method.signature();
                let n = sig.arg_count();
                if self.stack.len() < n {
                    return Err(self.underflow());
                }
                let call_args = self.stack.split_off(self.stack.len() - n);
                if op == OpCode::Callvirt && call_args.first() == Some(&Value::Unit) {
                    return Err(Exception::new(
                        "NullReferenceException",
                        format!("callvirt {} on a null receiver", method.full_name()),
                    ));
                }
                let result = dispatcher.dispatch(method, &call_args)?;
                if sig.returns {
                    self.stack.push(result);
                }
            }
            (OpCode::Ret, _) => {
                let value = if body.method().signature().returns {
                    self.pop()?
                } else {
                    Value::Unit
                };
                return Ok(Step::Return(value));
            }
            (OpCode::Throw, _) => {
                let v = self.pop()?;
                let message = match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                };
                return Err(Exception::thrown(message));
            }
            (op, operand) => {
                return Err(Exception::invalid_program(format!(
                    "{op} cannot take operand {operand:?}"
                )));
            }
        }
        Ok(Step::Next)
    }

    fn pop(&mut self) -> Result<Value, Exception> {
        self.stack.pop().ok_or_else(|| self.underflow())
    }

    fn underflow(&self) -> Exception {
        Exception::invalid_program(format!("stack underflow in {}", self.body.method()))
    }

    fn slot(&self, slots: &[Value], index: u16, what: &str) -> Result<Value, Exception> {
        slots
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| Exception::invalid_program(format!("no {what} {index}")))
    }

    fn branch_target(&self, pc: usize) -> Result<usize, Exception> {
        self.body
            .instruction(pc)
            .and_then(|i| i.label())
            .and_then(|l| self.body.label_target(l))
            .ok_or_else(|| Exception::invalid_program(format!("unresolved branch at {pc}")))
    }

    /// Innermost region whose protected range covers `pc`.
    fn handler_for(&self, pc: usize) -> Option<usize> {
        self.regions
            .iter()
            .filter(|r| r.try_start <= pc && pc <= r.try_end)
            .min_by_key(|r| r.try_end - r.try_start)
            .map(|r| r.handler_start)
    }
}

fn arithmetic(op: OpCode, a: &Value, b: &Value) -> Result<Value, Exception> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(match op {
            OpCode::Add => x.wrapping_add(*y),
            OpCode::Sub => x.wrapping_sub(*y),
            _ => x.wrapping_mul(*y),
        })),
        (Value::Str(x), Value::Str(y)) if op == OpCode::Add => {
            Ok(Value::Str(Arc::from(format!("{x}{y}"))))
        }
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => Ok(Value::Float(match op {
                OpCode::Add => x + y,
                OpCode::Sub => x - y,
                _ => x * y,
            })),
            _ => Err(Exception::invalid_cast(format!(
                "cannot {op} {} and {}",
                a.kind(),
                b.kind()
            ))),
        },
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, Exception> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => a
            .as_float()
            .zip(b.as_float())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| {
                Exception::invalid_cast(format!("cannot compare {} and {}", a.kind(), b.kind()))
            }),
    }
}

#[cfg(test)]
#[path = "interpreter_tests.rs"]
mod tests;
