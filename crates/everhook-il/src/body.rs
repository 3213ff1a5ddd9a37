//! Method bodies: ordered instructions, labels, exception regions and locals.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{CursorError, ValidationError};
use crate::instruction::{FlowType, InstrId, Instruction, Label, Operand};
use crate::method::MethodId;

#[derive(Debug, Clone)]
struct Slot {
    id: InstrId,
    instr: Instruction,
}

/// A catch-all protected region. Boundaries are inclusive and refer to
/// instruction ids, so edits inside the region never move them.
///
/// When an exception escapes an instruction inside `try_start..=try_end`, the
/// stack is cleared, the exception message is pushed and execution resumes at
/// `handler_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRegion {
    pub try_start: InstrId,
    pub try_end: InstrId,
    pub handler_start: InstrId,
    pub handler_end: InstrId,
}

/// Region boundaries resolved to indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedRegion {
    pub try_start: usize,
    pub try_end: usize,
    pub handler_start: usize,
}

/// The instruction list of one method.
#[derive(Debug, Clone)]
pub struct MethodBody {
    method: MethodId,
    slots: Vec<Slot>,
    labels: Vec<Option<InstrId>>,
    regions: Vec<ExceptionRegion>,
    locals: u16,
    next_id: u32,
}

impl MethodBody {
    /// Creates an empty body. Use an [`crate::ILCursor`] to fill it.
    pub fn new(method: MethodId) -> Self {
        Self {
            method,
            slots: Vec::new(),
            labels: Vec::new(),
            regions: Vec::new(),
            locals: 0,
            next_id: 0,
        }
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.slots.iter().map(|s| &s.instr)
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.slots.get(index).map(|s| &s.instr)
    }

    pub(crate) fn instruction_mut(&mut self, index: usize) -> Option<&mut Instruction> {
        self.slots.get_mut(index).map(|s| &mut s.instr)
    }

    pub fn id_at(&self, index: usize) -> Option<InstrId> {
        self.slots.get(index).map(|s| s.id)
    }

    pub fn index_of(&self, id: InstrId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    pub fn locals(&self) -> u16 {
        self.locals
    }

    /// Adds a local slot and returns its index.
    pub fn declare_local(&mut self) -> u16 {
        self.locals += 1;
        self.locals - 1
    }

    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    pub fn add_region(&mut self, region: ExceptionRegion) {
        self.regions.push(region);
    }

    /// Appends an instruction.
    pub fn push(&mut self, instr: Instruction) -> InstrId {
        let index = self.slots.len();
        self.insert(index, instr)
    }

    pub(crate) fn insert(&mut self, index: usize, instr: Instruction) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        self.slots.insert(index, Slot { id, instr });
        id
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<Instruction, CursorError> {
        let len = self.slots.len();
        let id = self
            .id_at(index)
            .ok_or(CursorError::OutOfRange { index, len })?;
        if self.is_referenced(id) {
            return Err(CursorError::InstructionReferenced { index });
        }
        Ok(self.slots.remove(index).instr)
    }

    pub fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    pub(crate) fn mark_label(&mut self, label: Label, target: InstrId) -> Result<(), CursorError> {
        let slot = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or(CursorError::UnknownLabel(label))?;
        *slot = Some(target);
        Ok(())
    }

    /// Number of labels defined so far.
    pub fn label_count(&self) -> u32 {
        self.labels.len() as u32
    }

    /// Index of the instruction a label points at, if marked.
    pub fn label_target(&self, label: Label) -> Option<usize> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .and_then(|id| self.index_of(id))
    }

    /// Labels currently pointing at `id`.
    pub fn labels_at(&self, id: InstrId) -> Vec<Label> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, target)| **target == Some(id))
            .map(|(i, _)| Label(i as u32))
            .collect()
    }

    pub(crate) fn retarget_labels(&mut self, from: InstrId, to: InstrId) {
        for target in self.labels.iter_mut() {
            if *target == Some(from) {
                *target = Some(to);
            }
        }
    }

    /// Whether a label or region boundary refers to `id`.
    pub fn is_referenced(&self, id: InstrId) -> bool {
        self.labels.iter().any(|t| *t == Some(id))
            || self.regions.iter().any(|r| {
                r.try_start == id || r.try_end == id || r.handler_start == id || r.handler_end == id
            })
    }

    /// Maps each instruction id to its current index.
    pub(crate) fn index_map(&self) -> HashMap<InstrId, usize> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect()
    }

    pub(crate) fn resolved_regions(&self) -> Vec<ResolvedRegion> {
        let map = self.index_map();
        self.regions
            .iter()
            .filter_map(|r| {
                Some(ResolvedRegion {
                    try_start: *map.get(&r.try_start)?,
                    try_end: *map.get(&r.try_end)?,
                    handler_start: *map.get(&r.handler_start)?,
                })
            })
            .collect()
    }

    /// Checks structural validity.
    ///
    /// Every reachable instruction must see the same stack depth on all
    /// incoming paths, no instruction may pop more than is available, every
    /// `ret` must leave exactly the return value, and control must never run
    /// past the last instruction. Labels must be marked and region boundaries
    /// present and ordered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.slots.is_empty() {
            return Err(ValidationError::Empty);
        }

        let sig = self.method.signature();
        let map = self.index_map();
        let len = self.slots.len();

        let mut handler_entries = Vec::with_capacity(self.regions.len());
        for (region, r) in self.regions.iter().enumerate() {
            let lookup = |id: InstrId, reason: &'static str| {
                map.get(&id)
                    .copied()
                    .ok_or(ValidationError::BadRegion { region, reason })
            };
            let try_start = lookup(r.try_start, "try start removed")?;
            let try_end = lookup(r.try_end, "try end removed")?;
            let handler_start = lookup(r.handler_start, "handler start removed")?;
            let handler_end = lookup(r.handler_end, "handler end removed")?;
            if !(try_start <= try_end && try_end < handler_start && handler_start <= handler_end) {
                return Err(ValidationError::BadRegion {
                    region,
                    reason: "boundaries out of order",
                });
            }
            handler_entries.push(handler_start);
        }

        let mut branch_targets: Vec<Option<usize>> = vec![None; len];
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.instr.operand() {
                Operand::Arg(arg) if usize::from(*arg) >= sig.arg_count() => {
                    return Err(ValidationError::ArgOutOfRange { index, arg: *arg });
                }
                Operand::Local(local) if *local >= self.locals => {
                    return Err(ValidationError::LocalOutOfRange {
                        index,
                        local: *local,
                    });
                }
                Operand::Label(label) => {
                    let target = self
                        .labels
                        .get(label.0 as usize)
                        .ok_or(ValidationError::UndefinedLabel(*label))?
                        .and_then(|id| map.get(&id).copied())
                        .ok_or(ValidationError::UnmarkedLabel {
                            label: *label,
                            index,
                        })?;
                    branch_targets[index] = Some(target);
                }
                _ => {}
            }
        }

        let mut depths: Vec<Option<usize>> = vec![None; len];
        let mut work: Vec<(usize, usize)> = vec![(0, 0)];
        work.extend(handler_entries.into_iter().map(|h| (h, 1)));

        while let Some((index, depth)) = work.pop() {
            match depths[index] {
                Some(existing) if existing == depth => continue,
                Some(existing) => {
                    return Err(ValidationError::StackMismatch {
                        index,
                        expected: existing,
                        found: depth,
                    });
                }
                None => depths[index] = Some(depth),
            }

            let instr = &self.slots[index].instr;
            let effect = instr.stack_behavior(sig.returns);
            if effect.pops > depth {
                return Err(ValidationError::StackUnderflow {
                    index,
                    needed: effect.pops,
                    available: depth,
                });
            }
            let after = depth - effect.pops + effect.pushes;

            let fall_through = |work: &mut Vec<(usize, usize)>| {
                if index + 1 >= len {
                    Err(ValidationError::FallsOffEnd { index })
                } else {
                    work.push((index + 1, after));
                    Ok(())
                }
            };

            match instr.opcode().flow() {
                FlowType::Next => fall_through(&mut work)?,
                FlowType::Branch => {
                    if let Some(target) = branch_targets[index] {
                        work.push((target, after));
                    }
                }
                FlowType::ConditionalBranch => {
                    if let Some(target) = branch_targets[index] {
                        work.push((target, after));
                    }
                    fall_through(&mut work)?;
                }
                FlowType::Leave => {
                    if let Some(target) = branch_targets[index] {
                        work.push((target, 0));
                    }
                }
                FlowType::Return => {
                    if depth != effect.pops {
                        return Err(ValidationError::UnbalancedReturn {
                            index,
                            depth,
                            expected: effect.pops,
                        });
                    }
                }
                FlowType::Throw => {}
            }
        }

        Ok(())
    }

    /// Human-readable disassembly, one instruction per line.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "// {}", self.method);
        for (index, slot) in self.slots.iter().enumerate() {
            for label in self.labels_at(slot.id) {
                let _ = writeln!(out, "{label}:");
            }
            let _ = writeln!(out, "  IL_{index:04}: {}", slot.instr);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::OpCode;
    use crate::method::Signature;

    fn method(sig: Signature) -> MethodId {
        MethodId::new("Test.Type", "Method", sig)
    }

    #[test]
    fn test_empty_body_is_invalid() {
        let body = MethodBody::new(method(Signature::new(0)));
        assert_eq!(body.validate(), Err(ValidationError::Empty));
    }

    #[test]
    fn test_simple_valid_body() {
        let mut body = MethodBody::new(method(Signature::new(1).returning()));
        body.push(Instruction::ldarg(0));
        body.push(Instruction::ldc_int(1));
        body.push(Instruction::simple(OpCode::Add).unwrap());
        body.push(Instruction::ret());
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_unbalanced_return() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        body.push(Instruction::ldc_int(1));
        body.push(Instruction::ret());
        assert!(matches!(
            body.validate(),
            Err(ValidationError::UnbalancedReturn { index: 1, .. })
        ));
    }

    #[test]
    fn test_underflow() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        body.push(Instruction::pop());
        body.push(Instruction::ret());
        assert!(matches!(
            body.validate(),
            Err(ValidationError::StackUnderflow { index: 0, .. })
        ));
    }

    #[test]
    fn test_falls_off_end() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        body.push(Instruction::nop());
        assert_eq!(body.validate(), Err(ValidationError::FallsOffEnd { index: 0 }));
    }

    #[test]
    fn test_unmarked_label() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        let label = body.define_label();
        body.push(Instruction::branch(OpCode::Br, label).unwrap());
        body.push(Instruction::ret());
        assert!(matches!(
            body.validate(),
            Err(ValidationError::UnmarkedLabel { index: 0, .. })
        ));
    }

    #[test]
    fn test_arg_out_of_range() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        body.push(Instruction::ldarg(0));
        body.push(Instruction::pop());
        body.push(Instruction::ret());
        assert!(matches!(
            body.validate(),
            Err(ValidationError::ArgOutOfRange { index: 0, arg: 0 })
        ));
    }

    #[test]
    fn test_join_point_mismatch() {
        // brtrue skips a push, so the join sees depth 0 and depth 1.
        let mut body = MethodBody::new(method(Signature::new(1)));
        let label = body.define_label();
        body.push(Instruction::ldarg(0));
        body.push(Instruction::branch(OpCode::Brtrue, label).unwrap());
        body.push(Instruction::ldc_int(5));
        let ret = body.push(Instruction::ret());
        body.mark_label(label, ret).unwrap();
        assert!(matches!(
            body.validate(),
            Err(ValidationError::StackMismatch { index: 3, .. })
                | Err(ValidationError::UnbalancedReturn { .. })
        ));
    }

    #[test]
    fn test_referenced_instruction_cannot_be_removed() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        let label = body.define_label();
        let nop = body.push(Instruction::nop());
        body.push(Instruction::ret());
        body.mark_label(label, nop).unwrap();
        assert!(body.is_referenced(nop));
        assert!(matches!(
            body.remove(0),
            Err(CursorError::InstructionReferenced { index: 0 })
        ));
    }

    #[test]
    fn test_region_order_checked() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        let a = body.push(Instruction::nop());
        let b = body.push(Instruction::ret());
        body.add_region(ExceptionRegion {
            try_start: b,
            try_end: b,
            handler_start: a,
            handler_end: a,
        });
        assert!(matches!(
            body.validate(),
            Err(ValidationError::BadRegion { region: 0, .. })
        ));
    }

    #[test]
    fn test_listing_shows_labels() {
        let mut body = MethodBody::new(method(Signature::new(0)));
        let label = body.define_label();
        let ret = body.push(Instruction::ret());
        body.mark_label(label, ret).unwrap();
        let text = body.listing();
        assert!(text.contains("IL_L0:"));
        assert!(text.contains("IL_0000: ret"));
    }
}
