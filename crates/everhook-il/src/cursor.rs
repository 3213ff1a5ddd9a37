//! Positioned, mutable view over a method body.
//!
//! The cursor sits between two instructions. `index` is the position of the
//! instruction after the cursor, so `0` is before the first instruction and
//! `len` is after the last one. Emitting inserts at the cursor and leaves the
//! cursor after the inserted instruction, which makes a sequence of `emit`
//! calls read in program order.

use crate::body::{ExceptionRegion, MethodBody};
use crate::error::CursorError;
use crate::instruction::{InstrId, Instruction, Label, OpCode, Operand};
use crate::method::MethodId;

/// Where the cursor lands after a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    /// Before the first matched instruction.
    #[default]
    Before,
    /// After the last matched instruction.
    After,
}

/// Predicate over a single instruction.
pub type Matcher<'p> = &'p dyn Fn(&Instruction) -> bool;

/// Cursor over a [`MethodBody`].
pub struct ILCursor<'a> {
    body: &'a mut MethodBody,
    index: usize,
    /// First instruction of the last forward match, so repeated searches with
    /// [`MoveType::Before`] make progress.
    last_match: Option<InstrId>,
    /// Retarget labels on the next instruction to the next emitted one.
    labels_follow: bool,
    /// Labels marked at the end of the body, attached to the next emit.
    pending: Vec<Label>,
}

impl<'a> ILCursor<'a> {
    pub fn new(body: &'a mut MethodBody) -> Self {
        Self {
            body,
            index: 0,
            last_match: None,
            labels_follow: false,
            pending: Vec::new(),
        }
    }

    pub fn body(&self) -> &MethodBody {
        self.body
    }

    pub fn method(&self) -> &MethodId {
        self.body.method()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Moves to an absolute position.
    pub fn goto(&mut self, index: usize) -> Result<&mut Self, CursorError> {
        let len = self.body.len();
        if index > len {
            return Err(CursorError::OutOfRange { index, len });
        }
        self.index = index;
        self.last_match = None;
        self.labels_follow = false;
        Ok(self)
    }

    pub fn goto_start(&mut self) -> &mut Self {
        self.index = 0;
        self.last_match = None;
        self.labels_follow = false;
        self
    }

    pub fn goto_end(&mut self) -> &mut Self {
        self.index = self.body.len();
        self.last_match = None;
        self.labels_follow = false;
        self
    }

    /// Instruction after the cursor.
    pub fn next(&self) -> Option<&Instruction> {
        self.body.instruction(self.index)
    }

    /// Instruction before the cursor.
    pub fn prev(&self) -> Option<&Instruction> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.body.instruction(i))
    }

    /// Mutable access to the instruction after the cursor. Its id, labels and
    /// region membership are unchanged by edits through this reference.
    pub fn next_mut(&mut self) -> Option<&mut Instruction> {
        self.body.instruction_mut(self.index)
    }

    /// Searches forward for consecutive instructions matching `predicates`.
    ///
    /// Returns `false` and leaves the cursor untouched if there is no match.
    pub fn try_goto_next(&mut self, move_type: MoveType, predicates: &[Matcher<'_>]) -> bool {
        if predicates.is_empty() {
            return false;
        }
        let mut start = self.index;
        if let Some(i) = self.last_match.and_then(|id| self.body.index_of(id)) {
            if i >= start {
                start = i + 1;
            }
        }
        let len = self.body.len();
        if start + predicates.len() > len {
            return false;
        }
        for i in start..=len - predicates.len() {
            if self.matches_at(i, predicates) {
                self.last_match = self.body.id_at(i);
                self.labels_follow = false;
                self.index = match move_type {
                    MoveType::Before => i,
                    MoveType::After => i + predicates.len(),
                };
                return true;
            }
        }
        false
    }

    /// Like [`Self::try_goto_next`], failing with [`CursorError::NoMatch`].
    pub fn goto_next(
        &mut self,
        move_type: MoveType,
        predicates: &[Matcher<'_>],
    ) -> Result<&mut Self, CursorError> {
        if self.try_goto_next(move_type, predicates) {
            Ok(self)
        } else {
            Err(CursorError::NoMatch {
                method: self.body.method().clone(),
            })
        }
    }

    /// Searches backward for a sequence ending before the cursor.
    pub fn try_goto_prev(&mut self, move_type: MoveType, predicates: &[Matcher<'_>]) -> bool {
        let n = predicates.len();
        if n == 0 || self.index < n {
            return false;
        }
        // A sequence that ends right at the cursor is where an `After`
        // search left us; skip it so backward loops terminate.
        let mut end = self.index;
        if move_type == MoveType::After {
            end -= 1;
        }
        if end < n {
            return false;
        }
        for i in (0..=end - n).rev() {
            if self.matches_at(i, predicates) {
                self.last_match = None;
                self.labels_follow = false;
                self.index = match move_type {
                    MoveType::Before => i,
                    MoveType::After => i + n,
                };
                return true;
            }
        }
        false
    }

    pub fn goto_prev(
        &mut self,
        move_type: MoveType,
        predicates: &[Matcher<'_>],
    ) -> Result<&mut Self, CursorError> {
        if self.try_goto_prev(move_type, predicates) {
            Ok(self)
        } else {
            Err(CursorError::NoMatch {
                method: self.body.method().clone(),
            })
        }
    }

    fn matches_at(&self, start: usize, predicates: &[Matcher<'_>]) -> bool {
        predicates.iter().enumerate().all(|(offset, pred)| {
            self.body
                .instruction(start + offset)
                .is_some_and(|instr| pred(instr))
        })
    }

    /// Makes the next emitted instruction the target of every label that
    /// currently points at the instruction after the cursor. Branches that
    /// used to land there will run the emitted code first.
    pub fn move_after_labels(&mut self) -> &mut Self {
        self.labels_follow = true;
        self
    }

    /// Inserts `instr` at the cursor and moves past it.
    pub fn emit(&mut self, instr: Instruction) -> InstrId {
        let displaced = self.body.id_at(self.index);
        let id = self.body.insert(self.index, instr);
        if self.labels_follow {
            if let Some(old) = displaced {
                self.body.retarget_labels(old, id);
            }
            self.labels_follow = false;
        }
        for label in std::mem::take(&mut self.pending) {
            // Both were validated when the label was marked.
            let _ = self.body.mark_label(label, id);
        }
        self.index += 1;
        id
    }

    /// Emits an instruction built from an opcode and operand.
    pub fn emit_op(&mut self, opcode: OpCode, operand: Operand) -> Result<InstrId, CursorError> {
        let instr = Instruction::new(opcode, operand)?;
        Ok(self.emit(instr))
    }

    pub fn emit_call(&mut self, method: MethodId) -> InstrId {
        self.emit(Instruction::call(method))
    }

    /// Emits `br`, `brtrue`, `brfalse` or `leave` to `label`.
    pub fn emit_branch(&mut self, opcode: OpCode, label: Label) -> Result<InstrId, CursorError> {
        self.check_label(label)?;
        let instr = Instruction::branch(opcode, label)?;
        Ok(self.emit(instr))
    }

    pub fn define_label(&mut self) -> Label {
        self.body.define_label()
    }

    /// Points `label` at the instruction after the cursor. At the end of the
    /// body the label attaches to the next instruction this cursor emits.
    pub fn mark_label(&mut self, label: Label) -> Result<(), CursorError> {
        self.check_label(label)?;
        match self.body.id_at(self.index) {
            Some(target) => self.body.mark_label(label, target),
            None => {
                self.pending.push(label);
                Ok(())
            }
        }
    }

    /// Defines a label and marks it at the cursor.
    pub fn mark_new_label(&mut self) -> Result<Label, CursorError> {
        let label = self.define_label();
        self.mark_label(label)?;
        Ok(label)
    }

    fn check_label(&self, label: Label) -> Result<(), CursorError> {
        if label.0 < self.body.label_count() {
            Ok(())
        } else {
            Err(CursorError::UnknownLabel(label))
        }
    }

    /// Replaces the instruction after the cursor, keeping its id so labels
    /// and regions that point at it stay attached.
    pub fn replace_next(&mut self, instr: Instruction) -> Result<Instruction, CursorError> {
        let method = self.body.method().clone();
        let slot = self
            .body
            .instruction_mut(self.index)
            .ok_or(CursorError::AtEnd { method })?;
        Ok(std::mem::replace(slot, instr))
    }

    /// Removes the instruction after the cursor. Refuses instructions that a
    /// label or exception region points at.
    pub fn remove_next(&mut self) -> Result<Instruction, CursorError> {
        if self.index >= self.body.len() {
            return Err(CursorError::AtEnd {
                method: self.body.method().clone(),
            });
        }
        self.body.remove(self.index)
    }

    pub fn declare_local(&mut self) -> u16 {
        self.body.declare_local()
    }

    pub fn add_region(&mut self, region: ExceptionRegion) {
        self.body.add_region(region);
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
