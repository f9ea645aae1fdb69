//! Two-buffer instruction accumulator for one block.
//!
//! Instructions go to the primary buffer until a continuation instruction
//! (the move-result of a throwing value producer) is queued. From then on
//! the throwing instruction must stay last in the block: ordinary appends
//! through [`InsnBuffer::add`] fail, and [`InsnBuffer::add_after`] routes to
//! the continuation buffer instead. [`InsnBuffer::seal`] closes the primary
//! buffer the same way after a throwing instruction with no result.

use crate::core::error::{CompileError, CompileResult};
use crate::rop::Insn;

#[derive(Debug, Default)]
pub struct InsnBuffer {
    insns: Vec<Insn>,
    extra: Vec<Insn>,
    extra_pending: bool,
}

impl InsnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the primary buffer.
    pub fn add(&mut self, insn: Insn) -> CompileResult<()> {
        if self.extra_pending {
            return Err(CompileError::ExtraInstructionPending {
                opcode: insn.opcode.name(),
            });
        }
        self.insns.push(insn);
        Ok(())
    }

    /// Queue a continuation instruction; closes the primary buffer.
    pub fn add_extra(&mut self, insn: Insn) {
        self.extra_pending = true;
        self.extra.push(insn);
    }

    /// Close the primary buffer without queueing anything, after a
    /// throwing instruction whose result is not fetched.
    pub fn seal(&mut self) {
        self.extra_pending = true;
    }

    /// Append after everything emitted so far, wherever that is.
    pub fn add_after(&mut self, insn: Insn) {
        if self.extra_pending {
            self.extra.push(insn);
        } else {
            self.insns.push(insn);
        }
    }

    pub fn has_pending_extra(&self) -> bool {
        self.extra_pending
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn extra(&self) -> &[Insn] {
        &self.extra
    }

    pub fn into_parts(self) -> (Vec<Insn>, Vec<Insn>) {
        (self.insns, self.extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Type;
    use crate::rop::{Opcode, SourcePosition};

    fn insn(opcode: Opcode) -> Insn {
        Insn::plain(opcode, Type::Int, SourcePosition::NONE, None, Vec::new())
    }

    #[test]
    fn test_primary_closes_once_extra_is_queued() {
        let mut buf = InsnBuffer::new();
        buf.add(insn(Opcode::Add)).unwrap();
        buf.add_extra(insn(Opcode::MoveResult));

        assert_eq!(
            buf.add(insn(Opcode::Sub)),
            Err(CompileError::ExtraInstructionPending { opcode: "sub" })
        );

        buf.add_after(insn(Opcode::Goto));
        let (insns, extra) = buf.into_parts();
        assert_eq!(insns.len(), 1);
        assert_eq!(extra.len(), 2);
        assert_eq!(extra[1].opcode, Opcode::Goto);
    }

    #[test]
    fn test_seal_routes_later_insns_to_extra() {
        let mut buf = InsnBuffer::new();
        buf.add(insn(Opcode::InvokeStatic)).unwrap();
        buf.seal();
        buf.add_after(insn(Opcode::Const));
        assert!(buf.add(insn(Opcode::GetField)).is_err());
        assert_eq!(buf.insns().len(), 1);
        assert_eq!(buf.extra().len(), 1);
    }

    #[test]
    fn test_add_after_without_pending_goes_to_primary() {
        let mut buf = InsnBuffer::new();
        buf.add_after(insn(Opcode::Goto));
        assert!(!buf.has_pending_extra());
        assert_eq!(buf.insns().len(), 1);
        assert!(buf.extra().is_empty());
    }
}
