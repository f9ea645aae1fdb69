//! SSA form of a lowered method.
//!
//! Blocks are addressed by index. Successor, predecessor and phi operand
//! fields all hold final indices; the lowering records labels while blocks
//! are still being created and rewrites them once, when the block list is
//! resolved.

use super::insn::Insn;
use super::reg::RegisterSpec;
use hashbrown::HashMap;
use std::fmt;

/// One incoming value of a phi, tagged with the predecessor it flows from.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiOperand {
    pub source: RegisterSpec,
    /// Index of the predecessor block.
    pub predecessor: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhiInsn {
    pub result: RegisterSpec,
    pub operands: Vec<PhiOperand>,
}

impl fmt::Display for PhiInsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- phi", self.result)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}@{}", sep, op.source, op.predecessor)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SsaBasicBlock {
    pub index: usize,
    pub label: u32,
    pub phis: Vec<PhiInsn>,
    pub insns: Vec<Insn>,
    pub successors: Vec<usize>,
    pub primary_successor: Option<usize>,
    pub predecessors: Vec<usize>,
}

impl fmt::Display for SsaBasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "block #{} (label {}):", self.index, self.label)?;
        for phi in &self.phis {
            writeln!(f, "  {}", phi)?;
        }
        for insn in &self.insns {
            writeln!(f, "  {}", insn)?;
        }
        write!(f, "  preds {:?} succs {:?}", self.predecessors, self.successors)?;
        if let Some(primary) = self.primary_successor {
            write!(f, " primary #{}", primary)?;
        }
        writeln!(f)
    }
}

/// Resolved SSA graph handed to the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaMethod {
    pub blocks: Vec<SsaBasicBlock>,
    pub entry: usize,
    pub exit: Option<usize>,
    pub register_count: u32,
    pub label_to_index: HashMap<u32, usize>,
}

impl SsaMethod {
    pub fn block_by_label(&self, label: u32) -> Option<&SsaBasicBlock> {
        self.label_to_index
            .get(&label)
            .and_then(|idx| self.blocks.get(*idx))
    }

    pub fn phi_count(&self) -> usize {
        self.blocks.iter().map(|b| b.phis.len()).sum()
    }
}

impl fmt::Display for SsaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "entry #{} registers {}",
            self.entry, self.register_count
        )?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}
