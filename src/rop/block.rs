//! Output basic blocks and the finished method graph.

use super::insn::Insn;
use std::fmt;

/// A labelled run of instructions with its exit edges.
///
/// A block ending in a throwing instruction lists its catch handlers first
/// and the normal continuation last.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: u32,
    pub insns: Vec<Insn>,
    pub successors: Vec<u32>,
    /// Straight-line fallthrough target, if any.
    pub primary_successor: Option<u32>,
}

impl BasicBlock {
    pub fn new(
        label: u32,
        insns: Vec<Insn>,
        successors: Vec<u32>,
        primary_successor: Option<u32>,
    ) -> Self {
        Self {
            label,
            insns,
            successors,
            primary_successor,
        }
    }

    pub fn last_insn(&self) -> Option<&Insn> {
        self.insns.last()
    }

    /// Catch types of the block's final throwing instruction.
    pub fn catches(&self) -> &[crate::cfg::Type] {
        self.last_insn().map_or(&[], |insn| insn.catches())
    }

    /// One past the highest register slot the block touches.
    pub fn register_high_water(&self) -> u32 {
        self.insns
            .iter()
            .flat_map(|insn| insn.result.iter().chain(insn.sources.iter()))
            .map(|spec| spec.next_reg())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "block {}:", self.label)?;
        for insn in &self.insns {
            writeln!(f, "  {}", insn)?;
        }
        let succs: Vec<String> = self.successors.iter().map(|s| s.to_string()).collect();
        write!(f, "  next [{}]", succs.join(", "))?;
        if let Some(primary) = self.primary_successor {
            write!(f, " primary {}", primary)?;
        }
        writeln!(f)
    }
}

/// Finished register-operation graph of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct RopMethod {
    pub blocks: Vec<BasicBlock>,
    /// Label of the block execution starts in.
    pub first_label: u32,
}

impl RopMethod {
    pub fn new(blocks: Vec<BasicBlock>, first_label: u32) -> Self {
        Self {
            blocks,
            first_label,
        }
    }

    pub fn block(&self, label: u32) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Frame size: one past the highest register slot used.
    pub fn register_count(&self) -> u32 {
        self.blocks
            .iter()
            .map(BasicBlock::register_high_water)
            .max()
            .unwrap_or(0)
    }

    pub fn insn_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insns.len()).sum()
    }
}

impl fmt::Display for RopMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "first {}", self.first_label)?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Type;
    use crate::rop::{Opcode, RegisterSpec, SourcePosition};

    #[test]
    fn test_register_count_counts_wide_slots() {
        let wide = RegisterSpec::new(3, Type::Long);
        let ret = Insn::plain(
            Opcode::Return,
            Type::Long,
            SourcePosition::NONE,
            None,
            vec![wide],
        );
        let method = RopMethod::new(vec![BasicBlock::new(1, vec![ret], Vec::new(), None)], 1);
        assert_eq!(method.register_count(), 5);
        assert_eq!(method.insn_count(), 1);
        assert!(method.block(1).is_some());
        assert!(method.block(2).is_none());
    }
}
