// This module implements the block assembler of the direct lowering. Labels are supplied by the
// caller from the label-space partition: original blocks keep their depth-first label,
// continuation blocks take the next free label of the extra range and the parameter block sits
// at its special label. The assembler owns the output list and the set of labels in use, rejects
// a second block with the same label and a primary successor missing from the successor list,
// and produces the finished RopMethod. Blocks are immutable once added.

//! Output block accumulation for the direct lowering.

use super::labels::{LabelSpace, SpecialLabel};
use crate::core::error::{CompileError, CompileResult};
use crate::rop::{BasicBlock, Insn, RopMethod};
use hashbrown::HashSet;

pub struct RopBlockAssembler {
    space: LabelSpace,
    blocks: Vec<BasicBlock>,
    labels: HashSet<u32>,
    extra_blocks: usize,
}

impl RopBlockAssembler {
    pub fn new(space: LabelSpace) -> Self {
        Self {
            space,
            blocks: Vec::new(),
            labels: HashSet::new(),
            extra_blocks: 0,
        }
    }

    /// Append a finished block.
    pub fn new_block(
        &mut self,
        label: u32,
        insns: Vec<Insn>,
        successors: Vec<u32>,
        primary_successor: Option<u32>,
    ) -> CompileResult<()> {
        if let Some(primary) = primary_successor {
            if !successors.contains(&primary) {
                return Err(CompileError::PrimaryNotSuccessor {
                    block: label,
                    primary,
                });
            }
        }
        if !self.labels.insert(label) {
            return Err(CompileError::DuplicateLabel(label));
        }
        if self.space.extra_range().contains(&label) {
            self.extra_blocks += 1;
        }
        log::trace!(
            "block {}: {} insns, successors {:?}",
            label,
            insns.len(),
            successors
        );
        self.blocks.push(BasicBlock::new(
            label,
            insns,
            successors,
            primary_successor,
        ));
        Ok(())
    }

    /// Label for a new continuation block.
    pub fn extra_label(&self) -> CompileResult<u32> {
        self.space.next_extra(self.labels.iter().copied())
    }

    /// Unused label above the special range.
    pub fn available_label(&self) -> u32 {
        self.space.available(self.labels.iter().copied())
    }

    pub fn special_label(&self, label: SpecialLabel) -> u32 {
        self.space.special(label)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn extra_block_count(&self) -> usize {
        self.extra_blocks
    }

    pub fn finish(self, first_label: u32) -> RopMethod {
        RopMethod::new(self.blocks, first_label)
    }
}
