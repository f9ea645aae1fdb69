// This module implements the block assembler of the SSA lowering as a two-phase state machine.
// While open, blocks are created in lowering order and receive sequential indices; each block
// records its label, instructions, successor labels and phis whose operands name their
// predecessor by label. Resolution happens exactly once: an exit block labelled with the special
// return label is attached to every block without successors, a label-to-index table is built
// from every declared label, successor lists and primary successors are rewritten to indices,
// every block is registered as a predecessor of its successors, and phi operands are rewritten
// from predecessor labels to predecessor indices. A predecessor whose normal edge moved to its
// continuation block is redirected to that block. After resolution any further block creation
// or a second resolution fails.

//! Two-phase block assembly for the SSA lowering.

use super::labels::{LabelSpace, SpecialLabel};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::rop::{Insn, PhiInsn, PhiOperand, RegisterSpec, SsaBasicBlock, SsaMethod};
use hashbrown::HashMap;

/// Phi whose operands still name predecessors by label.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPhi {
    pub result: RegisterSpec,
    pub operands: Vec<(RegisterSpec, u32)>,
}

/// Block under construction; fields are filled in after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBlock {
    pub label: Option<u32>,
    pub phis: Vec<PendingPhi>,
    pub insns: Vec<Insn>,
    pub successors: Vec<u32>,
    pub primary_successor: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Resolved,
}

pub struct SsaBlockAssembler {
    space: LabelSpace,
    blocks: Vec<PendingBlock>,
    /// Original label to the label of its continuation block.
    continuations: HashMap<u32, u32>,
    state: State,
}

impl SsaBlockAssembler {
    pub fn new(space: LabelSpace) -> Self {
        Self {
            space,
            blocks: Vec::new(),
            continuations: HashMap::new(),
            state: State::Open,
        }
    }

    fn ensure_open(&self) -> CompileResult<()> {
        match self.state {
            State::Open => Ok(()),
            State::Resolved => Err(CompileError::AssemblerResolved),
        }
    }

    /// Create a block and return its index.
    pub fn new_block(&mut self) -> CompileResult<usize> {
        self.ensure_open()?;
        self.blocks.push(PendingBlock::default());
        Ok(self.blocks.len() - 1)
    }

    pub fn block_mut(&mut self, index: usize) -> CompileResult<&mut PendingBlock> {
        self.ensure_open()?;
        self.blocks
            .get_mut(index)
            .ok_or_else(|| CompileError::MalformedCfg {
                reason: format!("no SSA block #{}", index),
            })
    }

    /// Note that the normal edge of `original` now leaves from `continuation`.
    pub fn record_continuation(&mut self, original: u32, continuation: u32) -> CompileResult<()> {
        self.ensure_open()?;
        self.continuations.insert(original, continuation);
        Ok(())
    }

    fn used_labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks.iter().filter_map(|b| b.label)
    }

    /// Unused label above the special range.
    pub fn available_label(&self) -> u32 {
        self.space.available(self.used_labels())
    }

    pub fn special_label(&self, label: SpecialLabel) -> u32 {
        self.space.special(label)
    }

    /// Map a raw reserved constant to its label.
    pub fn special_label_from_constant(&self, constant: i32) -> CompileResult<u32> {
        self.space.special_from_constant(constant)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Resolve labels to final indices and produce the SSA graph.
    pub fn compute_final_block_list(
        &mut self,
        session: &CompilationSession<'_>,
        entry_label: u32,
        register_count: u32,
    ) -> CompileResult<SsaMethod> {
        self.ensure_open()?;
        self.state = State::Resolved;
        let pending = std::mem::take(&mut self.blocks);
        let exit_label = self.space.special(SpecialLabel::Return);
        let mut blocks = pending;

        let needs_exit = blocks.iter().any(|b| b.successors.is_empty());
        if needs_exit {
            for block in blocks.iter_mut().filter(|b| b.successors.is_empty()) {
                block.successors.push(exit_label);
                block.primary_successor = Some(exit_label);
            }
            blocks.push(PendingBlock {
                label: Some(exit_label),
                ..PendingBlock::default()
            });
        }

        let mut table: HashMap<u32, usize> = HashMap::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let label = block.label.ok_or_else(|| CompileError::MalformedCfg {
                reason: format!("SSA block #{} has no label", index),
            })?;
            if table.insert(label, index).is_some() {
                return Err(CompileError::DuplicateLabel(label));
            }
        }
        let index_of = |block: u32, label: u32| {
            table
                .get(&label)
                .copied()
                .ok_or(CompileError::UnknownSuccessor { block, label })
        };

        let mut resolved: Vec<SsaBasicBlock> = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let label = block.label.unwrap_or_default();
            let successors = block
                .successors
                .iter()
                .map(|succ| index_of(label, *succ))
                .collect::<CompileResult<Vec<_>>>()?;
            let primary_successor = match block.primary_successor {
                Some(primary) if !block.successors.contains(&primary) => {
                    return Err(CompileError::PrimaryNotSuccessor {
                        block: label,
                        primary,
                    });
                }
                Some(primary) => Some(index_of(label, primary)?),
                None => None,
            };
            resolved.push(SsaBasicBlock {
                index,
                label,
                phis: Vec::new(),
                insns: block.insns.clone(),
                successors,
                primary_successor,
                predecessors: Vec::new(),
            });
        }

        for index in 0..resolved.len() {
            let successors = resolved[index].successors.clone();
            for succ in successors {
                let preds = &mut resolved[succ].predecessors;
                if !preds.contains(&index) {
                    preds.push(index);
                }
            }
        }

        for (index, block) in blocks.into_iter().enumerate() {
            let label = resolved[index].label;
            let mut phis = Vec::with_capacity(block.phis.len());
            for phi in block.phis {
                let mut operands = Vec::with_capacity(phi.operands.len());
                for (source, pred_label) in phi.operands {
                    let predecessor = self.phi_predecessor(&table, &resolved[index], label, pred_label)?;
                    operands.push(PhiOperand {
                        source,
                        predecessor,
                    });
                }
                session.record_phi_resolved();
                phis.push(PhiInsn {
                    result: phi.result,
                    operands,
                });
            }
            resolved[index].phis = phis;
        }

        let entry = index_of(entry_label, entry_label)?;
        let exit = if needs_exit { table.get(&exit_label).copied() } else { None };
        log::debug!(
            "resolved {} SSA blocks, entry #{}, exit {:?}",
            resolved.len(),
            entry,
            exit
        );
        Ok(SsaMethod {
            blocks: resolved,
            entry,
            exit,
            register_count,
            label_to_index: table,
        })
    }

    fn phi_predecessor(
        &self,
        table: &HashMap<u32, usize>,
        block: &SsaBasicBlock,
        label: u32,
        pred_label: u32,
    ) -> CompileResult<usize> {
        let mismatch = CompileError::PhiPredecessorMismatch {
            block: label,
            pred: pred_label,
        };
        let direct = table.get(&pred_label).copied();
        let via_continuation = self
            .continuations
            .get(&pred_label)
            .and_then(|cont| table.get(cont))
            .copied();
        [via_continuation, direct]
            .into_iter()
            .flatten()
            .find(|pred| block.predecessors.contains(pred))
            .ok_or(mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Type;
    use crate::rop::{Opcode, SourcePosition};
    use bumpalo::Bump;

    fn goto() -> Insn {
        Insn::plain(Opcode::Goto, Type::Void, SourcePosition::NONE, None, Vec::new())
    }

    fn reg(n: u32) -> RegisterSpec {
        RegisterSpec::new(n, Type::Int)
    }

    fn add(asm: &mut SsaBlockAssembler, label: u32, succs: Vec<u32>) -> usize {
        let idx = asm.new_block().unwrap();
        let block = asm.block_mut(idx).unwrap();
        block.label = Some(label);
        block.insns = vec![goto()];
        block.primary_successor = succs.first().copied();
        block.successors = succs;
        idx
    }

    #[test]
    fn test_phi_operands_resolve_to_final_indices() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut asm = SsaBlockAssembler::new(LabelSpace::new(10));

        // Created merge-first so labels and indices disagree.
        let merge = add(&mut asm, 3, Vec::new());
        asm.block_mut(merge).unwrap().phis.push(PendingPhi {
            result: reg(2),
            operands: vec![(reg(0), 1), (reg(1), 2)],
        });
        let b2 = add(&mut asm, 2, vec![3]);
        let b1 = add(&mut asm, 1, vec![3]);
        let entry = add(&mut asm, 0, vec![1, 2]);
        assert_eq!(asm.block_count(), 4);

        let method = asm.compute_final_block_list(&session, 0, 3).unwrap();
        assert_eq!(method.entry, entry);
        let phi = &method.blocks[merge].phis[0];
        assert_eq!(phi.operands[0].predecessor, b1);
        assert_eq!(phi.operands[1].predecessor, b2);
        assert_eq!(method.blocks[merge].predecessors, vec![b2, b1]);
        assert_eq!(session.stats().phis_resolved, 1);

        let exit = method.exit.unwrap();
        assert_eq!(method.blocks[exit].label, 21);
        assert_eq!(method.blocks[merge].successors, vec![exit]);
        assert_eq!(method.blocks[merge].primary_successor, Some(exit));
    }

    #[test]
    fn test_phi_predecessor_follows_continuation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut asm = SsaBlockAssembler::new(LabelSpace::new(4));
        add(&mut asm, 0, vec![1]);
        let extra_label = asm.available_label();
        assert_eq!(extra_label, 15);
        add(&mut asm, 1, vec![extra_label]);
        let extra = add(&mut asm, extra_label, vec![2]);
        asm.record_continuation(1, extra_label).unwrap();
        let merge = add(&mut asm, 2, Vec::new());
        asm.block_mut(merge).unwrap().phis.push(PendingPhi {
            result: reg(1),
            operands: vec![(reg(0), 1)],
        });

        let method = asm.compute_final_block_list(&session, 0, 2).unwrap();
        assert_eq!(method.blocks[merge].phis[0].operands[0].predecessor, extra);
    }

    #[test]
    fn test_phi_from_non_predecessor_is_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut asm = SsaBlockAssembler::new(LabelSpace::new(4));
        add(&mut asm, 0, vec![2]);
        add(&mut asm, 1, vec![3]);
        let merge = add(&mut asm, 2, vec![3]);
        add(&mut asm, 3, Vec::new());
        asm.block_mut(merge).unwrap().phis.push(PendingPhi {
            result: reg(1),
            operands: vec![(reg(0), 1)],
        });

        assert_eq!(
            asm.compute_final_block_list(&session, 0, 2),
            Err(CompileError::PhiPredecessorMismatch { block: 2, pred: 1 })
        );
    }

    #[test]
    fn test_resolution_happens_once() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut asm = SsaBlockAssembler::new(LabelSpace::new(2));
        add(&mut asm, 0, Vec::new());
        asm.compute_final_block_list(&session, 0, 0).unwrap();

        assert_eq!(asm.new_block(), Err(CompileError::AssemblerResolved));
        assert!(matches!(
            asm.compute_final_block_list(&session, 0, 0),
            Err(CompileError::AssemblerResolved)
        ));
    }

    #[test]
    fn test_unknown_successor_is_reported() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut asm = SsaBlockAssembler::new(LabelSpace::new(4));
        add(&mut asm, 0, vec![3]);
        assert_eq!(
            asm.compute_final_block_list(&session, 0, 0),
            Err(CompileError::UnknownSuccessor { block: 0, label: 3 })
        );
    }
}
