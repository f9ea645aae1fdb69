// This module checks the structural properties every finished register-operation graph must
// satisfy before it is handed to the optimizer or encoder: labels are unique, every successor
// label names a block, the primary successor is one of the successors, and every throwing
// value-producing instruction is followed by a source-less move-result or move-result-pseudo,
// either directly or as the first instruction of the block reached over the primary edge.
// Conversely a move-result must come right after a non-void call or filled-new-array and a
// move-result-pseudo right after another throwing value producer, looking back over the primary
// edge when the fetch opens its block. Both
// lowering variants run it on their output and the integration tests run it on every method
// they lower.

//! Structural verification of lowered methods.

use super::{BasicBlock, Insn, Opcode, RopMethod};
use crate::cfg::Type;
use crate::core::error::{CompileError, CompileResult};
use hashbrown::HashMap;

/// Verify `method`, returning the first violation found.
pub fn verify(method: &RopMethod) -> CompileResult<()> {
    let mut by_label: HashMap<u32, &BasicBlock> = HashMap::with_capacity(method.blocks.len());
    for block in &method.blocks {
        if by_label.insert(block.label, block).is_some() {
            return Err(CompileError::DuplicateLabel(block.label));
        }
    }

    if !by_label.contains_key(&method.first_label) {
        return Err(CompileError::UnknownSuccessor {
            block: method.first_label,
            label: method.first_label,
        });
    }

    let mut primary_preds: HashMap<u32, Vec<&BasicBlock>> = HashMap::new();
    for block in &method.blocks {
        if let Some(primary) = block.primary_successor {
            primary_preds.entry(primary).or_default().push(block);
        }
    }

    for block in &method.blocks {
        for succ in &block.successors {
            if !by_label.contains_key(succ) {
                return Err(CompileError::UnknownSuccessor {
                    block: block.label,
                    label: *succ,
                });
            }
        }

        if let Some(primary) = block.primary_successor {
            if !block.successors.contains(&primary) {
                return Err(CompileError::PrimaryNotSuccessor {
                    block: block.label,
                    primary,
                });
            }
        }

        verify_move_results(block, &by_label)?;
        verify_fetch_producers(block, &primary_preds)?;
    }

    Ok(())
}

fn verify_move_results(block: &BasicBlock, by_label: &HashMap<u32, &BasicBlock>) -> CompileResult<()> {
    for (idx, insn) in block.insns.iter().enumerate() {
        if !insn.produces_pending_value() {
            continue;
        }

        let follower: Option<&Insn> = match block.insns.get(idx + 1) {
            Some(next) => Some(next),
            None => block
                .primary_successor
                .and_then(|primary| by_label.get(&primary))
                .and_then(|next| next.insns.first()),
        };
        let paired = matches!(
            follower,
            Some(next) if next.opcode.is_move_result() && next.sources.is_empty()
        );
        if !paired {
            return Err(CompileError::MissingMoveResult {
                block: block.label,
                opcode: insn.opcode.name(),
            });
        }
    }
    Ok(())
}

/// Whether `fetch` reads the pending result of `producer`.
fn fetches_from(fetch: &Insn, producer: &Insn) -> bool {
    if !producer.is_throwing() || producer.ty == Type::Void {
        return false;
    }
    match fetch.opcode {
        Opcode::MoveResult => producer.opcode.is_call() || producer.opcode == Opcode::FilledNewArray,
        _ => producer.opcode.needs_move_result_pseudo(),
    }
}

fn verify_fetch_producers(
    block: &BasicBlock,
    primary_preds: &HashMap<u32, Vec<&BasicBlock>>,
) -> CompileResult<()> {
    for (idx, insn) in block.insns.iter().enumerate() {
        if !insn.opcode.is_move_result() {
            continue;
        }

        let paired = if idx > 0 {
            fetches_from(insn, &block.insns[idx - 1])
        } else {
            match primary_preds.get(&block.label) {
                Some(preds) => preds
                    .iter()
                    .all(|pred| matches!(pred.insns.last(), Some(last) if fetches_from(insn, last))),
                None => false,
            }
        };
        if !paired {
            return Err(CompileError::OrphanMoveResult {
                block: block.label,
                opcode: insn.opcode.name(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rop::{Constant, Opcode, RegisterSpec, SourcePosition};

    fn goto() -> Insn {
        Insn::plain(Opcode::Goto, Type::Void, SourcePosition::NONE, None, Vec::new())
    }

    fn ret() -> Insn {
        Insn::plain(Opcode::Return, Type::Void, SourcePosition::NONE, None, Vec::new())
    }

    #[test]
    fn test_rejects_primary_outside_successors() {
        let method = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![goto()], vec![1], Some(2)),
                BasicBlock::new(1, vec![ret()], Vec::new(), None),
                BasicBlock::new(2, vec![ret()], Vec::new(), None),
            ],
            0,
        );
        assert_eq!(
            verify(&method),
            Err(CompileError::PrimaryNotSuccessor { block: 0, primary: 2 })
        );
    }

    #[test]
    fn test_rejects_duplicate_and_unknown_labels() {
        let dup = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![ret()], Vec::new(), None),
                BasicBlock::new(0, vec![ret()], Vec::new(), None),
            ],
            0,
        );
        assert_eq!(verify(&dup), Err(CompileError::DuplicateLabel(0)));

        let dangling = RopMethod::new(vec![BasicBlock::new(0, vec![goto()], vec![9], Some(9))], 0);
        assert_eq!(
            verify(&dangling),
            Err(CompileError::UnknownSuccessor { block: 0, label: 9 })
        );
    }

    #[test]
    fn test_move_result_pairing_across_primary_edge() {
        let get = Insn::throwing_cst(
            Opcode::GetStatic,
            Type::Int,
            SourcePosition::NONE,
            Vec::new(),
            Constant::Int(0),
            Vec::new(),
        );
        let result = Insn::plain(
            Opcode::MoveResultPseudo,
            Type::Int,
            SourcePosition::NONE,
            Some(RegisterSpec::new(0, Type::Int)),
            Vec::new(),
        );

        let paired = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![get.clone()], vec![5], Some(5)),
                BasicBlock::new(5, vec![result, ret()], Vec::new(), None),
            ],
            0,
        );
        assert!(verify(&paired).is_ok());

        let unpaired = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![get], vec![5], Some(5)),
                BasicBlock::new(5, vec![ret()], Vec::new(), None),
            ],
            0,
        );
        assert_eq!(
            verify(&unpaired),
            Err(CompileError::MissingMoveResult {
                block: 0,
                opcode: "get-static"
            })
        );
    }

    fn invoke(ty: Type) -> Insn {
        Insn::throwing_cst(
            Opcode::InvokeStatic,
            ty,
            SourcePosition::NONE,
            Vec::new(),
            Constant::Int(0),
            Vec::new(),
        )
    }

    fn fetch(opcode: Opcode) -> Insn {
        Insn::plain(
            opcode,
            Type::Int,
            SourcePosition::NONE,
            Some(RegisterSpec::new(0, Type::Int)),
            Vec::new(),
        )
    }

    #[test]
    fn test_move_result_needs_a_producer() {
        let after_call = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![invoke(Type::Int)], vec![3], Some(3)),
                BasicBlock::new(3, vec![fetch(Opcode::MoveResult), ret()], Vec::new(), None),
            ],
            0,
        );
        assert!(verify(&after_call).is_ok());

        let after_void_call = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![invoke(Type::Void)], vec![3], Some(3)),
                BasicBlock::new(3, vec![fetch(Opcode::MoveResult), ret()], Vec::new(), None),
            ],
            0,
        );
        assert_eq!(
            verify(&after_void_call),
            Err(CompileError::OrphanMoveResult {
                block: 3,
                opcode: "move-result"
            })
        );

        let after_goto = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![goto()], vec![3], Some(3)),
                BasicBlock::new(3, vec![fetch(Opcode::MoveResult), ret()], Vec::new(), None),
            ],
            0,
        );
        assert!(matches!(
            verify(&after_goto),
            Err(CompileError::OrphanMoveResult { block: 3, .. })
        ));

        let unreached = RopMethod::new(
            vec![BasicBlock::new(0, vec![fetch(Opcode::MoveResult), ret()], Vec::new(), None)],
            0,
        );
        assert!(matches!(
            verify(&unreached),
            Err(CompileError::OrphanMoveResult { block: 0, .. })
        ));
    }

    #[test]
    fn test_fetch_kind_must_match_producer() {
        let get = Insn::throwing_cst(
            Opcode::GetStatic,
            Type::Int,
            SourcePosition::NONE,
            Vec::new(),
            Constant::Int(0),
            Vec::new(),
        );
        let pseudo_after_call = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![invoke(Type::Int)], vec![3], Some(3)),
                BasicBlock::new(3, vec![fetch(Opcode::MoveResultPseudo), ret()], Vec::new(), None),
            ],
            0,
        );
        assert!(matches!(
            verify(&pseudo_after_call),
            Err(CompileError::OrphanMoveResult { block: 3, .. })
        ));

        let result_after_get = RopMethod::new(
            vec![
                BasicBlock::new(0, vec![get], vec![3], Some(3)),
                BasicBlock::new(3, vec![fetch(Opcode::MoveResult), ret()], Vec::new(), None),
            ],
            0,
        );
        assert!(matches!(
            verify(&result_after_get),
            Err(CompileError::OrphanMoveResult { block: 3, .. })
        ));

        let in_block = RopMethod::new(
            vec![BasicBlock::new(
                0,
                vec![fetch(Opcode::Const), fetch(Opcode::MoveResult), ret()],
                Vec::new(),
                None,
            )],
            0,
        );
        assert!(matches!(
            verify(&in_block),
            Err(CompileError::OrphanMoveResult { block: 0, .. })
        ));
    }
}
