// This module implements the direct (non-SSA) method lowerer. Native and abstract methods and
// methods rejected by the host filter are skipped without producing anything. Otherwise the
// reachable blocks are numbered 1..=N in depth-first order, the label space is sized from that
// numbering, and registers are allocated per source variable. The parameter block at its
// special label moves every incoming argument slot into its register and jumps to the first
// real block; each reachable block is then lowered and placed, with its continuation block in
// the extra range when it has one. The finished graph is verified, handed to the optimizer
// when optimization is enabled and finally to the encoder. Failures carry the method identity
// and leave nothing behind in the encoder.

//! Direct method lowering.

use super::block::{BlockLowerer, PlacedBlock};
use super::blocks::RopBlockAssembler;
use super::labels::{LabelSpace, SpecialLabel};
use super::registers::{RegisterManager, RopRegisterManager};
use crate::backend::{Encoder, LoweredMethod, MethodFilter, Optimizer};
use crate::cfg::analysis::{reachable_order, BlockOrder, EXIT_LABEL};
use crate::cfg::{BlockId, BlockKind, Method, Type};
use crate::core::compiler::{MethodOutcome, SkipReason};
use crate::core::error::{CompileError, CompileResult};
use crate::core::options::CodegenOptions;
use crate::core::session::CompilationSession;
use crate::rop::{verify, Constant, Insn, Opcode, RegisterSpec, RopMethod, SourcePosition};

/// Why `method` produces no code, if it does not.
pub fn skip_reason(method: &Method, filter: &dyn MethodFilter) -> Option<SkipReason> {
    if method.flags.is_native {
        Some(SkipReason::Native)
    } else if method.flags.is_abstract {
        Some(SkipReason::Abstract)
    } else if !filter.accept(method) {
        Some(SkipReason::Filtered)
    } else {
        None
    }
}

/// Moves from incoming argument slots into `params`, then a jump.
pub fn param_moves(params: &[RegisterSpec]) -> Vec<Insn> {
    let mut insns = Vec::with_capacity(params.len() + 1);
    let mut slot = 0u32;
    for spec in params {
        insns.push(Insn::plain_cst(
            Opcode::MoveParam,
            spec.ty.clone(),
            SourcePosition::NONE,
            Some(spec.clone()),
            Vec::new(),
            Constant::Int(slot as i32),
        ));
        slot += spec.category();
    }
    insns.push(Insn::plain(
        Opcode::Goto,
        Type::Void,
        SourcePosition::NONE,
        None,
        Vec::new(),
    ));
    insns
}

/// First block after the entry.
pub fn first_block(method: &Method) -> CompileResult<BlockId> {
    match method.block(method.entry).map(|b| &b.kind) {
        Some(BlockKind::Entry { next }) => Ok(*next),
        _ => Err(CompileError::MalformedCfg {
            reason: format!("entry block {} does not name a first block", method.entry),
        }),
    }
}

/// Normal edges into the exit block have no target in the output graph.
pub fn reject_exit_edge(block: BlockId, label: u32) -> CompileResult<u32> {
    if label == EXIT_LABEL {
        return Err(CompileError::MalformedCfg {
            reason: format!("edge into the exit block; {} must return or throw", block),
        });
    }
    Ok(label)
}

/// Account a finished method in the session statistics.
pub fn record_lowered(
    session: &CompilationSession<'_>,
    identity: &str,
    body: &RopMethod,
    register_count: u32,
) {
    for block in &body.blocks {
        for insn in &block.insns {
            session.record_instruction(&insn.mnemonic());
        }
    }
    session.record_method_lowered(identity, body.blocks.len(), register_count);
}

/// Lowers methods without going through SSA.
pub struct RopMethodLowerer<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    options: &'s CodegenOptions,
}

impl<'s, 'arena> RopMethodLowerer<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, options: &'s CodegenOptions) -> Self {
        Self { session, options }
    }

    /// Lower `method` and hand it to `encoder`.
    pub fn lower(
        &self,
        method: &Method,
        filter: &dyn MethodFilter,
        optimizer: &mut dyn Optimizer,
        encoder: &mut dyn Encoder,
    ) -> CompileResult<MethodOutcome> {
        if let Some(reason) = skip_reason(method, filter) {
            log::debug!("skipping {}: {:?}", method.identity(), reason);
            self.session.record_method_skipped();
            return Ok(MethodOutcome::Skipped(reason));
        }

        let identity = method.identity();
        self.session.set_current_method(&identity);
        let result = self
            .lower_and_encode(method, &identity, optimizer, encoder)
            .map_err(|err| err.in_method(&identity));
        self.session.clear_method_state();
        if result.is_err() {
            self.session.record_method_failed();
        }
        result
    }

    fn lower_and_encode(
        &self,
        method: &Method,
        identity: &str,
        optimizer: &mut dyn Optimizer,
        encoder: &mut dyn Encoder,
    ) -> CompileResult<MethodOutcome> {
        let shape = method.shape();
        let (body, mut register_count) = self.build(method)?;

        let body = if self.options.run_optimizer {
            let optimized = optimizer.optimize_rop(body, &shape)?;
            verify(&optimized)?;
            register_count = optimized.register_count();
            optimized
        } else {
            body
        };

        record_lowered(self.session, identity, &body, register_count);
        let blocks = body.blocks.len();
        log::debug!(
            "{}: {} blocks, {} registers",
            identity,
            blocks,
            register_count
        );
        encoder.encode(LoweredMethod {
            shape,
            body,
            register_count,
            force_jumbo_strings: self.options.force_jumbo_strings,
            debug_info: self.options.emit_debug_info,
        })?;
        Ok(MethodOutcome::Lowered {
            blocks,
            registers: register_count,
        })
    }

    /// Lower `method` into a verified graph and its register count.
    pub fn build(&self, method: &Method) -> CompileResult<(RopMethod, u32)> {
        if let Some(block) = method.blocks.iter().find(|b| !b.phis.is_empty()) {
            return Err(CompileError::MalformedCfg {
                reason: format!("phi in {} outside SSA lowering", block.id),
            });
        }

        let order = reachable_order(self.session, method)?;
        let target = |id: BlockId| label_of(&order, id);
        let first_label = target(first_block(method)?)?;

        let mut asm = RopBlockAssembler::new(LabelSpace::new(order.max_label()));
        let mut regs = RopRegisterManager::for_method(method, self.options)?;

        let param_label = asm.special_label(SpecialLabel::ParamAssignment);
        asm.new_block(
            param_label,
            param_moves(regs.param_specs()),
            vec![first_label],
            Some(first_label),
        )?;

        let mut lowerer = BlockLowerer::new(method, self.options, &mut regs);
        for id in order.order {
            let block = method.block(*id).ok_or_else(|| CompileError::MalformedCfg {
                reason: format!("block {} missing", id),
            })?;
            let label = target(*id)?;
            let lowered = lowerer.lower(block)?;
            let placed = lowered.place(label, target, || asm.extra_label())?;
            for PlacedBlock {
                label,
                insns,
                successors,
                primary_successor,
            } in placed
            {
                asm.new_block(label, insns, successors, primary_successor)?;
            }
        }

        let register_count = regs.register_count();
        for _ in 0..asm.extra_block_count() {
            self.session.record_extra_block();
        }
        let body = asm.finish(param_label);
        verify(&body)?;
        log::trace!("{}:\n{}", method.name, body);
        Ok((body, register_count))
    }
}

fn label_of(order: &BlockOrder<'_>, id: BlockId) -> CompileResult<u32> {
    let label = order.label(id).ok_or_else(|| CompileError::MalformedCfg {
        reason: format!("{} is not reachable from the entry", id),
    })?;
    reject_exit_edge(id, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CollectingEncoder, MethodShape};
    use crate::cfg::{BinaryOp, Expr, MethodBuilder, Operand};
    use crate::rop::SsaMethod;
    use crate::backend::OptimizerStrategy;
    use bumpalo::Bump;

    struct PassThrough;

    impl Optimizer for PassThrough {
        fn optimize_rop(&mut self, method: RopMethod, _shape: &MethodShape) -> CompileResult<RopMethod> {
            Ok(method)
        }

        fn optimize_ssa(
            &mut self,
            _method: SsaMethod,
            _shape: &MethodShape,
            _strategy: OptimizerStrategy,
        ) -> CompileResult<RopMethod> {
            Err(CompileError::Optimizer("not an SSA test".to_string()))
        }
    }

    fn adder() -> Method {
        let mut b = MethodBuilder::new_static(Type::reference("LFoo;"), "add", Type::Int);
        let a = b.param("a", Type::Int);
        let c = b.param("b", Type::Int);
        let sum = b.local("sum", Type::Int);
        let body = b.new_block();
        b.start(body);
        b.assign(
            body,
            sum,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Operand::var(a),
                rhs: Operand::var(c),
            },
        );
        b.terminate(body, BlockKind::Return { value: Some(Operand::var(sum)) });
        b.build().unwrap()
    }

    #[test]
    fn test_param_moves_use_word_slots() {
        let insns = param_moves(&[
            RegisterSpec::new(0, Type::Long),
            RegisterSpec::new(2, Type::Int),
        ]);
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[1].constant(), Some(&Constant::Int(2)));
        assert_eq!(insns[2].opcode, Opcode::Goto);
    }

    #[test]
    fn test_native_and_abstract_methods_are_skipped() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let options = CodegenOptions::default();
        let lowerer = RopMethodLowerer::new(&session, &options);
        let mut encoder = CollectingEncoder::new();

        let mut native = adder();
        native.flags.is_native = true;
        let outcome = lowerer
            .lower(&native, &|_: &Method| true, &mut PassThrough, &mut encoder)
            .unwrap();
        assert_eq!(outcome, MethodOutcome::Skipped(SkipReason::Native));

        let outcome = lowerer
            .lower(&adder(), &|_: &Method| false, &mut PassThrough, &mut encoder)
            .unwrap();
        assert_eq!(outcome, MethodOutcome::Skipped(SkipReason::Filtered));
        assert!(encoder.methods.is_empty());
        assert_eq!(session.stats().methods_skipped, 2);
    }

    #[test]
    fn test_lowered_method_reaches_encoder() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let options = CodegenOptions::default();
        let lowerer = RopMethodLowerer::new(&session, &options);
        let mut encoder = CollectingEncoder::new();

        let outcome = lowerer
            .lower(&adder(), &|_: &Method| true, &mut PassThrough, &mut encoder)
            .unwrap();
        assert_eq!(
            outcome,
            MethodOutcome::Lowered {
                blocks: 2,
                registers: 3
            }
        );
        let lowered = encoder.method("LFoo;.add(II)I").unwrap();
        assert!(lowered.shape.is_static);
        assert_eq!(lowered.shape.param_word_count, 2);
        assert_eq!(session.stats().methods_lowered, 1);
        assert_eq!(session.stats().instruction_counts.get("add-int"), Some(&1));
    }

    #[test]
    fn test_edge_into_exit_is_rejected() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let options = CodegenOptions::default();
        let mut b = MethodBuilder::new_static(Type::reference("LFoo;"), "f", Type::Void);
        let body = b.new_block();
        let exit = b.exit();
        b.start(body);
        b.terminate(body, BlockKind::Simple { next: exit });
        let method = b.build().unwrap();

        let err = RopMethodLowerer::new(&session, &options)
            .build(&method)
            .unwrap_err();
        assert!(matches!(err, CompileError::MalformedCfg { .. }));
    }
}
