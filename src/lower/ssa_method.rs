// This module implements the SSA method lowerer. It shares the skip rule and the block lowering
// rules with the direct lowerer but labels blocks by their id over the whole method, with the
// entry standing for the parameter block and the exit mapped to the sentinel. Registers are
// allocated per definition before any block is lowered. The graph starts with an SSA-init block
// that jumps to the parameter block; phis are built from the declared phi elements with their
// operands tagged by predecessor label, continuation blocks take free labels above the special
// range, and the assembler resolves everything to final indices. The SsaMethod always goes
// through the optimizer. If the optimized body needs more registers than the encoder advises,
// the whole lowering runs once more with the register-minimizing strategy, which skips
// constant collection; a second overflow past the hard limit fails the method.

//! SSA method lowering with a bounded register retry.

use super::block::{BlockLowerer, PlacedBlock};
use super::labels::{LabelSpace, SpecialLabel};
use super::method::{first_block, param_moves, record_lowered, reject_exit_edge, skip_reason};
use super::registers::{RegisterManager, SsaRegisterManager};
use super::ssa_blocks::{PendingPhi, SsaBlockAssembler};
use crate::backend::{Encoder, LoweredMethod, MethodFilter, Optimizer, OptimizerStrategy};
use crate::cfg::analysis::{reachable_order, EXIT_LABEL};
use crate::cfg::{BlockId, Method, Type};
use crate::core::compiler::MethodOutcome;
use crate::core::error::{CompileError, CompileResult};
use crate::core::options::CodegenOptions;
use crate::core::session::CompilationSession;
use crate::rop::{verify, Insn, Opcode, SourcePosition, SsaMethod};

/// Lowering attempts per method: the standard one and one retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// Optimizer strategy of each attempt.
fn attempt_strategy(attempt: u32) -> OptimizerStrategy {
    if attempt == 1 {
        OptimizerStrategy::Standard
    } else {
        OptimizerStrategy::MinimizeRegisters
    }
}

/// Lowers methods through SSA form.
pub struct SsaMethodLowerer<'s, 'arena> {
    session: &'s CompilationSession<'arena>,
    options: &'s CodegenOptions,
}

impl<'s, 'arena> SsaMethodLowerer<'s, 'arena> {
    pub fn new(session: &'s CompilationSession<'arena>, options: &'s CodegenOptions) -> Self {
        Self { session, options }
    }

    /// Lower `method`, optimize it and hand it to `encoder`.
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
            .lower_with_retry(method, &identity, optimizer, encoder)
            .map_err(|err| err.in_method(&identity));
        self.session.clear_method_state();
        if result.is_err() {
            self.session.record_method_failed();
        }
        result
    }

    fn lower_with_retry(
        &self,
        method: &Method,
        identity: &str,
        optimizer: &mut dyn Optimizer,
        encoder: &mut dyn Encoder,
    ) -> CompileResult<MethodOutcome> {
        let shape = method.shape();
        let advised = encoder.advised_max_registers(&shape);

        let mut attempt = 1;
        let (body, register_count) = loop {
            let strategy = attempt_strategy(attempt);
            let ssa = self.build(method)?;
            let body = optimizer.optimize_ssa(ssa, &shape, strategy)?;
            verify(&body)?;
            let register_count = body.register_count();

            if register_count <= advised {
                break (body, register_count);
            }
            if attempt < MAX_ATTEMPTS {
                log::warn!(
                    "{}: {} registers exceed the advised {}, retrying with {:?}",
                    identity,
                    register_count,
                    advised,
                    attempt_strategy(attempt + 1)
                );
                self.session.record_ssa_retry();
                attempt += 1;
                continue;
            }
            let limit = encoder.max_registers();
            if register_count > limit {
                return Err(CompileError::RegisterBudgetExceeded {
                    count: register_count,
                    limit,
                });
            }
            break (body, register_count);
        };

        record_lowered(self.session, identity, &body, register_count);
        let blocks = body.blocks.len();
        log::debug!(
            "{}: {} blocks, {} registers after {} attempt(s)",
            identity,
            blocks,
            register_count,
            attempt
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

    /// Lower `method` into a resolved SSA graph.
    pub fn build(&self, method: &Method) -> CompileResult<SsaMethod> {
        let order = reachable_order(self.session, method)?;
        let space = LabelSpace::new(method.blocks.len() as u32);
        let mut asm = SsaBlockAssembler::new(space);
        let mut regs = SsaRegisterManager::for_method(method, self.options)?;

        let init_label = asm.special_label(SpecialLabel::SsaInit);
        let param_label = asm.special_label(SpecialLabel::ParamAssignment);
        let target = |id: BlockId| -> CompileResult<u32> {
            if id == method.entry {
                Ok(param_label)
            } else if id == method.exit {
                reject_exit_edge(id, EXIT_LABEL)
            } else {
                Ok(id.0)
            }
        };
        let first_label = target(first_block(method)?)?;

        let init = asm.new_block()?;
        {
            let block = asm.block_mut(init)?;
            block.label = Some(init_label);
            block.insns = vec![Insn::plain(
                Opcode::Goto,
                Type::Void,
                SourcePosition::NONE,
                None,
                Vec::new(),
            )];
            block.successors = vec![param_label];
            block.primary_successor = Some(param_label);
        }
        let params = asm.new_block()?;
        {
            let insns = param_moves(regs.param_specs());
            let block = asm.block_mut(params)?;
            block.label = Some(param_label);
            block.insns = insns;
            block.successors = vec![first_label];
            block.primary_successor = Some(first_label);
        }

        for id in order.order {
            let block = method.block(*id).ok_or_else(|| CompileError::MalformedCfg {
                reason: format!("block {} missing", id),
            })?;
            let label = target(*id)?;

            let mut phis = Vec::with_capacity(block.phis.len());
            for phi in &block.phis {
                let mut operands = Vec::with_capacity(phi.args.len());
                for arg in &phi.args {
                    operands.push((regs.use_spec(&arg.value)?, target(arg.pred)?));
                }
                phis.push(PendingPhi {
                    result: regs.def_spec(&phi.def)?,
                    operands,
                });
            }

            let lowered = BlockLowerer::new(method, self.options, &mut regs).lower(block)?;
            let placed = lowered.place(label, target, || Ok(asm.available_label()))?;
            if let Some(continuation) = placed.get(1) {
                asm.record_continuation(label, continuation.label)?;
                self.session.record_extra_block();
            }
            for (
                i,
                PlacedBlock {
                    label,
                    insns,
                    successors,
                    primary_successor,
                },
            ) in placed.into_iter().enumerate()
            {
                let index = asm.new_block()?;
                let pending = asm.block_mut(index)?;
                pending.label = Some(label);
                pending.insns = insns;
                pending.successors = successors;
                pending.primary_successor = primary_successor;
                if i == 0 {
                    pending.phis = std::mem::take(&mut phis);
                }
            }
        }

        let method_ssa = asm.compute_final_block_list(self.session, init_label, regs.register_count())?;
        log::trace!("{} (SSA):\n{}", method.name, method_ssa);
        Ok(method_ssa)
    }
}
