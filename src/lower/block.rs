// This module implements the block lowerer shared by the direct and SSA lowerings. It is
// generic over RegisterManager, so the same statement rules produce per-variable registers in
// one variant and per-definition registers in the other, and it is label-agnostic: it returns
// the primary and continuation instruction lists together with a BlockExit naming successor
// blocks by id, and the block assemblers turn those into labels. Dispatch is an exhaustive
// match over the closed BlockKind set; entry and exit blocks never reach it. Throwing
// instructions are only accepted in throwing-expression blocks (the throw of a Throw block is
// emitted separately). A throwing value producer is appended with InsnBuffer::add and its
// move-result or move-result-pseudo is queued as a continuation instruction; everything after
// it flows into the continuation list through add_after. Scratch registers are released at
// every statement boundary.

//! Lowering of one input block.

use super::insn_list::InsnBuffer;
use super::ops::{self, BinaryForm, CastPlan};
use super::registers::RegisterManager;
use crate::cfg::{
    BinaryOp, Block, BlockId, BlockKind, Branch, Call, CmpOp, Condition, Dispatch, Expr,
    Literal, Method, Operand, Stmt, StmtKind, Type, UnaryOp,
};
use crate::core::error::{CompileError, CompileResult};
use crate::core::options::{CodegenOptions, POLYMORPHIC_CALL_API_LEVEL};
use crate::rop::{Constant, Insn, Opcode, RegisterSpec, SourcePosition};

/// How control leaves a lowered block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockExit {
    Goto(BlockId),
    /// Conditional branch: falls through to `primary`, jumps to `alternative`.
    Branch {
        primary: BlockId,
        alternative: BlockId,
    },
    /// Case targets in declaration order, then the default.
    Switch { targets: Vec<BlockId> },
    Return,
    Throw,
    /// Ends in a throwing instruction; normal flow continues at `next`,
    /// through the continuation block when one is needed.
    Throwing { next: BlockId },
}

/// Instructions of one lowered block.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredBlock {
    pub insns: Vec<Insn>,
    /// Instructions for the continuation block; empty when none is needed.
    pub extra: Vec<Insn>,
    pub exit: BlockExit,
    /// Handler edges, one per catch type per handler, in handler order.
    pub catches: Vec<(Type, BlockId)>,
}

/// A lowered block placed at its label, ready for an assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBlock {
    pub label: u32,
    pub insns: Vec<Insn>,
    pub successors: Vec<u32>,
    pub primary_successor: Option<u32>,
}

impl LoweredBlock {
    pub fn needs_extra_block(&self) -> bool {
        !self.extra.is_empty()
    }

    /// Place the block at `label`, resolving successor blocks through
    /// `target`. A continuation block, when needed, is placed at the label
    /// returned by `extra_label` and comes second.
    pub fn place(
        self,
        label: u32,
        target: impl Fn(BlockId) -> CompileResult<u32>,
        extra_label: impl FnOnce() -> CompileResult<u32>,
    ) -> CompileResult<Vec<PlacedBlock>> {
        let LoweredBlock {
            insns,
            extra,
            exit,
            catches,
        } = self;
        if !extra.is_empty() && !matches!(exit, BlockExit::Throwing { .. }) {
            return Err(CompileError::MalformedCfg {
                reason: format!("continuation instructions in block {} without a throwing exit", label),
            });
        }
        let mut successors = catches
            .iter()
            .map(|(_, handler)| target(*handler))
            .collect::<CompileResult<Vec<_>>>()?;
        let block = |insns, successors, primary_successor| PlacedBlock {
            label,
            insns,
            successors,
            primary_successor,
        };

        let placed = match exit {
            BlockExit::Goto(next) => {
                let next = target(next)?;
                vec![block(insns, vec![next], Some(next))]
            }
            BlockExit::Branch {
                primary,
                alternative,
            } => {
                let primary = target(primary)?;
                let alternative = target(alternative)?;
                vec![block(insns, vec![primary, alternative], Some(primary))]
            }
            BlockExit::Switch { targets } => {
                let targets = targets
                    .into_iter()
                    .map(&target)
                    .collect::<CompileResult<Vec<_>>>()?;
                let default = targets.last().copied();
                vec![block(insns, targets, default)]
            }
            BlockExit::Return => vec![block(insns, Vec::new(), None)],
            BlockExit::Throw => vec![block(insns, successors, None)],
            BlockExit::Throwing { next } => {
                let next = target(next)?;
                if extra.is_empty() {
                    successors.push(next);
                    vec![block(insns, successors, Some(next))]
                } else {
                    let continuation = extra_label()?;
                    successors.push(continuation);
                    vec![
                        block(insns, successors, Some(continuation)),
                        PlacedBlock {
                            label: continuation,
                            insns: extra,
                            successors: vec![next],
                            primary_successor: Some(next),
                        },
                    ]
                }
            }
        };
        Ok(placed)
    }
}

/// Per-block lowering state.
struct Frame {
    id: BlockId,
    kind: &'static str,
    is_catch: bool,
    allows_throw: bool,
    catch_types: Vec<Type>,
    position: SourcePosition,
    buf: InsnBuffer,
}

/// Lowers blocks of one method into instruction lists.
pub struct BlockLowerer<'a, R: RegisterManager> {
    method: &'a Method,
    options: &'a CodegenOptions,
    regs: &'a mut R,
}

impl<'a, R: RegisterManager> BlockLowerer<'a, R> {
    pub fn new(method: &'a Method, options: &'a CodegenOptions, regs: &'a mut R) -> Self {
        Self {
            method,
            options,
            regs,
        }
    }

    pub fn registers(&self) -> &R {
        &*self.regs
    }

    /// Lower `block`, dispatching on its kind.
    pub fn lower(&mut self, block: &Block) -> CompileResult<LoweredBlock> {
        let catches = self.method.catch_edges(block);
        let mut frame = Frame {
            id: block.id,
            kind: block.kind.name(),
            is_catch: matches!(block.kind, BlockKind::Catch { .. }),
            allows_throw: matches!(block.kind, BlockKind::ThrowingExpression { .. }),
            catch_types: catches.iter().map(|(ty, _)| ty.clone()).collect(),
            position: SourcePosition::NONE,
            buf: InsnBuffer::new(),
        };

        if matches!(block.kind, BlockKind::Entry { .. } | BlockKind::Exit) {
            return Err(unexpected(block));
        }

        for stmt in &block.stmts {
            self.lower_stmt(&mut frame, stmt)?;
            self.regs.reset_temps();
        }

        let exit = match &block.kind {
            BlockKind::Simple { next } | BlockKind::Catch { next, .. } | BlockKind::Case { next } => {
                frame.buf.add_after(goto());
                BlockExit::Goto(*next)
            }
            BlockKind::Return { value } => {
                self.lower_return(&mut frame, value.as_ref())?;
                BlockExit::Return
            }
            BlockKind::Throw { value } => {
                let exception = self.operand_reg(&mut frame, value, &Type::throwable())?;
                let throw = Insn::throwing(
                    Opcode::Throw,
                    Type::Void,
                    frame.position,
                    vec![exception],
                    frame.catch_types.clone(),
                );
                frame.buf.add(throw)?;
                BlockExit::Throw
            }
            BlockKind::ThrowingExpression { next } => {
                let ends_throwing = frame.buf.has_pending_extra()
                    || frame.buf.insns().last().is_some_and(Insn::is_throwing);
                if ends_throwing {
                    if !frame.buf.extra().is_empty() {
                        frame.buf.add_after(goto());
                    }
                    BlockExit::Throwing { next: *next }
                } else {
                    frame.buf.add_after(goto());
                    BlockExit::Goto(*next)
                }
            }
            BlockKind::Conditional {
                cond,
                then_block,
                else_block,
                fallthrough,
            } => self.lower_conditional(&mut frame, cond, *then_block, *else_block, *fallthrough)?,
            BlockKind::Switch {
                selector,
                cases,
                default,
            } => {
                let sel = self.operand_reg(&mut frame, selector, &Type::Int)?;
                let values = cases.iter().map(|(value, _)| *value).collect();
                frame.buf.add_after(Insn::switch(frame.position, sel, values));
                let mut targets: Vec<BlockId> = cases.iter().map(|(_, target)| *target).collect();
                targets.push(*default);
                BlockExit::Switch { targets }
            }
            BlockKind::Entry { .. } | BlockKind::Exit => return Err(unexpected(block)),
        };
        self.regs.reset_temps();

        let catches = match exit {
            BlockExit::Throw | BlockExit::Throwing { .. } => catches,
            _ => Vec::new(),
        };
        let (insns, extra) = frame.buf.into_parts();
        for insn in insns.iter().chain(extra.iter()) {
            log::trace!("{}: {}", block.id, insn);
        }
        Ok(LoweredBlock {
            insns,
            extra,
            exit,
            catches,
        })
    }

    fn position(&self, line: Option<u32>) -> SourcePosition {
        match line {
            Some(line) if self.options.emit_line_numbers => SourcePosition::line(line),
            _ => SourcePosition::NONE,
        }
    }

    fn lower_stmt(&mut self, frame: &mut Frame, stmt: &Stmt) -> CompileResult<()> {
        frame.position = self.position(stmt.line);
        match &stmt.kind {
            StmtKind::Assign { dest, value } => {
                let dest = self.regs.def_spec(dest)?;
                self.lower_expr(frame, value, Some(dest))
            }
            StmtKind::Eval(expr) => self.lower_expr(frame, expr, None),
            StmtKind::FieldSet {
                field,
                instance,
                value,
            } => {
                let mut sources = vec![self.operand_reg(frame, value, &field.ty)?];
                let opcode = match instance {
                    Some(obj) => {
                        sources.push(self.operand_reg(frame, obj, &field.owner)?);
                        Opcode::PutField
                    }
                    None => Opcode::PutStatic,
                };
                let insn = Insn::throwing_cst(
                    opcode,
                    field.ty.clone(),
                    frame.position,
                    sources,
                    Constant::Field(field.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_throwing(frame, insn)
            }
            StmtKind::ArraySet {
                array,
                index,
                value,
                elem_ty,
            } => {
                let sources = vec![
                    self.operand_reg(frame, value, elem_ty)?,
                    self.operand_reg(frame, array, &elem_ty.array_of())?,
                    self.operand_reg(frame, index, &Type::Int)?,
                ];
                let insn = Insn::throwing(
                    Opcode::Aput,
                    elem_ty.clone(),
                    frame.position,
                    sources,
                    frame.catch_types.clone(),
                );
                self.emit_throwing(frame, insn)
            }
            StmtKind::Lock(obj) | StmtKind::Unlock(obj) => {
                let opcode = match &stmt.kind {
                    StmtKind::Lock(_) => Opcode::MonitorEnter,
                    _ => Opcode::MonitorExit,
                };
                let reg = self.operand_reg(frame, obj, &Type::object())?;
                let insn = Insn::throwing(
                    opcode,
                    Type::Void,
                    frame.position,
                    vec![reg],
                    frame.catch_types.clone(),
                );
                self.emit_throwing(frame, insn)
            }
        }
    }

    fn lower_expr(
        &mut self,
        frame: &mut Frame,
        expr: &Expr,
        dest: Option<RegisterSpec>,
    ) -> CompileResult<()> {
        let pos = frame.position;
        match expr {
            Expr::Operand(operand) => {
                let Some(dest) = dest else {
                    return Ok(());
                };
                match operand {
                    Operand::Var(var) => {
                        let src = self.regs.use_spec(var)?;
                        if src.reg != dest.reg {
                            frame.buf.add_after(Insn::plain(
                                Opcode::Move,
                                dest.ty.clone(),
                                pos,
                                Some(dest),
                                vec![src],
                            ));
                        }
                        Ok(())
                    }
                    Operand::Literal(lit) => self.load_literal(frame, lit, dest),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.lower_binary(frame, *op, lhs, rhs, dest),
            Expr::Unary { op, operand } => {
                let Some(dest) = dest else {
                    return Ok(());
                };
                let ty = arith_type(&self.operand_type(operand)?);
                let src = self.operand_reg(frame, operand, &ty)?;
                let insn = match op {
                    UnaryOp::Not => Insn::plain_cst(
                        Opcode::Xor,
                        Type::Int,
                        pos,
                        Some(dest),
                        vec![src],
                        Constant::Int(1),
                    ),
                    _ => Insn::plain(ops::unary_opcode(*op), ty, pos, Some(dest), vec![src]),
                };
                frame.buf.add_after(insn);
                Ok(())
            }
            Expr::Cast { operand, to } => self.lower_cast(frame, operand, to, dest),
            Expr::InstanceOf { operand, test } => {
                let src = self.operand_reg(frame, operand, &Type::object())?;
                let insn = Insn::throwing_cst(
                    Opcode::InstanceOf,
                    Type::Int,
                    pos,
                    vec![src],
                    Constant::Type(test.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::FieldGet { field, instance } => {
                let (opcode, sources) = match instance {
                    Some(obj) => (
                        Opcode::GetField,
                        vec![self.operand_reg(frame, obj, &field.owner)?],
                    ),
                    None => (Opcode::GetStatic, Vec::new()),
                };
                let insn = Insn::throwing_cst(
                    opcode,
                    field.ty.clone(),
                    pos,
                    sources,
                    Constant::Field(field.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::ArrayGet {
                array,
                index,
                elem_ty,
            } => {
                let sources = vec![
                    self.operand_reg(frame, array, &elem_ty.array_of())?,
                    self.operand_reg(frame, index, &Type::Int)?,
                ];
                let insn = Insn::throwing(
                    Opcode::Aget,
                    elem_ty.clone(),
                    pos,
                    sources,
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::ArrayLength(array) => {
                let src = self.operand_reg(frame, array, &Type::object())?;
                let insn = Insn::throwing(
                    Opcode::ArrayLength,
                    Type::Int,
                    pos,
                    vec![src],
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::NewInstance(ty) => {
                let insn = Insn::throwing_cst(
                    Opcode::NewInstance,
                    ty.clone(),
                    pos,
                    Vec::new(),
                    Constant::Type(ty.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::NewArray { array_ty, length } => {
                let len = self.operand_reg(frame, length, &Type::Int)?;
                let insn = Insn::throwing_cst(
                    Opcode::NewArray,
                    array_ty.clone(),
                    pos,
                    vec![len],
                    Constant::Type(array_ty.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::FilledNewArray { array_ty, elements } => {
                let elem_ty = array_ty.component().unwrap_or_else(Type::object);
                let mut sources = Vec::with_capacity(elements.len());
                for element in elements {
                    sources.push(self.operand_reg(frame, element, &elem_ty)?);
                }
                let insn = Insn::throwing_cst(
                    Opcode::FilledNewArray,
                    array_ty.clone(),
                    pos,
                    sources,
                    Constant::Type(array_ty.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            Expr::ArrayData { array_ty, values } => {
                let array = match dest {
                    Some(dest) => dest,
                    None => self.regs.temp(array_ty),
                };
                let len = i32::try_from(values.len()).map_err(|_| CompileError::InvalidOperand {
                    reason: format!("array literal of {} elements", values.len()),
                })?;
                let len = self.operand_reg(frame, &Operand::int(len), &Type::Int)?;
                let alloc = Insn::throwing_cst(
                    Opcode::NewArray,
                    array_ty.clone(),
                    pos,
                    vec![len],
                    Constant::Type(array_ty.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, alloc, Some(array.clone()))?;
                let values = values.iter().map(ops::literal_constant).collect();
                frame.buf.add_after(Insn::fill_array_data(
                    pos,
                    array,
                    array_ty.clone(),
                    values,
                ));
                Ok(())
            }
            Expr::Call(call) => self.lower_call(frame, call, dest),
            Expr::CaughtException => {
                if !frame.is_catch || !frame.buf.insns().is_empty() {
                    return Err(CompileError::MalformedCfg {
                        reason: format!(
                            "caught exception read outside the start of a catch block in {}",
                            frame.id
                        ),
                    });
                }
                let dest = match dest {
                    Some(dest) => dest,
                    None => self.regs.temp(&Type::throwable()),
                };
                frame.buf.add_after(Insn::plain(
                    Opcode::MoveException,
                    dest.ty.clone(),
                    pos,
                    Some(dest),
                    Vec::new(),
                ));
                Ok(())
            }
        }
    }

    fn lower_binary(
        &mut self,
        frame: &mut Frame,
        op: BinaryOp,
        lhs: &Operand,
        rhs: &Operand,
        dest: Option<RegisterSpec>,
    ) -> CompileResult<()> {
        let pos = frame.position;
        let operand_ty = match (lhs, rhs) {
            (Operand::Literal(_), Operand::Var(_)) if !op.is_shift() => self.operand_type(rhs)?,
            _ => self.operand_type(lhs)?,
        };
        let ty = arith_type(&operand_ty);
        let throws = ops::binary_opcode(op).can_throw(&ty);
        if dest.is_none() && !throws {
            return Ok(());
        }

        let (opcode, sources, cst) = match ops::binary_form(op, lhs, rhs, &ty) {
            BinaryForm::Registers { opcode, lhs, rhs } => {
                let rhs_ty = if op.is_shift() { Type::Int } else { ty.clone() };
                let a = self.operand_reg(frame, &lhs, &ty)?;
                let b = self.operand_reg(frame, &rhs, &rhs_ty)?;
                (opcode, vec![a, b], None)
            }
            BinaryForm::Literal {
                opcode,
                operand,
                literal,
            } => {
                let a = self.operand_reg(frame, &operand, &ty)?;
                (opcode, vec![a], Some(Constant::Int(literal)))
            }
        };

        if throws {
            let insn = match cst {
                Some(cst) => Insn::throwing_cst(
                    opcode,
                    ty,
                    pos,
                    sources,
                    cst,
                    frame.catch_types.clone(),
                ),
                None => Insn::throwing(opcode, ty, pos, sources, frame.catch_types.clone()),
            };
            return self.emit_value(frame, insn, dest);
        }

        let insn = match cst {
            Some(cst) => Insn::plain_cst(opcode, ty, pos, dest, sources, cst),
            None => Insn::plain(opcode, ty, pos, dest, sources),
        };
        frame.buf.add_after(insn);
        Ok(())
    }

    fn lower_cast(
        &mut self,
        frame: &mut Frame,
        operand: &Operand,
        to: &Type,
        dest: Option<RegisterSpec>,
    ) -> CompileResult<()> {
        let pos = frame.position;
        let from = self.operand_type(operand)?;
        let plan = ops::cast_plan(&from, to)?;
        if dest.is_none() && plan != CastPlan::CheckCast {
            return Ok(());
        }
        let src = self.operand_reg(frame, operand, &from)?;

        match (plan, dest) {
            (CastPlan::CheckCast, dest) => {
                let insn = Insn::throwing_cst(
                    Opcode::CheckCast,
                    to.clone(),
                    pos,
                    vec![src],
                    Constant::Type(to.clone()),
                    frame.catch_types.clone(),
                );
                self.emit_value(frame, insn, dest)
            }
            (_, None) => Ok(()),
            (CastPlan::Move, Some(dest)) => {
                if src.reg != dest.reg {
                    frame.buf.add_after(Insn::plain(
                        Opcode::Move,
                        dest.ty.clone(),
                        pos,
                        Some(dest),
                        vec![src],
                    ));
                }
                Ok(())
            }
            (CastPlan::Truncate(op), Some(dest)) => {
                frame
                    .buf
                    .add_after(Insn::plain(op, to.clone(), pos, Some(dest), vec![src]));
                Ok(())
            }
            (CastPlan::Convert, Some(dest)) => {
                frame.buf.add_after(Insn::plain(
                    Opcode::Conv,
                    arith_type(to),
                    pos,
                    Some(dest),
                    vec![src],
                ));
                Ok(())
            }
            (CastPlan::ConvertThenTruncate(op), Some(dest)) => {
                let int = self.regs.temp(&Type::Int);
                frame.buf.add_after(Insn::plain(
                    Opcode::Conv,
                    Type::Int,
                    pos,
                    Some(int.clone()),
                    vec![src],
                ));
                frame
                    .buf
                    .add_after(Insn::plain(op, to.clone(), pos, Some(dest), vec![int]));
                Ok(())
            }
        }
    }

    fn lower_call(
        &mut self,
        frame: &mut Frame,
        call: &Call,
        dest: Option<RegisterSpec>,
    ) -> CompileResult<()> {
        let pos = frame.position;
        let target = &call.method;
        let mut sources = Vec::with_capacity(call.args.len() + 1);
        if target.dispatch.has_receiver() {
            let receiver = call.receiver.as_ref().ok_or_else(|| CompileError::InvalidOperand {
                reason: format!("{:?} call to {} without receiver", target.dispatch, target),
            })?;
            sources.push(self.operand_reg(frame, receiver, &target.owner)?);
        }
        for (arg, ty) in call.args.iter().zip(target.params.iter()) {
            sources.push(self.operand_reg(frame, arg, ty)?);
        }
        if call.args.len() != target.params.len() {
            return Err(CompileError::InvalidOperand {
                reason: format!(
                    "{} takes {} arguments, {} given",
                    target,
                    target.params.len(),
                    call.args.len()
                ),
            });
        }

        let opcode = ops::invoke_opcode(target.dispatch);
        let insn = if target.dispatch == Dispatch::Polymorphic {
            if self.options.api_level < POLYMORPHIC_CALL_API_LEVEL {
                return Err(CompileError::UnsupportedApiLevel {
                    feature: "invoke-polymorphic",
                    required: POLYMORPHIC_CALL_API_LEVEL,
                    target: self.options.api_level,
                });
            }
            let proto = call.proto.clone().unwrap_or_else(|| target.descriptor());
            Insn::throwing_dual_cst(
                opcode,
                target.return_type.clone(),
                pos,
                sources,
                Constant::Method(target.clone()),
                Constant::Proto(proto),
                frame.catch_types.clone(),
            )
        } else {
            Insn::throwing_cst(
                opcode,
                target.return_type.clone(),
                pos,
                sources,
                Constant::Method(target.clone()),
                frame.catch_types.clone(),
            )
        };
        self.emit_value(frame, insn, dest)
    }

    fn lower_return(&mut self, frame: &mut Frame, value: Option<&Operand>) -> CompileResult<()> {
        let return_type = self.method.return_type.clone();
        let sources = match value {
            None => Vec::new(),
            Some(Operand::Var(var)) => vec![self.regs.use_spec(var)?],
            Some(Operand::Literal(lit)) => {
                let ret = self.regs.return_spec().cloned().ok_or_else(|| {
                    CompileError::InvalidOperand {
                        reason: format!("value returned from void method in {}", frame.id),
                    }
                })?;
                self.load_literal(frame, lit, ret.clone())?;
                vec![ret]
            }
        };
        frame.buf.add_after(Insn::plain(
            Opcode::Return,
            return_type,
            frame.position,
            None,
            sources,
        ));
        Ok(())
    }

    fn lower_conditional(
        &mut self,
        frame: &mut Frame,
        cond: &Condition,
        then_block: BlockId,
        else_block: BlockId,
        fallthrough: Branch,
    ) -> CompileResult<BlockExit> {
        if then_block == else_block && self.options.remove_redundant_branches {
            frame.buf.add_after(goto());
            return Ok(BlockExit::Goto(then_block));
        }

        // The branch is taken towards the alternative.
        let (primary, alternative, negate) = match fallthrough {
            Branch::Then => (then_block, else_block, true),
            Branch::Else => (else_block, then_block, false),
        };
        let pos = frame.position;

        let (op, lhs, rhs) = match cond {
            Condition::Truth(operand) => (CmpOp::Ne, operand.clone(), Operand::int(0)),
            Condition::Compare { op, lhs, rhs } => (*op, lhs.clone(), rhs.clone()),
        };
        let test = if negate { op.negate() } else { op };
        let ty = match (&lhs, &rhs) {
            (Operand::Literal(_), Operand::Var(_)) => self.operand_type(&rhs)?,
            _ => self.operand_type(&lhs)?,
        };

        let branch = if let Some(cmp) = ops::compare_opcode(op, &ty) {
            let a = self.operand_reg(frame, &lhs, &ty)?;
            let b = self.operand_reg(frame, &rhs, &ty)?;
            let result = self.regs.temp(&Type::Int);
            frame.buf.add_after(Insn::plain(
                cmp,
                ty,
                pos,
                Some(result.clone()),
                vec![a, b],
            ));
            Insn::plain(Opcode::IfZ(test), Type::Int, pos, None, vec![result])
        } else if is_zero(&rhs) {
            let a = self.operand_reg(frame, &lhs, &ty)?;
            Insn::plain(Opcode::IfZ(test), ty, pos, None, vec![a])
        } else if is_zero(&lhs) {
            let b = self.operand_reg(frame, &rhs, &ty)?;
            Insn::plain(Opcode::IfZ(test.swap()), ty, pos, None, vec![b])
        } else {
            let a = self.operand_reg(frame, &lhs, &ty)?;
            let b = self.operand_reg(frame, &rhs, &ty)?;
            Insn::plain(Opcode::If(test), ty, pos, None, vec![a, b])
        };
        frame.buf.add_after(branch);

        Ok(BlockExit::Branch {
            primary,
            alternative,
        })
    }

    /// Register holding `operand`, materialising literals into a scratch
    /// register of their own type (`hint` for null).
    fn operand_reg(
        &mut self,
        frame: &mut Frame,
        operand: &Operand,
        hint: &Type,
    ) -> CompileResult<RegisterSpec> {
        match operand {
            Operand::Var(var) => self.regs.use_spec(var),
            Operand::Literal(lit) => {
                let ty = match lit {
                    Literal::Null if hint.is_reference() => hint.clone(),
                    Literal::Null => Type::object(),
                    other => other.ty(),
                };
                let temp = self.regs.temp(&ty);
                self.load_literal(frame, lit, temp.clone())?;
                Ok(temp)
            }
        }
    }

    fn load_literal(
        &mut self,
        frame: &mut Frame,
        lit: &Literal,
        dest: RegisterSpec,
    ) -> CompileResult<()> {
        let pos = frame.position;
        let cst = ops::literal_constant(lit);
        if lit.loads_object() {
            let insn = Insn::throwing_cst(
                Opcode::ConstObject,
                lit.ty(),
                pos,
                Vec::new(),
                cst,
                frame.catch_types.clone(),
            );
            return self.emit_value(frame, insn, Some(dest));
        }
        frame.buf.add_after(Insn::plain_cst(
            Opcode::Const,
            dest.ty.clone(),
            pos,
            Some(dest),
            Vec::new(),
            cst,
        ));
        Ok(())
    }

    fn check_throw_allowed(&self, frame: &Frame, insn: &Insn) -> CompileResult<()> {
        if !frame.allows_throw {
            return Err(CompileError::MisplacedThrowingInsn {
                block: frame.id.0,
                kind: frame.kind,
                opcode: insn.opcode.name(),
            });
        }
        Ok(())
    }

    /// Emit a throwing instruction whose value, if any, is not fetched.
    fn emit_throwing(&mut self, frame: &mut Frame, insn: Insn) -> CompileResult<()> {
        self.check_throw_allowed(frame, &insn)?;
        if frame.buf.has_pending_extra() {
            frame.buf.add_after(insn);
        } else {
            frame.buf.add(insn)?;
            frame.buf.seal();
        }
        Ok(())
    }

    /// Emit a throwing value producer and queue the instruction fetching its
    /// result into `dest`. Discarded call results are not fetched; any other
    /// discarded value lands in a scratch register.
    fn emit_value(
        &mut self,
        frame: &mut Frame,
        insn: Insn,
        dest: Option<RegisterSpec>,
    ) -> CompileResult<()> {
        self.check_throw_allowed(frame, &insn)?;
        let pos = insn.position;
        let value_ty = insn.ty.clone();
        let is_call = insn.opcode.is_call();
        let fetch = if is_call || insn.opcode == Opcode::FilledNewArray {
            Opcode::MoveResult
        } else {
            Opcode::MoveResultPseudo
        };
        frame.buf.add(insn)?;

        let target = match dest {
            _ if value_ty == Type::Void => None,
            Some(dest) => Some(dest),
            None if is_call => None,
            None => Some(self.regs.temp(&value_ty)),
        };
        match target {
            Some(target) => {
                let ty = match fetch {
                    Opcode::MoveResult => value_ty,
                    _ => target.ty.clone(),
                };
                frame
                    .buf
                    .add_extra(Insn::plain(fetch, ty, pos, Some(target), Vec::new()));
            }
            None => frame.buf.seal(),
        }
        Ok(())
    }

    fn operand_type(&self, operand: &Operand) -> CompileResult<Type> {
        match operand {
            Operand::Var(var) => self
                .method
                .var(var.var)
                .map(|v| v.ty.clone())
                .ok_or(CompileError::RegisterNotAllocated { var: var.var.0 }),
            Operand::Literal(lit) => Ok(lit.ty()),
        }
    }
}

fn unexpected(block: &Block) -> CompileError {
    CompileError::UnexpectedBlock {
        block: block.id.0,
        kind: block.kind.name(),
    }
}

fn goto() -> Insn {
    Insn::plain(Opcode::Goto, Type::Void, SourcePosition::NONE, None, Vec::new())
}

/// Small ints compute as int.
fn arith_type(ty: &Type) -> Type {
    if ty.is_small_int() {
        Type::Int
    } else {
        ty.clone()
    }
}

fn is_zero(operand: &Operand) -> bool {
    operand.as_literal().is_some_and(Literal::is_zero)
}
