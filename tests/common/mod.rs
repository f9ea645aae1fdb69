//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use roplower::backend::{
    CollectingEncoder, Encoder, LoweredMethod, MethodShape, Optimizer, OptimizerStrategy,
};
use roplower::cfg::{
    BinaryOp, BlockKind, Branch, CmpOp, Condition, Expr, Method, MethodBuilder, Operand, Type,
    VarRef,
};
use roplower::core::CompileResult;
use roplower::rop::{
    BasicBlock, Constant, Insn, Opcode, RegisterSpec, RopMethod, SourcePosition, SsaMethod,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn foo() -> Type {
    Type::reference("LFoo;")
}

/// `int max(int x, int y) { return x > y ? x : y + 0; }` in SSA form.
pub fn max_method() -> Method {
    let mut b = MethodBuilder::new_static(foo(), "max", Type::Int);
    let x = b.param("x", Type::Int);
    let y = b.param("y", Type::Int);
    let m = b.local("m", Type::Int);
    let cond = b.new_block();
    let take_x = b.new_block();
    let take_y = b.new_block();
    let join = b.new_block();
    b.start(cond);
    b.terminate(
        cond,
        BlockKind::Conditional {
            cond: Condition::Compare {
                op: CmpOp::Gt,
                lhs: Operand::ssa(x, 0),
                rhs: Operand::ssa(y, 0),
            },
            then_block: take_x,
            else_block: take_y,
            fallthrough: Branch::Then,
        },
    );
    b.assign(take_x, VarRef::ssa(m, 1), Expr::Operand(Operand::ssa(x, 0)));
    b.terminate(take_x, BlockKind::Simple { next: join });
    b.assign(
        take_y,
        VarRef::ssa(m, 2),
        Expr::Binary {
            op: BinaryOp::Add,
            lhs: Operand::ssa(y, 0),
            rhs: Operand::int(0),
        },
    );
    b.terminate(take_y, BlockKind::Simple { next: join });
    b.phi(
        join,
        VarRef::ssa(m, 3),
        vec![(VarRef::ssa(m, 1), take_x), (VarRef::ssa(m, 2), take_y)],
    );
    b.terminate(
        join,
        BlockKind::Return {
            value: Some(Operand::ssa(m, 3)),
        },
    );
    b.build().unwrap()
}

/// Optimizer that changes nothing and remembers what it was asked to do.
///
/// SSA graphs are converted back naively: the exit block is dropped and
/// every phi becomes a move at the end of each predecessor.
#[derive(Debug, Default)]
pub struct RecordingOptimizer {
    /// Constants hoisted into fresh registers by the standard strategy.
    pub collected_constants: u32,
    pub rop_calls: usize,
    pub strategies: Vec<OptimizerStrategy>,
    pub ssa_inputs: Vec<SsaMethod>,
}

impl RecordingOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collected_constants(count: u32) -> Self {
        Self {
            collected_constants: count,
            ..Self::default()
        }
    }
}

impl Optimizer for RecordingOptimizer {
    fn optimize_rop(&mut self, method: RopMethod, _shape: &MethodShape) -> CompileResult<RopMethod> {
        self.rop_calls += 1;
        Ok(method)
    }

    fn optimize_ssa(
        &mut self,
        method: SsaMethod,
        _shape: &MethodShape,
        strategy: OptimizerStrategy,
    ) -> CompileResult<RopMethod> {
        self.strategies.push(strategy);
        let mut rop = destruct_ssa(&method);
        if strategy.runs_const_collector() {
            collect_constants(&mut rop, method.register_count, self.collected_constants);
        }
        self.ssa_inputs.push(method);
        Ok(rop)
    }
}

/// Loads `count` constants into registers past `first_free` at the top of the
/// entry block, the way a constant collector widens the frame.
fn collect_constants(method: &mut RopMethod, first_free: u32, count: u32) {
    let first_label = method.first_label;
    let Some(entry) = method.blocks.iter_mut().find(|b| b.label == first_label) else {
        return;
    };
    for i in 0..count {
        let load = Insn::plain_cst(
            Opcode::Const,
            Type::Int,
            SourcePosition::NONE,
            Some(RegisterSpec::new(first_free + i, Type::Int)),
            Vec::new(),
            Constant::Int(i as i32 + 100),
        );
        entry.insns.insert(0, load);
    }
}

/// Naive SSA destruction for tests.
pub fn destruct_ssa(method: &SsaMethod) -> RopMethod {
    let mut insns: Vec<Vec<Insn>> = method.blocks.iter().map(|b| b.insns.clone()).collect();

    for block in &method.blocks {
        for phi in &block.phis {
            for operand in &phi.operands {
                if operand.source.reg == phi.result.reg {
                    continue;
                }
                let mov = Insn::plain(
                    Opcode::Move,
                    phi.result.ty.clone(),
                    SourcePosition::NONE,
                    Some(phi.result.clone()),
                    vec![operand.source.clone()],
                );
                let pred = &mut insns[operand.predecessor];
                let at = match pred.last() {
                    Some(last) if last.opcode.is_branch() => pred.len() - 1,
                    _ => pred.len(),
                };
                pred.insert(at, mov);
            }
        }
    }

    let blocks = method
        .blocks
        .iter()
        .zip(insns)
        .filter(|(block, _)| Some(block.index) != method.exit)
        .map(|(block, insns)| {
            let successors: Vec<u32> = block
                .successors
                .iter()
                .filter(|succ| Some(**succ) != method.exit)
                .map(|succ| method.blocks[*succ].label)
                .collect();
            let primary = block
                .primary_successor
                .filter(|p| Some(*p) != method.exit)
                .map(|p| method.blocks[p].label);
            BasicBlock::new(block.label, insns, successors, primary)
        })
        .collect();
    RopMethod::new(blocks, method.blocks[method.entry].label)
}

/// Encoder with an explicit advised and hard register limit.
#[derive(Debug)]
pub struct LimitedEncoder {
    pub advised: u32,
    pub limit: u32,
    pub inner: CollectingEncoder,
}

impl LimitedEncoder {
    pub fn new(advised: u32, limit: u32) -> Self {
        Self {
            advised,
            limit,
            inner: CollectingEncoder::new(),
        }
    }
}

impl Encoder for LimitedEncoder {
    fn advised_max_registers(&self, _shape: &MethodShape) -> u32 {
        self.advised
    }

    fn max_registers(&self) -> u32 {
        self.limit
    }

    fn encode(&mut self, method: LoweredMethod) -> CompileResult<()> {
        self.inner.encode(method)
    }
}

/// Every instruction of `method` in block order, with its block label.
pub fn all_insns(method: &RopMethod) -> Vec<(u32, &Insn)> {
    method
        .blocks
        .iter()
        .flat_map(|b| b.insns.iter().map(move |i| (b.label, i)))
        .collect()
}

/// Opcode sequence of one block.
pub fn opcodes(block: &BasicBlock) -> Vec<Opcode> {
    block.insns.iter().map(|i| i.opcode).collect()
}
