// This module is the producer interface of the lowering stage: the typed, structured CFG of one
// method. A Method owns its variables (this, parameters, locals) and its blocks; blocks are
// addressed by BlockId, which is also their index in Method::blocks. Each block has a closed
// BlockKind that fixes its exit edges (jump, branch, switch, return, throw, or a throwing
// expression continuing to a successor), an ordered statement list, optional phi elements for
// SSA input, and the ordered list of catch blocks handling exceptions raised inside it. Entry
// and exit are ordinary blocks with dedicated kinds; the entry only names the first real block.

//! Input control-flow graph.
//!
//! The lowering stage consumes a [`Method`] built by an upstream producer (or
//! by [`MethodBuilder`] in tests). Everything here is plain data; analysis
//! helpers live in [`analysis`].

pub mod analysis;
pub mod builder;
pub mod expr;
pub mod types;

pub use builder::MethodBuilder;
pub use expr::{
    BinaryOp, Call, CmpOp, Dispatch, Expr, FieldRef, Literal, MethodRef, Operand, Stmt,
    StmtKind, UnaryOp, VarId, VarRef,
};
pub use types::{FrameType, Type};

use crate::backend::MethodShape;
use std::fmt;

/// Index of a block in [`Method::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Which branch of a conditional block is laid out as the fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Then,
    Else,
}

/// Branch condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Taken when the boolean operand is true.
    Truth(Operand),
    Compare {
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
    },
}

/// Closed set of block kinds; the kind fixes the block's exit edges.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Entry {
        next: BlockId,
    },
    Exit,
    Simple {
        next: BlockId,
    },
    /// Handler block; empty `catch_types` catches everything.
    Catch {
        next: BlockId,
        catch_types: Vec<Type>,
    },
    Case {
        next: BlockId,
    },
    Return {
        value: Option<Operand>,
    },
    Throw {
        value: Operand,
    },
    /// Ends with a statement that may throw; `next` is the normal successor.
    ThrowingExpression {
        next: BlockId,
    },
    Conditional {
        cond: Condition,
        then_block: BlockId,
        else_block: BlockId,
        fallthrough: Branch,
    },
    Switch {
        selector: Operand,
        cases: Vec<(i32, BlockId)>,
        default: BlockId,
    },
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Entry { .. } => "entry",
            BlockKind::Exit => "exit",
            BlockKind::Simple { .. } => "simple",
            BlockKind::Catch { .. } => "catch",
            BlockKind::Case { .. } => "case",
            BlockKind::Return { .. } => "return",
            BlockKind::Throw { .. } => "throw",
            BlockKind::ThrowingExpression { .. } => "throwing-expression",
            BlockKind::Conditional { .. } => "conditional",
            BlockKind::Switch { .. } => "switch",
        }
    }

    /// Normal (non-exceptional) successors in declaration order.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            BlockKind::Entry { next }
            | BlockKind::Simple { next }
            | BlockKind::Catch { next, .. }
            | BlockKind::Case { next }
            | BlockKind::ThrowingExpression { next } => vec![*next],
            BlockKind::Conditional {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            BlockKind::Switch { cases, default, .. } => {
                let mut succs: Vec<BlockId> = cases.iter().map(|(_, target)| *target).collect();
                succs.push(*default);
                succs
            }
            BlockKind::Exit | BlockKind::Return { .. } | BlockKind::Throw { .. } => Vec::new(),
        }
    }
}

/// Incoming value of a phi element.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiArg {
    pub value: VarRef,
    pub pred: BlockId,
}

/// SSA merge of one variable at a block with several predecessors.
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    pub def: VarRef,
    pub args: Vec<PhiArg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub stmts: Vec<Stmt>,
    pub phis: Vec<Phi>,
    /// Catch blocks covering this block, in handler order.
    pub handlers: Vec<BlockId>,
}

impl Block {
    /// Normal successors followed by exception handlers.
    pub fn all_successors(&self) -> Vec<BlockId> {
        let mut succs = self.kind.successors();
        succs.extend(self.handlers.iter().copied());
        succs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    This,
    Parameter,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
    /// Compiler-introduced; only described in debug info on request.
    pub synthetic: bool,
    /// Generic signature, if any.
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodFlags {
    pub is_static: bool,
    pub is_native: bool,
    pub is_abstract: bool,
}

/// One method's typed CFG.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub owner: Type,
    pub name: String,
    pub return_type: Type,
    pub flags: MethodFlags,
    pub this: Option<VarId>,
    pub params: Vec<VarId>,
    pub vars: Vec<Variable>,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    pub exit: BlockId,
    pub throws: Vec<Type>,
}

impl Method {
    pub fn var(&self, id: VarId) -> Option<&Variable> {
        self.vars.get(id.0 as usize)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Human-readable identity used in diagnostics, e.g. `LFoo;.bar(I)V`.
    pub fn identity(&self) -> String {
        let mut desc = String::from("(");
        for param in &self.params {
            if let Some(var) = self.var(*param) {
                desc.push_str(var.ty.descriptor());
            }
        }
        desc.push(')');
        desc.push_str(self.return_type.descriptor());
        format!("{}.{}{}", self.owner, self.name, desc)
    }

    /// Words of incoming arguments, `this` included.
    pub fn param_word_count(&self) -> u32 {
        let this_words = self.this.map_or(0, |_| 1);
        this_words
            + self
                .params
                .iter()
                .filter_map(|p| self.var(*p))
                .map(|v| v.ty.category())
                .sum::<u32>()
    }

    /// Static facts handed to the encoder with the lowered body.
    pub fn shape(&self) -> MethodShape {
        MethodShape {
            name: self.identity(),
            is_static: self.flags.is_static,
            param_word_count: self.param_word_count(),
            throws: self.throws.clone(),
        }
    }

    /// Catch types of `block`, one entry per type per handler, paired with
    /// the handler block.
    pub fn catch_edges(&self, block: &Block) -> Vec<(Type, BlockId)> {
        let mut edges = Vec::new();
        for handler in &block.handlers {
            let types = match self.block(*handler).map(|b| &b.kind) {
                Some(BlockKind::Catch { catch_types, .. }) if !catch_types.is_empty() => {
                    catch_types.clone()
                }
                _ => vec![Type::throwable()],
            };
            edges.extend(types.into_iter().map(|ty| (ty, *handler)));
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_successors_end_with_default() {
        let kind = BlockKind::Switch {
            selector: Operand::int(0),
            cases: vec![(1, BlockId(4)), (2, BlockId(5))],
            default: BlockId(6),
        };
        assert_eq!(kind.successors(), vec![BlockId(4), BlockId(5), BlockId(6)]);
        assert!(BlockKind::Return { value: None }.successors().is_empty());
    }
}
