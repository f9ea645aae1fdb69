//! Register-operation ("rop") output form.
//!
//! Lowering produces a [`RopMethod`] directly or, through SSA, an
//! [`SsaMethod`] that the optimizer turns back into a [`RopMethod`].

pub mod block;
pub mod insn;
pub mod reg;
pub mod ssa;
pub mod verify;

pub use block::{BasicBlock, RopMethod};
pub use insn::{Constant, Insn, InsnKind, Opcode, SourcePosition};
pub use reg::{LocalInfo, RegisterSpec};
pub use ssa::{PhiInsn, PhiOperand, SsaBasicBlock, SsaMethod};
pub use verify::verify;
