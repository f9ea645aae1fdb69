//! CFG to register-operation lowering.
//!
//! Two method lowerers share one block lowerer:
//!
//! - [`RopMethodLowerer`] numbers registers per source variable and labels
//!   blocks in depth-first order.
//! - [`SsaMethodLowerer`] gives every version of a variable that
//!   variable's register, builds phis and
//!   always goes through the optimizer, retrying once with a
//!   register-minimizing strategy when the result is too large.
//!
//! Both place their blocks in a [`LabelSpace`] split into original,
//! continuation and special labels.

pub mod block;
pub mod blocks;
pub mod insn_list;
pub mod labels;
pub mod method;
pub mod ops;
pub mod registers;
pub mod ssa_blocks;
pub mod ssa_method;

pub use block::{BlockExit, BlockLowerer, LoweredBlock, PlacedBlock};
pub use blocks::RopBlockAssembler;
pub use insn_list::InsnBuffer;
pub use labels::{LabelSpace, SpecialLabel, SPECIAL_LABEL_COUNT};
pub use method::RopMethodLowerer;
pub use registers::{RegisterManager, RopRegisterManager, SsaRegisterManager, TempPool};
pub use ssa_blocks::{PendingBlock, PendingPhi, SsaBlockAssembler};
pub use ssa_method::{SsaMethodLowerer, MAX_ATTEMPTS};
