// This module implements the small graph analyses the lowering stage needs over the input CFG.
// reachable_order walks the graph depth-first from the entry block, following normal
// successors in declaration order and then exception handlers, and yields the visited blocks
// in preorder without the entry and exit blocks; the direct lowering numbers its labels from
// this order. The order and the derived block-to-label table are allocated in the session arena
// so they share the lifetime of the method being lowered. ssa_definitions lists every SSA
// definition site (parameter versions, phi results, assignment targets) in a deterministic
// order so the SSA register manager can number all definitions before any block is lowered.

//! Block ordering and definition collection.

use super::{BlockId, Method, StmtKind, VarRef};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use hashbrown::HashSet;

/// Label assigned to edges that leave the method through the exit block.
pub const EXIT_LABEL: u32 = u32::MAX;

/// Depth-first visitation order of a method's reachable blocks.
#[derive(Debug, Clone, Copy)]
pub struct BlockOrder<'arena> {
    /// Reachable blocks in visitation order, entry and exit excluded.
    pub order: &'arena [BlockId],
    /// Label per block id; `None` for unreachable blocks.
    pub labels: &'arena [Option<u32>],
}

impl<'arena> BlockOrder<'arena> {
    /// Label of a block, with the exit block mapped to [`EXIT_LABEL`].
    pub fn label(&self, block: BlockId) -> Option<u32> {
        self.labels.get(block.index()).copied().flatten()
    }

    /// One past the largest original label (label 0 belongs to the entry).
    pub fn max_label(&self) -> u32 {
        self.order.len() as u32 + 1
    }
}

/// Visit reachable blocks depth-first from the entry and number them 1..=N.
pub fn reachable_order<'arena>(
    session: &CompilationSession<'arena>,
    method: &Method,
) -> CompileResult<BlockOrder<'arena>> {
    let entry = method.block(method.entry).ok_or_else(|| CompileError::MalformedCfg {
        reason: format!("entry block {} missing", method.entry),
    })?;

    let mut order = Vec::with_capacity(method.blocks.len());
    let mut visited = HashSet::new();
    visited.insert(method.entry);
    visited.insert(method.exit);

    let mut stack: Vec<BlockId> = entry.all_successors().into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let block = method.block(id).ok_or_else(|| CompileError::MalformedCfg {
            reason: format!("successor {} does not exist", id),
        })?;
        order.push(id);
        stack.extend(block.all_successors().into_iter().rev());
    }

    let mut labels = vec![None; method.blocks.len()];
    labels[method.entry.index()] = Some(0);
    if let Some(slot) = labels.get_mut(method.exit.index()) {
        *slot = Some(EXIT_LABEL);
    }
    for (idx, id) in order.iter().enumerate() {
        labels[id.index()] = Some(idx as u32 + 1);
    }

    log::trace!(
        "{}: {} of {} blocks reachable",
        method.name,
        order.len(),
        method.blocks.len()
    );

    Ok(BlockOrder {
        order: session.alloc_slice(&order),
        labels: session.alloc_slice(&labels),
    })
}

/// Every SSA definition of the method: `this` and parameters at version 0,
/// then phi results and assignment targets in block order.
pub fn ssa_definitions(method: &Method) -> Vec<VarRef> {
    let mut defs = Vec::new();
    if let Some(this) = method.this {
        defs.push(VarRef::ssa(this, 0));
    }
    defs.extend(method.params.iter().map(|p| VarRef::ssa(*p, 0)));
    for block in &method.blocks {
        defs.extend(block.phis.iter().map(|phi| phi.def));
        for stmt in &block.stmts {
            if let StmtKind::Assign { dest, .. } = &stmt.kind {
                defs.push(*dest);
            }
        }
    }
    defs
}
