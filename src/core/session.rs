// This module provides arena-based session management using the bumpalo crate. A
// CompilationSession borrows the arena that holds per-method scratch data (the depth-first
// block order and the block-to-label table) and records lowering statistics behind a RefCell,
// so every lowerer can take the session by shared reference. A session is single-threaded; a
// host lowering methods in parallel creates one session per worker. SessionStats counts methods
// lowered, skipped and failed, emitted blocks and continuation blocks, instructions with a
// per-opcode breakdown, registers, resolved phis and SSA retries, and prints as a short report.

//! Arena-based lowering session.
//!
//! Scratch slices allocated through the session share the arena lifetime, so
//! lowering helpers can hand them around without owning them.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Lowering session shared by every method lowered with one arena.
pub struct CompilationSession<'arena> {
    /// Arena for per-method scratch data.
    arena: &'arena Bump,

    /// Statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// Identity of the method currently being lowered.
    current_method: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            current_method: RefCell::new(None),
        }
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T>(&self, slice: &[T]) -> &'arena [T]
    where
        T: Clone,
    {
        self.arena.alloc_slice_clone(slice)
    }

    pub fn set_current_method(&self, identity: &str) {
        *self.current_method.borrow_mut() = Some(identity.to_string());
    }

    pub fn current_method(&self) -> Option<String> {
        self.current_method.borrow().clone()
    }

    pub fn clear_method_state(&self) {
        *self.current_method.borrow_mut() = None;
    }

    pub fn record_method_lowered(&self, identity: &str, block_count: usize, register_count: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.methods_lowered += 1;
        stats.blocks_emitted += block_count;
        stats.registers_allocated += register_count as usize;

        if stats.largest_method_registers < register_count {
            stats.largest_method_registers = register_count;
            stats.largest_method_name = identity.to_string();
        }
    }

    pub fn record_method_skipped(&self) {
        self.stats.borrow_mut().methods_skipped += 1;
    }

    pub fn record_method_failed(&self) {
        self.stats.borrow_mut().methods_failed += 1;
    }

    pub fn record_extra_block(&self) {
        self.stats.borrow_mut().extra_blocks += 1;
    }

    /// Record one emitted instruction.
    pub fn record_instruction(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_emitted += 1;
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_phi_resolved(&self) {
        self.stats.borrow_mut().phis_resolved += 1;
    }

    pub fn record_ssa_retry(&self) {
        self.stats.borrow_mut().ssa_retries += 1;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Lowering statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub methods_lowered: usize,
    pub methods_skipped: usize,
    pub methods_failed: usize,

    /// Blocks in the lowered graphs, continuation blocks included.
    pub blocks_emitted: usize,

    /// Continuation blocks synthesized for move-result instructions.
    pub extra_blocks: usize,

    pub instructions_emitted: usize,

    /// Count of each opcode emitted.
    pub instruction_counts: HashMap<String, usize>,

    /// Sum of final register counts.
    pub registers_allocated: usize,

    pub largest_method_registers: u32,
    pub largest_method_name: String,

    pub phis_resolved: usize,

    /// SSA lowerings re-run with the register-minimizing strategy.
    pub ssa_retries: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lowering Session Statistics:")?;
        writeln!(f, "  Methods lowered: {}", self.methods_lowered)?;
        writeln!(f, "  Methods skipped: {}", self.methods_skipped)?;
        writeln!(f, "  Methods failed: {}", self.methods_failed)?;
        writeln!(
            f,
            "  Blocks emitted: {} ({} continuation)",
            self.blocks_emitted, self.extra_blocks
        )?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Phis resolved: {}", self.phis_resolved)?;
        writeln!(f, "  SSA retries: {}", self.ssa_retries)?;

        if !self.largest_method_name.is_empty() {
            writeln!(
                f,
                "  Largest frame: {} ({} registers)",
                self.largest_method_name, self.largest_method_registers
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.methods_lowered, 0);
        assert_eq!(stats.instructions_emitted, 0);
        assert_eq!(stats.phis_resolved, 0);
        assert!(session.current_method().is_none());
    }

    #[test]
    fn test_arena_allocation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let slice = session.alloc_slice(&[1u32, 2, 3, 4]);
        assert_eq!(slice, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_method_lowered("LFoo;.f()V", 3, 4);
        session.record_method_lowered("LFoo;.g()V", 2, 9);
        session.record_instruction("add-int");
        session.record_instruction("goto");
        session.record_instruction("add-int");
        session.record_phi_resolved();
        session.record_extra_block();
        session.record_ssa_retry();

        let stats = session.stats();
        assert_eq!(stats.methods_lowered, 2);
        assert_eq!(stats.blocks_emitted, 5);
        assert_eq!(stats.registers_allocated, 13);
        assert_eq!(stats.largest_method_name, "LFoo;.g()V");
        assert_eq!(stats.instructions_emitted, 3);
        assert_eq!(stats.instruction_counts.get("add-int"), Some(&2));
        assert_eq!(stats.ssa_retries, 1);

        let report = stats.to_string();
        assert!(report.contains("Methods lowered: 2"));
        assert!(report.contains("add-int: 2"));
    }
}
