//! Per-method code generation options.
//!
//! The flag set travels with each method from the driver into the lowerers.
//! Defaults match a release build: line numbers on, local variable debug
//! info off, optimizer on, direct (non-SSA) lowering.

/// API level at which signature-polymorphic method-handle calls exist.
pub const POLYMORPHIC_CALL_API_LEVEL: u32 = 26;

/// Flags controlling how one method is lowered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Attach local variable names and signatures to register specs.
    pub emit_debug_info: bool,
    /// Also describe compiler-introduced variables in debug info.
    pub emit_synthetic_debug_info: bool,
    /// Carry source lines on emitted instructions.
    pub emit_line_numbers: bool,
    /// Ask the encoder for the wide string-constant form everywhere.
    pub force_jumbo_strings: bool,
    /// Run the optimizer on directly lowered methods.
    pub run_optimizer: bool,
    /// Lower conditionals whose two targets coincide to a plain jump.
    pub remove_redundant_branches: bool,
    /// Target API level.
    pub api_level: u32,
    /// Use the SSA lowering instead of the direct one.
    pub use_ssa: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            emit_debug_info: false,
            emit_synthetic_debug_info: false,
            emit_line_numbers: true,
            force_jumbo_strings: false,
            run_optimizer: true,
            remove_redundant_branches: true,
            api_level: 1,
            use_ssa: false,
        }
    }
}

impl CodegenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.emit_debug_info = enabled;
        self
    }

    pub fn with_synthetic_debug_info(mut self, enabled: bool) -> Self {
        self.emit_synthetic_debug_info = enabled;
        self
    }

    pub fn with_line_numbers(mut self, enabled: bool) -> Self {
        self.emit_line_numbers = enabled;
        self
    }

    pub fn with_jumbo_strings(mut self, enabled: bool) -> Self {
        self.force_jumbo_strings = enabled;
        self
    }

    pub fn with_optimizer(mut self, enabled: bool) -> Self {
        self.run_optimizer = enabled;
        self
    }

    pub fn with_redundant_branch_removal(mut self, enabled: bool) -> Self {
        self.remove_redundant_branches = enabled;
        self
    }

    pub fn with_api_level(mut self, level: u32) -> Self {
        self.api_level = level;
        self
    }

    pub fn with_ssa(mut self, enabled: bool) -> Self {
        self.use_ssa = enabled;
        self
    }

    /// Whether a variable gets a debug description.
    pub fn describes(&self, synthetic: bool) -> bool {
        self.emit_debug_info && (!synthetic || self.emit_synthetic_debug_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_variables_need_both_flags() {
        let opts = CodegenOptions::new().with_debug_info(true);
        assert!(opts.describes(false));
        assert!(!opts.describes(true));
        assert!(opts.with_synthetic_debug_info(true).describes(true));
        assert!(!CodegenOptions::default().describes(false));
    }
}
