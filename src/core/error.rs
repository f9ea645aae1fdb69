// This module defines error types for the lowering stage using the thiserror crate. CompileError
// covers the internal/structural class of failures: an unexpected block kind reaching the
// block lowerer, a register lookup miss, SSA references without a version, misuse of the
// register or block assemblers, label-space violations, malformed phi operands, and a method
// that cannot fit the encoder's register budget even after the retry. Every variant carries the
// labels, variable ids or opcode names needed to diagnose the upstream producer bug, and
// InMethod attaches the method identity before an error leaves a method lowerer. Collaborator
// failures from the optimizer or encoder are carried as strings. CompileResult<T> is the
// convenience alias used throughout the crate.

//! Error types for the lowering stage.

use thiserror::Error;

/// Main error type for method lowering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unexpected {kind} block {block} reached during lowering")]
    UnexpectedBlock { block: u32, kind: &'static str },

    #[error("no register allocated for variable %{var}")]
    RegisterNotAllocated { var: u32 },

    #[error("reference to variable %{var} is not in SSA def/use form")]
    NotInSsaForm { var: u32 },

    #[error("`this` must be allocated once, before any parameter")]
    ThisAllocationOrder,

    #[error("return register already allocated")]
    ReturnAlreadyAllocated,

    #[error("{opcode} appended to the primary list while a continuation instruction is pending")]
    ExtraInstructionPending { opcode: &'static str },

    #[error("throwing instruction {opcode} in {kind} block {block}, which has no exception edge")]
    MisplacedThrowingInsn {
        block: u32,
        kind: &'static str,
        opcode: &'static str,
    },

    #[error("block assembler already resolved")]
    AssemblerResolved,

    #[error("special label constant {0} is outside the reserved range")]
    InvalidSpecialLabel(i32),

    #[error("no free label left in [{floor}, {ceiling})")]
    LabelSpaceExhausted { floor: u32, ceiling: u32 },

    #[error("label {0} assigned to more than one block")]
    DuplicateLabel(u32),

    #[error("block {block} names successor label {label} which has no block")]
    UnknownSuccessor { block: u32, label: u32 },

    #[error("primary successor {primary} of block {block} is not in its successor list")]
    PrimaryNotSuccessor { block: u32, primary: u32 },

    #[error("{opcode} in block {block} is not followed by a move-result")]
    MissingMoveResult { block: u32, opcode: &'static str },

    #[error("{opcode} in block {block} does not follow an instruction with a pending result")]
    OrphanMoveResult { block: u32, opcode: &'static str },

    #[error("phi in block {block} names {pred}, which is not a predecessor")]
    PhiPredecessorMismatch { block: u32, pred: u32 },

    #[error("malformed CFG: {reason}")]
    MalformedCfg { reason: String },

    #[error("invalid operand: {reason}")]
    InvalidOperand { reason: String },

    #[error("{feature} requires API level {required}, targeting {target}")]
    UnsupportedApiLevel {
        feature: &'static str,
        required: u32,
        target: u32,
    },

    #[error("method needs {count} registers, limit is {limit}")]
    RegisterBudgetExceeded { count: u32, limit: u32 },

    #[error("optimizer failed: {0}")]
    Optimizer(String),

    #[error("encoder failed: {0}")]
    Encoder(String),

    #[error("in method {method}: {source}")]
    InMethod {
        method: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Attach the method identity, unless already attached.
    pub fn in_method(self, method: &str) -> Self {
        match self {
            err @ CompileError::InMethod { .. } => err,
            other => CompileError::InMethod {
                method: method.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, with method context stripped.
    pub fn root(&self) -> &CompileError {
        match self {
            CompileError::InMethod { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for lowering operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_method_wraps_once() {
        let err = CompileError::RegisterNotAllocated { var: 3 }
            .in_method("LFoo;.f()V")
            .in_method("LBar;.g()V");
        assert_eq!(
            err.to_string(),
            "in method LFoo;.f()V: no register allocated for variable %3"
        );
        assert_eq!(err.root(), &CompileError::RegisterNotAllocated { var: 3 });
    }
}
