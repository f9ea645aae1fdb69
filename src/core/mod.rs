// This module groups the infrastructure shared by both lowering variants: the lowering session
// with its arena and statistics, the structural error type, the per-method option set, and the
// driver that selects a method lowerer and collects per-method outcomes. Nothing here knows
// about individual instructions; the lowering itself lives in the lower module.

//! Shared lowering infrastructure.
//!
//! # Key Components
//!
//! ## Session (`session`)
//! - Arena-based scratch allocation using `bumpalo`
//! - Lowering statistics
//!
//! ## Errors (`error`)
//! - One structural error enum, with method context attached on the way out
//!
//! ## Options (`options`)
//! - The per-method flag set
//!
//! ## Driver (`compiler`)
//! - Lowerer selection and per-method outcome collection

pub mod compiler;
pub mod error;
pub mod options;
pub mod session;

pub use compiler::{CodeGenerator, CompileReport, MethodOutcome, SkipReason};
pub use error::{CompileError, CompileResult};
pub use options::CodegenOptions;
pub use session::{CompilationSession, SessionStats};
