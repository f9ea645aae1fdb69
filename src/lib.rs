//! roplower - CFG to register-operation lowering.
//!
//! Turns a typed, structured control-flow graph of one method into blocks of
//! register-operation instructions for a register-based bytecode, either
//! directly or through SSA form and an external optimizer.
//!
//! # Primary Usage
//!
//! ```ignore
//! use roplower::backend::CollectingEncoder;
//! use roplower::core::{CodeGenerator, CodegenOptions, CompilationSession};
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let generator = CodeGenerator::new(&session, CodegenOptions::default());
//! let mut encoder = CollectingEncoder::new();
//! generator.compile_method(&method, &mut optimizer, &mut encoder)?;
//! ```
//!
//! # Architecture
//!
//! - [`cfg`] - Input control-flow graph and its builder
//! - [`rop`] - Output instructions, blocks and SSA graphs
//! - [`lower`] - Register allocation, block lowering and method lowerers
//! - [`backend`] - Optimizer, encoder and filter interfaces
//! - [`core`] - Session, errors, options and the driver

pub mod backend;
pub mod cfg;
pub mod core;
pub mod lower;
pub mod rop;

pub use crate::core::{
    CodeGenerator, CodegenOptions, CompilationSession, CompileError, CompileReport,
    CompileResult, MethodOutcome, SessionStats, SkipReason,
};
pub use backend::{
    CollectingEncoder, Encoder, LoweredMethod, MethodFilter, MethodShape, Optimizer,
    OptimizerStrategy,
};
pub use lower::{RopMethodLowerer, SsaMethodLowerer};
