// This module declares the collaborators on either side of the lowering core. MethodFilter lets
// the host exclude methods before any work is done. Optimizer receives the lowered graph: the
// direct variant hands over a RopMethod only when optimization is enabled, while the SSA
// variant always hands over its SsaMethod, together with the strategy to run, and gets back a
// register-operation graph with SSA destructed. Encoder serializes the final body and advises
// the register budget the SSA retry is measured against. CollectingEncoder keeps every method
// it is given and is what the tests and simple hosts use.

//! Optimizer and encoder interfaces.

use crate::cfg::{Method, Type};
use crate::core::error::CompileResult;
use crate::rop::{RopMethod, SsaMethod};

/// Static facts about a method needed to emit its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodShape {
    /// Qualified identity, e.g. `LFoo;.bar(I)V`.
    pub name: String,
    pub is_static: bool,
    /// Words of incoming arguments, `this` included.
    pub param_word_count: u32,
    pub throws: Vec<Type>,
}

/// A finished method body handed to the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredMethod {
    pub shape: MethodShape,
    pub body: RopMethod,
    pub register_count: u32,
    pub force_jumbo_strings: bool,
    pub debug_info: bool,
}

/// Optimization run by the SSA optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerStrategy {
    Standard,
    /// Trade code quality for fewer registers.
    MinimizeRegisters,
}

impl OptimizerStrategy {
    /// Whether constants are collected into registers shared across uses.
    pub fn runs_const_collector(self) -> bool {
        matches!(self, OptimizerStrategy::Standard)
    }
}

pub trait Optimizer {
    /// Optimize a graph from the direct lowering.
    fn optimize_rop(&mut self, method: RopMethod, shape: &MethodShape) -> CompileResult<RopMethod>;

    /// Optimize an SSA graph and convert it back to register operations.
    fn optimize_ssa(
        &mut self,
        method: SsaMethod,
        shape: &MethodShape,
        strategy: OptimizerStrategy,
    ) -> CompileResult<RopMethod>;
}

/// Largest register index encodable by the widest instruction formats.
pub const MAX_REGISTERS: u32 = 65536;

/// Registers addressable by the compact instruction formats.
pub const DEFAULT_ADVISED_MAX_REGISTERS: u32 = 256;

pub trait Encoder {
    /// Register count above which the SSA lowering retries with the
    /// register-minimizing strategy.
    fn advised_max_registers(&self, shape: &MethodShape) -> u32;

    /// Hard register limit of the output format.
    fn max_registers(&self) -> u32 {
        MAX_REGISTERS
    }

    fn encode(&mut self, method: LoweredMethod) -> CompileResult<()>;
}

/// Encoder keeping every method it receives.
#[derive(Debug)]
pub struct CollectingEncoder {
    advised_max_registers: u32,
    pub methods: Vec<LoweredMethod>,
}

impl CollectingEncoder {
    pub fn new() -> Self {
        Self::with_advised_max_registers(DEFAULT_ADVISED_MAX_REGISTERS)
    }

    pub fn with_advised_max_registers(advised_max_registers: u32) -> Self {
        Self {
            advised_max_registers,
            methods: Vec::new(),
        }
    }

    pub fn method(&self, name: &str) -> Option<&LoweredMethod> {
        self.methods.iter().find(|m| m.shape.name == name)
    }
}

impl Default for CollectingEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for CollectingEncoder {
    fn advised_max_registers(&self, _shape: &MethodShape) -> u32 {
        self.advised_max_registers
    }

    fn encode(&mut self, method: LoweredMethod) -> CompileResult<()> {
        log::debug!(
            "encoded {}: {} blocks, {} registers",
            method.shape.name,
            method.body.blocks.len(),
            method.register_count
        );
        self.methods.push(method);
        Ok(())
    }
}

/// Host predicate deciding which methods are lowered.
pub trait MethodFilter {
    fn accept(&self, method: &Method) -> bool;
}

impl<F> MethodFilter for F
where
    F: Fn(&Method) -> bool,
{
    fn accept(&self, method: &Method) -> bool {
        self(method)
    }
}
