// This module defines the driver that sits between a host and the two method lowerers.
// CodeGenerator owns the option set and the host's method filter, borrows the session, and
// selects the direct or the SSA lowerer from CodegenOptions::use_ssa. Methods are lowered one
// at a time in the order given; a failing method does not stop the others. Every method ends as
// a MethodOutcome in the CompileReport (lowered with its block and register counts, or skipped
// with the reason) or as a failure carrying the method identity, and the caller decides from
// the report whether the build as a whole fails.

//! Lowering driver.
//!
//! ```ignore
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let generator = CodeGenerator::new(&session, CodegenOptions::default());
//! let report = generator.compile_all(&methods, &mut optimizer, &mut encoder);
//! report.into_result()?;
//! ```

use super::error::{CompileError, CompileResult};
use super::options::CodegenOptions;
use super::session::CompilationSession;
use crate::backend::{Encoder, MethodFilter, Optimizer};
use crate::cfg::Method;
use crate::lower::{RopMethodLowerer, SsaMethodLowerer};

/// Why a method produced no code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Native,
    Abstract,
    /// Rejected by the host filter.
    Filtered,
}

/// Result of lowering one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOutcome {
    Lowered { blocks: usize, registers: u32 },
    Skipped(SkipReason),
}

/// Outcome of a batch of methods.
#[derive(Debug, Default)]
pub struct CompileReport {
    /// Method identity and outcome, in lowering order.
    pub outcomes: Vec<(String, MethodOutcome)>,
    pub failures: Vec<CompileError>,
}

impl CompileReport {
    pub fn lowered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, MethodOutcome::Lowered { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.lowered()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, identity: &str) -> Option<&MethodOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == identity)
            .map(|(_, outcome)| outcome)
    }

    /// First failure, if any method failed.
    pub fn into_result(self) -> CompileResult<Vec<(String, MethodOutcome)>> {
        match self.failures.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.outcomes),
        }
    }
}

/// Lowers methods with one option set.
pub struct CodeGenerator<'a, 'arena> {
    session: &'a CompilationSession<'arena>,
    options: CodegenOptions,
    filter: Box<dyn MethodFilter + 'a>,
}

impl<'a, 'arena> CodeGenerator<'a, 'arena> {
    pub fn new(session: &'a CompilationSession<'arena>, options: CodegenOptions) -> Self {
        Self {
            session,
            options,
            filter: Box::new(|_: &Method| true),
        }
    }

    /// Lower only methods accepted by `filter`.
    pub fn with_filter(mut self, filter: impl MethodFilter + 'a) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Lower one method with the lowerer selected by the options.
    pub fn compile_method(
        &self,
        method: &Method,
        optimizer: &mut dyn Optimizer,
        encoder: &mut dyn Encoder,
    ) -> CompileResult<MethodOutcome> {
        if self.options.use_ssa {
            SsaMethodLowerer::new(self.session, &self.options).lower(
                method,
                self.filter.as_ref(),
                optimizer,
                encoder,
            )
        } else {
            RopMethodLowerer::new(self.session, &self.options).lower(
                method,
                self.filter.as_ref(),
                optimizer,
                encoder,
            )
        }
    }

    /// Lower every method, collecting failures instead of stopping.
    pub fn compile_all(
        &self,
        methods: &[Method],
        optimizer: &mut dyn Optimizer,
        encoder: &mut dyn Encoder,
    ) -> CompileReport {
        let mut report = CompileReport::default();
        for method in methods {
            match self.compile_method(method, optimizer, encoder) {
                Ok(outcome) => report.outcomes.push((method.identity(), outcome)),
                Err(err) => {
                    log::warn!("{}", err);
                    report.failures.push(err);
                }
            }
        }
        log::debug!(
            "lowered {} methods, skipped {}, {} failed",
            report.lowered(),
            report.skipped(),
            report.failures.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_and_first_failure() {
        let mut report = CompileReport::default();
        report.outcomes.push((
            "LFoo;.a()V".to_string(),
            MethodOutcome::Lowered {
                blocks: 2,
                registers: 1,
            },
        ));
        report
            .outcomes
            .push(("LFoo;.b()V".to_string(), MethodOutcome::Skipped(SkipReason::Native)));
        assert_eq!(report.lowered(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(
            report.outcome("LFoo;.b()V"),
            Some(&MethodOutcome::Skipped(SkipReason::Native))
        );
        assert!(report.is_success());

        report.failures.push(CompileError::AssemblerResolved.in_method("LFoo;.c()V"));
        assert!(!report.is_success());
        let err = report.into_result().unwrap_err();
        assert_eq!(err.root(), &CompileError::AssemblerResolved);
    }
}
