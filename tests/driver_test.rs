// These tests run batches of methods through CodeGenerator. A batch mixing lowered, native,
// abstract, filtered and broken methods must lower everything it can, report every skip with
// its reason, collect the broken method's error with the method identity attached, and keep the
// session statistics in step with the report. Further tests check that the optimizer is only
// consulted when enabled, that the SSA lowerer is selected by the options, and that the
// encoder receives the method shape and the per-method output flags.

//! Batch lowering through the driver.

mod common;

use bumpalo::Bump;
use common::{foo, init_logging, max_method, RecordingOptimizer};
use roplower::backend::{CollectingEncoder, OptimizerStrategy};
use roplower::cfg::{
    BinaryOp, BlockKind, Expr, Literal, Method, MethodBuilder, Operand, StmtKind, Type,
};
use roplower::core::{
    CodeGenerator, CodegenOptions, CompilationSession, CompileError, MethodOutcome, SkipReason,
};

fn sum_method(name: &str) -> Method {
    let mut b = MethodBuilder::new_static(foo(), name, Type::Int);
    let a = b.param("a", Type::Int);
    let c = b.param("b", Type::Int);
    let sum = b.local("sum", Type::Int);
    let body = b.new_block();
    b.start(body);
    b.assign(
        body,
        sum,
        Expr::Binary {
            op: BinaryOp::Add,
            lhs: Operand::var(a),
            rhs: Operand::var(c),
        },
    );
    b.terminate(body, BlockKind::Return { value: Some(Operand::var(sum)) });
    b.build().unwrap()
}

fn native_method() -> Method {
    let mut b = MethodBuilder::new_static(foo(), "nat", Type::Void);
    b.set_native();
    b.build().unwrap()
}

fn abstract_method() -> Method {
    let mut b = MethodBuilder::new_instance(foo(), "abs", Type::Int);
    b.set_abstract();
    b.build().unwrap()
}

/// Stores into an array from a block that has no exception edge.
fn broken_method() -> Method {
    let mut b = MethodBuilder::new_static(foo(), "broken", Type::Void);
    let arr = b.param("arr", Type::Int.array_of());
    let body = b.new_block();
    b.start(body);
    b.stmt(
        body,
        StmtKind::ArraySet {
            array: Operand::var(arr),
            index: Operand::int(0),
            value: Operand::Literal(Literal::Int(1)),
            elem_ty: Type::Int,
        },
    );
    b.terminate(body, BlockKind::Return { value: None });
    b.build().unwrap()
}

#[test]
fn test_batch_collects_skips_and_failures() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let generator = CodeGenerator::new(&session, CodegenOptions::default())
        .with_filter(|m: &Method| !m.name.starts_with("lambda$"));
    let mut optimizer = RecordingOptimizer::new();
    let mut encoder = CollectingEncoder::new();

    let methods = vec![
        sum_method("add"),
        native_method(),
        abstract_method(),
        sum_method("lambda$0"),
        broken_method(),
        sum_method("after"),
    ];
    let report = generator.compile_all(&methods, &mut optimizer, &mut encoder);

    assert_eq!(report.lowered(), 2);
    assert_eq!(report.skipped(), 3);
    assert_eq!(
        report.outcome("LFoo;.add(II)I"),
        Some(&MethodOutcome::Lowered {
            blocks: 2,
            registers: 3
        })
    );
    assert_eq!(
        report.outcome("LFoo;.nat()V"),
        Some(&MethodOutcome::Skipped(SkipReason::Native))
    );
    assert_eq!(
        report.outcome("LFoo;.abs()I"),
        Some(&MethodOutcome::Skipped(SkipReason::Abstract))
    );
    assert_eq!(
        report.outcome("LFoo;.lambda$0(II)I"),
        Some(&MethodOutcome::Skipped(SkipReason::Filtered))
    );
    assert!(report.outcome("LFoo;.broken([I)V").is_none());
    assert!(report.outcome("LFoo;.after(II)I").is_some());

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert!(failure.to_string().starts_with("in method LFoo;.broken([I)V"));
    assert!(matches!(
        failure.root(),
        CompileError::MisplacedThrowingInsn { opcode: "aput", .. }
    ));

    assert_eq!(optimizer.rop_calls, 2);
    assert_eq!(encoder.methods.len(), 2);

    let stats = session.stats();
    assert_eq!(stats.methods_lowered, 2);
    assert_eq!(stats.methods_skipped, 3);
    assert_eq!(stats.methods_failed, 1);
    assert!(session.current_method().is_none());

    assert!(!report.is_success());
    assert!(report.into_result().is_err());
}

#[test]
fn test_optimizer_only_runs_when_enabled() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let generator = CodeGenerator::new(&session, CodegenOptions::default().with_optimizer(false));
    let mut optimizer = RecordingOptimizer::new();
    let mut encoder = CollectingEncoder::new();

    let report = generator.compile_all(&[sum_method("add")], &mut optimizer, &mut encoder);
    assert!(report.is_success());
    assert_eq!(optimizer.rop_calls, 0);
    assert!(optimizer.strategies.is_empty());
    assert_eq!(encoder.methods[0].register_count, 3);
}

#[test]
fn test_ssa_option_selects_ssa_lowering() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let generator = CodeGenerator::new(&session, CodegenOptions::default().with_ssa(true));
    let mut optimizer = RecordingOptimizer::new();
    let mut encoder = CollectingEncoder::new();

    let outcome = generator
        .compile_method(&max_method(), &mut optimizer, &mut encoder)
        .unwrap();
    assert!(matches!(outcome, MethodOutcome::Lowered { registers: 3, .. }));
    assert_eq!(optimizer.strategies, vec![OptimizerStrategy::Standard]);
    assert_eq!(optimizer.rop_calls, 0);
    assert_eq!(session.stats().phis_resolved, 1);

    // The direct lowering refuses phis.
    let direct = CodeGenerator::new(&session, CodegenOptions::default());
    let err = direct
        .compile_method(&max_method(), &mut optimizer, &mut encoder)
        .unwrap_err();
    assert!(matches!(err.root(), CompileError::MalformedCfg { .. }));
}

#[test]
fn test_encoder_receives_shape_and_flags() {
    let mut b = MethodBuilder::new_instance(foo(), "read", Type::Void);
    b.param("len", Type::Long);
    b.add_throws(Type::reference("Ljava/io/IOException;"));
    let body = b.new_block();
    b.start(body);
    b.terminate(body, BlockKind::Return { value: None });
    let method = b.build().unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let options = CodegenOptions::default()
        .with_jumbo_strings(true)
        .with_debug_info(true);
    let generator = CodeGenerator::new(&session, options);
    let mut optimizer = RecordingOptimizer::new();
    let mut encoder = CollectingEncoder::new();
    generator
        .compile_method(&method, &mut optimizer, &mut encoder)
        .unwrap();

    let encoded = encoder.method("LFoo;.read(J)V").unwrap();
    assert!(!encoded.shape.is_static);
    assert_eq!(encoded.shape.param_word_count, 3);
    assert_eq!(
        encoded.shape.throws,
        vec![Type::reference("Ljava/io/IOException;")]
    );
    assert!(encoded.force_jumbo_strings);
    assert!(encoded.debug_info);

    let params = encoded.body.block(encoded.body.first_label).unwrap();
    let this = params.insns[0].result.as_ref().unwrap();
    assert_eq!(this.reg, 0);
    assert_eq!(this.local.as_ref().unwrap().name, "this");
}
