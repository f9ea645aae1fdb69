// This module implements register allocation for both lowering variants. FrameAllocator owns
// the single monotonically increasing next-free counter: every allocation advances it by the
// value's category, `this` must come first and only once, and the return register aliases
// register 0 without advancing the counter. TempPool hands out scratch registers per type; at
// each statement boundary its cursors rewind to zero so earlier temporaries are reused, but the
// pool never shrinks and the frame never gets smaller. RopRegisterManager maps each source
// variable to one register; SsaRegisterManager maps each (variable, version) definition to a
// register, pre-allocating every definition before any block is lowered so that phi operands
// on loop back edges resolve. All definitions of one source variable resolve to the register
// first assigned to that variable; parameters take theirs through a version-0 definition.
// RegisterManager is the seam the block lowerer is generic over.

//! Register allocation.

use crate::cfg::analysis::ssa_definitions;
use crate::cfg::{Method, Type, VarId, VarRef, Variable};
use crate::core::error::{CompileError, CompileResult};
use crate::core::options::CodegenOptions;
use crate::rop::{LocalInfo, RegisterSpec};
use hashbrown::HashMap;
use std::sync::Arc;

/// Register lookups needed while lowering a block.
pub trait RegisterManager {
    /// Register read by a use of `var`.
    fn use_spec(&self, var: &VarRef) -> CompileResult<RegisterSpec>;

    /// Register written by a definition of `var`.
    fn def_spec(&self, var: &VarRef) -> CompileResult<RegisterSpec>;

    /// Scratch register of type `ty`, valid until the next reset.
    fn temp(&mut self, ty: &Type) -> RegisterSpec;

    /// Statement boundary: scratch registers may be reused from here on.
    fn reset_temps(&mut self);

    /// Return register of non-void methods.
    fn return_spec(&self) -> Option<&RegisterSpec>;

    /// `this` and parameters in calling-convention order.
    fn param_specs(&self) -> &[RegisterSpec];

    /// Registers used so far, scratch registers included.
    fn register_count(&self) -> u32;
}

/// Per-type scratch registers, rewound at statement boundaries.
#[derive(Debug, Default)]
pub struct TempPool {
    lists: HashMap<Type, TempList>,
}

#[derive(Debug, Default)]
struct TempList {
    regs: Vec<u32>,
    cursor: usize,
}

impl TempPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free temporary of `ty`, growing the pool from `next_free`.
    pub fn acquire(&mut self, ty: &Type, next_free: &mut u32) -> RegisterSpec {
        let list = self.lists.entry(ty.clone()).or_default();
        let reg = match list.regs.get(list.cursor) {
            Some(reg) => *reg,
            None => {
                let reg = *next_free;
                *next_free += ty.category();
                list.regs.push(reg);
                reg
            }
        };
        list.cursor += 1;
        RegisterSpec::new(reg, ty.clone())
    }

    /// Rewind every cursor; created registers stay in the pool.
    pub fn reset(&mut self) {
        for list in self.lists.values_mut() {
            list.cursor = 0;
        }
    }

    /// Temporaries created over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.lists.values().map(|l| l.regs.len()).sum()
    }
}

/// The next-free register counter plus the fixed-role registers.
#[derive(Debug, Default)]
pub struct FrameAllocator {
    next_free: u32,
    this_allocated: bool,
    params_started: bool,
    return_spec: Option<RegisterSpec>,
    params: Vec<RegisterSpec>,
    temps: TempPool,
}

impl FrameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register 0 for `this`; once, and before any parameter.
    pub fn allocate_this(
        &mut self,
        ty: Type,
        local: Option<Arc<LocalInfo>>,
    ) -> CompileResult<RegisterSpec> {
        if self.this_allocated || self.params_started || self.next_free != 0 {
            return Err(CompileError::ThisAllocationOrder);
        }
        self.this_allocated = true;
        let spec = self.allocate(ty, local);
        self.params.push(spec.clone());
        Ok(spec)
    }

    pub fn allocate_param(&mut self, ty: Type, local: Option<Arc<LocalInfo>>) -> RegisterSpec {
        self.params_started = true;
        let spec = self.allocate(ty, local);
        self.params.push(spec.clone());
        spec
    }

    pub fn allocate(&mut self, ty: Type, local: Option<Arc<LocalInfo>>) -> RegisterSpec {
        let spec = RegisterSpec::with_local(self.next_free, ty, local);
        self.next_free += spec.category();
        log::trace!("allocated {}", spec);
        spec
    }

    /// Register 0 retyped to the return type.
    pub fn allocate_return(&mut self, ty: Type) -> CompileResult<RegisterSpec> {
        if self.return_spec.is_some() {
            return Err(CompileError::ReturnAlreadyAllocated);
        }
        let spec = RegisterSpec::new(0, ty);
        self.return_spec = Some(spec.clone());
        Ok(spec)
    }

    pub fn temp(&mut self, ty: &Type) -> RegisterSpec {
        self.temps.acquire(ty, &mut self.next_free)
    }

    pub fn reset_temps(&mut self) {
        self.temps.reset();
    }

    pub fn return_spec(&self) -> Option<&RegisterSpec> {
        self.return_spec.as_ref()
    }

    pub fn params(&self) -> &[RegisterSpec] {
        &self.params
    }

    pub fn register_count(&self) -> u32 {
        let ret = self.return_spec.as_ref().map_or(0, |r| r.next_reg());
        self.next_free.max(ret)
    }
}

/// Debug description of `var`, if the options ask for one.
pub fn describe(var: &Variable, options: &CodegenOptions) -> Option<Arc<LocalInfo>> {
    options
        .describes(var.synthetic)
        .then(|| Arc::new(LocalInfo::new(&var.name, &var.ty, var.signature.as_deref())))
}

fn variable(method: &Method, id: VarId) -> CompileResult<&Variable> {
    method
        .var(id)
        .ok_or(CompileError::RegisterNotAllocated { var: id.0 })
}

/// One register per source variable, for the direct lowering.
#[derive(Debug)]
pub struct RopRegisterManager {
    frame: FrameAllocator,
    vars: HashMap<VarId, RegisterSpec>,
}

impl RopRegisterManager {
    /// Allocate `this`, the parameters, the locals and the return register.
    pub fn for_method(method: &Method, options: &CodegenOptions) -> CompileResult<Self> {
        let mut manager = Self {
            frame: FrameAllocator::new(),
            vars: HashMap::with_capacity(method.vars.len()),
        };

        if let Some(this) = method.this {
            let var = variable(method, this)?;
            let spec = manager
                .frame
                .allocate_this(var.ty.clone(), describe(var, options))?;
            manager.vars.insert(this, spec);
        }
        for param in &method.params {
            let var = variable(method, *param)?;
            let spec = manager
                .frame
                .allocate_param(var.ty.clone(), describe(var, options));
            manager.vars.insert(*param, spec);
        }
        for var in &method.vars {
            if manager.vars.contains_key(&var.id) {
                continue;
            }
            let spec = manager.frame.allocate(var.ty.clone(), describe(var, options));
            manager.vars.insert(var.id, spec);
        }
        if method.return_type != Type::Void {
            manager.frame.allocate_return(method.return_type.clone())?;
        }
        Ok(manager)
    }

    fn lookup(&self, var: &VarRef) -> CompileResult<RegisterSpec> {
        self.vars
            .get(&var.var)
            .cloned()
            .ok_or(CompileError::RegisterNotAllocated { var: var.var.0 })
    }
}

impl RegisterManager for RopRegisterManager {
    fn use_spec(&self, var: &VarRef) -> CompileResult<RegisterSpec> {
        self.lookup(var)
    }

    fn def_spec(&self, var: &VarRef) -> CompileResult<RegisterSpec> {
        self.lookup(var)
    }

    fn temp(&mut self, ty: &Type) -> RegisterSpec {
        self.frame.temp(ty)
    }

    fn reset_temps(&mut self) {
        self.frame.reset_temps();
    }

    fn return_spec(&self) -> Option<&RegisterSpec> {
        self.frame.return_spec()
    }

    fn param_specs(&self) -> &[RegisterSpec] {
        self.frame.params()
    }

    fn register_count(&self) -> u32 {
        self.frame.register_count()
    }
}

/// One entry per SSA definition; every version of a variable resolves to
/// the variable's register.
#[derive(Debug)]
pub struct SsaRegisterManager {
    frame: FrameAllocator,
    defs: HashMap<(VarId, u32), RegisterSpec>,
}

impl SsaRegisterManager {
    /// Allocate every definition of the method up front.
    pub fn for_method(method: &Method, options: &CodegenOptions) -> CompileResult<Self> {
        let mut manager = Self {
            frame: FrameAllocator::new(),
            defs: HashMap::new(),
        };
        let mut by_var: HashMap<VarId, RegisterSpec> = HashMap::new();

        if let Some(this) = method.this {
            let var = variable(method, this)?;
            let spec = manager
                .frame
                .allocate_this(var.ty.clone(), describe(var, options))?;
            by_var.insert(this, spec.clone());
            manager.defs.insert((this, 0), spec);
        }
        for param in &method.params {
            let var = variable(method, *param)?;
            let spec = manager
                .frame
                .allocate_param(var.ty.clone(), describe(var, options));
            by_var.insert(*param, spec.clone());
            manager.defs.insert((*param, 0), spec);
        }

        for def in ssa_definitions(method) {
            let version = def.version.ok_or(CompileError::NotInSsaForm { var: def.var.0 })?;
            if manager.defs.contains_key(&(def.var, version)) {
                continue;
            }
            let spec = match by_var.get(&def.var).cloned() {
                Some(spec) => spec,
                None => {
                    let var = variable(method, def.var)?;
                    let spec = manager.frame.allocate(var.ty.clone(), describe(var, options));
                    by_var.insert(def.var, spec.clone());
                    spec
                }
            };
            manager.defs.insert((def.var, version), spec);
        }

        if method.return_type != Type::Void {
            manager.frame.allocate_return(method.return_type.clone())?;
        }
        log::debug!(
            "{}: {} SSA definitions in {} registers",
            method.name,
            manager.defs.len(),
            manager.frame.register_count()
        );
        Ok(manager)
    }

    fn lookup(&self, var: &VarRef) -> CompileResult<RegisterSpec> {
        let version = var.version.ok_or(CompileError::NotInSsaForm { var: var.var.0 })?;
        self.defs
            .get(&(var.var, version))
            .cloned()
            .ok_or(CompileError::RegisterNotAllocated { var: var.var.0 })
    }
}

impl RegisterManager for SsaRegisterManager {
    fn use_spec(&self, var: &VarRef) -> CompileResult<RegisterSpec> {
        self.lookup(var)
    }

    fn def_spec(&self, var: &VarRef) -> CompileResult<RegisterSpec> {
        self.lookup(var)
    }

    fn temp(&mut self, ty: &Type) -> RegisterSpec {
        self.frame.temp(ty)
    }

    fn reset_temps(&mut self) {
        self.frame.reset_temps();
    }

    fn return_spec(&self) -> Option<&RegisterSpec> {
        self.frame.return_spec()
    }

    fn param_specs(&self) -> &[RegisterSpec] {
        self.frame.params()
    }

    fn register_count(&self) -> u32 {
        self.frame.register_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{BlockKind, Expr, MethodBuilder, Operand};

    #[test]
    fn test_temps_are_reused_after_reset() {
        let mut frame = FrameAllocator::new();
        let a = frame.temp(&Type::Int);
        let b = frame.temp(&Type::Int);
        let w = frame.temp(&Type::Long);
        assert_eq!((a.reg, b.reg, w.reg), (0, 1, 2));
        assert_eq!(frame.register_count(), 4);

        frame.reset_temps();
        assert_eq!(frame.temp(&Type::Int).reg, 0);
        assert_eq!(frame.temp(&Type::Long).reg, 2);
        assert_eq!(frame.register_count(), 4);
        assert_eq!(frame.temps.created(), 3);
    }

    #[test]
    fn test_this_must_come_first() {
        let mut frame = FrameAllocator::new();
        frame.allocate_param(Type::Int, None);
        assert_eq!(
            frame.allocate_this(Type::object(), None),
            Err(CompileError::ThisAllocationOrder)
        );

        let mut frame = FrameAllocator::new();
        assert!(frame.allocate_this(Type::object(), None).is_ok());
        assert_eq!(
            frame.allocate_this(Type::object(), None),
            Err(CompileError::ThisAllocationOrder)
        );
    }

    #[test]
    fn test_return_register_aliases_zero() {
        let mut frame = FrameAllocator::new();
        frame.allocate_param(Type::Int, None);
        let ret = frame.allocate_return(Type::Long).unwrap();
        assert_eq!(ret.reg, 0);
        assert_eq!(frame.register_count(), 2);
        assert_eq!(
            frame.allocate_return(Type::Long),
            Err(CompileError::ReturnAlreadyAllocated)
        );
    }

    #[test]
    fn test_rop_manager_packs_wide_registers() {
        let mut b = MethodBuilder::new_instance(Type::reference("LFoo;"), "f", Type::Void);
        let x = b.param("x", Type::Long);
        let y = b.param("y", Type::Int);
        let z = b.local("z", Type::Double);
        let body = b.new_block();
        b.start(body);
        b.terminate(body, BlockKind::Return { value: None });
        let method = b.build().unwrap();

        let regs = RopRegisterManager::for_method(&method, &CodegenOptions::default()).unwrap();
        assert_eq!(regs.use_spec(&x.into()).unwrap().reg, 1);
        assert_eq!(regs.use_spec(&y.into()).unwrap().reg, 3);
        assert_eq!(regs.use_spec(&z.into()).unwrap().reg, 4);
        assert_eq!(regs.register_count(), 6);
        assert_eq!(regs.param_specs().len(), 3);
        assert!(regs.use_spec(&x.into()).unwrap().local.is_none());
    }

    #[test]
    fn test_debug_info_skips_synthetic_locals() {
        let mut b = MethodBuilder::new_static(Type::reference("LFoo;"), "f", Type::Void);
        let named = b.local("i", Type::Int);
        let hidden = b.synthetic_local("tmp$0", Type::Int);
        let body = b.new_block();
        b.start(body);
        b.terminate(body, BlockKind::Return { value: None });
        let method = b.build().unwrap();

        let options = CodegenOptions::default().with_debug_info(true);
        let regs = RopRegisterManager::for_method(&method, &options).unwrap();
        let local = regs.use_spec(&named.into()).unwrap().local.unwrap();
        assert_eq!(local.name, "i");
        assert!(regs.use_spec(&hidden.into()).unwrap().local.is_none());
    }

    fn two_version_method() -> (Method, VarId) {
        let mut b = MethodBuilder::new_static(Type::reference("LFoo;"), "f", Type::Int);
        let a = b.param("a", Type::Int);
        let x = b.local("x", Type::Int);
        let body = b.new_block();
        b.start(body);
        b.assign(body, VarRef::ssa(x, 1), Expr::Operand(Operand::ssa(a, 0)));
        b.assign(body, VarRef::ssa(x, 2), Expr::Operand(Operand::ssa(x, 1)));
        b.terminate(
            body,
            BlockKind::Return {
                value: Some(Operand::ssa(x, 2)),
            },
        );
        (b.build().unwrap(), x)
    }

    #[test]
    fn test_ssa_definitions_share_declaration_register() {
        let (method, x) = two_version_method();
        let regs = SsaRegisterManager::for_method(&method, &CodegenOptions::default()).unwrap();
        let first = regs.def_spec(&VarRef::ssa(x, 1)).unwrap();
        let second = regs.def_spec(&VarRef::ssa(x, 2)).unwrap();
        assert_eq!(first.reg, 1);
        assert_eq!(second.reg, first.reg);
        assert_eq!(regs.use_spec(&VarRef::ssa(x, 2)).unwrap().reg, 1);
        assert_eq!(regs.register_count(), 2);
        assert_eq!(
            regs.use_spec(&VarRef::new(x)),
            Err(CompileError::NotInSsaForm { var: x.0 })
        );
        assert_eq!(
            regs.use_spec(&VarRef::ssa(x, 7)),
            Err(CompileError::RegisterNotAllocated { var: x.0 })
        );
    }

    #[test]
    fn test_ssa_parameter_redefinition_reuses_parameter_register() {
        let mut b = MethodBuilder::new_static(Type::reference("LFoo;"), "bump", Type::Int);
        let a = b.param("a", Type::Int);
        let body = b.new_block();
        b.start(body);
        b.assign(
            body,
            VarRef::ssa(a, 1),
            Expr::Operand(Operand::int(3)),
        );
        b.terminate(
            body,
            BlockKind::Return {
                value: Some(Operand::ssa(a, 1)),
            },
        );
        let method = b.build().unwrap();

        let regs = SsaRegisterManager::for_method(&method, &CodegenOptions::default()).unwrap();
        assert_eq!(regs.def_spec(&VarRef::ssa(a, 1)).unwrap().reg, 0);
        assert_eq!(regs.register_count(), 1);
    }
}
