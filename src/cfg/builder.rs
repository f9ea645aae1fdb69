//! Incremental construction of input CFGs.
//!
//! Producers (and tests) declare variables, reserve blocks, append
//! statements and finally terminate every block with its [`BlockKind`].
//! [`MethodBuilder::build`] refuses graphs with unterminated blocks.
//!
//! ```ignore
//! let mut b = MethodBuilder::new_static(Type::reference("LFoo;"), "f", Type::Int);
//! let a = b.param("a", Type::Int);
//! let body = b.new_block();
//! b.start(body);
//! b.terminate(body, BlockKind::Return { value: Some(a.into()) });
//! let method = b.build()?;
//! ```

use super::{
    Block, BlockId, BlockKind, Expr, Method, MethodFlags, Phi, PhiArg, Stmt, StmtKind, Type,
    VarId, VarKind, VarRef, Variable,
};
use crate::core::error::{CompileError, CompileResult};

pub struct MethodBuilder {
    method: Method,
    kinds: Vec<Option<BlockKind>>,
}

impl MethodBuilder {
    /// Builder for a static method.
    pub fn new_static(owner: Type, name: &str, return_type: Type) -> Self {
        let mut builder = Self::empty(owner, name, return_type);
        builder.method.flags.is_static = true;
        builder
    }

    /// Builder for an instance method; `this` is declared immediately.
    pub fn new_instance(owner: Type, name: &str, return_type: Type) -> Self {
        let mut builder = Self::empty(owner.clone(), name, return_type);
        let this = builder.declare("this", owner, VarKind::This, false);
        builder.method.this = Some(this);
        builder
    }

    fn empty(owner: Type, name: &str, return_type: Type) -> Self {
        let mut builder = Self {
            method: Method {
                owner,
                name: name.to_string(),
                return_type,
                flags: MethodFlags::default(),
                this: None,
                params: Vec::new(),
                vars: Vec::new(),
                blocks: Vec::new(),
                entry: BlockId(0),
                exit: BlockId(1),
                throws: Vec::new(),
            },
            kinds: Vec::new(),
        };
        builder.method.entry = builder.new_block();
        builder.method.exit = builder.new_block();
        builder.kinds[builder.method.exit.index()] = Some(BlockKind::Exit);
        builder
    }

    fn declare(&mut self, name: &str, ty: Type, kind: VarKind, synthetic: bool) -> VarId {
        let id = VarId(self.method.vars.len() as u32);
        self.method.vars.push(Variable {
            id,
            name: name.to_string(),
            ty,
            kind,
            synthetic,
            signature: None,
        });
        id
    }

    pub fn this(&self) -> Option<VarId> {
        self.method.this
    }

    pub fn entry(&self) -> BlockId {
        self.method.entry
    }

    pub fn exit(&self) -> BlockId {
        self.method.exit
    }

    pub fn param(&mut self, name: &str, ty: Type) -> VarId {
        let id = self.declare(name, ty, VarKind::Parameter, false);
        self.method.params.push(id);
        id
    }

    pub fn local(&mut self, name: &str, ty: Type) -> VarId {
        self.declare(name, ty, VarKind::Local, false)
    }

    /// Compiler-introduced local.
    pub fn synthetic_local(&mut self, name: &str, ty: Type) -> VarId {
        self.declare(name, ty, VarKind::Local, true)
    }

    /// Attach a generic signature to a variable's debug description.
    pub fn set_signature(&mut self, var: VarId, signature: &str) {
        if let Some(v) = self.method.vars.get_mut(var.0 as usize) {
            v.signature = Some(signature.to_string());
        }
    }

    pub fn set_native(&mut self) {
        self.method.flags.is_native = true;
    }

    pub fn set_abstract(&mut self) {
        self.method.flags.is_abstract = true;
    }

    pub fn add_throws(&mut self, ty: Type) {
        self.method.throws.push(ty);
    }

    /// Reserve a block; it must be terminated before [`build`](Self::build).
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.method.blocks.len() as u32);
        self.method.blocks.push(Block {
            id,
            kind: BlockKind::Exit,
            stmts: Vec::new(),
            phis: Vec::new(),
            handlers: Vec::new(),
        });
        self.kinds.push(None);
        id
    }

    /// Make `first` the block the entry falls into.
    pub fn start(&mut self, first: BlockId) {
        let entry = self.method.entry;
        self.kinds[entry.index()] = Some(BlockKind::Entry { next: first });
    }

    pub fn stmt(&mut self, block: BlockId, kind: StmtKind) {
        self.method.blocks[block.index()].stmts.push(Stmt::new(kind));
    }

    pub fn stmt_at(&mut self, block: BlockId, kind: StmtKind, line: u32) {
        self.method.blocks[block.index()]
            .stmts
            .push(Stmt::at_line(kind, line));
    }

    /// Shorthand for `dest = value`.
    pub fn assign(&mut self, block: BlockId, dest: impl Into<VarRef>, value: Expr) {
        self.stmt(
            block,
            StmtKind::Assign {
                dest: dest.into(),
                value,
            },
        );
    }

    pub fn phi(&mut self, block: BlockId, def: VarRef, args: Vec<(VarRef, BlockId)>) {
        let args = args
            .into_iter()
            .map(|(value, pred)| PhiArg { value, pred })
            .collect();
        self.method.blocks[block.index()]
            .phis
            .push(Phi { def, args });
    }

    /// Append `catch_block` to the handler list of `block`.
    pub fn handler(&mut self, block: BlockId, catch_block: BlockId) {
        self.method.blocks[block.index()].handlers.push(catch_block);
    }

    pub fn terminate(&mut self, block: BlockId, kind: BlockKind) {
        self.kinds[block.index()] = Some(kind);
    }

    pub fn build(mut self) -> CompileResult<Method> {
        // Native and abstract methods have no body.
        if self.method.flags.is_native || self.method.flags.is_abstract {
            let exit = self.method.exit;
            self.kinds[self.method.entry.index()].get_or_insert(BlockKind::Entry { next: exit });
        }
        for (idx, kind) in self.kinds.into_iter().enumerate() {
            let kind = kind.ok_or_else(|| CompileError::MalformedCfg {
                reason: format!("block B{} was never terminated", idx),
            })?;
            self.method.blocks[idx].kind = kind;
        }
        let block_count = self.method.blocks.len();
        for block in &self.method.blocks {
            if let Some(bad) = block
                .all_successors()
                .into_iter()
                .find(|succ| succ.index() >= block_count)
            {
                return Err(CompileError::MalformedCfg {
                    reason: format!("{} names unknown successor {}", block.id, bad),
                });
            }
        }
        Ok(self.method)
    }
}
