// This module defines the statement-level vocabulary of the input CFG. The producer hands over
// code already in three-address form: every operand is either a variable reference or a
// literal, and each statement performs at most one operation. Variable references optionally
// carry an SSA version; the direct lowering ignores it, while the SSA lowering requires it on
// every definition and use. Field and method references are qualified by their declaring type
// and, for methods, by dispatch kind, which decides the invoke opcode emitted later.

//! Operands, expressions and statements of the input CFG.

use super::types::Type;
use std::fmt;

/// Index of a variable in [`super::Method::vars`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A reference to a variable, optionally tagged with an SSA version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub var: VarId,
    pub version: Option<u32>,
}

impl VarRef {
    /// Plain (non-SSA) reference.
    pub fn new(var: VarId) -> Self {
        Self { var, version: None }
    }

    /// SSA definition or use of `var` at `version`.
    pub fn ssa(var: VarId, version: u32) -> Self {
        Self {
            var,
            version: Some(version),
        }
    }
}

impl From<VarId> for VarRef {
    fn from(var: VarId) -> Self {
        VarRef::new(var)
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}_{}", self.var, v),
            None => write!(f, "{}", self.var),
        }
    }
}

/// Literal constant operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
    /// Class literal (`Foo.class`).
    Class(Type),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Boolean(_) => Type::Boolean,
            Literal::Byte(_) => Type::Byte,
            Literal::Char(_) => Type::Char,
            Literal::Short(_) => Type::Short,
            Literal::Int(_) => Type::Int,
            Literal::Long(_) => Type::Long,
            Literal::Float(_) => Type::Float,
            Literal::Double(_) => Type::Double,
            Literal::String(_) => Type::string(),
            Literal::Null => Type::Null,
            Literal::Class(_) => Type::class(),
        }
    }

    /// Value as a 32-bit integer, for literals of the int frame type.
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Literal::Boolean(b) => Some(b as i32),
            Literal::Byte(v) => Some(v as i32),
            Literal::Char(v) => Some(v as i32),
            Literal::Short(v) => Some(v as i32),
            Literal::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the literal is integral zero, `false` or `null`.
    pub fn is_zero(&self) -> bool {
        match self {
            Literal::Null => true,
            Literal::Long(v) => *v == 0,
            _ => self.as_int() == Some(0),
        }
    }

    /// String and class literals load through a throwing instruction.
    pub fn loads_object(&self) -> bool {
        matches!(self, Literal::String(_) | Literal::Class(_))
    }
}

/// Operand of a three-address statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(VarRef),
    Literal(Literal),
}

impl Operand {
    pub fn var(var: VarId) -> Self {
        Operand::Var(VarRef::new(var))
    }

    pub fn ssa(var: VarId, version: u32) -> Self {
        Operand::Var(VarRef::ssa(var, version))
    }

    pub fn int(value: i32) -> Self {
        Operand::Literal(Literal::Int(value))
    }

    pub fn long(value: i64) -> Self {
        Operand::Literal(Literal::Long(value))
    }

    pub fn null() -> Self {
        Operand::Literal(Literal::Null)
    }

    pub fn string(value: &str) -> Self {
        Operand::Literal(Literal::String(value.to_string()))
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Operand::Literal(lit) => Some(lit),
            Operand::Var(_) => None,
        }
    }
}

impl From<VarId> for Operand {
    fn from(var: VarId) -> Self {
        Operand::var(var)
    }
}

impl From<VarRef> for Operand {
    fn from(var: VarRef) -> Self {
        Operand::Var(var)
    }
}

impl From<Literal> for Operand {
    fn from(lit: Literal) -> Self {
        Operand::Literal(lit)
    }
}

/// A field, qualified by its declaring type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: Type,
    pub name: String,
    pub ty: Type,
}

impl FieldRef {
    pub fn new(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            owner,
            name: name.to_string(),
            ty,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.ty)
    }
}

/// How a call is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    Static,
    /// Instance, virtual.
    Virtual,
    /// Instance, non-virtual (constructors, private methods).
    Direct,
    Interface,
    Super,
    /// Signature-polymorphic method-handle invocation.
    Polymorphic,
}

impl Dispatch {
    /// Whether a receiver is passed ahead of the arguments.
    pub fn has_receiver(self) -> bool {
        !matches!(self, Dispatch::Static)
    }
}

/// A method, qualified by its declaring type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: Type,
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    pub dispatch: Dispatch,
}

impl MethodRef {
    pub fn new(
        owner: Type,
        name: &str,
        params: Vec<Type>,
        return_type: Type,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            owner,
            name: name.to_string(),
            params,
            return_type,
            dispatch,
        }
    }

    /// Method descriptor, e.g. `(IJ)V`.
    pub fn descriptor(&self) -> String {
        let mut desc = String::from("(");
        for param in &self.params {
            desc.push_str(param.descriptor());
        }
        desc.push(')');
        desc.push_str(self.return_type.descriptor());
        desc
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor())
    }
}

/// A call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: MethodRef,
    pub receiver: Option<Operand>,
    pub args: Vec<Operand>,
    /// Call-site prototype for polymorphic calls, e.g. `(II)I`.
    pub proto: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl BinaryOp {
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise complement.
    BitNot,
    /// Boolean negation.
    Not,
}

/// Comparison operator of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CmpOp {
    /// Operator selecting the opposite branch.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Le => CmpOp::Gt,
        }
    }

    /// Operator valid after exchanging the operands.
    pub fn swap(self) -> Self {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Ge => "ge",
            CmpOp::Gt => "gt",
            CmpOp::Le => "le",
        }
    }
}

/// Right-hand side of an assignment or an evaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Operand(Operand),
    Binary {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnaryOp,
        operand: Operand,
    },
    Cast {
        operand: Operand,
        to: Type,
    },
    InstanceOf {
        operand: Operand,
        test: Type,
    },
    FieldGet {
        field: FieldRef,
        instance: Option<Operand>,
    },
    ArrayGet {
        array: Operand,
        index: Operand,
        elem_ty: Type,
    },
    ArrayLength(Operand),
    NewInstance(Type),
    /// One-dimensional array allocation.
    NewArray {
        array_ty: Type,
        length: Operand,
    },
    /// Array allocated and filled from operands in one instruction.
    FilledNewArray {
        array_ty: Type,
        elements: Vec<Operand>,
    },
    /// Primitive array initialised from a literal table.
    ArrayData {
        array_ty: Type,
        values: Vec<Literal>,
    },
    Call(Call),
    /// The exception caught by the enclosing catch block.
    CaughtException,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign { dest: VarRef, value: Expr },
    /// Expression evaluated for its side effects.
    Eval(Expr),
    FieldSet {
        field: FieldRef,
        instance: Option<Operand>,
        value: Operand,
    },
    ArraySet {
        array: Operand,
        index: Operand,
        value: Operand,
        elem_ty: Type,
    },
    Lock(Operand),
    Unlock(Operand),
}

/// A statement with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: Option<u32>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, line: None }
    }

    pub fn at_line(kind: StmtKind, line: u32) -> Self {
        Self {
            kind,
            line: Some(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_negate_is_involution() {
        for op in [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Ge, CmpOp::Gt, CmpOp::Le] {
            assert_eq!(op.negate().negate(), op);
        }
        assert_eq!(CmpOp::Lt.negate(), CmpOp::Ge);
        assert_eq!(CmpOp::Lt.swap(), CmpOp::Gt);
        assert_eq!(CmpOp::Eq.swap(), CmpOp::Eq);
    }

    #[test]
    fn test_literal_zero() {
        assert!(Literal::Int(0).is_zero());
        assert!(Literal::Boolean(false).is_zero());
        assert!(Literal::Null.is_zero());
        assert!(!Literal::Int(3).is_zero());
        assert!(!Literal::Double(0.0).is_zero());
    }

    #[test]
    fn test_method_descriptor() {
        let m = MethodRef::new(
            Type::reference("LFoo;"),
            "bar",
            vec![Type::Int, Type::Long, Type::string()],
            Type::Void,
            Dispatch::Virtual,
        );
        assert_eq!(m.descriptor(), "(IJLjava/lang/String;)V");
        assert!(m.dispatch.has_receiver());
    }
}
