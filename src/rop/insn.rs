// This module defines the register-operation instruction set emitted by the lowering stage. An
// Opcode is the operation alone; the operand type travels on the instruction, so `add` on an int
// and on a double share one opcode and differ only in Insn::ty. Opcode answers the questions the
// lowering and verification need: whether the operation ends a block, whether it can throw for a
// given operand type, and whether its value must be fetched by a following move-result or
// move-result-pseudo. Insn carries an optional destination, ordered sources, a source position
// and an InsnKind that holds the kind-specific payload: embedded constants, the catch-type list
// of throwing instructions, the case table of a switch, or the literal table of fill-array-data.

//! Register-operation instructions.

use super::reg::RegisterSpec;
use crate::cfg::{CmpOp, FieldRef, MethodRef, Type};
use std::fmt;

/// Operation performed by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Move,
    /// Copy an incoming argument slot into a register.
    MoveParam,
    MoveException,
    /// Fetch the result of a call or filled-new-array.
    MoveResult,
    /// Fetch the result of any other throwing value-producing instruction.
    MoveResultPseudo,
    Const,
    /// String or class constant load.
    ConstObject,
    Goto,
    /// Two-register conditional branch.
    If(CmpOp),
    /// Compare one register against zero or null.
    IfZ(CmpOp),
    Switch,
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
    Neg,
    Not,
    /// Reverse subtract: `k - a`.
    RSub,
    /// Long comparison, or floating comparison with NaN yielding -1.
    CmpL,
    /// Floating comparison with NaN yielding 1.
    CmpG,
    /// Conversion between int, long, float and double.
    Conv,
    ToByte,
    ToChar,
    ToShort,
    Return,
    ArrayLength,
    Throw,
    MonitorEnter,
    MonitorExit,
    Aget,
    Aput,
    NewInstance,
    NewArray,
    FilledNewArray,
    FillArrayData,
    CheckCast,
    InstanceOf,
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeStatic,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeInterface,
    InvokePolymorphic,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Move => "move",
            Opcode::MoveParam => "move-param",
            Opcode::MoveException => "move-exception",
            Opcode::MoveResult => "move-result",
            Opcode::MoveResultPseudo => "move-result-pseudo",
            Opcode::Const => "const",
            Opcode::ConstObject => "const-object",
            Opcode::Goto => "goto",
            Opcode::If(_) => "if",
            Opcode::IfZ(_) => "if-z",
            Opcode::Switch => "switch",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Ushr => "ushr",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::RSub => "rsub",
            Opcode::CmpL => "cmpl",
            Opcode::CmpG => "cmpg",
            Opcode::Conv => "conv",
            Opcode::ToByte => "to-byte",
            Opcode::ToChar => "to-char",
            Opcode::ToShort => "to-short",
            Opcode::Return => "return",
            Opcode::ArrayLength => "array-length",
            Opcode::Throw => "throw",
            Opcode::MonitorEnter => "monitor-enter",
            Opcode::MonitorExit => "monitor-exit",
            Opcode::Aget => "aget",
            Opcode::Aput => "aput",
            Opcode::NewInstance => "new-instance",
            Opcode::NewArray => "new-array",
            Opcode::FilledNewArray => "filled-new-array",
            Opcode::FillArrayData => "fill-array-data",
            Opcode::CheckCast => "check-cast",
            Opcode::InstanceOf => "instance-of",
            Opcode::GetField => "get-field",
            Opcode::GetStatic => "get-static",
            Opcode::PutField => "put-field",
            Opcode::PutStatic => "put-static",
            Opcode::InvokeStatic => "invoke-static",
            Opcode::InvokeVirtual => "invoke-virtual",
            Opcode::InvokeSuper => "invoke-super",
            Opcode::InvokeDirect => "invoke-direct",
            Opcode::InvokeInterface => "invoke-interface",
            Opcode::InvokePolymorphic => "invoke-polymorphic",
        }
    }

    /// Whether the instruction must be the last of its block.
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::If(_)
                | Opcode::IfZ(_)
                | Opcode::Switch
                | Opcode::Return
                | Opcode::Throw
        )
    }

    /// Whether the operation can raise an exception for operands of type `ty`.
    pub fn can_throw(&self, ty: &Type) -> bool {
        match self {
            Opcode::Div | Opcode::Rem => !ty.is_floating(),
            Opcode::ConstObject
            | Opcode::ArrayLength
            | Opcode::Throw
            | Opcode::MonitorEnter
            | Opcode::MonitorExit
            | Opcode::Aget
            | Opcode::Aput
            | Opcode::NewInstance
            | Opcode::NewArray
            | Opcode::FilledNewArray
            | Opcode::CheckCast
            | Opcode::InstanceOf
            | Opcode::GetField
            | Opcode::GetStatic
            | Opcode::PutField
            | Opcode::PutStatic => true,
            _ => self.is_call(),
        }
    }

    /// Throwing value producers whose result is fetched by move-result-pseudo.
    pub fn needs_move_result_pseudo(&self) -> bool {
        matches!(
            self,
            Opcode::ConstObject
                | Opcode::ArrayLength
                | Opcode::Aget
                | Opcode::NewInstance
                | Opcode::NewArray
                | Opcode::CheckCast
                | Opcode::InstanceOf
                | Opcode::GetField
                | Opcode::GetStatic
                | Opcode::Div
                | Opcode::Rem
        )
    }

    pub fn is_call(&self) -> bool {
        matches!(
            self,
            Opcode::InvokeStatic
                | Opcode::InvokeVirtual
                | Opcode::InvokeSuper
                | Opcode::InvokeDirect
                | Opcode::InvokeInterface
                | Opcode::InvokePolymorphic
        )
    }

    pub fn is_move_result(&self) -> bool {
        matches!(self, Opcode::MoveResult | Opcode::MoveResultPseudo)
    }

    /// Whether the mnemonic carries the operand type (`add-int`).
    fn is_typed(&self) -> bool {
        matches!(
            self,
            Opcode::Move
                | Opcode::MoveParam
                | Opcode::MoveResult
                | Opcode::Const
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Rem
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::Shr
                | Opcode::Ushr
                | Opcode::Neg
                | Opcode::Not
                | Opcode::RSub
                | Opcode::CmpL
                | Opcode::CmpG
                | Opcode::Return
                | Opcode::Aget
                | Opcode::Aput
        )
    }
}

/// Constant operand embedded in an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    String(String),
    Type(Type),
    Field(FieldRef),
    Method(MethodRef),
    /// Call-site prototype descriptor.
    Proto(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "#{}", v),
            Constant::Long(v) => write!(f, "#{}L", v),
            Constant::Float(v) => write!(f, "#{}f", v),
            Constant::Double(v) => write!(f, "#{}d", v),
            Constant::Null => f.write_str("null"),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Type(ty) => write!(f, "{}", ty),
            Constant::Field(field) => write!(f, "{}", field),
            Constant::Method(method) => write!(f, "{}", method),
            Constant::Proto(proto) => f.write_str(proto),
        }
    }
}

/// Source line of an instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: Option<u32>,
}

impl SourcePosition {
    pub const NONE: SourcePosition = SourcePosition { line: None };

    pub fn line(line: u32) -> Self {
        Self { line: Some(line) }
    }
}

/// Kind-specific payload of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum InsnKind {
    Plain,
    PlainCst(Constant),
    Throwing {
        catches: Vec<Type>,
    },
    ThrowingCst {
        cst: Constant,
        catches: Vec<Type>,
    },
    /// Method-handle call: the method and the call-site prototype.
    ThrowingDualCst {
        cst: Constant,
        proto: Constant,
        catches: Vec<Type>,
    },
    /// Case values in declaration order; targets are the block successors.
    Switch {
        cases: Vec<i32>,
    },
    FillArrayData {
        array_ty: Type,
        values: Vec<Constant>,
    },
}

/// One register operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Insn {
    pub opcode: Opcode,
    /// Operand type selecting the typed variant of the opcode.
    pub ty: Type,
    pub position: SourcePosition,
    pub result: Option<RegisterSpec>,
    pub sources: Vec<RegisterSpec>,
    pub kind: InsnKind,
}

impl Insn {
    pub fn plain(
        opcode: Opcode,
        ty: Type,
        position: SourcePosition,
        result: Option<RegisterSpec>,
        sources: Vec<RegisterSpec>,
    ) -> Self {
        Self {
            opcode,
            ty,
            position,
            result,
            sources,
            kind: InsnKind::Plain,
        }
    }

    pub fn plain_cst(
        opcode: Opcode,
        ty: Type,
        position: SourcePosition,
        result: Option<RegisterSpec>,
        sources: Vec<RegisterSpec>,
        cst: Constant,
    ) -> Self {
        Self {
            kind: InsnKind::PlainCst(cst),
            ..Self::plain(opcode, ty, position, result, sources)
        }
    }

    /// Throwing instructions never carry a destination; their value is
    /// fetched by the move-result that follows.
    pub fn throwing(
        opcode: Opcode,
        ty: Type,
        position: SourcePosition,
        sources: Vec<RegisterSpec>,
        catches: Vec<Type>,
    ) -> Self {
        Self {
            kind: InsnKind::Throwing { catches },
            ..Self::plain(opcode, ty, position, None, sources)
        }
    }

    pub fn throwing_cst(
        opcode: Opcode,
        ty: Type,
        position: SourcePosition,
        sources: Vec<RegisterSpec>,
        cst: Constant,
        catches: Vec<Type>,
    ) -> Self {
        Self {
            kind: InsnKind::ThrowingCst { cst, catches },
            ..Self::plain(opcode, ty, position, None, sources)
        }
    }

    pub fn throwing_dual_cst(
        opcode: Opcode,
        ty: Type,
        position: SourcePosition,
        sources: Vec<RegisterSpec>,
        cst: Constant,
        proto: Constant,
        catches: Vec<Type>,
    ) -> Self {
        Self {
            kind: InsnKind::ThrowingDualCst {
                cst,
                proto,
                catches,
            },
            ..Self::plain(opcode, ty, position, None, sources)
        }
    }

    pub fn switch(position: SourcePosition, selector: RegisterSpec, cases: Vec<i32>) -> Self {
        Self {
            kind: InsnKind::Switch { cases },
            ..Self::plain(Opcode::Switch, Type::Int, position, None, vec![selector])
        }
    }

    pub fn fill_array_data(
        position: SourcePosition,
        array: RegisterSpec,
        array_ty: Type,
        values: Vec<Constant>,
    ) -> Self {
        Self {
            kind: InsnKind::FillArrayData { array_ty, values },
            ..Self::plain(Opcode::FillArrayData, Type::Void, position, None, vec![array])
        }
    }

    /// Catch types of a throwing instruction, empty otherwise.
    pub fn catches(&self) -> &[Type] {
        match &self.kind {
            InsnKind::Throwing { catches }
            | InsnKind::ThrowingCst { catches, .. }
            | InsnKind::ThrowingDualCst { catches, .. } => catches,
            _ => &[],
        }
    }

    pub fn constant(&self) -> Option<&Constant> {
        match &self.kind {
            InsnKind::PlainCst(cst)
            | InsnKind::ThrowingCst { cst, .. }
            | InsnKind::ThrowingDualCst { cst, .. } => Some(cst),
            _ => None,
        }
    }

    pub fn is_throwing(&self) -> bool {
        matches!(
            self.kind,
            InsnKind::Throwing { .. } | InsnKind::ThrowingCst { .. } | InsnKind::ThrowingDualCst { .. }
        )
    }

    /// Whether a move-result or move-result-pseudo must follow. Calls may
    /// leave their result unread.
    pub fn produces_pending_value(&self) -> bool {
        self.is_throwing()
            && self.ty != Type::Void
            && (self.opcode == Opcode::FilledNewArray || self.opcode.needs_move_result_pseudo())
    }

    /// Full mnemonic, e.g. `add-int`, `if-ltz`, `long-to-int`.
    pub fn mnemonic(&self) -> String {
        match self.opcode {
            Opcode::If(op) => format!("if-{}", op.suffix()),
            Opcode::IfZ(op) => format!("if-{}z", op.suffix()),
            Opcode::Conv => {
                let from = self.sources.first().map_or("?", |s| s.ty.mnemonic());
                format!("{}-to-{}", from, self.ty.mnemonic())
            }
            op if op.is_typed() => format!("{}-{}", op.name(), self.ty.mnemonic()),
            op => op.name().to_string(),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            write!(f, "{} <- ", result)?;
        }
        f.write_str(&self.mnemonic())?;
        for (i, source) in self.sources.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, source)?;
        }
        match &self.kind {
            InsnKind::Plain | InsnKind::Throwing { .. } => {}
            InsnKind::PlainCst(cst) | InsnKind::ThrowingCst { cst, .. } => write!(f, " {}", cst)?,
            InsnKind::ThrowingDualCst { cst, proto, .. } => write!(f, " {} {}", cst, proto)?,
            InsnKind::Switch { cases } => write!(f, " {:?}", cases)?,
            InsnKind::FillArrayData { values, .. } => write!(f, " [{} values]", values.len())?,
        }
        let catches = self.catches();
        if !catches.is_empty() {
            let names: Vec<String> = catches.iter().map(|c| c.to_string()).collect();
            write!(f, " catch({})", names.join(", "))?;
        }
        if let Some(line) = self.position.line {
            write!(f, " @{}", line)?;
        }
        Ok(())
    }
}
