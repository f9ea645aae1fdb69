// This module holds the pure opcode-selection rules of the block lowerer. binary_form folds an
// int literal operand into the instruction when it fits the 16-bit immediate: `a - k` becomes
// an add of `-k` because there is no subtract-with-immediate, `k - a` becomes a reverse
// subtract, commutative operators accept the literal on either side, and immediate int shift
// counts are masked to five bits. Long shift counts are masked to six bits and stay a register
// operand. cast_plan picks between a plain move, a truncation inside the small-int family, a
// conversion across int/long/float/double (followed by a truncation for byte/char/short
// targets) and a check-cast for reference targets. compare_opcode reduces long and floating
// comparisons to an int via cmp, choosing the NaN bias so that NaN takes the false branch.

//! Opcode selection and constant folding.

use crate::cfg::{BinaryOp, CmpOp, Dispatch, Literal, Operand, Type, UnaryOp};
use crate::core::error::{CompileError, CompileResult};
use crate::rop::{Constant, Opcode};

/// Mask applied to immediate int shift counts.
pub const INT_SHIFT_MASK: i32 = 0x1f;

/// Mask applied to immediate long shift counts.
pub const LONG_SHIFT_MASK: i32 = 0x3f;

/// Whether `value` fits the 16-bit literal operand.
pub fn fits_lit16(value: i32) -> bool {
    (i16::MIN as i32..=i16::MAX as i32).contains(&value)
}

pub fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Rem => Opcode::Rem,
        BinaryOp::And => Opcode::And,
        BinaryOp::Or => Opcode::Or,
        BinaryOp::Xor => Opcode::Xor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::Ushr => Opcode::Ushr,
    }
}

pub fn unary_opcode(op: UnaryOp) -> Opcode {
    match op {
        UnaryOp::Neg => Opcode::Neg,
        UnaryOp::BitNot | UnaryOp::Not => Opcode::Not,
    }
}

pub fn invoke_opcode(dispatch: Dispatch) -> Opcode {
    match dispatch {
        Dispatch::Static => Opcode::InvokeStatic,
        Dispatch::Virtual => Opcode::InvokeVirtual,
        Dispatch::Direct => Opcode::InvokeDirect,
        Dispatch::Interface => Opcode::InvokeInterface,
        Dispatch::Super => Opcode::InvokeSuper,
        Dispatch::Polymorphic => Opcode::InvokePolymorphic,
    }
}

/// Shape of a lowered binary operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryForm {
    /// Both operands in registers.
    Registers {
        opcode: Opcode,
        lhs: Operand,
        rhs: Operand,
    },
    /// One register operand and an embedded literal.
    Literal {
        opcode: Opcode,
        operand: Operand,
        literal: i32,
    },
}

/// Fold literal operands of `lhs op rhs` computed in type `ty`.
pub fn binary_form(op: BinaryOp, lhs: &Operand, rhs: &Operand, ty: &Type) -> BinaryForm {
    let opcode = binary_opcode(op);
    let registers = |lhs: &Operand, rhs: &Operand| BinaryForm::Registers {
        opcode,
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    };

    if *ty == Type::Long && op.is_shift() {
        if let Some(count) = rhs.as_literal().and_then(Literal::as_int) {
            return registers(lhs, &Operand::int(count & LONG_SHIFT_MASK));
        }
        return registers(lhs, rhs);
    }
    if !ty.is_small_int() {
        return registers(lhs, rhs);
    }

    let rhs_lit = rhs.as_literal().and_then(Literal::as_int);
    let lhs_lit = lhs.as_literal().and_then(Literal::as_int);

    match (lhs_lit, rhs_lit) {
        (_, Some(k)) if op.is_shift() => BinaryForm::Literal {
            opcode,
            operand: lhs.clone(),
            literal: k & INT_SHIFT_MASK,
        },
        (_, Some(k)) if op == BinaryOp::Sub => match k.checked_neg().filter(|n| fits_lit16(*n)) {
            Some(neg) => BinaryForm::Literal {
                opcode: Opcode::Add,
                operand: lhs.clone(),
                literal: neg,
            },
            None => registers(lhs, rhs),
        },
        (_, Some(k)) if fits_lit16(k) => BinaryForm::Literal {
            opcode,
            operand: lhs.clone(),
            literal: k,
        },
        (Some(k), None) if op == BinaryOp::Sub && fits_lit16(k) => BinaryForm::Literal {
            opcode: Opcode::RSub,
            operand: rhs.clone(),
            literal: k,
        },
        (Some(k), None) if op.is_commutative() && fits_lit16(k) => BinaryForm::Literal {
            opcode,
            operand: rhs.clone(),
            literal: k,
        },
        _ => registers(lhs, rhs),
    }
}

/// Instructions implementing a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastPlan {
    Move,
    /// Truncation inside the small-int family.
    Truncate(Opcode),
    /// Conversion across int/long/float/double.
    Convert,
    /// Conversion to int, then truncation.
    ConvertThenTruncate(Opcode),
    CheckCast,
}

fn truncation(to: &Type) -> Option<Opcode> {
    match to {
        Type::Byte => Some(Opcode::ToByte),
        Type::Char => Some(Opcode::ToChar),
        Type::Short => Some(Opcode::ToShort),
        _ => None,
    }
}

pub fn cast_plan(from: &Type, to: &Type) -> CompileResult<CastPlan> {
    if to.is_reference() {
        if !from.is_reference() {
            return Err(CompileError::InvalidOperand {
                reason: format!("cannot cast primitive {} to {}", from, to),
            });
        }
        return Ok(CastPlan::CheckCast);
    }
    if from.is_reference() || *to == Type::Void || *from == Type::Void {
        return Err(CompileError::InvalidOperand {
            reason: format!("cannot cast {} to {}", from, to),
        });
    }

    let plan = if from.is_small_int() && to.is_small_int() {
        let widening = matches!(
            (from, to),
            (Type::Byte, Type::Byte)
                | (Type::Byte, Type::Short)
                | (Type::Short, Type::Short)
                | (Type::Char, Type::Char)
        );
        match truncation(to) {
            Some(op) if !widening => CastPlan::Truncate(op),
            _ => CastPlan::Move,
        }
    } else if from.frame_type() == to.frame_type() {
        CastPlan::Move
    } else if to.is_small_int() {
        match truncation(to) {
            Some(op) => CastPlan::ConvertThenTruncate(op),
            None => CastPlan::Convert,
        }
    } else {
        CastPlan::Convert
    };
    Ok(plan)
}

/// Compare instruction reducing a `ty` comparison to an int, if one is needed.
pub fn compare_opcode(op: CmpOp, ty: &Type) -> Option<Opcode> {
    match ty {
        Type::Long => Some(Opcode::CmpL),
        Type::Float | Type::Double => match op {
            CmpOp::Lt | CmpOp::Le => Some(Opcode::CmpG),
            _ => Some(Opcode::CmpL),
        },
        _ => None,
    }
}

/// Constant operand for a literal.
pub fn literal_constant(lit: &Literal) -> Constant {
    match lit {
        Literal::Long(v) => Constant::Long(*v),
        Literal::Float(v) => Constant::Float(*v),
        Literal::Double(v) => Constant::Double(*v),
        Literal::String(s) => Constant::String(s.clone()),
        Literal::Null => Constant::Null,
        Literal::Class(ty) => Constant::Type(ty.clone()),
        other => Constant::Int(other.as_int().unwrap_or(0)),
    }
}
