// This module defines the value types shared by the input CFG and the emitted register
// operations. Type covers the primitive kinds of the target virtual machine, the null type and
// reference types named by their descriptor. Each type knows its register category (one slot,
// or two for long/double) and its frame type, the coarse class under which registers are
// interchangeable: boolean, byte, char, short and int collapse to one frame type while long,
// float, double and references each stay distinct. Descriptors follow the usual
// `I`/`J`/`Ljava/lang/String;`/`[I` spelling so constants and debug signatures can be printed
// without a separate type table.

//! Value types and frame types.

use std::fmt;
use std::sync::Arc;

/// Descriptor of `java.lang.Object`.
pub const OBJECT_DESCRIPTOR: &str = "Ljava/lang/Object;";

/// Descriptor of `java.lang.Throwable`, used for catch-all handlers.
pub const THROWABLE_DESCRIPTOR: &str = "Ljava/lang/Throwable;";

/// Descriptor of `java.lang.String`.
pub const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";

/// Descriptor of `java.lang.Class`.
pub const CLASS_DESCRIPTOR: &str = "Ljava/lang/Class;";

/// A value type.
///
/// References are identified by descriptor only; class hierarchy questions
/// belong to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Type of the `null` literal.
    Null,
    /// Class or array type, by descriptor.
    Reference(Arc<str>),
}

/// Coarse register class: two registers may be assigned to one another only
/// when their frame types match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Void,
}

impl Type {
    /// Reference type from a descriptor such as `Ljava/lang/String;`.
    pub fn reference(descriptor: &str) -> Self {
        Type::Reference(Arc::from(descriptor))
    }

    /// `java.lang.Object`.
    pub fn object() -> Self {
        Self::reference(OBJECT_DESCRIPTOR)
    }

    /// `java.lang.Throwable`.
    pub fn throwable() -> Self {
        Self::reference(THROWABLE_DESCRIPTOR)
    }

    /// `java.lang.String`.
    pub fn string() -> Self {
        Self::reference(STRING_DESCRIPTOR)
    }

    /// `java.lang.Class`.
    pub fn class() -> Self {
        Self::reference(CLASS_DESCRIPTOR)
    }

    /// Array type whose component is `self`.
    pub fn array_of(&self) -> Self {
        Type::Reference(Arc::from(format!("[{}", self.descriptor())))
    }

    /// Component type if `self` is an array type.
    pub fn component(&self) -> Option<Type> {
        match self {
            Type::Reference(desc) => desc.strip_prefix('[').and_then(Type::from_descriptor),
            _ => None,
        }
    }

    /// Parse a single field descriptor.
    pub fn from_descriptor(desc: &str) -> Option<Type> {
        let ty = match desc {
            "V" => Type::Void,
            "Z" => Type::Boolean,
            "B" => Type::Byte,
            "C" => Type::Char,
            "S" => Type::Short,
            "I" => Type::Int,
            "J" => Type::Long,
            "F" => Type::Float,
            "D" => Type::Double,
            _ if desc.starts_with('[') && desc.len() > 1 => Type::reference(desc),
            _ if desc.starts_with('L') && desc.ends_with(';') && desc.len() > 2 => {
                Type::reference(desc)
            }
            _ => return None,
        };
        Some(ty)
    }

    /// Descriptor spelling of the type.
    pub fn descriptor(&self) -> &str {
        match self {
            Type::Void => "V",
            Type::Boolean => "Z",
            Type::Byte => "B",
            Type::Char => "C",
            Type::Short => "S",
            Type::Int => "I",
            Type::Long => "J",
            Type::Float => "F",
            Type::Double => "D",
            Type::Null => OBJECT_DESCRIPTOR,
            Type::Reference(desc) => desc,
        }
    }

    /// Number of register slots occupied by a value of this type.
    pub fn category(&self) -> u32 {
        match self {
            Type::Long | Type::Double => 2,
            Type::Void => 0,
            _ => 1,
        }
    }

    /// Whether the type needs a register pair.
    pub fn is_wide(&self) -> bool {
        self.category() == 2
    }

    /// Boolean, byte, char, short or int.
    pub fn is_small_int(&self) -> bool {
        matches!(
            self,
            Type::Boolean | Type::Byte | Type::Char | Type::Short | Type::Int
        )
    }

    /// Reference or null.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_) | Type::Null)
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference() && *self != Type::Void
    }

    /// Float or double.
    pub fn is_floating(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Type::Boolean | Type::Byte | Type::Char | Type::Short | Type::Int => FrameType::Int,
            Type::Long => FrameType::Long,
            Type::Float => FrameType::Float,
            Type::Double => FrameType::Double,
            Type::Null | Type::Reference(_) => FrameType::Reference,
            Type::Void => FrameType::Void,
        }
    }

    /// Short name used in opcode mnemonics (`int`, `long`, `object`, ...).
    pub fn mnemonic(&self) -> &'static str {
        match self.frame_type() {
            FrameType::Int => match self {
                Type::Boolean => "boolean",
                Type::Byte => "byte",
                Type::Char => "char",
                Type::Short => "short",
                _ => "int",
            },
            FrameType::Long => "long",
            FrameType::Float => "float",
            FrameType::Double => "double",
            FrameType::Reference => "object",
            FrameType::Void => "void",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => f.write_str("null"),
            _ => f.write_str(self.descriptor()),
        }
    }
}
