//! Virtual registers.

use crate::cfg::{FrameType, Type};
use std::fmt;
use std::sync::Arc;

/// Debug description of the source variable held in a register.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalInfo {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
}

impl LocalInfo {
    pub fn new(name: &str, ty: &Type, signature: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            descriptor: ty.descriptor().to_string(),
            signature: signature.map(str::to_string),
        }
    }
}

/// A numbered virtual register holding a value of type `ty`.
///
/// Wide values occupy `reg` and `reg + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisterSpec {
    pub reg: u32,
    pub ty: Type,
    pub local: Option<Arc<LocalInfo>>,
}

impl RegisterSpec {
    pub fn new(reg: u32, ty: Type) -> Self {
        Self {
            reg,
            ty,
            local: None,
        }
    }

    pub fn with_local(reg: u32, ty: Type, local: Option<Arc<LocalInfo>>) -> Self {
        Self { reg, ty, local }
    }

    /// Slots occupied (1 or 2).
    pub fn category(&self) -> u32 {
        self.ty.category()
    }

    /// First register past this one.
    pub fn next_reg(&self) -> u32 {
        self.reg + self.category()
    }

    pub fn frame_type(&self) -> FrameType {
        self.ty.frame_type()
    }

    /// Two registers may be assigned to one another only when their frame
    /// types match.
    pub fn is_assignable_to(&self, other: &RegisterSpec) -> bool {
        self.frame_type() == other.frame_type()
    }

    /// Same register retyped, without debug info.
    pub fn with_type(&self, ty: Type) -> Self {
        Self::new(self.reg, ty)
    }
}

impl fmt::Display for RegisterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:{}", self.reg, self.ty)?;
        if let Some(local) = &self.local {
            write!(f, "{{{}}}", local.name)?;
        }
        Ok(())
    }
}
