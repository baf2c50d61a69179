//! IR types
//!
//! The language has a single integer width; pointers only appear as the
//! addresses of constant globals handed to the runtime imports.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    /// 64-bit signed integer, the only value type of the language
    I64,
    /// Opaque pointer (address of a global)
    Ptr,
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::I64 => f.write_str("i64"),
            IrType::Ptr => f.write_str("ptr"),
        }
    }
}

/// Function type: fixed parameters, optional variadic tail, i64 result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<IrType>,
    pub variadic: bool,
}

impl Signature {
    /// `i64 (i64, i64, ...)` with `arity` parameters
    pub fn integers(arity: usize) -> Self {
        Self {
            params: vec![IrType::I64; arity],
            variadic: false,
        }
    }

    /// `i64 (ptr, ...)`, the shape of `printf` and `scanf`
    pub fn format_variadic() -> Self {
        Self {
            params: vec![IrType::Ptr],
            variadic: true,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether a call with `count` arguments is well formed
    pub fn accepts(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i64 (")?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty)?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}
