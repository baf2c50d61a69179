//! IR instructions
//!
//! Every instruction that produces a value defines a fresh temporary
//! (`%tN`) exactly once. Blocks are referenced by label.

use crate::types::IrType;
use std::fmt;

/// An SSA operand
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// 64-bit integer constant
    Const(i64),
    /// Result of an earlier instruction
    Temp(u32),
    /// Incoming argument of the enclosing function
    Param(usize),
    /// Address of a module-level symbol
    Global(String),
}

impl Value {
    pub fn ty(&self) -> IrType {
        match self {
            Value::Global(_) => IrType::Ptr,
            _ => IrType::I64,
        }
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Value::Const(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(v) => write!(f, "{}", v),
            Value::Temp(id) => write!(f, "%t{}", id),
            Value::Param(idx) => write!(f, "%arg{}", idx),
            Value::Global(name) => write!(f, "@{}", name),
        }
    }
}

/// Integer arithmetic; add/sub/mul wrap, div is signed and truncates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "sdiv",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Signed comparison producing 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// LLVM `icmp` predicate
    pub fn predicate(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "slt",
            CompareOp::Le => "sle",
            CompareOp::Gt => "sgt",
            CompareOp::Ge => "sge",
        }
    }

    pub fn evaluate(&self, left: i64, right: i64) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.predicate())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// %dest = op left, right
    Binary {
        dest: u32,
        op: BinaryOp,
        left: Value,
        right: Value,
    },

    /// %dest = cmp op left, right (i64 0 or 1)
    Compare {
        dest: u32,
        op: CompareOp,
        left: Value,
        right: Value,
    },

    /// %dest = neg value
    Neg { dest: u32, value: Value },

    /// %dest = not value (bitwise complement)
    Not { dest: u32, value: Value },

    /// %dest = call @func(args...)
    Call {
        dest: u32,
        func: String,
        args: Vec<Value>,
    },

    /// %dest = phi [value, label], ...
    Phi {
        dest: u32,
        incoming: Vec<(Value, String)>,
    },

    /// br label
    Branch { target: String },

    /// br cond, then_label, else_label (non-zero takes `then_label`)
    CondBranch {
        cond: Value,
        then_label: String,
        else_label: String,
    },

    /// ret value
    Return(Value),
}

impl Instruction {
    /// Temporary defined by the instruction, if any
    pub fn dest(&self) -> Option<u32> {
        match self {
            Instruction::Binary { dest, .. }
            | Instruction::Compare { dest, .. }
            | Instruction::Neg { dest, .. }
            | Instruction::Not { dest, .. }
            | Instruction::Call { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            _ => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return(_) | Instruction::Branch { .. } | Instruction::CondBranch { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi { .. })
    }

    /// Labels this instruction can transfer control to
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Instruction::Branch { target } => vec![target.as_str()],
            Instruction::CondBranch {
                then_label,
                else_label,
                ..
            } => vec![then_label.as_str(), else_label.as_str()],
            _ => Vec::new(),
        }
    }

    /// Operands read by the instruction
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Binary { left, right, .. } | Instruction::Compare { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Neg { value, .. } | Instruction::Not { value, .. } => vec![value],
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
            Instruction::Branch { .. } => Vec::new(),
            Instruction::CondBranch { cond, .. } => vec![cond],
            Instruction::Return(value) => vec![value],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "%t{} = {} {}, {}", dest, op, left, right),
            Instruction::Compare {
                dest,
                op,
                left,
                right,
            } => write!(f, "%t{} = cmp {} {}, {}", dest, op, left, right),
            Instruction::Neg { dest, value } => write!(f, "%t{} = neg {}", dest, value),
            Instruction::Not { dest, value } => write!(f, "%t{} = not {}", dest, value),
            Instruction::Call { dest, func, args } => {
                write!(f, "%t{} = call @{}(", dest, func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Instruction::Phi { dest, incoming } => {
                write!(f, "%t{} = phi ", dest)?;
                for (i, (value, label)) in incoming.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{}, {}]", value, label)?;
                }
                Ok(())
            }
            Instruction::Branch { target } => write!(f, "br {}", target),
            Instruction::CondBranch {
                cond,
                then_label,
                else_label,
            } => write!(f, "br {}, {}, {}", cond, then_label, else_label),
            Instruction::Return(value) => write!(f, "ret {}", value),
        }
    }
}
