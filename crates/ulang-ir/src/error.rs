//! Errors raised while building or verifying IR.

use thiserror::Error;
use ulang_error::CompileError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("builder is not positioned inside a block")]
    NoInsertionPoint,

    #[error("block `{label}` in `{function}` is already terminated")]
    BlockTerminated { function: String, label: String },

    #[error("function `{0}` already has a body")]
    FunctionHasBody(String),

    #[error("phi in `{function}` must come before every non-phi instruction of `{label}`")]
    MisplacedPhi { function: String, label: String },

    #[error("block `{label}` in `{function}` does not end with a terminator")]
    MissingTerminator { function: String, label: String },

    #[error("terminator in the middle of block `{label}` in `{function}`")]
    TerminatorNotLast { function: String, label: String },

    #[error("branch in `{function}` targets unknown block `{target}`")]
    UnknownBlock { function: String, target: String },

    #[error("duplicate block label `{label}` in `{function}`")]
    DuplicateBlock { function: String, label: String },

    #[error("phi in `{function}`:`{label}` has incoming edges {incoming:?} but predecessors {predecessors:?}")]
    PhiPredecessorMismatch {
        function: String,
        label: String,
        incoming: Vec<String>,
        predecessors: Vec<String>,
    },

    #[error("`{function}` uses %t{temp} which is never defined")]
    UndefinedTemp { function: String, temp: u32 },

    #[error("`{function}` defines %t{temp} more than once")]
    RedefinedTemp { function: String, temp: u32 },

    #[error("`{function}` refers to parameter {index} but has only {arity}")]
    UnknownParam {
        function: String,
        index: usize,
        arity: usize,
    },

    #[error("`{function}` refers to unknown global `@{name}`")]
    UnknownGlobal { function: String, name: String },

    #[error("`{function}` calls unknown function `@{callee}`")]
    UnknownCallee { function: String, callee: String },

    #[error("`{function}` calls `@{callee}` with {found} argument(s), signature is {signature}")]
    CallArity {
        function: String,
        callee: String,
        found: usize,
        signature: String,
    },

    #[error("argument {index} of call to `@{callee}` in `{function}` has type {found}, expected {expected}")]
    CallArgumentType {
        function: String,
        callee: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("`{function}` uses pointer {value} as an integer")]
    PointerAsInteger { function: String, value: String },

    #[error("module defines {0} `main` functions, expected exactly one")]
    EntryPoint(usize),
}

impl From<IrError> for CompileError {
    fn from(err: IrError) -> Self {
        CompileError::Internal(err.to_string())
    }
}
