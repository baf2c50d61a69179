//! ulang-ir - SSA intermediate representation of the ulang language
//!
//! Programs are lowered into basic blocks of three-address instructions.
//! Variables never live in memory: each name maps to the SSA value it holds,
//! and joins in control flow are resolved with phi nodes.
//!
//! # Architecture
//!
//! ```text
//! AST (ulang-parser)
//!         ↓
//!    [Emit / lower]   bindings, builder cursor
//!         ↓
//!   IR Module
//!   ├── Globals       (format strings)
//!   └── Functions
//!       └── Basic Blocks
//!           ├── Phis
//!           └── Instructions + terminator
//!         ↓
//!    [verify]
//!         ↓
//!   ulang-codegen
//! ```
//!
//! # Example
//!
//! ```rust
//! use ulang_ir::{lower_program, LoweringOptions};
//! use ulang_parser::parse_source;
//!
//! let program = parse_source("int main() { return 2 + 3 * 4; }", 0).unwrap();
//! let module = lower_program(&program, &LoweringOptions::default()).unwrap();
//! assert!(module.to_string().contains("ret %t1"));
//! ```

pub mod bindings;
pub mod builder;
pub mod error;
pub mod instruction;
pub mod lower;
pub mod module;
pub mod types;
pub mod verify;

pub use bindings::{Binding, Bindings};
pub use builder::{Builder, PhiRef};
pub use error::IrError;
pub use instruction::{BinaryOp, CompareOp, Instruction, Value};
pub use lower::{lower_program, Emit, EmitContext, LoopMode, LoweringOptions};
pub use module::{
    BasicBlock, BlockId, FuncId, Function, Global, Module, Symbol, INPUT_FMT, NUMBER_FMT, PRINTF,
    SCANF,
};
pub use types::{IrType, Signature};
pub use verify::{verify_function, verify_module};
