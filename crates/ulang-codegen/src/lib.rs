//! ulang-codegen - Backends for the ulang IR
//!
//! Supports several backends:
//! - **LLVM text**: writes a `.ll` file that `clang` or `llc` accept (default)
//! - **Interpreter**: runs the IR directly, used by `ulang run` and the tests
//! - **LLVM native**: builds an object file through LLVM (requires LLVM installed)
//!
//! # Example
//!
//! ```rust
//! use ulang_codegen::{CodeGen, LlvmTextBackend};
//! use ulang_ir::{lower_program, LoweringOptions};
//! use ulang_parser::parse_source;
//!
//! let program = parse_source("int main() { print(42); return 0; }", 0).unwrap();
//! let module = lower_program(&program, &LoweringOptions::default()).unwrap();
//! let text = LlvmTextBackend::new().generate(&module);
//! assert!(text.contains("declare i64 @printf(ptr, ...)"));
//! ```

pub mod interpreter;
pub mod llvm_text;

#[cfg(feature = "llvm")]
pub mod llvm_backend;

pub use interpreter::{Interpreter, RuntimeError};
pub use llvm_text::LlvmTextBackend;

#[cfg(feature = "llvm")]
pub use llvm_backend::{LlvmBackend, LlvmCodeGen};

use std::path::PathBuf;
use thiserror::Error;
use ulang_ir::LoopMode;

/// Trait for code generation backends
pub trait CodeGen {
    /// Backend output type
    type Output;

    /// Generates code from the IR module
    fn generate(&self, module: &ulang_ir::Module) -> Self::Output;
}

/// Where the compiled output goes and how loops are lowered
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output file
    pub output: PathBuf,
    pub loop_mode: LoopMode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output/output.ll"),
            loop_mode: LoopMode::Guarded,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("cannot write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("LLVM: {0}")]
    Llvm(String),
}
