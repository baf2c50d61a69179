//! Textual LLVM IR backend
//!
//! Produces an `.ll` module by hand, without linking against LLVM. IR
//! integers are i64 throughout; comparisons are widened back to i64 with
//! `zext` and branches test their condition against zero.

use crate::{CodeGen, CodegenError};
use std::fmt::Write;
use std::path::Path;
use tracing::info;
use ulang_ir::{Function, Global, Instruction, Module, Value};

#[derive(Debug, Default)]
pub struct LlvmTextBackend {
    /// Emitted as the module's `target triple` when set
    target: Option<String>,
}

impl LlvmTextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, triple: impl Into<String>) -> Self {
        self.target = Some(triple.into());
        self
    }

    /// Writes the module to `path`, creating missing parent directories
    pub fn save(&self, module: &Module, path: &Path) -> Result<(), CodegenError> {
        let io_err = |source| CodegenError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.generate(module)).map_err(io_err)?;
        info!(path = %path.display(), "wrote LLVM IR");
        Ok(())
    }

    fn emit_global(&self, out: &mut String, global: &Global) {
        let _ = writeln!(
            out,
            "@{} = private unnamed_addr constant [{} x i8] c\"{}\"",
            global.name,
            global.bytes.len(),
            escape_bytes(&global.bytes)
        );
    }

    fn emit_function(&self, out: &mut String, func: &Function) {
        let params: Vec<String> = func
            .params
            .iter()
            .enumerate()
            .map(|(i, name)| format!("i64 {}", param_name(i, name)))
            .collect();

        if !func.has_body() {
            let mut types: Vec<String> = func.signature.params.iter().map(|t| t.to_string()).collect();
            if func.signature.variadic {
                types.push("...".to_string());
            }
            let _ = writeln!(out, "declare i64 @{}({})", func.name, types.join(", "));
            return;
        }

        let _ = writeln!(out, "define i64 @{}({}) {{", func.name, params.join(", "));
        let mut conds = 0;
        for (index, block) in func.blocks.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "{}:", block.label);
            for inst in &block.instructions {
                self.emit_instruction(out, func, inst, &mut conds);
            }
        }
        out.push_str("}\n");
    }

    fn emit_instruction(&self, out: &mut String, func: &Function, inst: &Instruction, conds: &mut u32) {
        let v = |value: &Value| operand(func, value);
        let _ = match inst {
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => writeln!(out, "  %t{} = {} i64 {}, {}", dest, op.mnemonic(), v(left), v(right)),
            Instruction::Compare {
                dest,
                op,
                left,
                right,
            } => {
                let _ = writeln!(
                    out,
                    "  %t{}.cmp = icmp {} i64 {}, {}",
                    dest,
                    op.predicate(),
                    v(left),
                    v(right)
                );
                writeln!(out, "  %t{} = zext i1 %t{}.cmp to i64", dest, dest)
            }
            Instruction::Neg { dest, value } => writeln!(out, "  %t{} = sub i64 0, {}", dest, v(value)),
            Instruction::Not { dest, value } => writeln!(out, "  %t{} = xor i64 {}, -1", dest, v(value)),
            Instruction::Call {
                dest,
                func: callee,
                args,
            } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| format!("{} {}", arg.ty(), v(arg)))
                    .collect();
                // variadic callees need their full type spelled out at the call
                let fn_ty = match self.variadic_signature(callee) {
                    Some(sig) => format!("{} ", sig),
                    None => "i64 ".to_string(),
                };
                writeln!(out, "  %t{} = call {}@{}({})", dest, fn_ty, callee, args.join(", "))
            }
            Instruction::Phi { dest, incoming } => {
                let edges: Vec<String> = incoming
                    .iter()
                    .map(|(value, label)| format!("[ {}, %{} ]", v(value), label))
                    .collect();
                writeln!(out, "  %t{} = phi i64 {}", dest, edges.join(", "))
            }
            Instruction::Branch { target } => writeln!(out, "  br label %{}", target),
            Instruction::CondBranch {
                cond,
                then_label,
                else_label,
            } => {
                let id = *conds;
                *conds += 1;
                let _ = writeln!(out, "  %cond{} = icmp ne i64 {}, 0", id, v(cond));
                writeln!(
                    out,
                    "  br i1 %cond{}, label %{}, label %{}",
                    id, then_label, else_label
                )
            }
            Instruction::Return(value) => writeln!(out, "  ret i64 {}", v(value)),
        };
    }

    fn variadic_signature(&self, callee: &str) -> Option<&'static str> {
        // the only variadic functions are the runtime imports
        match callee {
            ulang_ir::PRINTF | ulang_ir::SCANF => Some("i64 (ptr, ...)"),
            _ => None,
        }
    }
}

impl CodeGen for LlvmTextBackend {
    type Output = String;

    fn generate(&self, module: &Module) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; ModuleID = '{}'", module.name);
        let _ = writeln!(out, "source_filename = \"{}\"", module.name);
        if let Some(triple) = &self.target {
            let _ = writeln!(out, "target triple = \"{}\"", triple);
        }

        if !module.globals.is_empty() {
            out.push('\n');
        }
        for global in &module.globals {
            self.emit_global(&mut out, global);
        }

        let declarations: Vec<&Function> = module.functions.iter().filter(|f| !f.has_body()).collect();
        if !declarations.is_empty() {
            out.push('\n');
        }
        for func in declarations {
            self.emit_function(&mut out, func);
        }

        for func in module.definitions() {
            out.push('\n');
            self.emit_function(&mut out, func);
        }

        out
    }
}

fn param_name(index: usize, name: &str) -> String {
    format!("%arg{}.{}", index, name)
}

fn operand(func: &Function, value: &Value) -> String {
    match value {
        Value::Const(c) => c.to_string(),
        Value::Temp(t) => format!("%t{}", t),
        Value::Param(i) => param_name(*i, func.params.get(*i).map(String::as_str).unwrap_or("")),
        Value::Global(name) => format!("@{}", name),
    }
}

/// LLVM `c"..."` escaping: printable ASCII stays, everything else is `\XX`
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() && b != b'"' && b != b'\\' || b == b' ' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\{:02X}", b);
        }
    }
    out
}
