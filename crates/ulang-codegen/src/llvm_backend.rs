//! LLVM backend for the ulang language
//!
//! Builds the module through the LLVM C API and can write a native object
//! file. Requires LLVM 17 to be installed on the system.
//!
//! # Setup
//!
//! 1. Install LLVM 17 from https://llvm.org/releases/
//! 2. Set environment variable: LLVM_SYS_170_PREFIX=/path/to/llvm
//! 3. Build with: cargo build --features llvm
//!
//! # Example
//!
//! ```rust,ignore
//! use inkwell::context::Context;
//! use ulang_codegen::LlvmBackend;
//!
//! let context = Context::create();
//! let mut backend = LlvmBackend::new(&context, "main");
//! backend.emit_module(&module)?;
//! backend.compile(std::path::Path::new("output.o"))?;
//! ```

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module as LlvmModule};
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::types::BasicMetadataTypeEnum;
use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, FunctionValue, IntValue, PhiValue, PointerValue,
};
use inkwell::{AddressSpace, IntPredicate, OptimizationLevel};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use ulang_ir::{
    BinaryOp, CompareOp, Function, Instruction, IrType, Module as IrModule, Value as IrValue,
};

use crate::{CodeGen, CodegenError};

fn llvm_err(err: impl std::fmt::Display) -> CodegenError {
    CodegenError::Llvm(err.to_string())
}

/// Phis are created empty and filled once every block has been emitted
type PendingPhi<'ctx, 'ir> = (PhiValue<'ctx>, &'ir [(IrValue, String)]);

/// LLVM backend for native code generation
pub struct LlvmBackend<'ctx> {
    context: &'ctx Context,
    module: LlvmModule<'ctx>,
    builder: Builder<'ctx>,
    functions: HashMap<String, FunctionValue<'ctx>>,
    globals: HashMap<String, PointerValue<'ctx>>,
}

impl<'ctx> LlvmBackend<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        Self {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            functions: HashMap::new(),
            globals: HashMap::new(),
        }
    }

    /// Translates a verified IR module and runs the LLVM verifier on it
    pub fn emit_module(&mut self, ir: &IrModule) -> Result<(), CodegenError> {
        for global in &ir.globals {
            let bytes = self.context.const_string(&global.bytes, false);
            let value = self
                .module
                .add_global(bytes.get_type(), Some(AddressSpace::default()), &global.name);
            value.set_initializer(&bytes);
            value.set_constant(true);
            value.set_linkage(Linkage::Private);
            value.set_unnamed_addr(true);
            self.globals.insert(global.name.clone(), value.as_pointer_value());
        }

        for func in &ir.functions {
            let params: Vec<BasicMetadataTypeEnum> = func
                .signature
                .params
                .iter()
                .map(|ty| match ty {
                    IrType::I64 => self.context.i64_type().into(),
                    IrType::Ptr => self.context.ptr_type(AddressSpace::default()).into(),
                })
                .collect();
            let fn_type = self
                .context
                .i64_type()
                .fn_type(&params, func.signature.variadic);
            let value = self.module.add_function(&func.name, fn_type, None);
            self.functions.insert(func.name.clone(), value);
        }

        for func in ir.definitions() {
            self.emit_function(func)?;
        }

        self.module.verify().map_err(llvm_err)?;
        debug!(module = %ir.name, "LLVM module verified");
        Ok(())
    }

    /// Writes a native object file for the host target
    pub fn compile(&self, output: &Path) -> Result<(), CodegenError> {
        Target::initialize_native(&InitializationConfig::default()).map_err(llvm_err)?;

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).map_err(llvm_err)?;
        let machine = target
            .create_target_machine(
                &triple,
                "generic",
                "",
                OptimizationLevel::Default,
                RelocMode::Default,
                CodeModel::Default,
            )
            .ok_or_else(|| CodegenError::Llvm("cannot create a target machine".to_string()))?;
        self.module.set_triple(&triple);

        machine
            .write_to_file(&self.module, FileType::Object, output)
            .map_err(llvm_err)?;
        info!(path = %output.display(), "wrote object file");
        Ok(())
    }

    /// LLVM's own rendering of the module
    pub fn emit_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    fn function(&self, name: &str) -> Result<FunctionValue<'ctx>, CodegenError> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::Llvm(format!("function `{}` was not declared", name)))
    }

    fn emit_function(&mut self, func: &Function) -> Result<(), CodegenError> {
        let fn_value = self.function(&func.name)?;
        let mut blocks: HashMap<&str, BasicBlock<'ctx>> = HashMap::new();
        for block in &func.blocks {
            blocks.insert(
                block.label.as_str(),
                self.context.append_basic_block(fn_value, &block.label),
            );
        }

        let mut values: HashMap<u32, IntValue<'ctx>> = HashMap::new();
        let mut pending: Vec<PendingPhi<'ctx, '_>> = Vec::new();

        // definitions before uses; only phis may refer forward
        let order = func.reverse_postorder();
        for id in &order {
            let block = func.block(*id);
            self.builder.position_at_end(lookup_block(&blocks, &block.label)?);
            for inst in &block.instructions {
                self.emit_instruction(fn_value, inst, &blocks, &mut values, &mut pending)?;
            }
        }
        for (index, block) in func.blocks.iter().enumerate() {
            if !order.iter().any(|id| id.0 == index) {
                self.builder.position_at_end(lookup_block(&blocks, &block.label)?);
                self.builder.build_unreachable().map_err(llvm_err)?;
            }
        }

        for (phi, incoming) in pending {
            let mut edges = Vec::with_capacity(incoming.len());
            for (value, label) in incoming {
                edges.push((self.int_value(fn_value, value, &values)?, lookup_block(&blocks, label)?));
            }
            let edges: Vec<(&dyn BasicValue<'ctx>, BasicBlock<'ctx>)> = edges
                .iter()
                .map(|(value, block)| (value as &dyn BasicValue<'ctx>, *block))
                .collect();
            phi.add_incoming(&edges);
        }

        Ok(())
    }

    fn emit_instruction<'ir>(
        &mut self,
        fn_value: FunctionValue<'ctx>,
        inst: &'ir Instruction,
        blocks: &HashMap<&str, BasicBlock<'ctx>>,
        values: &mut HashMap<u32, IntValue<'ctx>>,
        pending: &mut Vec<PendingPhi<'ctx, 'ir>>,
    ) -> Result<(), CodegenError> {
        let i64_type = self.context.i64_type();
        match inst {
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => {
                let lhs = self.int_value(fn_value, left, values)?;
                let rhs = self.int_value(fn_value, right, values)?;
                let name = format!("t{}", dest);
                let result = match op {
                    BinaryOp::Add => self.builder.build_int_add(lhs, rhs, &name),
                    BinaryOp::Sub => self.builder.build_int_sub(lhs, rhs, &name),
                    BinaryOp::Mul => self.builder.build_int_mul(lhs, rhs, &name),
                    BinaryOp::Div => self.builder.build_int_signed_div(lhs, rhs, &name),
                }
                .map_err(llvm_err)?;
                values.insert(*dest, result);
            }

            Instruction::Compare {
                dest,
                op,
                left,
                right,
            } => {
                let lhs = self.int_value(fn_value, left, values)?;
                let rhs = self.int_value(fn_value, right, values)?;
                let predicate = match op {
                    CompareOp::Eq => IntPredicate::EQ,
                    CompareOp::Ne => IntPredicate::NE,
                    CompareOp::Lt => IntPredicate::SLT,
                    CompareOp::Le => IntPredicate::SLE,
                    CompareOp::Gt => IntPredicate::SGT,
                    CompareOp::Ge => IntPredicate::SGE,
                };
                let bit = self
                    .builder
                    .build_int_compare(predicate, lhs, rhs, &format!("t{}.cmp", dest))
                    .map_err(llvm_err)?;
                let widened = self
                    .builder
                    .build_int_z_extend(bit, i64_type, &format!("t{}", dest))
                    .map_err(llvm_err)?;
                values.insert(*dest, widened);
            }

            Instruction::Neg { dest, value } => {
                let operand = self.int_value(fn_value, value, values)?;
                let result = self
                    .builder
                    .build_int_neg(operand, &format!("t{}", dest))
                    .map_err(llvm_err)?;
                values.insert(*dest, result);
            }

            Instruction::Not { dest, value } => {
                let operand = self.int_value(fn_value, value, values)?;
                let result = self
                    .builder
                    .build_not(operand, &format!("t{}", dest))
                    .map_err(llvm_err)?;
                values.insert(*dest, result);
            }

            Instruction::Call { dest, func, args } => {
                let callee = self.function(func)?;
                let mut arguments: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(match arg {
                        IrValue::Global(name) => self.global(name)?.into(),
                        other => self.int_value(fn_value, other, values)?.into(),
                    });
                }
                let call = self
                    .builder
                    .build_call(callee, &arguments, &format!("t{}", dest))
                    .map_err(llvm_err)?;
                let result = call
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| CodegenError::Llvm(format!("call to `{}` has no value", func)))?;
                values.insert(*dest, result.into_int_value());
            }

            Instruction::Phi { dest, incoming } => {
                let phi = self
                    .builder
                    .build_phi(i64_type, &format!("t{}", dest))
                    .map_err(llvm_err)?;
                values.insert(*dest, phi.as_basic_value().into_int_value());
                pending.push((phi, incoming.as_slice()));
            }

            Instruction::Branch { target } => {
                self.builder
                    .build_unconditional_branch(lookup_block(blocks, target)?)
                    .map_err(llvm_err)?;
            }

            Instruction::CondBranch {
                cond,
                then_label,
                else_label,
            } => {
                let value = self.int_value(fn_value, cond, values)?;
                let bit = self
                    .builder
                    .build_int_compare(IntPredicate::NE, value, i64_type.const_zero(), "cond")
                    .map_err(llvm_err)?;
                self.builder
                    .build_conditional_branch(
                        bit,
                        lookup_block(blocks, then_label)?,
                        lookup_block(blocks, else_label)?,
                    )
                    .map_err(llvm_err)?;
            }

            Instruction::Return(value) => {
                let result = self.int_value(fn_value, value, values)?;
                self.builder.build_return(Some(&result)).map_err(llvm_err)?;
            }
        }
        Ok(())
    }

    fn global(&self, name: &str) -> Result<PointerValue<'ctx>, CodegenError> {
        self.globals
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::Llvm(format!("unknown global `@{}`", name)))
    }

    fn int_value(
        &self,
        fn_value: FunctionValue<'ctx>,
        value: &IrValue,
        values: &HashMap<u32, IntValue<'ctx>>,
    ) -> Result<IntValue<'ctx>, CodegenError> {
        match value {
            IrValue::Const(c) => Ok(self.context.i64_type().const_int(*c as u64, true)),
            IrValue::Temp(t) => values
                .get(t)
                .copied()
                .ok_or_else(|| CodegenError::Llvm(format!("%t{} used before definition", t))),
            IrValue::Param(i) => fn_value
                .get_nth_param(*i as u32)
                .map(|p| p.into_int_value())
                .ok_or_else(|| CodegenError::Llvm(format!("no parameter {}", i))),
            IrValue::Global(name) => Err(CodegenError::Llvm(format!(
                "pointer `@{}` used as an integer",
                name
            ))),
        }
    }
}

fn lookup_block<'ctx>(
    blocks: &HashMap<&str, BasicBlock<'ctx>>,
    label: &str,
) -> Result<BasicBlock<'ctx>, CodegenError> {
    blocks
        .get(label)
        .copied()
        .ok_or_else(|| CodegenError::Llvm(format!("unknown block `{}`", label)))
}

/// Wrapper to implement CodeGen trait; yields LLVM's textual IR
pub struct LlvmCodeGen;

impl CodeGen for LlvmCodeGen {
    type Output = Result<String, CodegenError>;

    fn generate(&self, module: &IrModule) -> Self::Output {
        let context = Context::create();
        let mut backend = LlvmBackend::new(&context, &module.name);
        backend.emit_module(module)?;
        Ok(backend.emit_ir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulang_ir::{lower_program, LoweringOptions};
    use ulang_parser::parse_source;

    #[test]
    fn test_llvm_module_verifies() {
        let program = parse_source(
            "int main() { int s = 0; for (i = 0; i < 4; i = i + 1) { s = s + i; } print(s); return s; }",
            0,
        )
        .unwrap();
        let module = lower_program(&program, &LoweringOptions::default()).unwrap();
        let ir = LlvmCodeGen.generate(&module).unwrap();
        assert!(ir.contains("define i64 @main()"));
        assert!(ir.contains("phi i64"));
    }
}
