//! Builder - insertion cursor over a [`Module`]
//!
//! The builder owns the module while it is being filled in. It keeps a
//! single cursor (function, block); every `build_*` call appends to the
//! block under the cursor and refuses to write past a terminator.

use crate::error::IrError;
use crate::instruction::{BinaryOp, CompareOp, Instruction, Value};
use crate::module::{BasicBlock, BlockId, FuncId, Module};

/// Handle to a phi node, used to add incoming edges once they are known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiRef {
    func: FuncId,
    block: BlockId,
    index: usize,
    dest: u32,
}

impl PhiRef {
    /// The SSA value the phi defines
    pub fn value(&self) -> Value {
        Value::Temp(self.dest)
    }
}

#[derive(Debug)]
pub struct Builder {
    module: Module,
    cursor: Option<(FuncId, BlockId)>,
}

impl Builder {
    pub fn new(module: Module) -> Self {
        Self {
            module,
            cursor: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    // =========================================
    // Cursor
    // =========================================

    /// Opens the `entry` block of a bodyless function and positions there
    pub fn start_function(&mut self, func: FuncId) -> Result<BlockId, IrError> {
        let function = self.module.function(func);
        if function.has_body() || function.import {
            return Err(IrError::FunctionHasBody(function.name.clone()));
        }
        let entry = self.append_block_to(func, "entry");
        self.position_at_end(func, entry);
        Ok(entry)
    }

    /// Appends an empty block with a label unique in the current function
    pub fn append_block(&mut self, prefix: &str) -> Result<BlockId, IrError> {
        let (func, _) = self.cursor.ok_or(IrError::NoInsertionPoint)?;
        Ok(self.append_block_to(func, prefix))
    }

    fn append_block_to(&mut self, func: FuncId, prefix: &str) -> BlockId {
        let function = self.module.function_mut(func);
        let label = function.fresh_label(prefix);
        function.blocks.push(BasicBlock::new(label));
        BlockId(function.blocks.len() - 1)
    }

    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.cursor = Some((func, block));
    }

    /// Moves the cursor to another block of the current function
    pub fn switch_to(&mut self, block: BlockId) -> Result<(), IrError> {
        let (func, _) = self.cursor.ok_or(IrError::NoInsertionPoint)?;
        self.position_at_end(func, block);
        Ok(())
    }

    pub fn clear_position(&mut self) {
        self.cursor = None;
    }

    pub fn current_function(&self) -> Result<FuncId, IrError> {
        self.cursor.map(|(f, _)| f).ok_or(IrError::NoInsertionPoint)
    }

    pub fn current_block(&self) -> Result<BlockId, IrError> {
        self.cursor.map(|(_, b)| b).ok_or(IrError::NoInsertionPoint)
    }

    /// True when there is no cursor or its block already ends in a terminator
    pub fn is_terminated(&self) -> bool {
        match self.cursor {
            Some((func, block)) => self.module.function(func).block(block).is_terminated(),
            None => true,
        }
    }

    pub fn label(&self, block: BlockId) -> Result<String, IrError> {
        let func = self.current_function()?;
        Ok(self.module.function(func).block(block).label.clone())
    }

    /// Cursor position, provided its block can still be appended to
    fn writable(&self) -> Result<(FuncId, BlockId), IrError> {
        let (func, block) = self.cursor.ok_or(IrError::NoInsertionPoint)?;
        let function = self.module.function(func);
        if function.block(block).is_terminated() {
            return Err(IrError::BlockTerminated {
                function: function.name.clone(),
                label: function.block(block).label.clone(),
            });
        }
        Ok((func, block))
    }

    /// Appends `build(dest)` to the current block and returns `dest`
    fn push(&mut self, build: impl FnOnce(u32) -> Instruction) -> Result<u32, IrError> {
        let (func, block) = self.writable()?;
        let function = self.module.function_mut(func);
        let dest = function.new_temp();
        function.block_mut(block).instructions.push(build(dest));
        Ok(dest)
    }

    fn push_terminator(&mut self, inst: Instruction) -> Result<(), IrError> {
        let (func, block) = self.writable()?;
        self.module
            .function_mut(func)
            .block_mut(block)
            .instructions
            .push(inst);
        Ok(())
    }

    // =========================================
    // Instructions
    // =========================================

    pub fn build_binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, IrError> {
        let dest = self.push(|dest| Instruction::Binary {
            dest,
            op,
            left,
            right,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn build_compare(&mut self, op: CompareOp, left: Value, right: Value) -> Result<Value, IrError> {
        let dest = self.push(|dest| Instruction::Compare {
            dest,
            op,
            left,
            right,
        })?;
        Ok(Value::Temp(dest))
    }

    pub fn build_neg(&mut self, value: Value) -> Result<Value, IrError> {
        self.push(|dest| Instruction::Neg { dest, value }).map(Value::Temp)
    }

    pub fn build_not(&mut self, value: Value) -> Result<Value, IrError> {
        self.push(|dest| Instruction::Not { dest, value }).map(Value::Temp)
    }

    pub fn build_call(&mut self, callee: FuncId, args: Vec<Value>) -> Result<Value, IrError> {
        let func = self.module.function(callee).name.clone();
        self.push(|dest| Instruction::Call { dest, func, args }).map(Value::Temp)
    }

    /// Phi with the given initial edges; it must precede every non-phi
    /// instruction of the current block
    pub fn build_phi(&mut self, incoming: Vec<(Value, BlockId)>) -> Result<PhiRef, IrError> {
        let (func, block) = self.cursor.ok_or(IrError::NoInsertionPoint)?;
        let function = self.module.function(func);
        let current = function.block(block);
        if current.instructions.iter().any(|i| !i.is_phi()) {
            return Err(IrError::MisplacedPhi {
                function: function.name.clone(),
                label: current.label.clone(),
            });
        }
        let index = current.instructions.len();
        let incoming = incoming
            .into_iter()
            .map(|(value, from)| (value, function.block(from).label.clone()))
            .collect();

        let dest = self.push(|dest| Instruction::Phi { dest, incoming })?;
        Ok(PhiRef {
            func,
            block,
            index,
            dest,
        })
    }

    pub fn add_incoming(&mut self, phi: PhiRef, value: Value, from: BlockId) -> Result<(), IrError> {
        let function = self.module.function_mut(phi.func);
        let label = function.block(from).label.clone();
        match function.block_mut(phi.block).instructions.get_mut(phi.index) {
            Some(Instruction::Phi { incoming, .. }) => {
                incoming.push((value, label));
                Ok(())
            }
            _ => Err(IrError::MisplacedPhi {
                function: function.name.clone(),
                label: function.block(phi.block).label.clone(),
            }),
        }
    }

    pub fn build_br(&mut self, target: BlockId) -> Result<(), IrError> {
        let target = self.label(target)?;
        self.push_terminator(Instruction::Branch { target })
    }

    /// Branches to `then_block` when `cond` is non-zero
    pub fn build_cond_br(
        &mut self,
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<(), IrError> {
        let then_label = self.label(then_block)?;
        let else_label = self.label(else_block)?;
        self.push_terminator(Instruction::CondBranch {
            cond,
            then_label,
            else_label,
        })
    }

    pub fn build_ret(&mut self, value: Value) -> Result<(), IrError> {
        self.push_terminator(Instruction::Return(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;

    fn builder_in_main() -> (Builder, FuncId) {
        let mut module = Module::with_runtime("test");
        let main = module.declare_function("main", vec![]);
        let mut builder = Builder::new(module);
        builder.start_function(main).unwrap();
        (builder, main)
    }

    #[test]
    fn test_build_straight_line() {
        let (mut builder, main) = builder_in_main();
        let sum = builder
            .build_binary(BinaryOp::Add, Value::Const(2), Value::Const(3))
            .unwrap();
        builder.build_ret(sum).unwrap();

        let module = builder.finish();
        let body = &module.function(main).blocks;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].label, "entry");
        assert_eq!(body[0].instructions[0].to_string(), "%t0 = add 2, 3");
        assert_eq!(body[0].instructions[1].to_string(), "ret %t0");
    }

    #[test]
    fn test_refuses_to_write_after_terminator() {
        let (mut builder, _) = builder_in_main();
        builder.build_ret(Value::Const(0)).unwrap();
        assert!(builder.is_terminated());
        assert!(matches!(
            builder.build_neg(Value::Const(1)),
            Err(IrError::BlockTerminated { .. })
        ));
        assert!(matches!(
            builder.build_ret(Value::Const(1)),
            Err(IrError::BlockTerminated { .. })
        ));
    }

    #[test]
    fn test_no_insertion_point() {
        let mut builder = Builder::new(Module::new("empty"));
        assert!(builder.is_terminated());
        assert_eq!(
            builder.build_ret(Value::Const(0)),
            Err(IrError::NoInsertionPoint)
        );
        assert_eq!(builder.append_block("x"), Err(IrError::NoInsertionPoint));
    }

    #[test]
    fn test_phi_edges() {
        let (mut builder, main) = builder_in_main();
        let entry = builder.current_block().unwrap();
        let next = builder.append_block("next").unwrap();
        builder.build_br(next).unwrap();
        builder.switch_to(next).unwrap();
        let phi = builder.build_phi(vec![(Value::Const(1), entry)]).unwrap();
        builder.add_incoming(phi, Value::Const(2), next).unwrap();
        builder.build_ret(phi.value()).unwrap();

        let module = builder.finish();
        let block = module.function(main).get_block("next").unwrap();
        assert_eq!(
            block.instructions[0].to_string(),
            "%t0 = phi [1, entry], [2, next]"
        );
    }

    #[test]
    fn test_phi_must_lead_block() {
        let (mut builder, _) = builder_in_main();
        builder.build_neg(Value::Const(1)).unwrap();
        assert!(matches!(
            builder.build_phi(vec![]),
            Err(IrError::MisplacedPhi { .. })
        ));
    }

    #[test]
    fn test_start_function_twice() {
        let (mut builder, main) = builder_in_main();
        assert!(matches!(
            builder.start_function(main),
            Err(IrError::FunctionHasBody(name)) if name == "main"
        ));
    }
}
