//! Structural verification of a finished module.

use crate::error::IrError;
use crate::instruction::{Instruction, Value};
use crate::module::{Function, Module};
use crate::types::IrType;
use std::collections::HashSet;

/// Checks the whole module; stops at the first problem found
pub fn verify_module(module: &Module) -> Result<(), IrError> {
    for function in module.definitions() {
        verify_function(module, function)?;
    }

    let mains = module.definitions().filter(|f| f.name == "main").count();
    if mains != 1 {
        return Err(IrError::EntryPoint(mains));
    }

    Ok(())
}

/// Checks one defined function against the module it lives in
pub fn verify_function(module: &Module, function: &Function) -> Result<(), IrError> {
    let name = || function.name.clone();

    let mut labels = HashSet::new();
    for block in &function.blocks {
        if !labels.insert(block.label.as_str()) {
            return Err(IrError::DuplicateBlock {
                function: name(),
                label: block.label.clone(),
            });
        }
    }

    let mut defined = HashSet::new();
    for block in &function.blocks {
        let Some((last, body)) = block.instructions.split_last() else {
            return Err(IrError::MissingTerminator {
                function: name(),
                label: block.label.clone(),
            });
        };
        if !last.is_terminator() {
            return Err(IrError::MissingTerminator {
                function: name(),
                label: block.label.clone(),
            });
        }
        if body.iter().any(Instruction::is_terminator) {
            return Err(IrError::TerminatorNotLast {
                function: name(),
                label: block.label.clone(),
            });
        }
        let leading_phis = block.phis().count();
        if block.instructions[leading_phis..].iter().any(Instruction::is_phi) {
            return Err(IrError::MisplacedPhi {
                function: name(),
                label: block.label.clone(),
            });
        }
        for target in last.successors() {
            if !labels.contains(target) {
                return Err(IrError::UnknownBlock {
                    function: name(),
                    target: target.to_string(),
                });
            }
        }
        for inst in &block.instructions {
            if let Some(dest) = inst.dest() {
                if !defined.insert(dest) {
                    return Err(IrError::RedefinedTemp {
                        function: name(),
                        temp: dest,
                    });
                }
            }
        }
    }

    for block in &function.blocks {
        verify_phis(function, &block.label, block.phis())?;

        for inst in &block.instructions {
            for operand in inst.operands() {
                verify_operand(module, function, operand, &defined)?;
            }
            match inst {
                Instruction::Call { func, args, .. } => verify_call(module, function, func, args)?,
                Instruction::Phi { .. } => {}
                other => {
                    if let Some(value) = other.operands().into_iter().find(|v| v.ty() == IrType::Ptr) {
                        return Err(IrError::PointerAsInteger {
                            function: name(),
                            value: value.to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

/// Every phi must carry exactly one edge per predecessor and none from elsewhere
fn verify_phis<'a>(
    function: &Function,
    label: &str,
    phis: impl Iterator<Item = &'a Instruction>,
) -> Result<(), IrError> {
    let mut predecessors: Vec<String> = function
        .predecessors(label)
        .into_iter()
        .map(str::to_string)
        .collect();
    predecessors.sort();

    for phi in phis {
        let Instruction::Phi { incoming, .. } = phi else {
            continue;
        };
        let mut sources: Vec<String> = incoming.iter().map(|(_, from)| from.clone()).collect();
        sources.sort();
        if sources != predecessors {
            return Err(IrError::PhiPredecessorMismatch {
                function: function.name.clone(),
                label: label.to_string(),
                incoming: sources,
                predecessors,
            });
        }
    }

    Ok(())
}

fn verify_operand(
    module: &Module,
    function: &Function,
    value: &Value,
    defined: &HashSet<u32>,
) -> Result<(), IrError> {
    match value {
        Value::Const(_) => Ok(()),
        Value::Temp(temp) if defined.contains(temp) => Ok(()),
        Value::Temp(temp) => Err(IrError::UndefinedTemp {
            function: function.name.clone(),
            temp: *temp,
        }),
        Value::Param(index) if *index < function.arity() => Ok(()),
        Value::Param(index) => Err(IrError::UnknownParam {
            function: function.name.clone(),
            index: *index,
            arity: function.arity(),
        }),
        Value::Global(name) if module.get_global(name).is_some() => Ok(()),
        Value::Global(name) => Err(IrError::UnknownGlobal {
            function: function.name.clone(),
            name: name.clone(),
        }),
    }
}

fn verify_call(
    module: &Module,
    function: &Function,
    callee: &str,
    args: &[Value],
) -> Result<(), IrError> {
    let Some(target) = module.get_function(callee) else {
        return Err(IrError::UnknownCallee {
            function: function.name.clone(),
            callee: callee.to_string(),
        });
    };
    if !target.signature.accepts(args.len()) {
        return Err(IrError::CallArity {
            function: function.name.clone(),
            callee: callee.to_string(),
            found: args.len(),
            signature: target.signature.to_string(),
        });
    }
    for (index, (arg, expected)) in args.iter().zip(&target.signature.params).enumerate() {
        if arg.ty() != *expected {
            return Err(IrError::CallArgumentType {
                function: function.name.clone(),
                callee: callee.to_string(),
                index,
                expected: expected.to_string(),
                found: arg.ty().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::instruction::{BinaryOp, CompareOp};
    use crate::module::{Module, NUMBER_FMT, PRINTF};

    fn new_main() -> (Builder, crate::module::FuncId) {
        let mut module = Module::with_runtime("test");
        let main = module.declare_function("main", vec![]);
        let mut builder = Builder::new(module);
        builder.start_function(main).unwrap();
        (builder, main)
    }

    #[test]
    fn test_valid_diamond() {
        let (mut b, _) = new_main();
        let then_bb = b.append_block("then").unwrap();
        let else_bb = b.append_block("else").unwrap();
        let merge = b.append_block("after_if").unwrap();

        let cond = b.build_compare(CompareOp::Lt, Value::Const(1), Value::Const(2)).unwrap();
        b.build_cond_br(cond, then_bb, else_bb).unwrap();
        b.switch_to(then_bb).unwrap();
        b.build_br(merge).unwrap();
        b.switch_to(else_bb).unwrap();
        b.build_br(merge).unwrap();
        b.switch_to(merge).unwrap();
        let phi = b
            .build_phi(vec![(Value::Const(10), then_bb), (Value::Const(20), else_bb)])
            .unwrap();
        b.build_ret(phi.value()).unwrap();

        assert_eq!(verify_module(&b.finish()), Ok(()));
    }

    #[test]
    fn test_missing_terminator() {
        let (mut b, _) = new_main();
        b.build_binary(BinaryOp::Add, Value::Const(1), Value::Const(2)).unwrap();
        assert!(matches!(
            verify_module(&b.finish()),
            Err(IrError::MissingTerminator { label, .. }) if label == "entry"
        ));
    }

    #[test]
    fn test_phi_edge_from_non_predecessor() {
        let (mut b, _) = new_main();
        let entry = b.current_block().unwrap();
        let next = b.append_block("next").unwrap();
        let stray = b.append_block("stray").unwrap();
        b.build_br(next).unwrap();
        b.switch_to(stray).unwrap();
        b.build_ret(Value::Const(0)).unwrap();
        b.switch_to(next).unwrap();
        let phi = b
            .build_phi(vec![(Value::Const(1), entry), (Value::Const(2), stray)])
            .unwrap();
        b.build_ret(phi.value()).unwrap();

        assert!(matches!(
            verify_module(&b.finish()),
            Err(IrError::PhiPredecessorMismatch { .. })
        ));
    }

    #[test]
    fn test_call_checks() {
        let (mut b, _) = new_main();
        let printf = match b.module().lookup(PRINTF) {
            Some(crate::module::Symbol::Function(id)) => id,
            other => panic!("printf missing: {:?}", other),
        };
        b.build_call(printf, vec![Value::Const(5)]).unwrap();
        b.build_ret(Value::Const(0)).unwrap();
        assert!(matches!(
            verify_module(&b.finish()),
            Err(IrError::CallArgumentType { index: 0, .. })
        ));

        let (mut b, _) = new_main();
        b.build_call(printf, vec![Value::Global(NUMBER_FMT.into()), Value::Const(5)])
            .unwrap();
        b.build_ret(Value::Const(0)).unwrap();
        assert_eq!(verify_module(&b.finish()), Ok(()));
    }

    #[test]
    fn test_pointer_used_as_integer() {
        let (mut b, _) = new_main();
        b.build_ret(Value::Global(NUMBER_FMT.into())).unwrap();
        assert!(matches!(
            verify_module(&b.finish()),
            Err(IrError::PointerAsInteger { .. })
        ));
    }

    #[test]
    fn test_requires_main() {
        let mut module = Module::with_runtime("test");
        let f = module.declare_function("f", vec![]);
        let mut b = Builder::new(module);
        b.start_function(f).unwrap();
        b.build_ret(Value::Const(0)).unwrap();
        assert_eq!(verify_module(&b.finish()), Err(IrError::EntryPoint(0)));
    }

    #[test]
    fn test_undefined_temp() {
        let (mut b, _) = new_main();
        b.build_ret(Value::Temp(7)).unwrap();
        assert!(matches!(
            verify_module(&b.finish()),
            Err(IrError::UndefinedTemp { temp: 7, .. })
        ));
    }
}
