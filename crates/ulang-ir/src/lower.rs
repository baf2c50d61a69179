//! Lowering AST → IR
//!
//! Every AST node implements [`Emit`]. Emission appends instructions at the
//! builder's cursor and hands back the SSA value the node produced; for
//! statements that value is only observed as the result of an `if` branch.

use crate::bindings::{assigned_in_loop, plan_merge, Binding, Bindings, MergePlan};
use crate::builder::{Builder, PhiRef};
use crate::instruction::{BinaryOp, CompareOp, Value};
use crate::module::{BlockId, FuncId, Module, Symbol, NUMBER_FMT, PRINTF};
use crate::verify::verify_module;
use tracing::{debug, trace, warn};
use ulang_error::{CompileError, Result, Spanned};
use ulang_parser::{
    BinOp, Expr, For, Function, FunctionCall, FunctionPrototype, If, Print, Program, Stmt, UnaryOp,
};

/// How a `for` loop treats its condition on entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Evaluate the condition on the start value and skip the body if it fails
    #[default]
    Guarded,
    /// Always run the body once before the first check
    AtLeastOnce,
}

#[derive(Debug, Clone)]
pub struct LoweringOptions {
    pub module_name: String,
    pub loop_mode: LoopMode,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            module_name: "main".to_string(),
            loop_mode: LoopMode::Guarded,
        }
    }
}

/// State shared by every node while one compilation unit is emitted
pub struct EmitContext {
    builder: Builder,
    bindings: Bindings,
    options: LoweringOptions,
}

impl EmitContext {
    pub fn new(options: LoweringOptions) -> Self {
        let module = Module::with_runtime(options.module_name.clone());
        Self {
            builder: Builder::new(module),
            bindings: Bindings::new(),
            options,
        }
    }

    pub fn module(&self) -> &Module {
        self.builder.module()
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn finish(self) -> Module {
        self.builder.finish()
    }

    fn lookup_variable(&self, name: &str, span: ulang_error::Span) -> Result<Value> {
        self.bindings
            .value(name)
            .cloned()
            .ok_or_else(|| CompileError::UnboundVariable {
                name: name.to_string(),
                span,
            })
    }

    /// Runs `f` with `name` bound to `value`, then puts the previous binding
    /// back whether `f` succeeded or not
    fn with_binding<T>(
        &mut self,
        name: &str,
        value: Value,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = self.bindings.bind(name, value);
        let result = f(self);
        self.bindings.restore(name, saved);
        result
    }

    /// Emits statements in order, stopping once the block is terminated.
    /// Yields the value of the last statement emitted, 0 for an empty list.
    fn emit_block(&mut self, stmts: &[Stmt]) -> Result<Value> {
        let mut last = Value::Const(0);
        for (index, stmt) in stmts.iter().enumerate() {
            if self.builder.is_terminated() {
                warn!(
                    line = stmt.span().start.line,
                    skipped = stmts.len() - index,
                    "unreachable statements after return"
                );
                break;
            }
            last = stmt.emit(self)?;
        }
        Ok(last)
    }

    /// Replaces the binding table with the join of `edges`, emitting a phi
    /// for each variable whose value differs per edge. The cursor must sit at
    /// the start of the join block.
    fn merge_bindings(&mut self, edges: &[(Bindings, BlockId)]) -> Result<()> {
        let mut merged = Bindings::new();
        for (name, plan) in plan_merge(edges) {
            match plan {
                MergePlan::Keep(Binding::Value(value)) => {
                    merged.bind(&name, value);
                }
                MergePlan::Keep(Binding::Declared) => {
                    merged.declare(&name);
                }
                MergePlan::Phi(incoming) => {
                    let phi = self.builder.build_phi(incoming)?;
                    trace!(variable = %name, value = %phi.value(), "merged binding");
                    merged.bind(&name, phi.value());
                }
                MergePlan::Drop => {}
            }
        }
        self.bindings = merged;
        Ok(())
    }

    fn runtime_function(&self, name: &str) -> Result<FuncId> {
        match self.module().lookup(name) {
            Some(Symbol::Function(id)) => Ok(id),
            _ => Err(CompileError::Internal(format!(
                "runtime import `{}` is missing",
                name
            ))),
        }
    }
}

/// Appends the IR for one AST node at the builder's cursor
pub trait Emit {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value>;
}

/// Lowers and verifies a whole program
pub fn lower_program(program: &Program, options: &LoweringOptions) -> Result<Module> {
    let mut ctx = EmitContext::new(options.clone());
    program.emit(&mut ctx)?;
    let module = ctx.finish();
    verify_module(&module)?;
    debug!(
        module = %module.name,
        functions = module.definitions().count(),
        "module lowered"
    );
    Ok(module)
}

impl Emit for Program {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        let mut mains = self.functions.iter().filter(|f| f.name() == "main");
        let main = mains.next().ok_or(CompileError::NoMainFunction)?;
        if let Some(duplicate) = mains.next() {
            return Err(CompileError::Redefinition {
                name: "main".to_string(),
                span: duplicate.prototype.span,
            });
        }
        let main_offset = main.prototype.span.start.offset;
        if let Some(late) = self
            .prototypes
            .iter()
            .find(|p| p.name == "main" && p.span.start.offset > main_offset)
        {
            return Err(CompileError::Redefinition {
                name: "main".to_string(),
                span: late.span,
            });
        }

        // everything but main's body is emitted in source order
        let mut items: Vec<(usize, &dyn Emit)> = self
            .prototypes
            .iter()
            .map(|p| (p.span.start.offset, p as &dyn Emit))
            .chain(
                self.functions
                    .iter()
                    .filter(|f| f.name() != "main")
                    .map(|f| (f.prototype.span.start.offset, f as &dyn Emit)),
            )
            .collect();
        items.sort_by_key(|(offset, _)| *offset);
        for (_, item) in items {
            item.emit(ctx)?;
        }
        main.emit(ctx)
    }
}

fn declare_prototype(prototype: &FunctionPrototype, ctx: &mut EmitContext) -> Result<FuncId> {
    let module = ctx.builder.module();
    match module.lookup(&prototype.name) {
        Some(Symbol::Global(_)) => Err(CompileError::NameCollision {
            name: prototype.name.clone(),
            span: prototype.span,
        }),
        Some(Symbol::Function(id)) => {
            let existing = module.function(id);
            if existing.has_body() || existing.import {
                Err(CompileError::Redefinition {
                    name: prototype.name.clone(),
                    span: prototype.span,
                })
            } else if existing.arity() != prototype.params.len() {
                Err(CompileError::ArityMismatch {
                    name: prototype.name.clone(),
                    expected: existing.arity(),
                    found: prototype.params.len(),
                    span: prototype.span,
                })
            } else {
                Ok(id)
            }
        }
        None => Ok(ctx
            .builder
            .module_mut()
            .declare_function(prototype.name.clone(), prototype.params.clone())),
    }
}

impl Emit for FunctionPrototype {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        declare_prototype(self, ctx)?;
        Ok(Value::Global(self.name.clone()))
    }
}

impl Emit for Function {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        ctx.bindings.clear();
        let id = declare_prototype(&self.prototype, ctx)?;
        // a definition names its parameters, whatever an earlier prototype called them
        ctx.builder.module_mut().function_mut(id).params = self.prototype.params.clone();

        debug!(function = %self.name(), params = self.prototype.params.len(), "emitting function");
        ctx.builder.start_function(id)?;
        for (index, param) in self.prototype.params.iter().enumerate() {
            ctx.bindings.bind(param, Value::Param(index));
        }

        ctx.emit_block(&self.body)?;

        if ctx.builder.is_terminated() {
            if self.return_value.is_some() {
                warn!(function = %self.name(), "trailing return is unreachable");
            }
        } else {
            let Some(expr) = &self.return_value else {
                return Err(CompileError::MissingReturn {
                    name: self.name().to_string(),
                    span: self.prototype.span,
                });
            };
            let value = expr.emit(ctx)?;
            ctx.builder.build_ret(value)?;
        }

        ctx.builder.clear_position();
        Ok(Value::Global(self.name().to_string()))
    }
}

impl Emit for Stmt {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        match self {
            Stmt::Expr(expr) => expr.emit(ctx),
            Stmt::If(node) => node.emit(ctx),
            Stmt::For(node) => node.emit(ctx),
            Stmt::Declare { name, value, .. } => match value {
                Some(expr) => {
                    let value = expr.emit(ctx)?;
                    ctx.bindings.bind(name, value.clone());
                    Ok(value)
                }
                None => {
                    ctx.bindings.declare(name);
                    Ok(Value::Const(0))
                }
            },
            Stmt::Return { value, .. } => {
                let value = value.emit(ctx)?;
                ctx.builder.build_ret(value)?;
                Ok(Value::Const(0))
            }
        }
    }
}

impl Emit for Print {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        let value = self.value.emit(ctx)?;
        let printf = ctx.runtime_function(PRINTF)?;
        ctx.builder.build_call(
            printf,
            vec![Value::Global(NUMBER_FMT.to_string()), value.clone()],
        )?;
        Ok(value)
    }
}

impl Emit for If {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        let condition = self.condition.emit(ctx)?;
        let then_block = ctx.builder.append_block("then")?;
        let else_block = ctx.builder.append_block("else")?;
        ctx.builder.build_cond_br(condition, then_block, else_block)?;

        let before = ctx.bindings.clone();
        let mut arms = Vec::with_capacity(2);
        for (block, body) in [(then_block, &self.then_body), (else_block, &self.else_body)] {
            ctx.bindings = before.clone();
            ctx.builder.switch_to(block)?;
            let value = ctx.emit_block(body)?;
            if !ctx.builder.is_terminated() {
                arms.push((value, ctx.builder.current_block()?, ctx.bindings.clone()));
            }
        }

        if arms.is_empty() {
            trace!("both branches of `if` return");
            ctx.bindings = before;
            return Ok(Value::Const(0));
        }

        let merge = ctx.builder.append_block("after_if")?;
        for (_, end, _) in &arms {
            ctx.builder.switch_to(*end)?;
            ctx.builder.build_br(merge)?;
        }
        ctx.builder.switch_to(merge)?;

        let phi = ctx.builder.build_phi(
            arms.iter()
                .map(|(value, end, _)| (value.clone(), *end))
                .collect(),
        )?;
        let edges: Vec<(Bindings, BlockId)> = arms
            .into_iter()
            .map(|(_, end, bindings)| (bindings, end))
            .collect();
        ctx.merge_bindings(&edges)?;

        Ok(phi.value())
    }
}

/// State at the end of a loop body that falls through to the back edge
struct Latch {
    next: Value,
    condition: Value,
    block: BlockId,
    bindings: Bindings,
}

impl Emit for For {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        let start = self.start.emit(ctx)?;
        let prior = ctx.bindings.get(&self.var).cloned();
        let guarded = ctx.options.loop_mode == LoopMode::Guarded;
        let preheader = ctx.builder.current_block()?;

        let loop_block = ctx.builder.append_block("loop")?;
        let exit_block = if guarded {
            let exit = ctx.builder.append_block("after_loop")?;
            let enter =
                ctx.with_binding(&self.var, start.clone(), |ctx| self.condition.emit(ctx))?;
            ctx.builder.build_cond_br(enter, loop_block, exit)?;
            Some(exit)
        } else {
            ctx.builder.build_br(loop_block)?;
            None
        };
        // the guard may itself assign, so snapshot the preheader only now
        let entry_bindings = ctx.bindings.clone();

        ctx.builder.switch_to(loop_block)?;
        let induction = ctx.builder.build_phi(vec![(start.clone(), preheader)])?;
        let mut carried: Vec<(String, PhiRef)> = Vec::new();
        for name in assigned_in_loop(self) {
            if name == self.var {
                continue;
            }
            if let Some(value) = ctx.bindings.value(&name).cloned() {
                let phi = ctx.builder.build_phi(vec![(value, preheader)])?;
                ctx.bindings.bind(&name, phi.value());
                carried.push((name, phi));
            }
        }
        trace!(var = %self.var, carried = carried.len(), "loop header");

        let latch = ctx.with_binding(&self.var, induction.value(), |ctx| {
            ctx.emit_block(&self.body)?;
            if ctx.builder.is_terminated() {
                return Ok(None);
            }
            let next = next_value(self, ctx)?;
            ctx.bindings.bind(&self.var, next.clone());
            let condition = self.condition.emit(ctx)?;
            Ok(Some(Latch {
                next,
                condition,
                block: ctx.builder.current_block()?,
                bindings: ctx.bindings.clone(),
            }))
        })?;

        let Some(mut latch) = latch else {
            ctx.bindings = entry_bindings;
            match exit_block {
                Some(exit) => {
                    ctx.builder.switch_to(exit)?;
                    if prior == Some(Binding::Declared) {
                        ctx.bindings.bind(&self.var, start);
                    }
                }
                None => debug!(var = %self.var, "loop body never reaches its back edge"),
            }
            return Ok(Value::Const(0));
        };

        let exit = match exit_block {
            Some(exit) => exit,
            None => ctx.builder.append_block("after_loop")?,
        };
        ctx.builder.build_cond_br(latch.condition.clone(), loop_block, exit)?;
        ctx.builder.add_incoming(induction, latch.next.clone(), latch.block)?;
        for (name, phi) in &carried {
            let value = latch.bindings.value(name).cloned().unwrap_or_else(|| phi.value());
            ctx.builder.add_incoming(*phi, value, latch.block)?;
        }

        ctx.builder.switch_to(exit)?;
        latch.bindings.restore(&self.var, prior.clone());
        let mut edges = Vec::with_capacity(2);
        if guarded {
            edges.push((entry_bindings, preheader));
        }
        edges.push((latch.bindings, latch.block));
        ctx.merge_bindings(&edges)?;

        if prior == Some(Binding::Declared) {
            let exit_value = if guarded {
                ctx.builder
                    .build_phi(vec![(start, preheader), (latch.next, latch.block)])?
                    .value()
            } else {
                latch.next
            };
            ctx.bindings.bind(&self.var, exit_value);
        }

        Ok(Value::Const(0))
    }
}

/// The induction variable's value for the next iteration
fn next_value(node: &For, ctx: &mut EmitContext) -> Result<Value> {
    match &node.step {
        Some(step) if assigns_to(step, &node.var) => step.emit(ctx),
        Some(step) => {
            let current = ctx.lookup_variable(&node.var, node.span)?;
            let increment = step.emit(ctx)?;
            Ok(ctx.builder.build_binary(BinaryOp::Add, current, increment)?)
        }
        None => {
            let current = ctx.lookup_variable(&node.var, node.span)?;
            Ok(ctx
                .builder
                .build_binary(BinaryOp::Add, current, Value::Const(1))?)
        }
    }
}

fn assigns_to(expr: &Expr, var: &str) -> bool {
    matches!(
        expr,
        Expr::Binary { op: BinOp::Assign, left, .. } if left.as_variable() == Some(var)
    )
}

impl Emit for Expr {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        match self {
            Expr::Number { value, .. } => Ok(Value::Const(*value)),
            Expr::Variable { name, span } => ctx.lookup_variable(name, *span),
            Expr::Call(call) => call.emit(ctx),
            Expr::Print(print) => print.emit(ctx),
            Expr::Unary { op, operand, .. } => {
                let value = operand.emit(ctx)?;
                let result = match op {
                    UnaryOp::Neg => ctx.builder.build_neg(value)?,
                    UnaryOp::BitNot => ctx.builder.build_not(value)?,
                    UnaryOp::Not => {
                        ctx.builder
                            .build_compare(CompareOp::Eq, value, Value::Const(0))?
                    }
                };
                Ok(result)
            }
            Expr::Binary {
                op: BinOp::Assign,
                left,
                right,
                ..
            } => {
                let Some(name) = left.as_variable() else {
                    return Err(CompileError::InvalidAssignmentTarget { span: left.span() });
                };
                let value = right.emit(ctx)?;
                ctx.bindings.bind(name, value.clone());
                Ok(value)
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = left.emit(ctx)?;
                let right = right.emit(ctx)?;
                let result = match op {
                    BinOp::Add => ctx.builder.build_binary(BinaryOp::Add, left, right)?,
                    BinOp::Sub => ctx.builder.build_binary(BinaryOp::Sub, left, right)?,
                    BinOp::Mul => ctx.builder.build_binary(BinaryOp::Mul, left, right)?,
                    BinOp::Div => ctx.builder.build_binary(BinaryOp::Div, left, right)?,
                    BinOp::Lt => ctx.builder.build_compare(CompareOp::Lt, left, right)?,
                    BinOp::Le => ctx.builder.build_compare(CompareOp::Le, left, right)?,
                    BinOp::Gt => ctx.builder.build_compare(CompareOp::Gt, left, right)?,
                    BinOp::Ge => ctx.builder.build_compare(CompareOp::Ge, left, right)?,
                    BinOp::Eq => ctx.builder.build_compare(CompareOp::Eq, left, right)?,
                    BinOp::Ne => ctx.builder.build_compare(CompareOp::Ne, left, right)?,
                    BinOp::Assign => {
                        return Err(CompileError::Internal(
                            "assignment reached arithmetic lowering".to_string(),
                        ))
                    }
                };
                Ok(result)
            }
        }
    }
}

impl Emit for FunctionCall {
    fn emit(&self, ctx: &mut EmitContext) -> Result<Value> {
        let unknown = || CompileError::UnknownFunction {
            name: self.callee.clone(),
            span: self.span,
        };
        let callee = match ctx.module().lookup(&self.callee) {
            Some(Symbol::Function(id)) if !ctx.module().function(id).import => id,
            _ => return Err(unknown()),
        };

        let signature = &ctx.module().function(callee).signature;
        if !signature.accepts(self.args.len()) {
            return Err(CompileError::ArityMismatch {
                name: self.callee.clone(),
                expected: signature.arity(),
                found: self.args.len(),
                span: self.span,
            });
        }

        let args = self
            .args
            .iter()
            .map(|arg| arg.emit(ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(ctx.builder.build_call(callee, args)?)
    }
}
