//! Variable bindings of the function being emitted
//!
//! There are no stack slots: a variable name maps straight to the SSA value
//! it currently holds. Where control flow joins, [`plan_merge`] decides for
//! each name whether the incoming values agree or need a phi.

use crate::instruction::Value;
use crate::module::BlockId;
use std::collections::{BTreeMap, BTreeSet};
use ulang_parser::{BinOp, Expr, For, Stmt};

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Holds this SSA value
    Value(Value),
    /// Declared with `int x;` and not assigned yet
    Declared,
}

/// Name to binding map. Ordered so that merges emit phis deterministically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vars: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.vars.get(name)
    }

    /// Current value of `name`, if it has one
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.vars.get(name) {
            Some(Binding::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Binds `name` to `value`, returning the previous binding
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Binding> {
        self.vars.insert(name.to_string(), Binding::Value(value))
    }

    pub fn declare(&mut self, name: &str) -> Option<Binding> {
        self.vars.insert(name.to_string(), Binding::Declared)
    }

    /// Puts back a binding saved from [`bind`](Self::bind); `None` unbinds
    pub fn restore(&mut self, name: &str, saved: Option<Binding>) {
        match saved {
            Some(binding) => {
                self.vars.insert(name.to_string(), binding);
            }
            None => {
                self.vars.remove(name);
            }
        }
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.vars.iter().map(|(name, binding)| (name.as_str(), binding))
    }
}

/// What a variable becomes where several edges meet
#[derive(Debug, Clone, PartialEq)]
pub enum MergePlan {
    /// Every edge agrees
    Keep(Binding),
    /// Values differ per edge; one incoming entry per edge
    Phi(Vec<(Value, BlockId)>),
    /// Unbound on at least one edge
    Drop,
}

/// Decides, name by name, how the bindings flowing in over `edges` combine.
///
/// A name only survives if every edge binds it; it stays declared-only if
/// any edge has it unassigned.
pub fn plan_merge(edges: &[(Bindings, BlockId)]) -> Vec<(String, MergePlan)> {
    let names: BTreeSet<&str> = edges
        .iter()
        .flat_map(|(bindings, _)| bindings.vars.keys().map(String::as_str))
        .collect();

    names
        .into_iter()
        .map(|name| {
            let seen: Vec<Option<&Binding>> =
                edges.iter().map(|(bindings, _)| bindings.get(name)).collect();

            let plan = if seen.iter().any(Option::is_none) {
                MergePlan::Drop
            } else if seen.iter().any(|b| matches!(b, Some(Binding::Declared))) {
                MergePlan::Keep(Binding::Declared)
            } else {
                let incoming: Vec<(Value, BlockId)> = edges
                    .iter()
                    .filter_map(|(bindings, block)| bindings.value(name).map(|v| (v.clone(), *block)))
                    .collect();
                if incoming.iter().all(|(v, _)| *v == incoming[0].0) {
                    MergePlan::Keep(Binding::Value(incoming[0].0.clone()))
                } else {
                    MergePlan::Phi(incoming)
                }
            };
            (name.to_string(), plan)
        })
        .collect()
}

/// Names that `stmts` may rebind, including nested bodies and loop headers
pub fn assigned_variables(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for stmt in stmts {
        collect_stmt(stmt, &mut names);
    }
    names
}

fn collect_stmt(stmt: &Stmt, names: &mut BTreeSet<String>) {
    match stmt {
        Stmt::Expr(expr) => collect_expr(expr, names),
        Stmt::Return { value, .. } => collect_expr(value, names),
        Stmt::Declare { name, value, .. } => {
            names.insert(name.clone());
            if let Some(value) = value {
                collect_expr(value, names);
            }
        }
        Stmt::If(node) => {
            collect_expr(&node.condition, names);
            for s in node.then_body.iter().chain(&node.else_body) {
                collect_stmt(s, names);
            }
        }
        Stmt::For(node) => {
            names.insert(node.var.clone());
            collect_expr(&node.start, names);
            collect_loop(node, names);
        }
    }
}

/// Names a loop's condition, step or body may rebind on any iteration.
/// The start expression runs once, before the loop, and is not included.
pub fn assigned_in_loop(node: &For) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_loop(node, &mut names);
    names
}

fn collect_loop(node: &For, names: &mut BTreeSet<String>) {
    collect_expr(&node.condition, names);
    if let Some(step) = &node.step {
        collect_expr(step, names);
    }
    for s in &node.body {
        collect_stmt(s, names);
    }
}

fn collect_expr(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Number { .. } | Expr::Variable { .. } => {}
        Expr::Call(call) => {
            for arg in &call.args {
                collect_expr(arg, names);
            }
        }
        Expr::Print(print) => collect_expr(&print.value, names),
        Expr::Unary { operand, .. } => collect_expr(operand, names),
        Expr::Binary { op, left, right, .. } => {
            if *op == BinOp::Assign {
                if let Some(name) = left.as_variable() {
                    names.insert(name.to_string());
                }
            }
            collect_expr(left, names);
            collect_expr(right, names);
        }
    }
}
