//! AST - Abstract Syntax Tree for the ulang language
//!
//! Every node owns its children and carries the span it was parsed from.
//! The tree is built once by the parser and consumed once by IR emission.

use ulang_error::{Span, Spanned};

/// A whole compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Bodyless signatures (`int f(a, b);`) in source order
    pub prototypes: Vec<FunctionPrototype>,
    /// Functions with bodies in source order
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.prototype.name == name)
    }
}

/// `int name(a, b, ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPrototype {
    pub name: String,
    pub params: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub prototype: FunctionPrototype,
    pub body: Vec<Stmt>,
    /// Trailing `return expr;` of the body. `None` when every path returns
    /// through an explicit `return` statement (or never returns at all).
    pub return_value: Option<Expr>,
    pub span: Span,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.prototype.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `expr;`, including `print(expr);`
    Expr(Expr),
    If(If),
    For(For),
    /// `int x;` or `int x = expr;`
    Declare {
        name: String,
        value: Option<Expr>,
        span: Span,
    },
    /// `return expr;` that is not the last statement of a function body
    Return { value: Expr, span: Span },
}

/// `print(expr)`, whose value is the printed value
#[derive(Debug, Clone, PartialEq)]
pub struct Print {
    pub value: Expr,
    pub span: Span,
}

/// `if (cond) { ... } else { ... }`; the else branch is mandatory
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: Expr,
    pub then_body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
    pub span: Span,
}

/// `for (var = start; condition; step) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub var: String,
    pub start: Expr,
    pub condition: Expr,
    /// Increment added to the induction variable each iteration, 1 when absent.
    /// An assignment to `var` (C style `i = i + 2`) supplies the next value
    /// directly.
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub callee: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal
    Number { value: i64, span: Span },
    Variable { name: String, span: Span },
    Call(FunctionCall),
    Print(Box<Print>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn number(value: i64, span: Span) -> Self {
        Expr::Number { value, span }
    }

    /// Name of a bare variable reference
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Expr::Variable { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. }
            | Expr::Variable { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. } => *span,
            Expr::Call(call) => call.span,
            Expr::Print(print) => print.span,
        }
    }
}

impl Spanned for Stmt {
    fn span(&self) -> Span {
        match self {
            Stmt::Expr(expr) => expr.span(),
            Stmt::If(node) => node.span,
            Stmt::For(node) => node.span,
            Stmt::Declare { span, .. } | Stmt::Return { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `~x`
    BitNot,
    /// `!x`, 1 when `x` is zero and 0 otherwise
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }
}
