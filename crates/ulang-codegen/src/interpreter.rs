//! Reference interpreter for verified IR
//!
//! Executes a module block by block, the way the generated native code
//! would: 64-bit wrapping arithmetic, phis read on block entry, `printf`
//! writing to the supplied output.

use std::collections::HashMap;
use std::io::Write;
use thiserror::Error;
use tracing::{debug, trace};
use ulang_ir::{BinaryOp, Function, Instruction, Module, Value, PRINTF};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no function named `{0}`")]
    UnknownFunction(String),

    #[error("`{0}` is declared but has no body")]
    NoBody(String),

    #[error("the runtime import `{0}` is not available to the interpreter")]
    UnsupportedImport(String),

    #[error("`main` must take no arguments, it takes {0}")]
    EntryPointTakesArguments(usize),

    #[error("`{function}` expects {expected} argument(s), got {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("division by zero in `{0}`")]
    DivisionByZero(String),

    #[error("division overflow in `{0}`")]
    DivisionOverflow(String),

    #[error("call depth exceeded {0}")]
    CallDepthExceeded(usize),

    #[error("step limit of {0} instructions exceeded")]
    StepLimitExceeded(u64),

    #[error("malformed IR in `{function}`: {message}")]
    Malformed { function: String, message: String },

    #[error("failed to write program output")]
    Io(#[from] std::io::Error),
}

/// Runs functions of one module, sending program output to `out`
pub struct Interpreter<'m, W: Write> {
    module: &'m Module,
    out: W,
    max_call_depth: usize,
    max_steps: Option<u64>,
    steps: u64,
    depth: usize,
}

/// Locals of one activation
struct Frame<'f> {
    function: &'f Function,
    args: Vec<i64>,
    temps: HashMap<u32, i64>,
}

impl<'f> Frame<'f> {
    fn malformed(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::Malformed {
            function: self.function.name.clone(),
            message: message.into(),
        }
    }

    fn read(&self, value: &Value) -> Result<i64, RuntimeError> {
        match value {
            Value::Const(c) => Ok(*c),
            Value::Temp(t) => self
                .temps
                .get(t)
                .copied()
                .ok_or_else(|| self.malformed(format!("%t{} read before it is defined", t))),
            Value::Param(i) => self
                .args
                .get(*i)
                .copied()
                .ok_or_else(|| self.malformed(format!("no parameter {}", i))),
            Value::Global(name) => Err(self.malformed(format!("@{} used as an integer", name))),
        }
    }
}

impl<'m, W: Write> Interpreter<'m, W> {
    pub fn new(module: &'m Module, out: W) -> Self {
        Self {
            module,
            out,
            max_call_depth: 1024,
            max_steps: None,
            steps: 0,
            depth: 0,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Aborts after this many executed instructions
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs `main` and returns its result
    pub fn run_main(&mut self) -> Result<i64, RuntimeError> {
        let main = self
            .module
            .get_function("main")
            .ok_or_else(|| RuntimeError::UnknownFunction("main".to_string()))?;
        if main.arity() != 0 {
            return Err(RuntimeError::EntryPointTakesArguments(main.arity()));
        }
        let result = self.call("main", Vec::new())?;
        self.out.flush()?;
        debug!(result, steps = self.steps, "program finished");
        Ok(result)
    }

    /// Calls a function defined in the module
    pub fn call(&mut self, name: &str, args: Vec<i64>) -> Result<i64, RuntimeError> {
        let module = self.module;
        let function = module
            .get_function(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        if function.import {
            return Err(RuntimeError::UnsupportedImport(name.to_string()));
        }
        if !function.has_body() {
            return Err(RuntimeError::NoBody(name.to_string()));
        }
        if args.len() != function.arity() {
            return Err(RuntimeError::ArgumentCount {
                function: name.to_string(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        if self.depth >= self.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded(self.max_call_depth));
        }

        self.depth += 1;
        let result = self.execute(function, args);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, function: &'m Function, args: Vec<i64>) -> Result<i64, RuntimeError> {
        let mut frame = Frame {
            function,
            args,
            temps: HashMap::new(),
        };
        let mut block = function
            .blocks
            .first()
            .ok_or_else(|| frame.malformed("no entry block"))?;
        let mut previous: Option<&str> = None;

        loop {
            trace!(function = %function.name, block = %block.label, "enter block");

            // phis read their inputs together, before any of them is written
            let mut incoming = Vec::new();
            for inst in block.phis() {
                let Instruction::Phi { dest, incoming: edges } = inst else {
                    continue;
                };
                let from = previous.ok_or_else(|| frame.malformed("phi in the entry block"))?;
                let (value, _) = edges.iter().find(|(_, label)| label == from).ok_or_else(|| {
                    frame.malformed(format!("phi in `{}` has no edge from `{}`", block.label, from))
                })?;
                incoming.push((*dest, frame.read(value)?));
            }
            let phi_count = incoming.len();
            frame.temps.extend(incoming);

            let mut next = None;
            for inst in &block.instructions[phi_count..] {
                self.tick()?;
                match inst {
                    Instruction::Binary {
                        dest,
                        op,
                        left,
                        right,
                    } => {
                        let value = self.binary(&frame, *op, frame.read(left)?, frame.read(right)?)?;
                        frame.temps.insert(*dest, value);
                    }
                    Instruction::Compare {
                        dest,
                        op,
                        left,
                        right,
                    } => {
                        let value = op.evaluate(frame.read(left)?, frame.read(right)?);
                        frame.temps.insert(*dest, value as i64);
                    }
                    Instruction::Neg { dest, value } => {
                        let value = frame.read(value)?.wrapping_neg();
                        frame.temps.insert(*dest, value);
                    }
                    Instruction::Not { dest, value } => {
                        let value = !frame.read(value)?;
                        frame.temps.insert(*dest, value);
                    }
                    Instruction::Call { dest, func, args } => {
                        let value = if func == PRINTF {
                            self.printf(&frame, args)?
                        } else {
                            let args = args
                                .iter()
                                .map(|arg| frame.read(arg))
                                .collect::<Result<Vec<_>, _>>()?;
                            self.call(func, args)?
                        };
                        frame.temps.insert(*dest, value);
                    }
                    Instruction::Phi { .. } => return Err(frame.malformed("phi after a non-phi instruction")),
                    Instruction::Branch { target } => next = Some(target.as_str()),
                    Instruction::CondBranch {
                        cond,
                        then_label,
                        else_label,
                    } => {
                        next = Some(if frame.read(cond)? != 0 {
                            then_label.as_str()
                        } else {
                            else_label.as_str()
                        });
                    }
                    Instruction::Return(value) => return frame.read(value),
                }
                if next.is_some() {
                    break;
                }
            }

            let target = next.ok_or_else(|| {
                frame.malformed(format!("block `{}` falls off its end", block.label))
            })?;
            previous = Some(block.label.as_str());
            block = function
                .get_block(target)
                .ok_or_else(|| frame.malformed(format!("unknown block `{}`", target)))?;
        }
    }

    fn binary(&self, frame: &Frame<'_>, op: BinaryOp, left: i64, right: i64) -> Result<i64, RuntimeError> {
        match op {
            BinaryOp::Add => Ok(left.wrapping_add(right)),
            BinaryOp::Sub => Ok(left.wrapping_sub(right)),
            BinaryOp::Mul => Ok(left.wrapping_mul(right)),
            BinaryOp::Div if right == 0 => Err(RuntimeError::DivisionByZero(frame.function.name.clone())),
            BinaryOp::Div => left
                .checked_div(right)
                .ok_or_else(|| RuntimeError::DivisionOverflow(frame.function.name.clone())),
        }
    }

    /// `printf` restricted to the conversions the compiler emits: `%lld` and `%%`
    fn printf(&mut self, frame: &Frame<'_>, args: &[Value]) -> Result<i64, RuntimeError> {
        let (format, rest) = match args.split_first() {
            Some((Value::Global(name), rest)) => {
                let global = self
                    .module
                    .get_global(name)
                    .ok_or_else(|| frame.malformed(format!("unknown global @{}", name)))?;
                (global.as_str(), rest)
            }
            _ => return Err(frame.malformed("printf without a format string")),
        };

        let mut values = rest.iter();
        let mut text = String::new();
        let mut chars = format.char_indices();
        while let Some((index, c)) = chars.next() {
            if c != '%' {
                text.push(c);
                continue;
            }
            if format[index..].starts_with("%lld") {
                let value = values
                    .next()
                    .ok_or_else(|| frame.malformed("printf has fewer arguments than conversions"))?;
                text.push_str(&frame.read(value)?.to_string());
                chars.nth(2);
            } else if format[index..].starts_with("%%") {
                text.push('%');
                chars.next();
            } else {
                return Err(frame.malformed(format!("unsupported conversion in {:?}", format)));
            }
        }

        self.out.write_all(text.as_bytes())?;
        Ok(text.len() as i64)
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        match self.max_steps {
            Some(limit) if self.steps > limit => Err(RuntimeError::StepLimitExceeded(limit)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulang_ir::{lower_program, LoopMode, LoweringOptions};
    use ulang_parser::parse_source;

    fn compile(source: &str, loop_mode: LoopMode) -> Module {
        let program = parse_source(source, 0).unwrap();
        let options = LoweringOptions {
            loop_mode,
            ..LoweringOptions::default()
        };
        lower_program(&program, &options).unwrap()
    }

    fn run(source: &str) -> (Result<i64, RuntimeError>, String) {
        let module = compile(source, LoopMode::Guarded);
        let mut interpreter = Interpreter::new(&module, Vec::new()).with_max_steps(100_000);
        let result = interpreter.run_main();
        let output = String::from_utf8(interpreter.into_output()).unwrap();
        (result, output)
    }

    #[test]
    fn test_arithmetic() {
        let (result, output) = run("int main() { return 2 + 3 * 4; }");
        assert_eq!(result.unwrap(), 14);
        assert_eq!(output, "");
    }

    #[test]
    fn test_print_and_branch() {
        let (result, output) =
            run("int main() { if (3 > 2) { print(10); } else { print(20); } return 0; }");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(output, "10\n");
    }

    #[test]
    fn test_loop_output() {
        let (result, output) = run(
            "int main() { int x; for (x = 0; x < 3; x = x + 1) { print(x); } return x; }",
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(output, "0\n1\n2\n");
    }

    #[test]
    fn test_zero_trip_loop() {
        let (result, output) = run(
            "int main() { int x; for (x = 5; x < 3; x = x + 1) { print(x); } return x; }",
        );
        assert_eq!(result.unwrap(), 5);
        assert_eq!(output, "");
    }

    #[test]
    fn test_at_least_once_loop_runs_body() {
        let module = compile(
            "int main() { int x; for (x = 5; x < 3; x = x + 1) { print(x); } return x; }",
            LoopMode::AtLeastOnce,
        );
        let mut interpreter = Interpreter::new(&module, Vec::new());
        assert_eq!(interpreter.run_main().unwrap(), 6);
        assert_eq!(interpreter.into_output(), b"5\n");
    }

    #[test]
    fn test_recursion() {
        let (result, _) = run(
            "int fact(n) { if (n < 2) { return 1; } else { return n * fact(n - 1); } }
             int main() { return fact(10); }",
        );
        assert_eq!(result.unwrap(), 3_628_800);
    }

    #[test]
    fn test_wrapping_and_unary() {
        let (result, _) = run("int main() { return -(9223372036854775807 + 1) + ~0 + !0 + !7; }");
        // MIN negated wraps to MIN, then + (-1) + 1 + 0
        assert_eq!(result.unwrap(), i64::MIN);
    }

    #[test]
    fn test_division_traps() {
        let (result, _) = run("int f(a) { return 1 / a; } int main() { return f(0); }");
        assert!(matches!(result, Err(RuntimeError::DivisionByZero(name)) if name == "f"));

        let (result, _) = run("int main() { return 7 / -2; }");
        assert_eq!(result.unwrap(), -3);
    }

    #[test]
    fn test_call_depth_limit() {
        let module = compile(
            "int down(n) { return down(n + 1); } int main() { return down(0); }",
            LoopMode::Guarded,
        );
        let mut interpreter = Interpreter::new(&module, Vec::new()).with_max_call_depth(64);
        assert!(matches!(
            interpreter.run_main(),
            Err(RuntimeError::CallDepthExceeded(64))
        ));
    }

    #[test]
    fn test_step_limit() {
        let module = compile(
            "int main() { for (i = 0; i < 1; i = i - 1) { } return 0; }",
            LoopMode::Guarded,
        );
        let mut interpreter = Interpreter::new(&module, Vec::new()).with_max_steps(1_000);
        assert!(matches!(
            interpreter.run_main(),
            Err(RuntimeError::StepLimitExceeded(1_000))
        ));
    }

    #[test]
    fn test_main_with_parameters() {
        let module = compile("int main(a) { return a; }", LoopMode::Guarded);
        let mut interpreter = Interpreter::new(&module, Vec::new());
        assert!(matches!(
            interpreter.run_main(),
            Err(RuntimeError::EntryPointTakesArguments(1))
        ));
    }
}
