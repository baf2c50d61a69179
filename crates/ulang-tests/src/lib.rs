//! End-to-end tests for the ulang compiler
//!
//! Each helper runs the full pipeline: source text is parsed, lowered to
//! SSA IR, verified, and then either rendered as LLVM text or executed by
//! the IR interpreter.

use ulang_codegen::{CodeGen, Interpreter, LlvmTextBackend, RuntimeError};
use ulang_error::{CompileError, DiagnosticRenderer, ErrorCode, SourceCache};
use ulang_ir::{lower_program, LoopMode, LoweringOptions, Module};
use ulang_parser::parse_source;

/// Executed instructions allowed per test run before the interpreter gives up
const STEP_LIMIT: u64 = 1_000_000;

/// Outcome of compiling one source string
#[derive(Debug)]
pub struct CompileResult {
    pub success: bool,
    pub error: Option<CompileError>,
    pub module: Option<Module>,
    pub ir_debug: Option<String>,
    pub llvm_ir: Option<String>,
}

/// Outcome of running `main`
#[derive(Debug)]
pub struct RunResult {
    pub value: Result<i64, RuntimeError>,
    pub output: String,
}

/// Compiles with the default (guarded) loop semantics
pub fn compile(source: &str) -> CompileResult {
    compile_with(source, LoopMode::Guarded)
}

pub fn compile_with(source: &str, loop_mode: LoopMode) -> CompileResult {
    let options = LoweringOptions {
        loop_mode,
        ..LoweringOptions::default()
    };
    let lowered = parse_source(source, 0).and_then(|program| lower_program(&program, &options));

    match lowered {
        Ok(module) => CompileResult {
            success: true,
            error: None,
            ir_debug: Some(module.to_string()),
            llvm_ir: Some(LlvmTextBackend::new().generate(&module)),
            module: Some(module),
        },
        Err(err) => CompileResult {
            success: false,
            error: Some(err),
            module: None,
            ir_debug: None,
            llvm_ir: None,
        },
    }
}

/// Renders a compile error the way the CLI prints it, without colors
pub fn render_error(source: &str, err: &CompileError) -> String {
    let mut cache = SourceCache::new();
    cache.add("test.unnamedlang", source.to_string());
    DiagnosticRenderer::new(&cache)
        .without_colors()
        .render(&err.to_diagnostic())
}

pub fn run(source: &str) -> RunResult {
    run_with(source, LoopMode::Guarded)
}

pub fn run_with(source: &str, loop_mode: LoopMode) -> RunResult {
    let result = compile_with(source, loop_mode);
    let Some(module) = result.module else {
        panic!(
            "Expected compilation to succeed, but got: {}",
            render_error(source, result.error.as_ref().unwrap())
        );
    };

    let mut interpreter = Interpreter::new(&module, Vec::new()).with_max_steps(STEP_LIMIT);
    let value = interpreter.run_main();
    let output = String::from_utf8(interpreter.into_output()).unwrap();
    RunResult { value, output }
}

/// Asserts that code compiles successfully
pub fn assert_compiles(source: &str) {
    let result = compile(source);
    if !result.success {
        panic!(
            "Expected compilation to succeed, but got:\n{}",
            render_error(source, result.error.as_ref().unwrap())
        );
    }
}

/// Asserts that code fails to compile with the given error code
pub fn assert_compile_fails_with(source: &str, code: ErrorCode) {
    let result = compile(source);
    match result.error {
        Some(err) => assert_eq!(
            err.code(),
            code,
            "Expected error {}, got:\n{}",
            code,
            render_error(source, &err)
        ),
        None => panic!(
            "Expected compilation to fail with {}, but it succeeded:\n{}",
            code,
            result.ir_debug.unwrap_or_default()
        ),
    }
}

/// Asserts that the IR dump contains a specific line or fragment
pub fn assert_ir_contains(source: &str, expected: &str) {
    let result = compile(source);
    let ir = result.ir_debug.unwrap_or_default();
    if !ir.contains(expected) {
        panic!("Expected IR to contain '{}', but got:\n{}", expected, ir);
    }
}

pub fn assert_llvm_contains(source: &str, expected: &str) {
    let result = compile(source);
    let llvm = result.llvm_ir.unwrap_or_default();
    if !llvm.contains(expected) {
        panic!("Expected LLVM IR to contain '{}', but got:\n{}", expected, llvm);
    }
}

/// Asserts the printed output and the value `main` returns
pub fn assert_runs(source: &str, expected_output: &str, expected_value: i64) {
    let result = run(source);
    match result.value {
        Ok(value) => {
            assert_eq!(result.output, expected_output, "printed output differs");
            assert_eq!(value, expected_value, "main returned a different value");
        }
        Err(e) => panic!("Expected main to return, but got runtime error: {}", e),
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    // =========================================
    // Basic Programs
    // =========================================

    #[test]
    fn test_arithmetic_precedence() {
        assert_runs("int main() { return 2 + 3 * 4; }", "", 14);
        assert_ir_contains("int main() { return 2 + 3 * 4; }", "%t0 = mul 3, 4");
    }

    #[test]
    fn test_integer_literals_round_trip() {
        for literal in [0i64, 1, 42, 1234567, 9_000_000_000] {
            let source = format!("int main() {{ return {}; }}", literal);
            assert_runs(&source, "", literal);
        }
    }

    #[test]
    fn test_negative_values() {
        assert_runs("int main() { return -7; }", "", -7);
        assert_runs("int main() { return 3 - 10; }", "", -7);
    }

    #[test]
    fn test_if_returns_from_taken_branch() {
        assert_runs(
            "int main(){ if (1 < 2) { return 10; } else { return 20; } }",
            "",
            10,
        );
    }

    #[test]
    fn test_if_example() {
        let source = r#"
            int main() {
                int x = 5;
                if (x < 10) { print(x + 5); } else { print(x - 5); }
                return 0;
            }
        "#;
        assert_runs(source, "10\n", 0);
    }

    #[test]
    fn test_loop_example() {
        let source = r#"
            int main() {
                int i;
                for (i = 0; i < 3; i = i + 1) { print(i); }
                return i;
            }
        "#;
        assert_runs(source, "0\n1\n2\n", 3);
    }

    #[test]
    fn test_function_calls() {
        let source = r#"
            int square(n) { return n * n; }
            int sum(a, b, c) { return a + b + c; }
            int main() { return sum(square(2), square(3), 1); }
        "#;
        assert_runs(source, "", 14);
    }

    #[test]
    fn test_print_returns_printed_value() {
        assert_runs("int main() { return print(4) + 1; }", "4\n", 5);
        assert_runs("int main(){ return print(4); }", "4\n", 4);
        assert_runs("int main() { int x = print(2) * 3; return x; }", "2\n", 6);
    }

    // =========================================
    // Conditionals
    // =========================================

    #[test]
    fn test_if_selects_branch_by_condition() {
        for (cond, expected) in [(0, 2), (1, 1), (-5, 1), (100, 1)] {
            let source = format!(
                "int main() {{ int r = 0; if ({}) {{ r = 1; }} else {{ r = 2; }} return r; }}",
                cond
            );
            assert_runs(&source, "", expected);
        }
    }

    #[test]
    fn test_empty_else_keeps_prior_value() {
        let source = r#"
            int pick(c) {
                int r = 10;
                if (c) { r = 20; } else { }
                return r;
            }
            int main() { return pick(0) + pick(1); }
        "#;
        assert_runs(source, "", 30);
    }

    #[test]
    fn test_if_where_both_branches_return() {
        let source = r#"
            int sign(n) {
                if (n < 0) { return -1; } else { return 1; }
            }
            int main() { return sign(-4) * 10 + sign(4); }
        "#;
        assert_runs(source, "", -9);
    }

    #[test]
    fn test_comparison_operators() {
        let source = r#"
            int main() {
                print(1 < 2);
                print(2 <= 1);
                print(3 > 2);
                print(3 >= 3);
                print(4 == 4);
                print(4 != 4);
                return !0;
            }
        "#;
        assert_runs(source, "1\n0\n1\n1\n1\n0\n", 1);
    }

    // =========================================
    // Loops
    // =========================================

    #[test]
    fn test_loop_visits_arithmetic_sequence() {
        for (start, step, limit) in [(0, 1, 4), (3, 2, 10), (-6, 3, 2), (5, 5, 30)] {
            let source = format!(
                "int main() {{ for (i = {}; i < {}; {}) {{ print(i); }} return 0; }}",
                start, limit, step
            );
            let expected: String = (0..)
                .map(|k| start + k * step)
                .take_while(|v| *v < limit)
                .map(|v| format!("{}\n", v))
                .collect();
            assert_runs(&source, &expected, 0);
        }
    }

    #[test]
    fn test_loop_variable_restored_after_loop() {
        let source = r#"
            int main() {
                int i = 100;
                for (i = 0; i < 3; i = i + 1) { print(i); }
                return i;
            }
        "#;
        assert_runs(source, "0\n1\n2\n", 100);
    }

    #[test]
    fn test_zero_trip_loop_skips_body() {
        let source = r#"
            int main() {
                int x;
                for (x = 5; x < 3; x = x + 1) { print(x); }
                return x;
            }
        "#;
        assert_runs(source, "", 5);
    }

    #[test]
    fn test_legacy_loops_run_body_once() {
        let source = r#"
            int main() {
                int x;
                for (x = 5; x < 3; x = x + 1) { print(x); }
                return x;
            }
        "#;
        let result = run_with(source, LoopMode::AtLeastOnce);
        assert_eq!(result.output, "5\n");
        assert_eq!(result.value.unwrap(), 6);
    }

    #[test]
    fn test_loop_accumulator() {
        let source = r#"
            int main() {
                int sum = 0;
                for (i = 1; i <= 10; i = i + 1) { sum = sum + i; }
                return sum;
            }
        "#;
        assert_runs(source, "", 55);
    }

    #[test]
    fn test_nested_loops() {
        let source = r#"
            int main() {
                int total = 0;
                for (i = 0; i < 3; i = i + 1) {
                    for (j = 0; j < 4; j = j + 1) { total = total + 1; }
                }
                return total;
            }
        "#;
        assert_runs(source, "", 12);
    }

    #[test]
    fn test_if_inside_loop() {
        let source = r#"
            int main() {
                int evens = 0;
                for (i = 0; i < 10; i = i + 1) {
                    if (i - (i / 2) * 2 == 0) { evens = evens + 1; } else { }
                }
                return evens;
            }
        "#;
        assert_runs(source, "", 5);
    }

    #[test]
    fn test_return_inside_loop() {
        let source = r#"
            int firstSquareAbove(n) {
                for (i = 0; i < n; i = i + 1) {
                    if (i * i > n) { return i; } else { }
                }
                return -1;
            }
            int main() { return firstSquareAbove(20); }
        "#;
        assert_runs(source, "", 5);
    }

    // =========================================
    // Functions and Prototypes
    // =========================================

    #[test]
    fn test_recursion() {
        let source = r#"
            int fib(n) {
                if (n < 2) { return n; } else { return fib(n - 1) + fib(n - 2); }
            }
            int main() { return fib(10); }
        "#;
        assert_runs(source, "", 55);
    }

    #[test]
    fn test_mutual_recursion_through_prototypes() {
        let source = r#"
            int odd(n);
            int even(n) { if (n == 0) { return 1; } else { return odd(n - 1); } }
            int odd(n) { if (n == 0) { return 0; } else { return even(n - 1); } }
            int main() { return even(10) * 10 + odd(7); }
        "#;
        assert_runs(source, "", 11);
    }

    #[test]
    fn test_repeated_prototypes() {
        assert_compiles("int ext(a); int ext(b); int main() { return 0; }");
        assert_ir_contains("int ext(a); int main() { return 0; }", "declare i64 @ext(i64 %a)");
    }

    #[test]
    fn test_main_emitted_after_helpers() {
        let result = compile("int main() { return helper(); } int helper() { return 1; }");
        let module = result.module.unwrap();
        let names: Vec<&str> = module.definitions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "main"]);
    }

    // =========================================
    // Compile Errors
    // =========================================

    #[test]
    fn test_lex_error() {
        assert_compile_fails_with("int main() { return 1 $ 2; }", ErrorCode::UNEXPECTED_CHAR);
    }

    #[test]
    fn test_parse_error() {
        assert_compile_fails_with("int main() { return 1 + ; }", ErrorCode::UNEXPECTED_TOKEN);
        assert_compile_fails_with("int main() { return 1 }", ErrorCode::UNEXPECTED_TOKEN);
    }

    #[test]
    fn test_missing_main() {
        assert_compile_fails_with("int f() { return 1; }", ErrorCode::NO_MAIN_FUNCTION);
    }

    #[test]
    fn test_redefinition() {
        assert_compile_fails_with(
            "int f() { return 1; } int f() { return 2; } int main() { return f(); }",
            ErrorCode::REDEFINITION,
        );
        assert_compile_fails_with(
            "int main() { return 1; } int main() { return 2; }",
            ErrorCode::REDEFINITION,
        );
    }

    #[test]
    fn test_prototypes_follow_source_order() {
        assert_compile_fails_with(
            "int f() { return 1; } int f(); int main(){ return f(); }",
            ErrorCode::REDEFINITION,
        );
        assert_compile_fails_with(
            "int g() { return f(); } int f(); int f() { return 1; } int main() { return g(); }",
            ErrorCode::UNKNOWN_FUNCTION,
        );
        assert_runs("int f(); int g() { return f(); } int f() { return 7; } int main() { return g(); }", "", 7);
    }

    #[test]
    fn test_runtime_imports_are_reserved() {
        assert_compile_fails_with(
            "int scanf(a) { return a; } int main() { return 0; }",
            ErrorCode::REDEFINITION,
        );
        assert_compile_fails_with("int main() { return scanf(1); }", ErrorCode::UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_name_collision_with_format_global() {
        // identifiers cannot contain `_`, so the clash is built on the AST
        let mut program = parse_source("int numberfmt() { return 1; } int main() { return 0; }", 0).unwrap();
        program.functions[0].prototype.name = ulang_ir::NUMBER_FMT.to_string();
        let err = lower_program(&program, &LoweringOptions::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NAME_COLLISION);
    }

    #[test]
    fn test_underscore_is_not_an_identifier_character() {
        assert_compile_fails_with("int main() { int a_b = 1; return 0; }", ErrorCode::UNEXPECTED_CHAR);
    }

    #[test]
    fn test_arity_mismatch() {
        assert_compile_fails_with(
            "int f(a); int f(a, b) { return a; } int main() { return 0; }",
            ErrorCode::ARITY_MISMATCH,
        );
        assert_compile_fails_with(
            "int f(a) { return a; } int main() { return f(1, 2); }",
            ErrorCode::ARITY_MISMATCH,
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_compile_fails_with("int main() { return g(1); }", ErrorCode::UNKNOWN_FUNCTION);
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert_compile_fails_with("int main() { 3 = 4; return 0; }", ErrorCode::INVALID_ASSIGNMENT);
        assert_compile_fails_with(
            "int f() { return 1; } int main() { f() = 3; return 0; }",
            ErrorCode::INVALID_ASSIGNMENT,
        );
    }

    #[test]
    fn test_unbound_variable() {
        assert_compile_fails_with("int main() { return y; }", ErrorCode::UNBOUND_VARIABLE);
        assert_compile_fails_with("int main() { int y; return y; }", ErrorCode::UNBOUND_VARIABLE);
    }

    #[test]
    fn test_variable_from_one_branch_is_unbound_after_if() {
        assert_compile_fails_with(
            "int main() { if (1) { int z = 3; } else { } return z; }",
            ErrorCode::UNBOUND_VARIABLE,
        );
    }

    #[test]
    fn test_variable_assigned_only_in_loop_body() {
        // the guarded loop may skip its body, leaving `x` unassigned
        let source = "int main() { int x; for (i = 0; i < 3; i = i + 1) { x = i; } return x; }";
        assert_compile_fails_with(source, ErrorCode::UNBOUND_VARIABLE);

        let result = run_with(source, LoopMode::AtLeastOnce);
        assert_eq!(result.value.unwrap(), 2);

        assert_runs(
            "int main() { int x = 0; for (i = 0; i < 3; i = i + 1) { x = i; } return x; }",
            "",
            2,
        );
    }

    #[test]
    fn test_missing_return() {
        assert_compile_fails_with("int main() { print(1); }", ErrorCode::MISSING_RETURN);
    }

    #[test]
    fn test_error_rendering_points_at_source() {
        let source = "int main() {\n  return y;\n}\n";
        let err = compile(source).error.unwrap();
        let rendered = render_error(source, &err);
        assert!(rendered.starts_with("error[ES007]"), "{}", rendered);
        assert!(rendered.contains("test.unnamedlang:2:10"), "{}", rendered);
    }

    // =========================================
    // Backends
    // =========================================

    #[test]
    fn test_llvm_text_output() {
        let source = "int main() { print(7); return 0; }";
        assert_llvm_contains(source, "declare i64 @printf(ptr, ...)");
        assert_llvm_contains(source, "@printf(ptr @number_fmt, i64 7)");
        assert_llvm_contains(source, "define i64 @main() {");
    }

    #[test]
    fn test_llvm_text_saved_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output").join("output.ll");
        let module = compile("int main() { return 0; }").module.unwrap();

        LlvmTextBackend::new().save(&module, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("define i64 @main()"));
    }

    #[test]
    fn test_division_by_zero_is_a_runtime_error() {
        let result = run("int main() { int z = 0; return 1 / z; }");
        assert!(matches!(result.value, Err(RuntimeError::DivisionByZero(_))));
    }
}
