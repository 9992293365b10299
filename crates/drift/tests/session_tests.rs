//! Behavioral tests for `Session`, the persistent execution surface.
//!
//! A session keeps constants, globals, and the symbol table alive across
//! `execute()` calls; these tests pin that persistence, the reset contract,
//! the per-stage error routing, and the JSON shape hosts consume.

use drift::{CollectStringPrint, ExecutionResult, Session, SessionError, Value};
use pretty_assertions::assert_eq;

// =============================================================================
// 1. Basic execution
// =============================================================================

/// A bare expression evaluates to its inspected value.
#[test]
fn execute_expression_returns_its_value() {
    let mut session = Session::new();
    assert_eq!(session.execute("1 + 2"), ExecutionResult::success("3".into()));
}

/// A `let` statement leaves nothing on the stack, so the result is omitted.
#[test]
fn execute_let_statement_returns_no_result() {
    let mut session = Session::new();
    let result = session.execute("let a = 5;");
    assert!(result.success);
    assert_eq!(result.result, None);
}

/// A final `null` value is omitted from the result string.
#[test]
fn null_final_value_is_omitted() {
    let mut session = Session::new();
    let result = session.execute("if (false) { 10 }");
    assert!(result.success);
    assert_eq!(result.result, None);
}

// =============================================================================
// 2. State persistence across calls
// =============================================================================

/// Globals defined in one call are visible in later calls.
#[test]
fn globals_survive_across_calls() {
    let mut session = Session::new();
    session.execute("let a = 5;");
    session.execute("let b = a * 2;");
    assert_eq!(session.execute("b + a").result.as_deref(), Some("15"));
}

/// Closures built in one call keep working in later calls.
#[test]
fn closures_survive_across_calls() {
    let mut session = Session::new();
    session.execute("let newAdder = fn(x) { fn(y) { x + y } };");
    session.execute("let add2 = newAdder(2);");
    assert_eq!(session.execute("add2(3)").result.as_deref(), Some("5"));
}

/// Re-`let` of an existing name rebinds it to a fresh slot.
#[test]
fn names_can_be_rebound() {
    let mut session = Session::new();
    session.execute("let x = 1;");
    session.execute("let x = 42;");
    assert_eq!(session.execute("x").result.as_deref(), Some("42"));
}

/// A failed run does not lose state that earlier calls established.
#[test]
fn state_survives_a_runtime_error() {
    let mut session = Session::new();
    session.execute("let a = 7;");
    let failed = session.execute("a + true");
    assert!(!failed.success);
    assert_eq!(session.execute("a").result.as_deref(), Some("7"));
}

/// A compile error inside a function body must not corrupt the scope
/// stack: later top-level bindings are still globals and persist.
#[test]
fn globals_persist_after_a_compile_error_inside_a_function_body() {
    let mut session = Session::new();
    let failed = session.execute("let f = fn(x) { y; };");
    assert_eq!(failed.compiler_error.as_deref(), Some("undefined variable y"));
    session.execute("let a = 5;");
    assert_eq!(session.execute("a").result.as_deref(), Some("5"));

    // Nested literals fail at a deeper scope; every level unwinds.
    let failed = session.execute("let g = fn(a) { fn(b) { macro(m) { m } } };");
    assert_eq!(failed.compiler_error.as_deref(), Some("macro literals are not supported"));
    session.execute("let b = a + 1;");
    assert_eq!(session.execute("b").result.as_deref(), Some("6"));
}

/// Symbols defined before a compile error persist; their global slot reads
/// as `null` because the assignment never ran.
#[test]
fn definitions_before_a_compile_error_persist_unassigned() {
    let mut session = Session::new();
    let failed = session.execute("let z = missing;");
    assert_eq!(failed.compiler_error.as_deref(), Some("undefined variable missing"));
    let read_back = session.execute("z");
    assert!(read_back.success);
    assert_eq!(read_back.result, None);
}

// =============================================================================
// 3. Reset
// =============================================================================

/// `reset` discards all bindings.
#[test]
fn reset_discards_bindings() {
    let mut session = Session::new();
    session.execute("let a = 5;");
    session.reset();
    let result = session.execute("a");
    assert_eq!(result.compiler_error.as_deref(), Some("undefined variable a"));
}

/// Built-ins are re-registered by `reset`.
#[test]
fn reset_keeps_builtins_working() {
    let mut session = Session::new();
    session.execute("let a = 5;");
    session.reset();
    assert_eq!(session.execute("len([1, 2])").result.as_deref(), Some("2"));
}

// =============================================================================
// 4. puts output and result concatenation
// =============================================================================

/// The result is the concatenation of `puts` output and the final value.
#[test]
fn puts_output_precedes_the_final_value() {
    let mut session = Session::new();
    let result = session.execute(r#"puts("a"); puts("b"); 42"#);
    assert_eq!(result.result.as_deref(), Some("a\nb\n42"));
}

/// `puts` alone still produces a result; its return value is `null` and is
/// omitted.
#[test]
fn puts_without_a_final_value() {
    let mut session = Session::new();
    let result = session.execute(r#"puts("hi")"#);
    assert_eq!(result.result.as_deref(), Some("hi\n"));
}

/// `execute_with` streams `puts` to the sink; the result carries only the
/// final value.
#[test]
fn execute_with_streams_to_the_sink() {
    let mut session = Session::new();
    let mut sink = CollectStringPrint::new();
    let result = session.execute_with(r#"puts("streamed"); 7"#, &mut sink);
    assert_eq!(sink.output(), "streamed\n");
    assert_eq!(result.result.as_deref(), Some("7"));
}

// =============================================================================
// 5. Error taxonomy routing
// =============================================================================

/// Parse failures report the accumulated parser messages.
#[test]
fn parser_errors_are_reported_as_a_list() {
    let mut session = Session::new();
    let result = session.execute("let x 5;");
    assert!(!result.success);
    assert_eq!(
        result.parser_errors,
        Some(vec!["expected next token to be =, got INT instead".to_string()])
    );
    assert_eq!(result.compiler_error, None);
    assert_eq!(result.runtime_error, None);
}

/// Compile failures report a single compiler error.
#[test]
fn compiler_errors_are_reported() {
    let mut session = Session::new();
    let result = session.execute("nowhere");
    assert_eq!(result.compiler_error.as_deref(), Some("undefined variable nowhere"));
}

/// Runtime failures report a single runtime error.
#[test]
fn runtime_errors_are_reported() {
    let mut session = Session::new();
    let result = session.execute("5 + true");
    assert_eq!(
        result.runtime_error.as_deref(),
        Some("unsupported types for binary operation: INTEGER + BOOLEAN")
    );
}

/// The typed pipeline distinguishes stages without string matching.
#[test]
fn run_source_returns_typed_stage_errors() {
    let mut session = Session::new();
    let mut sink = drift::NoPrint;
    assert!(matches!(
        session.run_source("let x 5;", &mut sink),
        Err(SessionError::Parse(_))
    ));
    assert!(matches!(
        session.run_source("missing", &mut sink),
        Err(SessionError::Compile(_))
    ));
    assert!(matches!(
        session.run_source("-true", &mut sink),
        Err(SessionError::Runtime(_))
    ));
    assert_eq!(session.run_source("40 + 2", &mut sink), Ok(Value::Integer(42)));
}

// =============================================================================
// 6. JSON contract
// =============================================================================

/// Success serializes to `success` + `result` only.
#[test]
fn success_json_shape() {
    let mut session = Session::new();
    let json = serde_json::to_value(session.execute("1 + 2")).expect("serializes");
    assert_eq!(json, serde_json::json!({"success": true, "result": "3"}));
}

/// An omitted result leaves only `success`.
#[test]
fn empty_result_is_absent_from_json() {
    let mut session = Session::new();
    let json = serde_json::to_value(session.execute("let a = 1;")).expect("serializes");
    assert_eq!(json, serde_json::json!({"success": true}));
}

/// Failures serialize with the camelCase field for their stage.
#[test]
fn failure_json_shapes() {
    let mut session = Session::new();
    let json = serde_json::to_value(session.execute("let x 5;")).expect("serializes");
    assert_eq!(
        json,
        serde_json::json!({
            "success": false,
            "parserErrors": ["expected next token to be =, got INT instead"],
        })
    );

    let json = serde_json::to_value(session.execute("5 + true")).expect("serializes");
    assert_eq!(
        json,
        serde_json::json!({
            "success": false,
            "runtimeError": "unsupported types for binary operation: INTEGER + BOOLEAN",
        })
    );
}

/// Results round-trip through JSON.
#[test]
fn execution_results_round_trip() {
    let mut session = Session::new();
    let original = session.execute(r#"puts("out"); [1, 2]"#);
    let encoded = serde_json::to_string(&original).expect("serializes");
    let decoded: ExecutionResult = serde_json::from_str(&encoded).expect("deserializes");
    assert_eq!(decoded, original);
}
