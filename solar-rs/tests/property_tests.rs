use std::path::Path;

use proptest::prelude::*;
use solar::script::error::ErrorKind;
use solar::script::expr::parse_expr;
use solar::script::lexer::{tokenize, TokenKind};
use solar::script::stmt::parse_program;
use solar::script::value::Value;
use solar::script::Interpreter;

/// Every demo script must lex and parse.
#[test]
fn parse_all_demo_files() {
    let demo_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("demos");

    let mut entries: Vec<_> = std::fs::read_dir(&demo_dir)
        .unwrap_or_else(|e| panic!("cannot open {}: {e}", demo_dir.display()))
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "solar").unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.path());

    assert!(!entries.is_empty(), "no .solar files found in {}", demo_dir.display());

    let mut failures = Vec::new();
    for entry in &entries {
        let path = entry.path();
        let src = std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
        if let Err(e) = parse_program(&src) {
            failures.push(format!("{}: {e}", path.file_name().unwrap().to_string_lossy()));
        }
    }

    if !failures.is_empty() {
        panic!(
            "{}/{} files failed to parse:\n  {}",
            failures.len(),
            entries.len(),
            failures.join("\n  ")
        );
    }
}

/// Demos that need no passthrough engine also run.
#[test]
fn run_engine_free_demos() {
    let demo_dir = Path::new(env!("CARGO_MANIFEST_DIR")).parent().unwrap().join("demos");
    for name in ["hello", "functions", "loops", "modules", "ui_counter", "game_bounce"] {
        let path = demo_dir.join(format!("{name}.solar"));
        let src = std::fs::read_to_string(&path).unwrap();
        let mut interp = Interpreter::new();
        interp
            .run_source(&src)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        assert!(!interp.output.is_empty(), "{name} printed nothing");
        assert_eq!(interp.env().live_scopes(), 1, "{name} leaked scopes");
    }
}

proptest! {
    /// The parser never panics; it returns Ok or Err.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = parse_program(&s);
    }

    /// Parsing is deterministic.
    #[test]
    fn parse_is_deterministic(s in "[a-z0-9 +*()=:\\n\"-]{0,60}") {
        let a = parse_program(&s);
        let b = parse_program(&s);
        prop_assert_eq!(a, b);
    }

    /// Keywords inside string literals stay strings.
    #[test]
    fn keywords_in_strings_are_not_tokens(
        kw in prop::sample::select(vec!["if", "end", "while", "solar_def", "return", "print", "python:"]),
    ) {
        let src = format!("let s = \"{kw} x\"");
        let toks = tokenize(&src).unwrap();
        let strings: Vec<_> = toks
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Str(_)))
            .collect();
        prop_assert_eq!(strings.len(), 1);
        prop_assert!(!toks.iter().any(|t| matches!(t.kind, TokenKind::End)));
    }

    /// Integer arithmetic agrees with Rust's, promoting to float on overflow.
    #[test]
    fn integer_addition_matches(a in any::<i32>(), b in any::<i32>()) {
        let mut interp = Interpreter::new();
        interp.run_source(&format!("print {a} + {b}")).unwrap();
        prop_assert_eq!(&interp.output, &vec![(a as i64 + b as i64).to_string()]);
    }

    /// Displayed expressions re-parse to the same tree.
    #[test]
    fn expression_display_reparses(a in 0i64..1000, b in 0i64..1000, c in 1i64..1000) {
        let src = format!("{a} + {b} * ({a} - {c}) / {c}");
        let e = parse_expr(&src).unwrap();
        prop_assert_eq!(parse_expr(&e.to_string()).unwrap(), e);
    }

    /// Variables created inside a loop body never outlive it.
    #[test]
    fn loop_locals_do_not_leak(n in 0i64..20) {
        let mut interp = Interpreter::new();
        interp.run_source(&format!("for i in range({n}): let t = i end")).unwrap();
        prop_assert!(interp.get_var("t").is_none());
        prop_assert!(interp.get_var("i").is_none());
        prop_assert_eq!(interp.env().live_scopes(), 1);
    }
}

#[test]
fn division_by_zero_is_value_error() {
    let mut interp = Interpreter::new();
    let err = interp.run_source("print 1 % 0").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Value(_)));
    assert_eq!(interp.get_var("nothing"), None::<&Value>);
}
