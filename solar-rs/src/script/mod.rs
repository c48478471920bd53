//! The Solar language core.
//!
//! A tree-walking interpreter for Solar, covering:
//!
//! - Tokenizing, including fenced `python:` / `lua:` passthrough blocks
//! - Expressions with operator precedence, lists, dicts and member access
//! - Statements: `let`, `print`, `if`/`elif`/`else`, `while`, `for`,
//!   `solar_def`, `return`, `break`, `continue`, `contain`, `ui`, `game`
//! - A registry of built-in functions plus user-defined ones
//!
//! # Quick start
//!
//! ```rust
//! use solar::script::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! interp.run_source("let x = 6\nprint x * 7").unwrap();
//! assert_eq!(interp.output, vec!["42"]);
//! ```

pub mod builtins;
pub mod env;
pub mod error;
pub mod expr;
pub mod interp;
pub mod lexer;
pub mod stack;
pub mod stmt;
pub mod value;

// Re-exports for convenience.
pub use error::{ErrorKind, SolarError};
pub use expr::EvalContext;
pub use interp::Interpreter;
pub use value::Value;
