//! Solar interpreter.
//!
//! The [`Interpreter`] owns the scope arena, the function registry and the
//! collaborators (import resolvers, passthrough engines, the frontend) and
//! executes parsed [`Stmt`] trees.  It implements [`EvalContext`] so the
//! expression evaluator can call back into it for variable lookups and
//! function calls, and [`BuiltinHost`] so host built-ins can reach its I/O.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::time::Instant;

use tracing::{debug, trace};

use crate::bridge::{
    diff_namespace, FunctionTable, ImportFailure, ImportResolver, PassthroughEngine,
    StaticModules,
};
use crate::frontend::{Callback, Frontend, FrontendCommand, HeadlessFrontend};

use super::builtins::{Arity, BuiltinFn, BuiltinHost, FunctionEntry, Registry, Rng};
use super::env::Environment;
use super::error::{ErrorKind, Result, SolarError};
use super::expr::{eval_expr, EvalContext, Expr};
use super::stack::ensure_sufficient_stack;
use super::stmt::{parse_program, Clause, FrontendStmt, Positional, Stmt, StmtKind};
use super::value::Value;

/// Default limit on nested user-function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-error control-flow signals that unwind enclosing blocks.
#[derive(Debug, PartialEq)]
pub enum ControlFlow {
    Break,
    Continue,
    Return(Value),
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter {
    env: Environment,
    registry: Registry,
    /// Tried in order; the first that knows a path wins.
    resolvers: Vec<Box<dyn ImportResolver>>,
    engines: Vec<Box<dyn PassthroughEngine>>,
    frontend: Box<dyn Frontend>,
    /// Lines produced by `print` and friends (when not echoing).
    pub output: Vec<String>,
    /// Write output straight to stdout instead of collecting it.
    echo: bool,
    /// Lines served to `input()` before falling back to stdin.
    input: VecDeque<String>,
    read_stdin: bool,
    rng: Rng,
    started: Instant,
    max_call_depth: usize,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter with every built-in, the native module registry, a
    /// headless frontend and no passthrough engines.
    pub fn new() -> Self {
        Interpreter {
            env: Environment::new(),
            registry: Registry::with_builtins(),
            resolvers: vec![Box::new(StaticModules::new())],
            engines: Vec::new(),
            frontend: Box::new(HeadlessFrontend::new()),
            output: Vec::new(),
            echo: false,
            input: VecDeque::new(),
            read_stdin: false,
            rng: Rng::from_time(),
            started: Instant::now(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            depth: 0,
        }
    }

    pub fn add_resolver(&mut self, resolver: Box<dyn ImportResolver>) {
        self.resolvers.push(resolver);
    }

    /// Register an engine; a later engine for the same language replaces it.
    pub fn add_engine(&mut self, engine: Box<dyn PassthroughEngine>) {
        self.engines.retain(|e| e.language() != engine.language());
        self.engines.push(engine);
    }

    pub fn set_frontend(&mut self, frontend: Box<dyn Frontend>) {
        self.frontend = frontend;
    }

    pub fn frontend_mut(&mut self) -> &mut dyn Frontend {
        self.frontend.as_mut()
    }

    /// The frontend, if it is the built-in headless one.
    pub fn headless(&mut self) -> Option<&mut HeadlessFrontend> {
        self.frontend.as_any_mut().downcast_mut::<HeadlessFrontend>()
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.max_call_depth = depth;
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Let `input()` read stdin once queued lines run out.
    pub fn set_read_stdin(&mut self, on: bool) {
        self.read_stdin = on;
    }

    pub fn push_input(&mut self, line: impl Into<String>) {
        self.input.push_back(line.into());
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = Rng::seeded(seed);
    }

    /// Look a variable up from the current scope.
    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    pub fn set_global_var(&mut self, name: &str, value: Value) {
        self.env.define_global(name, value);
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Parse and run a program.  Nothing runs if parsing fails.
    pub fn run_source(&mut self, src: &str) -> Result<()> {
        let program = parse_program(src)?;
        self.run_program(&program)
    }

    pub fn run_program(&mut self, program: &[Stmt]) -> Result<()> {
        self.exec_block(program)?;
        Ok(())
    }

    /// Execute statements in the current scope until one signals control flow.
    pub fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Option<ControlFlow>> {
        for stmt in stmts {
            if let Some(cf) = self.exec_stmt(stmt)? {
                return Ok(Some(cf));
            }
        }
        Ok(None)
    }

    /// Execute one statement; errors are tagged with its line.
    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Option<ControlFlow>> {
        trace!(line = stmt.line, "exec");
        ensure_sufficient_stack(|| self.exec_kind(&stmt.kind)).map_err(|e| e.at_line(stmt.line))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Result<Option<ControlFlow>> {
        match kind {
            StmtKind::Let { name, value } => {
                let v = eval_expr(value, self)?;
                self.env.assign(name, v);
            }
            StmtKind::Print(args) => {
                let values = self.eval_all(args)?;
                let line = values.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
                self.write_line(&line);
            }
            StmtKind::If { cond, then_block, else_block } => {
                let block = if eval_expr(cond, self)?.truthy() { then_block } else { else_block };
                return self.exec_block(block);
            }
            StmtKind::While { cond, body } => {
                while eval_expr(cond, self)?.truthy() {
                    match self.exec_scoped(body, None)? {
                        Some(ControlFlow::Break) => break,
                        Some(ret @ ControlFlow::Return(_)) => return Ok(Some(ret)),
                        Some(ControlFlow::Continue) | None => {}
                    }
                }
            }
            StmtKind::For { var, iter, body } => {
                let items = iter_items(eval_expr(iter, self)?)?;
                for item in items {
                    match self.exec_scoped(body, Some((var.as_str(), item)))? {
                        Some(ControlFlow::Break) => break,
                        Some(ret @ ControlFlow::Return(_)) => return Ok(Some(ret)),
                        Some(ControlFlow::Continue) | None => {}
                    }
                }
            }
            StmtKind::Def { name, params, body } => {
                debug!(function = %name, params = params.len(), "define");
                self.registry.define_user(name, params.clone(), body.clone());
            }
            StmtKind::Call(expr) => {
                eval_expr(expr, self)?;
            }
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => eval_expr(e, self)?,
                    None => Value::Nil,
                };
                return Ok(Some(ControlFlow::Return(v)));
            }
            StmtKind::Break => return Ok(Some(ControlFlow::Break)),
            StmtKind::Continue => return Ok(Some(ControlFlow::Continue)),
            StmtKind::Import(path) => self.import(path)?,
            StmtKind::Passthrough { language, code } => self.passthrough(language, code)?,
            StmtKind::Frontend(cmd) => self.frontend_command(cmd)?,
        }
        Ok(None)
    }

    /// Run one loop iteration in a fresh child scope, released even on error.
    fn exec_scoped(
        &mut self,
        body: &[Stmt],
        binding: Option<(&str, Value)>,
    ) -> Result<Option<ControlFlow>> {
        let saved = self.env.push_child();
        if let Some((name, value)) = binding {
            self.env.define(name, value);
        }
        let flow = self.exec_block(body);
        self.env.pop(saved);
        flow
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| eval_expr(e, self)).collect()
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// Call a registered function by name.
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let entry = self.registry.get(name).cloned().ok_or_else(|| SolarError::name(name))?;
        match entry {
            FunctionEntry::Builtin { arity, func } => {
                arity.check(name, args.len())?;
                match func {
                    BuiltinFn::Pure(f) => f(&args),
                    BuiltinFn::Host(f) => f(self, &args),
                }
            }
            FunctionEntry::User { params, body } => {
                Arity::exactly(params.len()).check(name, args.len())?;
                if self.depth >= self.max_call_depth {
                    return Err(ErrorKind::Recursion(self.max_call_depth).into());
                }
                debug!(function = name, depth = self.depth + 1, "call");
                self.depth += 1;
                let saved = self.env.push_call();
                for (param, arg) in params.iter().zip(args) {
                    self.env.define(param, arg);
                }
                let flow = self.exec_block(&body);
                self.env.pop(saved);
                self.depth -= 1;
                match flow? {
                    Some(ControlFlow::Return(v)) => Ok(v),
                    _ => Ok(Value::Nil),
                }
            }
        }
    }

    // ── Imports ───────────────────────────────────────────────────────────────

    fn import(&mut self, path: &str) -> Result<()> {
        let mut reason = String::from("no module by that name");
        for resolver in self.resolvers.iter_mut() {
            match resolver.resolve(path) {
                Ok(module) => {
                    let leaf = path.rsplit('.').next().unwrap_or(path);
                    debug!(module = path, bound_as = leaf, "import");
                    self.env.define_global(leaf, Value::Host(module));
                    return Ok(());
                }
                Err(ImportFailure::NotFound(_)) => {}
                Err(ImportFailure::Failed(msg)) => {
                    reason = msg;
                    break;
                }
            }
        }
        Err(ErrorKind::Import { package: path.to_owned(), reason }.into())
    }

    // ── Passthrough ───────────────────────────────────────────────────────────

    /// Run a foreign block and merge its bindings back, also when it failed.
    fn passthrough(&mut self, language: &str, code: &str) -> Result<()> {
        let namespace = self.env.visible();
        let functions = FunctionTable::from_registry(&self.registry);
        let Some(engine) = self.engines.iter_mut().find(|e| e.language() == language) else {
            return Err(ErrorKind::Passthrough {
                language: language.to_owned(),
                message: "no engine is available for this language".to_owned(),
            }
            .into());
        };
        let outcome = engine.execute(code, &namespace, &functions);
        let diff = diff_namespace(&namespace, &outcome.namespace);
        debug!(
            language,
            added = diff.added.len(),
            changed = diff.changed.len(),
            failed = outcome.error.is_some(),
            "passthrough merged"
        );
        for (name, value) in diff.added {
            self.env.define_global(&name, value);
        }
        for (name, value) in diff.changed {
            self.env.assign(&name, value);
        }
        match outcome.error {
            Some(message) => {
                Err(ErrorKind::Passthrough { language: language.to_owned(), message }.into())
            }
            None => Ok(()),
        }
    }

    // ── Frontend ──────────────────────────────────────────────────────────────

    fn frontend_command(&mut self, stmt: &FrontendStmt) -> Result<()> {
        let mut cmd = FrontendCommand::new(stmt.surface, stmt.verb.clone());
        for positional in &stmt.positionals {
            cmd.args.push(match positional {
                Positional::Name(name) => Value::Str(name.clone()),
                Positional::Expr(e) => eval_expr(e, self)?,
            });
        }
        let mut into = None;
        for clause in &stmt.clauses {
            match clause {
                Clause::Value(kind, exprs) => {
                    let values = self.eval_all(exprs)?;
                    cmd.clauses.push((*kind, values));
                }
                Clause::Into(name) => into = Some(name),
                Clause::Do { func, args } => {
                    if !self.registry.contains(func) {
                        return Err(SolarError::name(func.as_str()));
                    }
                    let args = self.eval_all(args)?;
                    cmd.callback = Some(Callback { func: func.clone(), args });
                }
            }
        }

        debug!(surface = stmt.surface.as_str(), verb = %stmt.verb, "frontend dispatch");
        let reply = self.frontend.dispatch(&cmd).map_err(ErrorKind::from)?;
        if let Some(name) = into {
            self.env.assign(name, reply.value);
        }
        for Callback { func, args } in reply.callbacks {
            self.call_function(&func, args)?;
        }
        Ok(())
    }
}

/// Elements a `for` loop walks: list items, string characters or dict keys.
fn iter_items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(pairs) => Ok(pairs.into_iter().map(|(k, _)| k).collect()),
        other => Err(SolarError::type_err(format!("cannot iterate over {}", other.type_name()))),
    }
}

// ── EvalContext impl ──────────────────────────────────────────────────────────

impl EvalContext for Interpreter {
    /// A variable, else a registered function as a `Func` value.
    fn lookup(&self, name: &str) -> Option<Value> {
        match self.env.get(name) {
            Some(v) => Some(v.clone()),
            None if self.registry.contains(name) => Some(Value::Func(name.to_owned())),
            None => None,
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        match self.env.get(name) {
            Some(Value::Func(target)) => {
                let target = target.clone();
                self.call_function(&target, args)
            }
            Some(other) if !self.registry.contains(name) => Err(SolarError::type_err(format!(
                "`{name}` is {}, not a function",
                other.type_name()
            ))),
            _ => self.call_function(name, args),
        }
    }
}

// ── BuiltinHost impl ──────────────────────────────────────────────────────────

impl BuiltinHost for Interpreter {
    fn write_line(&mut self, line: &str) {
        if self.echo {
            println!("{line}");
        } else {
            self.output.push(line.to_owned());
        }
    }

    fn read_line(&mut self, prompt: &str) -> Option<String> {
        if let Some(line) = self.input.pop_front() {
            return Some(line);
        }
        if !self.read_stdin {
            return None;
        }
        if !prompt.is_empty() {
            print!("{prompt}");
            let _ = io::stdout().flush();
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_owned()),
        }
    }

    fn rng(&mut self) -> &mut Rng {
        &mut self.rng
    }

    fn clock(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
