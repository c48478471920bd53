//! Bridges between interpreted Solar state and foreign code.
//!
//! Two capability traits live here:
//!
//! - [`PassthroughEngine`] runs a fenced `python:` / `lua:` block against a
//!   snapshot of the visible Solar bindings and hands back the namespace as
//!   the foreign code left it.
//! - [`ImportResolver`] turns a `contain a.b.c` path into a host object.
//!
//! [`StaticModules`] is the resolver every interpreter starts with; it serves
//! a small set of native modules (`math`, `random`, `time`, `string`).

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::script::builtins::{pure_builtin, Arity, BuiltinFn, FunctionEntry, PureFn, Registry, Rng};
use crate::script::error::{ErrorKind, Result, SolarError};
use crate::script::value::{HostObject, HostRef, Value};

pub use crate::script::env::Namespace;

// ── Passthrough ───────────────────────────────────────────────────────────────

/// One registered function, as seen by a passthrough engine.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub arity: Arity,
    /// Set for built-ins that need nothing but their arguments; engines may
    /// call these directly.
    pub pure: Option<PureFn>,
}

/// Snapshot of the function registry handed to passthrough engines.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Vec<FunctionInfo>,
}

impl FunctionTable {
    pub fn from_registry(registry: &Registry) -> Self {
        let mut entries: Vec<FunctionInfo> = registry
            .iter()
            .map(|(name, entry)| FunctionInfo {
                name: name.clone(),
                arity: entry.arity(),
                pure: match entry {
                    FunctionEntry::Builtin { func: BuiltinFn::Pure(f), .. } => Some(*f),
                    _ => None,
                },
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        FunctionTable { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo> {
        self.entries.iter().find(|f| f.name == name)
    }

    /// Call a pure function by name, checking its arity.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ErrorKind> {
        let info = self.get(name).ok_or_else(|| ErrorKind::Name(name.to_owned()))?;
        let Some(f) = info.pure else {
            return Err(ErrorKind::Type(format!(
                "`{name}` cannot be called from passthrough code"
            )));
        };
        info.arity.check(name, args.len()).map_err(|e| e.kind)?;
        f(args).map_err(|e| e.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a passthrough block left behind.
#[derive(Debug, Clone, Default)]
pub struct PassthroughOutcome {
    /// The namespace after the block ran (also when it failed part-way).
    pub namespace: Namespace,
    /// The engine's error message, if the block raised.
    pub error: Option<String>,
}

/// Runs foreign-language source against Solar bindings.
pub trait PassthroughEngine {
    /// Language tag this engine serves (`"python"`, `"lua"`).
    fn language(&self) -> &str;

    fn execute(
        &mut self,
        code: &str,
        namespace: &Namespace,
        functions: &FunctionTable,
    ) -> PassthroughOutcome;
}

/// Names a passthrough block created or rebound.
#[derive(Debug, Default, PartialEq)]
pub struct NamespaceDiff {
    pub added: Vec<(String, Value)>,
    pub changed: Vec<(String, Value)>,
}

/// Compare the namespace sent to an engine with the one it returned.
/// Deleted names are ignored.
pub fn diff_namespace(before: &Namespace, after: &Namespace) -> NamespaceDiff {
    let mut diff = NamespaceDiff::default();
    for (name, value) in after {
        match before.get(name) {
            None => diff.added.push((name.clone(), value.clone())),
            Some(old) if !same_value(old, value) => {
                diff.changed.push((name.clone(), value.clone()))
            }
            Some(_) => {}
        }
    }
    diff
}

/// Equality that also tells `1` from `1.0`, so a type change counts as a rebind.
/// A NaN is the same as an identical NaN.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x == y || x.to_bits() == y.to_bits(),
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Dict(xs), Value::Dict(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(xk, xv)| {
                    ys.iter().any(|(yk, yv)| same_value(xk, yk) && same_value(xv, yv))
                })
        }
        _ => std::mem::discriminant(a) == std::mem::discriminant(b) && a == b,
    }
}

// ── Imports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImportFailure {
    #[error("no module named `{0}`")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
}

/// Resolves `contain` paths to host objects.
pub trait ImportResolver {
    fn resolve(&mut self, path: &str) -> Result<HostRef, ImportFailure>;
}

#[derive(Clone, Copy)]
enum ModuleFn {
    /// A pure built-in re-exported under the module.
    Pure(PureFn),
    /// Needs the module's own state.
    Native(fn(&NativeModule, &[Value]) -> Result<Value>),
}

/// A module implemented in Rust.
pub struct NativeModule {
    name: String,
    consts: Vec<(&'static str, Value)>,
    funcs: Vec<(&'static str, Arity, ModuleFn)>,
    rng: RefCell<Rng>,
    started: Instant,
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule").field("name", &self.name).finish_non_exhaustive()
    }
}

impl NativeModule {
    fn new(name: &str) -> Self {
        NativeModule {
            name: name.to_owned(),
            consts: Vec::new(),
            funcs: Vec::new(),
            rng: RefCell::new(Rng::from_time()),
            started: Instant::now(),
        }
    }

    fn constant(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.consts.push((name, value.into()));
        self
    }

    fn native(
        mut self,
        name: &'static str,
        arity: Arity,
        f: fn(&NativeModule, &[Value]) -> Result<Value>,
    ) -> Self {
        self.funcs.push((name, arity, ModuleFn::Native(f)));
        self
    }

    fn builtin(mut self, name: &'static str) -> Self {
        if let Some((arity, f)) = pure_builtin(name) {
            self.funcs.push((name, arity, ModuleFn::Pure(f)));
        }
        self
    }

    fn math() -> Self {
        NativeModule::new("math")
            .constant("pi", std::f64::consts::PI)
            .constant("e", std::f64::consts::E)
            .constant("tau", std::f64::consts::TAU)
            .constant("inf", f64::INFINITY)
            .builtin("sqrt")
            .builtin("floor")
            .builtin("ceil")
            .builtin("round")
            .builtin("pow")
            .builtin("abs")
            .native("sin", Arity::exactly(1), |_, a| float1(a, "sin", f64::sin))
            .native("cos", Arity::exactly(1), |_, a| float1(a, "cos", f64::cos))
            .native("tan", Arity::exactly(1), |_, a| float1(a, "tan", f64::tan))
            .native("exp", Arity::exactly(1), |_, a| float1(a, "exp", f64::exp))
            .native("atan2", Arity::exactly(2), |_, a| {
                Ok(Value::Float(num(a, 0, "atan2")?.atan2(num(a, 1, "atan2")?)))
            })
            .native("hypot", Arity::exactly(2), |_, a| {
                Ok(Value::Float(num(a, 0, "hypot")?.hypot(num(a, 1, "hypot")?)))
            })
            .native("log", Arity::range(1, 2), |_, a| {
                let x = num(a, 0, "log")?;
                if x <= 0.0 {
                    return Err(SolarError::value_err("`log` of a non-positive number"));
                }
                Ok(Value::Float(match a.len() {
                    2 => x.log(num(a, 1, "log")?),
                    _ => x.ln(),
                }))
            })
    }

    fn random() -> Self {
        NativeModule::new("random")
            .native("random", Arity::exactly(0), |m, _| Ok(Value::Float(m.rng.borrow_mut().next_f64())))
            .native("uniform", Arity::exactly(2), |m, a| {
                let lo = num(a, 0, "uniform")?;
                let hi = num(a, 1, "uniform")?;
                Ok(Value::Float(lo + (hi - lo) * m.rng.borrow_mut().next_f64()))
            })
            .native("randint", Arity::exactly(2), |m, a| {
                let (lo, hi) = (int(a, 0, "randint")?, int(a, 1, "randint")?);
                if lo > hi {
                    return Err(SolarError::value_err(format!("`randint`: empty range {lo}..{hi}")));
                }
                Ok(Value::Int(m.rng.borrow_mut().range_inclusive(lo, hi)))
            })
            .native("choice", Arity::exactly(1), |m, a| match &a[0] {
                Value::List(items) if !items.is_empty() => {
                    let i = m.rng.borrow_mut().range_inclusive(0, items.len() as i64 - 1);
                    Ok(items[i as usize].clone())
                }
                Value::List(_) => Err(SolarError::value_err("`choice` from an empty list")),
                other => Err(SolarError::type_err(format!(
                    "`choice` expects a list, got {}",
                    other.type_name()
                ))),
            })
            .native("seed", Arity::exactly(1), |m, a| {
                *m.rng.borrow_mut() = Rng::seeded(int(a, 0, "seed")? as u64);
                Ok(Value::Nil)
            })
    }

    fn time() -> Self {
        NativeModule::new("time")
            .builtin("time")
            .builtin("sleep")
            .native("monotonic", Arity::exactly(0), |m, _| {
                Ok(Value::Float(m.started.elapsed().as_secs_f64()))
            })
    }

    fn string() -> Self {
        NativeModule::new("string")
            .constant("ascii_lowercase", "abcdefghijklmnopqrstuvwxyz")
            .constant("ascii_uppercase", "ABCDEFGHIJKLMNOPQRSTUVWXYZ")
            .constant("ascii_letters", "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ")
            .constant("digits", "0123456789")
            .constant("punctuation", r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##)
            .builtin("upper")
            .builtin("lower")
            .builtin("trim")
            .native("capitalize", Arity::exactly(1), |_, a| match &a[0] {
                Value::Str(s) => {
                    let mut chars = s.chars();
                    let out = match chars.next() {
                        Some(c) => c.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                        None => String::new(),
                    };
                    Ok(Value::Str(out))
                }
                other => Err(SolarError::type_err(format!(
                    "`capitalize` expects a string, got {}",
                    other.type_name()
                ))),
            })
    }
}

fn num(args: &[Value], idx: usize, name: &str) -> Result<f64> {
    args[idx].as_f64().ok_or_else(|| {
        SolarError::type_err(format!("`{name}` expects a number, got {}", args[idx].type_name()))
    })
}

fn int(args: &[Value], idx: usize, name: &str) -> Result<i64> {
    match &args[idx] {
        Value::Int(n) => Ok(*n),
        other => Err(SolarError::type_err(format!(
            "`{name}` expects an integer, got {}",
            other.type_name()
        ))),
    }
}

fn float1(args: &[Value], name: &str, f: fn(f64) -> f64) -> Result<Value> {
    Ok(Value::Float(f(num(args, 0, name)?)))
}

impl HostObject for NativeModule {
    fn type_name(&self) -> &str {
        "module"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_member(&self, member: &str) -> Option<Value> {
        self.consts.iter().find(|(n, _)| *n == member).map(|(_, v)| v.clone())
    }

    fn call_member(&self, member: &str, args: &[Value]) -> Result<Value, ErrorKind> {
        let Some(&(name, arity, f)) = self.funcs.iter().find(|(n, _, _)| *n == member) else {
            return Err(ErrorKind::Name(format!("{}.{member}", self.name)));
        };
        let qualified = format!("{}.{name}", self.name);
        arity.check(&qualified, args.len()).map_err(|e| e.kind)?;
        let result = match f {
            ModuleFn::Pure(f) => f(args),
            ModuleFn::Native(f) => f(self, args),
        };
        result.map_err(|e| e.kind)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Native module registry.  Each path is built once; later imports of the
/// same path get the same object.
#[derive(Debug, Default)]
pub struct StaticModules {
    cache: HashMap<String, HostRef>,
}

impl StaticModules {
    pub const AVAILABLE: &'static [&'static str] = &["math", "random", "time", "string"];

    pub fn new() -> Self {
        Self::default()
    }

    fn build(path: &str) -> Option<NativeModule> {
        Some(match path {
            "math" => NativeModule::math(),
            "random" => NativeModule::random(),
            "time" => NativeModule::time(),
            "string" => NativeModule::string(),
            _ => return None,
        })
    }
}

impl ImportResolver for StaticModules {
    fn resolve(&mut self, path: &str) -> Result<HostRef, ImportFailure> {
        if let Some(module) = self.cache.get(path) {
            return Ok(Rc::clone(module));
        }
        let module: HostRef =
            Rc::new(Self::build(path).ok_or_else(|| ImportFailure::NotFound(path.to_owned()))?);
        debug!(module = path, "loaded native module");
        self.cache.insert(path.to_owned(), Rc::clone(&module));
        Ok(module)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
