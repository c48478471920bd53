//! Function registry and the built-in Solar functions.
//!
//! Built-ins come in two flavours.  *Pure* functions only look at their
//! arguments, so passthrough engines may call them directly.  *Host*
//! functions need the running interpreter (output, input, the random
//! generator) and receive it through [`BuiltinHost`].

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;

use super::error::{ErrorKind, Result, SolarError};
use super::stmt::Stmt;
use super::value::{dict_get, dict_set, resolve_index, Value};

/// Largest list or string (in elements or bytes) `range` and `repeat` build.
pub const MAX_BUILT_LEN: usize = 1 << 24;

// ── Registry ──────────────────────────────────────────────────────────────────

pub type PureFn = fn(&[Value]) -> Result<Value>;
pub type HostFn = fn(&mut dyn BuiltinHost, &[Value]) -> Result<Value>;

/// What built-in host functions may ask of the interpreter.
pub trait BuiltinHost {
    /// Emit one line of program output.
    fn write_line(&mut self, line: &str);

    /// Read one line of input; `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    fn rng(&mut self) -> &mut Rng;

    /// Seconds since the interpreter started.
    fn clock(&self) -> f64;
}

#[derive(Clone, Copy)]
pub enum BuiltinFn {
    Pure(PureFn),
    Host(HostFn),
}

impl fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinFn::Pure(_) => write!(f, "Pure(..)"),
            BuiltinFn::Host(_) => write!(f, "Host(..)"),
        }
    }
}

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Arity { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Arity { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Arity { min, max: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }

    /// Raise an arity error for `name` unless `got` is accepted.
    pub fn check(&self, name: &str, got: usize) -> Result<()> {
        if self.accepts(got) {
            return Ok(());
        }
        Err(ErrorKind::Arity { name: name.to_owned(), expected: self.to_string(), got }.into())
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{} to {max}", self.min),
            None => write!(f, "at least {}", self.min),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FunctionEntry {
    Builtin { arity: Arity, func: BuiltinFn },
    User { params: Vec<String>, body: Rc<Vec<Stmt>> },
}

impl FunctionEntry {
    pub fn arity(&self) -> Arity {
        match self {
            FunctionEntry::Builtin { arity, .. } => *arity,
            FunctionEntry::User { params, .. } => Arity::exactly(params.len()),
        }
    }
}

/// Name → function.  Redefinition overwrites, built-ins included.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: HashMap<String, FunctionEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        for &(name, arity, func) in BUILTINS {
            reg.entries.insert(name.to_owned(), FunctionEntry::Builtin { arity, func });
        }
        reg
    }

    pub fn define_user(&mut self, name: &str, params: Vec<String>, body: Rc<Vec<Stmt>>) {
        self.entries.insert(name.to_owned(), FunctionEntry::User { params, body });
    }

    pub fn define_builtin(&mut self, name: &str, arity: Arity, func: BuiltinFn) {
        self.entries.insert(name.to_owned(), FunctionEntry::Builtin { arity, func });
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FunctionEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Random numbers ────────────────────────────────────────────────────────────

/// xorshift64 generator.  Not cryptographically secure.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn seeded(seed: u64) -> Self {
        Rng { state: if seed == 0 { 0xdead_beef } else { seed } }
    }

    /// Seed from the system clock.
    pub fn from_time() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0xdead_beef);
        Self::seeded(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut s = self.state;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.state = s;
        s
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `lo..=hi`; requires `lo <= hi`.
    pub fn range_inclusive(&mut self, lo: i64, hi: i64) -> i64 {
        let span = (hi as i128 - lo as i128 + 1) as u128;
        (lo as i128 + (self.next_u64() as u128 % span) as i128) as i64
    }
}

// ── Built-in table ────────────────────────────────────────────────────────────

use Arity as A;
use BuiltinFn::{Host as H, Pure as P};

static BUILTINS: &[(&str, Arity, BuiltinFn)] = &[
    // I/O
    ("print", A::at_least(0), H(print)),
    ("print_many", A::at_least(0), H(print)),
    ("input", A::range(0, 1), H(input)),
    ("sleep", A::exactly(1), P(sleep)),
    ("add", A::exactly(2), H(add)),
    ("mul", A::exactly(2), H(mul)),
    // math
    ("abs", A::exactly(1), P(abs)),
    ("min", A::at_least(1), P(min)),
    ("max", A::at_least(1), P(max)),
    ("floor", A::exactly(1), P(floor)),
    ("ceil", A::exactly(1), P(ceil)),
    ("round", A::range(1, 2), P(round)),
    ("sqrt", A::exactly(1), P(sqrt)),
    ("pow", A::exactly(2), P(pow)),
    // strings
    ("len", A::exactly(1), P(len)),
    ("upper", A::exactly(1), P(upper)),
    ("lower", A::exactly(1), P(lower)),
    ("trim", A::exactly(1), P(trim)),
    ("split", A::range(1, 2), P(split)),
    ("join", A::exactly(2), P(join)),
    ("replace", A::exactly(3), P(replace)),
    ("substr", A::range(2, 3), P(substr)),
    ("contains", A::exactly(2), P(contains)),
    ("starts_with", A::exactly(2), P(starts_with)),
    ("ends_with", A::exactly(2), P(ends_with)),
    ("find", A::exactly(2), P(find)),
    ("repeat", A::exactly(2), P(repeat)),
    ("matches", A::exactly(2), P(matches)),
    // lists and dicts
    ("range", A::range(1, 3), P(range)),
    ("append", A::exactly(2), P(append)),
    ("insert", A::exactly(3), P(insert)),
    ("remove", A::exactly(2), P(remove)),
    ("pop", A::range(1, 2), P(pop)),
    ("first", A::exactly(1), P(first)),
    ("last", A::exactly(1), P(last)),
    ("reverse", A::exactly(1), P(reverse)),
    ("sort", A::exactly(1), P(sort)),
    ("slice", A::range(2, 3), P(slice)),
    ("keys", A::exactly(1), P(keys)),
    ("values", A::exactly(1), P(values)),
    ("has_key", A::exactly(2), P(has_key)),
    ("set", A::exactly(3), P(set)),
    ("get", A::range(2, 3), P(get)),
    // random and time
    ("random", A::exactly(0), H(random)),
    ("randint", A::exactly(2), H(randint)),
    ("choice", A::exactly(1), H(choice)),
    ("time", A::exactly(0), P(time)),
    ("clock", A::exactly(0), H(clock)),
    // conversions
    ("str", A::exactly(1), P(to_str)),
    ("int", A::exactly(1), P(to_int)),
    ("float", A::exactly(1), P(to_float)),
    ("bool", A::exactly(1), P(to_bool)),
    ("type", A::exactly(1), P(type_of)),
];

/// Look up a built-in that needs nothing but its arguments.
pub fn pure_builtin(name: &str) -> Option<(Arity, PureFn)> {
    BUILTINS.iter().find_map(|&(n, arity, func)| match func {
        BuiltinFn::Pure(f) if n == name => Some((arity, f)),
        _ => None,
    })
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn wrong_type(name: &str, idx: usize, want: &str, got: &Value) -> SolarError {
    SolarError::type_err(format!(
        "`{name}` expects {want} as argument {}, got {}",
        idx + 1,
        got.type_name()
    ))
}

fn str_arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a str> {
    match &args[idx] {
        Value::Str(s) => Ok(s),
        other => Err(wrong_type(name, idx, "a string", other)),
    }
}

fn int_arg(args: &[Value], idx: usize, name: &str) -> Result<i64> {
    match &args[idx] {
        Value::Int(n) => Ok(*n),
        Value::Float(x) if x.fract() == 0.0 && x.is_finite() => Ok(*x as i64),
        other => Err(wrong_type(name, idx, "an integer", other)),
    }
}

fn num_arg(args: &[Value], idx: usize, name: &str) -> Result<f64> {
    args[idx].as_f64().ok_or_else(|| wrong_type(name, idx, "a number", &args[idx]))
}

fn list_arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a [Value]> {
    match &args[idx] {
        Value::List(items) => Ok(items),
        other => Err(wrong_type(name, idx, "a list", other)),
    }
}

fn float_to_int(x: f64, name: &str) -> Result<Value> {
    if !x.is_finite() {
        return Err(SolarError::value_err(format!("`{name}`: cannot convert {x} to int")));
    }
    Ok(Value::Int(x as i64))
}

fn joined(args: &[Value]) -> String {
    args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ")
}

// ── I/O ───────────────────────────────────────────────────────────────────────

fn print(host: &mut dyn BuiltinHost, args: &[Value]) -> Result<Value> {
    host.write_line(&joined(args));
    Ok(Value::Nil)
}

fn input(host: &mut dyn BuiltinHost, args: &[Value]) -> Result<Value> {
    let prompt = args.first().map(Value::to_string).unwrap_or_default();
    Ok(host.read_line(&prompt).map_or(Value::Nil, Value::Str))
}

fn sleep(args: &[Value]) -> Result<Value> {
    let secs = num_arg(args, 0, "sleep")?;
    if secs > 0.0 {
        let d = Duration::try_from_secs_f64(secs)
            .map_err(|_| SolarError::value_err(format!("`sleep`: {secs} seconds is out of range")))?;
        std::thread::sleep(d);
    }
    Ok(Value::Nil)
}

fn add(host: &mut dyn BuiltinHost, args: &[Value]) -> Result<Value> {
    let v = args[0].arith_add(&args[1])?;
    host.write_line(&v.to_string());
    Ok(v)
}

fn mul(host: &mut dyn BuiltinHost, args: &[Value]) -> Result<Value> {
    let v = args[0].arith_mul(&args[1])?;
    host.write_line(&v.to_string());
    Ok(v)
}

// ── Math ──────────────────────────────────────────────────────────────────────

fn abs(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Int(n) => Ok(n.checked_abs().map_or(Value::Float((*n as f64).abs()), Value::Int)),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(wrong_type("abs", 0, "a number", other)),
    }
}

fn extreme(name: &str, args: &[Value], want: std::cmp::Ordering) -> Result<Value> {
    let items = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    let mut best = items
        .first()
        .ok_or_else(|| SolarError::value_err(format!("`{name}` of an empty list")))?;
    for item in &items[1..] {
        if item.compare(best)? == want {
            best = item;
        }
    }
    Ok(best.clone())
}

fn min(args: &[Value]) -> Result<Value> {
    extreme("min", args, std::cmp::Ordering::Less)
}

fn max(args: &[Value]) -> Result<Value> {
    extreme("max", args, std::cmp::Ordering::Greater)
}

fn floor(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        _ => float_to_int(num_arg(args, 0, "floor")?.floor(), "floor"),
    }
}

fn ceil(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        _ => float_to_int(num_arg(args, 0, "ceil")?.ceil(), "ceil"),
    }
}

fn round(args: &[Value]) -> Result<Value> {
    let x = num_arg(args, 0, "round")?;
    if args.len() == 2 {
        let digits = int_arg(args, 1, "round")?.clamp(-300, 300) as i32;
        let scale = 10f64.powi(digits);
        return Ok(Value::Float((x * scale).round() / scale));
    }
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        _ => float_to_int(x.round(), "round"),
    }
}

fn sqrt(args: &[Value]) -> Result<Value> {
    let x = num_arg(args, 0, "sqrt")?;
    if x < 0.0 {
        return Err(SolarError::value_err("`sqrt` of a negative number"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn pow(args: &[Value]) -> Result<Value> {
    if let (Value::Int(b), Value::Int(e)) = (&args[0], &args[1]) {
        if let Ok(e32) = u32::try_from(*e) {
            if let Some(n) = b.checked_pow(e32) {
                return Ok(Value::Int(n));
            }
        }
    }
    let b = num_arg(args, 0, "pow")?;
    let e = num_arg(args, 1, "pow")?;
    Ok(Value::Float(b.powf(e)))
}

// ── Strings ───────────────────────────────────────────────────────────────────

fn len(args: &[Value]) -> Result<Value> {
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Dict(pairs) => pairs.len(),
        other => return Err(wrong_type("len", 0, "a string, list or dict", other)),
    };
    Ok(Value::Int(n as i64))
}

fn upper(args: &[Value]) -> Result<Value> {
    Ok(Value::Str(str_arg(args, 0, "upper")?.to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value> {
    Ok(Value::Str(str_arg(args, 0, "lower")?.to_lowercase()))
}

fn trim(args: &[Value]) -> Result<Value> {
    Ok(Value::Str(str_arg(args, 0, "trim")?.trim().to_owned()))
}

fn split(args: &[Value]) -> Result<Value> {
    let s = str_arg(args, 0, "split")?;
    let parts: Vec<Value> = match args.get(1) {
        None => s.split_whitespace().map(Value::from).collect(),
        Some(_) => {
            let sep = str_arg(args, 1, "split")?;
            if sep.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(sep).map(Value::from).collect()
            }
        }
    };
    Ok(Value::List(parts))
}

fn join(args: &[Value]) -> Result<Value> {
    let items = list_arg(args, 0, "join")?;
    let sep = str_arg(args, 1, "join")?;
    Ok(Value::Str(items.iter().map(Value::to_string).collect::<Vec<_>>().join(sep)))
}

fn replace(args: &[Value]) -> Result<Value> {
    let s = str_arg(args, 0, "replace")?;
    let from = str_arg(args, 1, "replace")?;
    let to = str_arg(args, 2, "replace")?;
    if from.is_empty() {
        return Ok(Value::Str(s.to_owned()));
    }
    Ok(Value::Str(s.replace(from, to)))
}

fn substr(args: &[Value]) -> Result<Value> {
    let chars: Vec<char> = str_arg(args, 0, "substr")?.chars().collect();
    let start = clamp_index(int_arg(args, 1, "substr")?, chars.len());
    let end = match args.get(2) {
        Some(_) => start.saturating_add(int_arg(args, 2, "substr")?.max(0) as usize).min(chars.len()),
        None => chars.len(),
    };
    Ok(Value::Str(chars[start..end].iter().collect()))
}

fn contains(args: &[Value]) -> Result<Value> {
    let found = match &args[0] {
        Value::Str(s) => s.contains(str_arg(args, 1, "contains")?),
        Value::List(items) => items.contains(&args[1]),
        Value::Dict(pairs) => dict_get(pairs, &args[1]).is_some(),
        other => return Err(wrong_type("contains", 0, "a string, list or dict", other)),
    };
    Ok(Value::Bool(found))
}

fn starts_with(args: &[Value]) -> Result<Value> {
    let s = str_arg(args, 0, "starts_with")?;
    Ok(Value::Bool(s.starts_with(str_arg(args, 1, "starts_with")?)))
}

fn ends_with(args: &[Value]) -> Result<Value> {
    let s = str_arg(args, 0, "ends_with")?;
    Ok(Value::Bool(s.ends_with(str_arg(args, 1, "ends_with")?)))
}

fn find(args: &[Value]) -> Result<Value> {
    let idx = match &args[0] {
        Value::Str(s) => {
            let needle = str_arg(args, 1, "find")?;
            s.find(needle).map(|byte| s[..byte].chars().count())
        }
        Value::List(items) => items.iter().position(|v| *v == args[1]),
        other => return Err(wrong_type("find", 0, "a string or list", other)),
    };
    Ok(Value::Int(idx.map_or(-1, |i| i as i64)))
}

fn repeat(args: &[Value]) -> Result<Value> {
    let n = usize::try_from(int_arg(args, 1, "repeat")?).unwrap_or(0);
    let check = |len: usize| match len.checked_mul(n) {
        Some(total) if total <= MAX_BUILT_LEN => Ok(()),
        _ => Err(SolarError::value_err("`repeat` result too large")),
    };
    match &args[0] {
        Value::Str(s) => {
            check(s.len())?;
            Ok(Value::Str(s.repeat(n)))
        }
        Value::List(items) => {
            check(items.len())?;
            Ok(Value::List(std::iter::repeat(items.iter().cloned()).take(n).flatten().collect()))
        }
        other => Err(wrong_type("repeat", 0, "a string or list", other)),
    }
}

fn matches(args: &[Value]) -> Result<Value> {
    let text = str_arg(args, 0, "matches")?;
    let pattern = str_arg(args, 1, "matches")?;
    let re = Regex::new(pattern)
        .map_err(|e| SolarError::value_err(format!("`matches`: invalid pattern: {e}")))?;
    Ok(Value::Bool(re.is_match(text)))
}

// ── Lists and dicts ───────────────────────────────────────────────────────────

/// Clamp a possibly negative slice bound into `0..=len`.
fn clamp_index(i: i64, len: usize) -> usize {
    if i < 0 {
        (len as i64 + i).max(0) as usize
    } else {
        (i as usize).min(len)
    }
}

fn range(args: &[Value]) -> Result<Value> {
    let (start, stop, step) = match args.len() {
        1 => (0, int_arg(args, 0, "range")?, 1),
        2 => (int_arg(args, 0, "range")?, int_arg(args, 1, "range")?, 1),
        _ => (int_arg(args, 0, "range")?, int_arg(args, 1, "range")?, int_arg(args, 2, "range")?),
    };
    if step == 0 {
        return Err(SolarError::value_err("`range` step must not be zero"));
    }
    let (span, stride) = (i128::from(stop) - i128::from(start), i128::from(step));
    let count = if span.signum() == stride.signum() { (span + stride - stride.signum()) / stride } else { 0 };
    if count > MAX_BUILT_LEN as i128 {
        return Err(SolarError::value_err(format!("`range` of {count} items is too large")));
    }
    let out = (0..count).map(|k| Value::Int((i128::from(start) + k * stride) as i64)).collect();
    Ok(Value::List(out))
}

fn append(args: &[Value]) -> Result<Value> {
    let mut items = list_arg(args, 0, "append")?.to_vec();
    items.push(args[1].clone());
    Ok(Value::List(items))
}

fn insert(args: &[Value]) -> Result<Value> {
    let mut items = list_arg(args, 0, "insert")?.to_vec();
    let at = clamp_index(int_arg(args, 1, "insert")?, items.len());
    items.insert(at, args[2].clone());
    Ok(Value::List(items))
}

fn remove(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::List(items) => {
            let mut items = items.clone();
            if let Some(i) = items.iter().position(|v| *v == args[1]) {
                items.remove(i);
            }
            Ok(Value::List(items))
        }
        Value::Dict(pairs) => Ok(Value::Dict(
            pairs.iter().filter(|(k, _)| *k != args[1]).cloned().collect(),
        )),
        other => Err(wrong_type("remove", 0, "a list or dict", other)),
    }
}

fn pop(args: &[Value]) -> Result<Value> {
    let mut items = list_arg(args, 0, "pop")?.to_vec();
    if items.is_empty() {
        return Err(SolarError::value_err("`pop` from an empty list"));
    }
    let idx = match args.get(1) {
        Some(_) => resolve_index(int_arg(args, 1, "pop")?, items.len())?,
        None => items.len() - 1,
    };
    items.remove(idx);
    Ok(Value::List(items))
}

fn first(args: &[Value]) -> Result<Value> {
    list_arg(args, 0, "first")?
        .first()
        .cloned()
        .ok_or_else(|| SolarError::value_err("`first` of an empty list"))
}

fn last(args: &[Value]) -> Result<Value> {
    list_arg(args, 0, "last")?
        .last()
        .cloned()
        .ok_or_else(|| SolarError::value_err("`last` of an empty list"))
}

fn reverse(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
        Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
        other => Err(wrong_type("reverse", 0, "a list or string", other)),
    }
}

fn sort(args: &[Value]) -> Result<Value> {
    let mut items = list_arg(args, 0, "sort")?.to_vec();
    // All elements must be comparable with the first.
    if let Some(first) = items.first() {
        for item in &items {
            first.compare(item)?;
        }
    }
    items.sort_by(|a, b| a.compare(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Value::List(items))
}

fn slice(args: &[Value]) -> Result<Value> {
    let bounds = |len: usize| -> Result<(usize, usize)> {
        let start = clamp_index(int_arg(args, 1, "slice")?, len);
        let end = match args.get(2) {
            Some(_) => clamp_index(int_arg(args, 2, "slice")?, len),
            None => len,
        };
        Ok((start, end.max(start)))
    };
    match &args[0] {
        Value::List(items) => {
            let (s, e) = bounds(items.len())?;
            Ok(Value::List(items[s..e].to_vec()))
        }
        Value::Str(st) => {
            let chars: Vec<char> = st.chars().collect();
            let (s, e) = bounds(chars.len())?;
            Ok(Value::Str(chars[s..e].iter().collect()))
        }
        other => Err(wrong_type("slice", 0, "a list or string", other)),
    }
}

fn dict_arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a [(Value, Value)]> {
    match &args[idx] {
        Value::Dict(pairs) => Ok(pairs),
        other => Err(wrong_type(name, idx, "a dict", other)),
    }
}

fn keys(args: &[Value]) -> Result<Value> {
    Ok(Value::List(dict_arg(args, 0, "keys")?.iter().map(|(k, _)| k.clone()).collect()))
}

fn values(args: &[Value]) -> Result<Value> {
    Ok(Value::List(dict_arg(args, 0, "values")?.iter().map(|(_, v)| v.clone()).collect()))
}

fn has_key(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(dict_get(dict_arg(args, 0, "has_key")?, &args[1]).is_some()))
}

fn set(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Dict(pairs) => {
            let mut pairs = pairs.clone();
            dict_set(&mut pairs, args[1].clone(), args[2].clone());
            Ok(Value::Dict(pairs))
        }
        Value::List(items) => {
            let mut items = items.clone();
            let idx = resolve_index(int_arg(args, 1, "set")?, items.len())?;
            items[idx] = args[2].clone();
            Ok(Value::List(items))
        }
        other => Err(wrong_type("set", 0, "a list or dict", other)),
    }
}

fn get(args: &[Value]) -> Result<Value> {
    let default = args.get(2).cloned().unwrap_or(Value::Nil);
    match &args[0] {
        Value::Dict(pairs) => Ok(dict_get(pairs, &args[1]).cloned().unwrap_or(default)),
        Value::List(items) => {
            let i = int_arg(args, 1, "get")?;
            Ok(resolve_index(i, items.len()).map(|idx| items[idx].clone()).unwrap_or(default))
        }
        other => Err(wrong_type("get", 0, "a list or dict", other)),
    }
}

// ── Random and time ───────────────────────────────────────────────────────────

fn random(host: &mut dyn BuiltinHost, _args: &[Value]) -> Result<Value> {
    Ok(Value::Float(host.rng().next_f64()))
}

fn randint(host: &mut dyn BuiltinHost, args: &[Value]) -> Result<Value> {
    let lo = int_arg(args, 0, "randint")?;
    let hi = int_arg(args, 1, "randint")?;
    if lo > hi {
        return Err(SolarError::value_err(format!("`randint`: empty range {lo}..{hi}")));
    }
    Ok(Value::Int(host.rng().range_inclusive(lo, hi)))
}

fn choice(host: &mut dyn BuiltinHost, args: &[Value]) -> Result<Value> {
    let items = list_arg(args, 0, "choice")?;
    if items.is_empty() {
        return Err(SolarError::value_err("`choice` from an empty list"));
    }
    let idx = host.rng().range_inclusive(0, items.len() as i64 - 1) as usize;
    Ok(items[idx].clone())
}

fn time(_args: &[Value]) -> Result<Value> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
    Ok(Value::Float(secs))
}

fn clock(host: &mut dyn BuiltinHost, _args: &[Value]) -> Result<Value> {
    Ok(Value::Float(host.clock()))
}

// ── Conversions ───────────────────────────────────────────────────────────────

fn to_str(args: &[Value]) -> Result<Value> {
    Ok(Value::Str(args[0].to_string()))
}

fn to_int(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(x) => float_to_int(x.trunc(), "int"),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Str(s) => {
            let t = s.trim();
            if let Ok(n) = t.parse::<i64>() {
                return Ok(Value::Int(n));
            }
            match t.parse::<f64>() {
                Ok(x) => float_to_int(x.trunc(), "int"),
                Err(_) => Err(SolarError::value_err(format!("`int`: invalid number {s:?}"))),
            }
        }
        other => Err(wrong_type("int", 0, "a number, bool or string", other)),
    }
}

fn to_float(args: &[Value]) -> Result<Value> {
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| SolarError::value_err(format!("`float`: invalid number {s:?}"))),
        other => Err(wrong_type("float", 0, "a number, bool or string", other)),
    }
}

fn to_bool(args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(args[0].truthy()))
}

fn type_of(args: &[Value]) -> Result<Value> {
    Ok(Value::Str(args[0].type_name().to_owned()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct TestHost {
        out: Vec<String>,
        input: Vec<String>,
        rng: Rng,
    }

    impl TestHost {
        fn new() -> Self {
            TestHost { out: Vec::new(), input: Vec::new(), rng: Rng::seeded(42) }
        }
    }

    impl BuiltinHost for TestHost {
        fn write_line(&mut self, line: &str) {
            self.out.push(line.to_owned());
        }
        fn read_line(&mut self, _prompt: &str) -> Option<String> {
            if self.input.is_empty() {
                None
            } else {
                Some(self.input.remove(0))
            }
        }
        fn rng(&mut self) -> &mut Rng {
            &mut self.rng
        }
        fn clock(&self) -> f64 {
            1.5
        }
    }

    fn call_with(host: &mut TestHost, name: &str, args: Vec<Value>) -> Result<Value> {
        let reg = Registry::with_builtins();
        let Some(FunctionEntry::Builtin { arity, func }) = reg.get(name) else {
            panic!("`{name}` is not a builtin");
        };
        arity.check(name, args.len())?;
        match func {
            BuiltinFn::Pure(f) => f(&args),
            BuiltinFn::Host(f) => f(host, &args),
        }
    }

    fn call(name: &str, args: Vec<Value>) -> Value {
        call_with(&mut TestHost::new(), name, args).expect("call failed")
    }

    fn call_err(name: &str, args: Vec<Value>) -> ErrorKind {
        call_with(&mut TestHost::new(), name, args).expect_err("call succeeded").kind
    }

    fn s(v: &str) -> Value {
        Value::Str(v.into())
    }

    fn ints(v: &[i64]) -> Value {
        Value::List(v.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn arity_is_checked() {
        assert!(matches!(
            call_err("len", vec![]),
            ErrorKind::Arity { ref name, got: 0, .. } if name == "len"
        ));
        assert!(matches!(call_err("min", vec![]), ErrorKind::Arity { .. }));
        assert_eq!(Arity::range(1, 3).to_string(), "1 to 3");
        assert_eq!(Arity::at_least(1).to_string(), "at least 1");
    }

    #[test]
    fn print_joins_with_spaces() {
        let mut host = TestHost::new();
        call_with(&mut host, "print", vec![s("a"), Value::Int(1), Value::Float(2.0)]).unwrap();
        call_with(&mut host, "print_many", vec![]).unwrap();
        assert_eq!(host.out, vec!["a 1 2.0".to_string(), String::new()]);
    }

    #[test]
    fn add_and_mul_print_their_result() {
        let mut host = TestHost::new();
        let v = call_with(&mut host, "add", vec![Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(v, Value::Int(5));
        call_with(&mut host, "mul", vec![Value::Int(4), Value::Float(0.5)]).unwrap();
        assert_eq!(host.out, vec!["5".to_string(), "2.0".to_string()]);
    }

    #[test]
    fn input_reads_lines() {
        let mut host = TestHost::new();
        host.input.push("bob".into());
        assert_eq!(call_with(&mut host, "input", vec![s("name? ")]).unwrap(), s("bob"));
        assert_eq!(call_with(&mut host, "input", vec![]).unwrap(), Value::Nil);
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn math() {
        assert_eq!(call("abs", vec![Value::Int(-3)]), Value::Int(3));
        assert_eq!(call("min", vec![Value::Int(3), Value::Float(1.5)]), Value::Float(1.5));
        assert_eq!(call("max", vec![ints(&[4, 9, 2])]), Value::Int(9));
        assert_eq!(call("floor", vec![Value::Float(-1.5)]), Value::Int(-2));
        assert_eq!(call("ceil", vec![Value::Float(1.2)]), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(2.5)]), Value::Int(3));
        assert_eq!(call("round", vec![Value::Float(3.14159), Value::Int(2)]), Value::Float(3.14));
        assert_eq!(call("sqrt", vec![Value::Int(9)]), Value::Float(3.0));
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(10)]), Value::Int(1024));
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(-1)]), Value::Float(0.5));
        assert!(matches!(call_err("sqrt", vec![Value::Int(-1)]), ErrorKind::Value(_)));
        assert!(matches!(call_err("abs", vec![s("x")]), ErrorKind::Type(_)));
    }

    #[test]
    fn strings() {
        assert_eq!(call("len", vec![s("héllo")]), Value::Int(5));
        assert_eq!(call("upper", vec![s("abc")]), s("ABC"));
        assert_eq!(call("trim", vec![s("  x ")]), s("x"));
        assert_eq!(call("split", vec![s("a b  c")]), Value::List(vec![s("a"), s("b"), s("c")]));
        assert_eq!(call("split", vec![s("a,b"), s(",")]), Value::List(vec![s("a"), s("b")]));
        assert_eq!(call("join", vec![ints(&[1, 2, 3]), s("-")]), s("1-2-3"));
        assert_eq!(call("replace", vec![s("aXbX"), s("X"), s("_")]), s("a_b_"));
        assert_eq!(call("substr", vec![s("hello"), Value::Int(1), Value::Int(3)]), s("ell"));
        assert_eq!(call("substr", vec![s("hello"), Value::Int(-3)]), s("llo"));
        assert_eq!(call("contains", vec![s("hello"), s("ell")]), Value::Bool(true));
        assert_eq!(call("starts_with", vec![s("hello"), s("he")]), Value::Bool(true));
        assert_eq!(call("ends_with", vec![s("hello"), s("x")]), Value::Bool(false));
        assert_eq!(call("find", vec![s("héllo"), s("l")]), Value::Int(2));
        assert_eq!(call("find", vec![s("hello"), s("z")]), Value::Int(-1));
        assert_eq!(call("repeat", vec![s("ab"), Value::Int(3)]), s("ababab"));
    }

    #[test]
    fn regex_matches() {
        assert_eq!(call("matches", vec![s("order 66"), s(r"\d+")]), Value::Bool(true));
        assert_eq!(call("matches", vec![s("none"), s(r"^\d+$")]), Value::Bool(false));
        assert!(matches!(call_err("matches", vec![s("x"), s("(")]), ErrorKind::Value(_)));
    }

    #[test]
    fn lists() {
        assert_eq!(call("range", vec![Value::Int(3)]), ints(&[0, 1, 2]));
        assert_eq!(call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]), ints(&[5, 3, 1]));
        assert!(matches!(
            call_err("range", vec![Value::Int(0), Value::Int(1), Value::Int(0)]),
            ErrorKind::Value(_)
        ));
        assert_eq!(call("append", vec![ints(&[1]), Value::Int(2)]), ints(&[1, 2]));
        assert_eq!(call("insert", vec![ints(&[1, 3]), Value::Int(1), Value::Int(2)]), ints(&[1, 2, 3]));
        assert_eq!(call("remove", vec![ints(&[1, 2, 1]), Value::Int(1)]), ints(&[2, 1]));
        assert_eq!(call("pop", vec![ints(&[1, 2, 3])]), ints(&[1, 2]));
        assert_eq!(call("pop", vec![ints(&[1, 2, 3]), Value::Int(0)]), ints(&[2, 3]));
        assert_eq!(call("first", vec![ints(&[7, 8])]), Value::Int(7));
        assert_eq!(call("last", vec![ints(&[7, 8])]), Value::Int(8));
        assert_eq!(call("reverse", vec![ints(&[1, 2])]), ints(&[2, 1]));
        assert_eq!(call("sort", vec![ints(&[3, 1, 2])]), ints(&[1, 2, 3]));
        assert_eq!(call("slice", vec![ints(&[1, 2, 3, 4]), Value::Int(1), Value::Int(-1)]), ints(&[2, 3]));
        assert!(matches!(call_err("first", vec![ints(&[])]), ErrorKind::Value(_)));
        assert!(matches!(call_err("sort", vec![Value::List(vec![Value::Int(1), s("a")])]), ErrorKind::Type(_)));
        assert_eq!(call("repeat", vec![ints(&[1, 2]), Value::Int(2)]), ints(&[1, 2, 1, 2]));
        assert_eq!(call("repeat", vec![ints(&[1]), Value::Int(-3)]), ints(&[]));
        assert_eq!(call("range", vec![Value::Int(i64::MAX - 2), Value::Int(i64::MAX)]).to_string(),
                   format!("[{}, {}]", i64::MAX - 2, i64::MAX - 1));
    }

    #[test]
    fn oversized_results_are_value_errors() {
        let huge = Value::Int(i64::MAX);
        assert!(matches!(call_err("repeat", vec![s("abc"), huge.clone()]), ErrorKind::Value(_)));
        assert!(matches!(call_err("repeat", vec![ints(&[1]), huge.clone()]), ErrorKind::Value(_)));
        assert!(matches!(call_err("range", vec![Value::Int(1_000_000_000_000)]), ErrorKind::Value(_)));
        assert!(matches!(
            call_err("range", vec![Value::Int(i64::MIN), huge]),
            ErrorKind::Value(_)
        ));
        assert!(matches!(call_err("sleep", vec![Value::Float(1e300)]), ErrorKind::Value(_)));
        assert_eq!(call("sleep", vec![Value::Float(-1.0)]), Value::Nil);
    }

    #[test]
    fn dicts() {
        let d = Value::Dict(vec![(s("a"), Value::Int(1))]);
        let d2 = call("set", vec![d.clone(), s("b"), Value::Int(2)]);
        assert_eq!(call("keys", vec![d2.clone()]), Value::List(vec![s("a"), s("b")]));
        assert_eq!(call("values", vec![d2.clone()]), ints(&[1, 2]));
        assert_eq!(call("has_key", vec![d2.clone(), s("b")]), Value::Bool(true));
        assert_eq!(call("has_key", vec![d.clone(), s("b")]), Value::Bool(false));
        assert_eq!(call("get", vec![d2.clone(), s("z"), Value::Int(0)]), Value::Int(0));
        assert_eq!(call("get", vec![d2.clone(), s("z")]), Value::Nil);
        assert_eq!(call("remove", vec![d2, s("a")]), Value::Dict(vec![(s("b"), Value::Int(2))]));
    }

    #[test]
    fn random_is_seeded() {
        let mut a = TestHost::new();
        let mut b = TestHost::new();
        for _ in 0..20 {
            let x = call_with(&mut a, "randint", vec![Value::Int(1), Value::Int(6)]).unwrap();
            let y = call_with(&mut b, "randint", vec![Value::Int(1), Value::Int(6)]).unwrap();
            assert_eq!(x, y);
            assert!(matches!(x, Value::Int(n) if (1..=6).contains(&n)));
        }
        let r = call_with(&mut a, "random", vec![]).unwrap();
        assert!(matches!(r, Value::Float(x) if (0.0..1.0).contains(&x)));
        let c = call_with(&mut a, "choice", vec![ints(&[5])]).unwrap();
        assert_eq!(c, Value::Int(5));
        assert!(matches!(call_err("randint", vec![Value::Int(2), Value::Int(1)]), ErrorKind::Value(_)));
    }

    #[test]
    fn clock_comes_from_host() {
        assert_eq!(call("clock", vec![]), Value::Float(1.5));
        assert!(matches!(call("time", vec![]), Value::Float(t) if t > 0.0));
    }

    #[test]
    fn conversions() {
        assert_eq!(call("str", vec![Value::Float(5.0)]), s("5.0"));
        assert_eq!(call("int", vec![s(" 42 ")]), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]), Value::Int(-2));
        assert_eq!(call("float", vec![s("2.5")]), Value::Float(2.5));
        assert_eq!(call("bool", vec![ints(&[])]), Value::Bool(false));
        assert_eq!(call("type", vec![Value::Nil]), s("nil"));
        assert!(matches!(call_err("int", vec![s("abc")]), ErrorKind::Value(_)));
    }

    #[test]
    fn user_definitions_overwrite_builtins() {
        let mut reg = Registry::with_builtins();
        reg.define_user("len", vec!["x".into()], Rc::new(Vec::new()));
        assert!(matches!(reg.get("len"), Some(FunctionEntry::User { .. })));
        assert_eq!(reg.get("len").map(FunctionEntry::arity), Some(Arity::exactly(1)));
    }
}
