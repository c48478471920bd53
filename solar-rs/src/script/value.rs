//! Runtime value type for the Solar language.
//!
//! Integers and floats form a single numeric domain: integer arithmetic stays
//! integral until it overflows or meets a float, and `/` always produces a
//! float.  Containers are plain values (cloned on assignment); host objects
//! returned by imports and passthrough code are shared by reference.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::error::{ErrorKind, Result, SolarError};

// ── Host objects ──────────────────────────────────────────────────────────────

/// An object owned by the host runtime (an imported module, or a Python/Lua
/// value that has no Solar equivalent).
///
/// The interpreter stores and forwards these without looking inside; the
/// only operations are member lookup and member calls.
pub trait HostObject: fmt::Debug {
    /// Short type label, e.g. `"module"`.
    fn type_name(&self) -> &str;

    /// Name the object was created under (module path, Python type name…).
    fn name(&self) -> &str;

    /// Read a member (`math.pi`).  `None` if there is no such member.
    fn get_member(&self, member: &str) -> Option<Value>;

    /// Call a member (`math.sqrt(2)`).
    fn call_member(&self, member: &str, args: &[Value]) -> Result<Value, ErrorKind>;

    fn as_any(&self) -> &dyn Any;
}

pub type HostRef = Rc<dyn HostObject>;

// ── Value ─────────────────────────────────────────────────────────────────────

/// A Solar runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Insertion-ordered mapping.
    Dict(Vec<(Value, Value)>),
    /// Reference to a function in the registry, by name.
    Func(String),
    Host(HostRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| dict_get(b, k).is_some_and(|w| w == v))
            }
            (Value::Func(a), Value::Func(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => other.fmt_repr(f),
        }
    }
}

impl Value {
    /// Container-style rendering: strings are quoted.
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                // Integral floats keep one decimal so they read as floats.
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_repr(f)?;
                }
                write!(f, "]")
            }
            Value::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    k.fmt_repr(f)?;
                    write!(f, ": ")?;
                    v.fmt_repr(f)?;
                }
                write!(f, "}}")
            }
            Value::Func(name) => write!(f, "<function {name}>"),
            Value::Host(h) => write!(f, "<{} {}>", h.type_name(), h.name()),
        }
    }

    /// Truthiness: `false`, `nil`, zero, and empty strings/lists/dicts are
    /// falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            Value::Func(_) | Value::Host(_) => true,
        }
    }

    /// Name of the type, as returned by `type()`.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Func(_) => "function",
            Value::Host(h) => h.type_name(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    fn numeric_op(
        &self,
        rhs: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(match int_op(*a, *b) {
                Some(n) => Value::Int(n),
                None => Value::Float(float_op(*a as f64, *b as f64)),
            }),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
                _ => Err(mismatch(op, self, rhs)),
            },
        }
    }

    pub fn arith_add(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                Ok(Value::List(out))
            }
            (Value::Str(_), _) | (_, Value::Str(_)) => Err(SolarError::type_err(format!(
                "cannot add {} and {}; convert with str() first",
                self.type_name(),
                rhs.type_name()
            ))),
            _ => self.numeric_op(rhs, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn arith_sub(&self, rhs: &Value) -> Result<Value> {
        self.numeric_op(rhs, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn arith_mul(&self, rhs: &Value) -> Result<Value> {
        self.numeric_op(rhs, "*", i64::checked_mul, |a, b| a * b)
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value> {
        match (self.as_f64(), rhs.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(SolarError::value_err("division by zero")),
            (Some(a), Some(b)) => Ok(Value::Float(a / b)),
            _ => Err(mismatch("/", self, rhs)),
        }
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value> {
        if rhs.as_f64() == Some(0.0) && self.is_number() {
            return Err(SolarError::value_err("modulo by zero"));
        }
        self.numeric_op(rhs, "%", i64::checked_rem_euclid, f64::rem_euclid)
    }

    pub fn arith_neg(&self) -> Result<Value> {
        match self {
            Value::Int(n) => Ok(n.checked_neg().map_or(Value::Float(-(*n as f64)), Value::Int)),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(SolarError::type_err(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }

    /// Ordering for `< <= > >=`: two numbers or two strings.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                _ => Err(SolarError::type_err(format!(
                    "cannot compare {} with {}",
                    self.type_name(),
                    rhs.type_name()
                ))),
            },
        }
    }

    // ── Indexing ──────────────────────────────────────────────────────────────

    /// `self[index]` for lists, strings and dicts.
    pub fn index(&self, index: &Value) -> Result<Value> {
        match (self, index) {
            (Value::List(items), Value::Int(i)) => {
                let idx = resolve_index(*i, items.len())?;
                Ok(items[idx].clone())
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = resolve_index(*i, chars.len())?;
                Ok(Value::Str(chars[idx].to_string()))
            }
            (Value::Dict(pairs), key) => dict_get(pairs, key)
                .cloned()
                .ok_or_else(|| SolarError::value_err(format!("key {} not found", key.repr()))),
            (Value::List(_) | Value::Str(_), other) => Err(SolarError::type_err(format!(
                "{} index must be int, not {}",
                self.type_name(),
                other.type_name()
            ))),
            (other, _) => Err(SolarError::type_err(format!(
                "{} is not indexable",
                other.type_name()
            ))),
        }
    }

    /// Rendering used inside containers and error messages (strings quoted).
    pub fn repr(&self) -> String {
        struct Repr<'a>(&'a Value);
        impl fmt::Display for Repr<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt_repr(f)
            }
        }
        Repr(self).to_string()
    }
}

fn mismatch(op: &str, l: &Value, r: &Value) -> SolarError {
    SolarError::type_err(format!(
        "unsupported operand types for {op}: {} and {}",
        l.type_name(),
        r.type_name()
    ))
}

/// Map a possibly negative index onto `0..len`.
pub fn resolve_index(i: i64, len: usize) -> Result<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as usize >= len {
        return Err(SolarError::value_err(format!(
            "index {i} out of range for length {len}"
        )));
    }
    Ok(idx as usize)
}

/// Look up `key` in a dict's pair list.
pub fn dict_get<'a>(pairs: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Insert or replace `key` in a dict's pair list, keeping insertion order.
pub fn dict_set(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(1e20).to_string(), "100000000000000000000.0");
        assert_eq!(Value::Float(-3e16).to_string(), "-30000000000000000.0");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Str("hello".into()).to_string(), "hello");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Nil.to_string(), "nil");
    }

    #[test]
    fn display_containers_quote_strings() {
        let v = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
        assert_eq!(v.to_string(), "[1, \"a\"]");
        let d = Value::Dict(vec![(Value::Str("k".into()), Value::Float(0.5))]);
        assert_eq!(d.to_string(), "{\"k\": 0.5}");
    }

    #[test]
    fn truthiness() {
        for falsy in [
            Value::Nil,
            Value::Bool(false),
            Value::Int(0),
            Value::Float(0.0),
            Value::Str(String::new()),
            Value::List(vec![]),
            Value::Dict(vec![]),
        ] {
            assert!(!falsy.truthy(), "{falsy:?} should be falsy");
        }
        assert!(Value::Str("0".into()).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(Value::List(vec![Value::Nil]).truthy());
    }

    #[test]
    fn int_arithmetic_stays_int() {
        let a = Value::Int(10);
        let b = Value::Int(3);
        assert_eq!(a.arith_add(&b).unwrap(), Value::Int(13));
        assert!(matches!(a.arith_sub(&b).unwrap(), Value::Int(7)));
        assert!(matches!(a.arith_mul(&b).unwrap(), Value::Int(30)));
        assert!(matches!(a.arith_rem(&b).unwrap(), Value::Int(1)));
    }

    #[test]
    fn division_promotes_to_float() {
        assert!(matches!(Value::Int(10).arith_div(&Value::Int(4)).unwrap(), Value::Float(x) if x == 2.5));
        assert!(matches!(Value::Int(10).arith_div(&Value::Int(2)).unwrap(), Value::Float(x) if x == 5.0));
    }

    #[test]
    fn mixing_with_float_promotes() {
        assert!(matches!(Value::Int(7).arith_add(&Value::Float(2.0)).unwrap(), Value::Float(x) if x == 9.0));
    }

    #[test]
    fn overflow_promotes_to_float() {
        let v = Value::Int(i64::MAX).arith_add(&Value::Int(1)).unwrap();
        assert!(matches!(v, Value::Float(_)));
    }

    #[test]
    fn division_by_zero_is_value_error() {
        let e = Value::Int(1).arith_div(&Value::Int(0)).unwrap_err();
        assert!(matches!(e.kind, ErrorKind::Value(_)));
        let e = Value::Int(1).arith_rem(&Value::Int(0)).unwrap_err();
        assert!(matches!(e.kind, ErrorKind::Value(_)));
    }

    #[test]
    fn string_plus_number_is_type_error() {
        let e = Value::Str("a".into()).arith_add(&Value::Int(1)).unwrap_err();
        assert!(matches!(e.kind, ErrorKind::Type(_)));
        assert_eq!(
            Value::Str("a".into()).arith_add(&Value::Str("b".into())).unwrap(),
            Value::Str("ab".into())
        );
    }

    #[test]
    fn int_float_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Str("2".into()));
    }

    #[test]
    fn dict_equality_ignores_order() {
        let a = Value::Dict(vec![(Value::Int(1), Value::Int(2)), (Value::Int(3), Value::Int(4))]);
        let b = Value::Dict(vec![(Value::Int(3), Value::Int(4)), (Value::Int(1), Value::Int(2))]);
        assert_eq!(a, b);
    }

    #[test]
    fn compare_rejects_mixed_types() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)).unwrap(), Ordering::Less);
        assert_eq!(
            Value::Str("b".into()).compare(&Value::Str("a".into())).unwrap(),
            Ordering::Greater
        );
        assert!(Value::Int(1).compare(&Value::Str("a".into())).is_err());
    }

    #[test]
    fn indexing() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.index(&Value::Int(0)).unwrap(), Value::Int(1));
        assert_eq!(list.index(&Value::Int(-1)).unwrap(), Value::Int(3));
        assert!(matches!(list.index(&Value::Int(3)).unwrap_err().kind, ErrorKind::Value(_)));
        assert!(matches!(
            list.index(&Value::Str("x".into())).unwrap_err().kind,
            ErrorKind::Type(_)
        ));
        assert_eq!(Value::Str("héllo".into()).index(&Value::Int(1)).unwrap(), Value::Str("é".into()));
    }

    #[test]
    fn dict_set_replaces_in_place() {
        let mut pairs = vec![(Value::Str("a".into()), Value::Int(1))];
        dict_set(&mut pairs, Value::Str("b".into()), Value::Int(2));
        dict_set(&mut pairs, Value::Str("a".into()), Value::Int(9));
        assert_eq!(pairs[0].1, Value::Int(9));
        assert_eq!(pairs.len(), 2);
    }
}
