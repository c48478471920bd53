//! Optional Python passthrough and imports via the `pyo3` crate.
//!
//! Enabled with the `python` Cargo feature:
//! ```text
//! cargo build --features python
//! cargo test  --features python
//! ```
//!
//! # Passthrough blocks
//!
//! A `python:` … `end_python` block runs in a fresh globals dict seeded with
//! every visible Solar binding that has a Python equivalent.  The registry's
//! pure built-ins are reachable through a `funcs` dict:
//!
//! ```text
//! python:
//!     shout = funcs["upper"](name)
//! end_python
//! ```
//!
//! # Imports
//!
//! [`PythonEngine`] also resolves `contain` paths through Python's import
//! machinery, so `contain os.path` binds `path` to the real module.

#[cfg(feature = "python")]
pub use python_impl::{PyHost, PythonEngine};

#[cfg(feature = "python")]
mod python_impl {
    use std::any::Any;
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::sync::OnceLock;

    use pyo3::exceptions::{PyModuleNotFoundError, PyRuntimeError};
    use pyo3::prelude::*;
    use pyo3::types::{PyBool, PyCFunction, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple};
    use tracing::debug;

    use crate::bridge::{
        FunctionTable, ImportFailure, ImportResolver, Namespace, PassthroughEngine,
        PassthroughOutcome,
    };
    use crate::script::error::ErrorKind;
    use crate::script::value::{HostObject, HostRef, Value};

    static PYTHON_INIT: OnceLock<()> = OnceLock::new();

    // ── PyHost ────────────────────────────────────────────────────────────

    /// A Python object with no Solar equivalent (modules, functions, class
    /// instances).
    #[derive(Debug)]
    pub struct PyHost {
        obj: PyObject,
        type_name: String,
        name: String,
    }

    impl PyHost {
        fn wrap(obj: &Bound<'_, PyAny>) -> HostRef {
            let type_name = obj
                .get_type()
                .getattr("__name__")
                .and_then(|n| n.extract::<String>())
                .unwrap_or_else(|_| "object".to_owned());
            let name = obj
                .getattr("__name__")
                .and_then(|n| n.extract::<String>())
                .unwrap_or_else(|_| type_name.clone());
            Rc::new(PyHost { obj: obj.clone().unbind(), type_name, name })
        }

        pub fn object(&self) -> &PyObject {
            &self.obj
        }
    }

    impl HostObject for PyHost {
        fn type_name(&self) -> &str {
            &self.type_name
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn get_member(&self, member: &str) -> Option<Value> {
            Python::with_gil(|py| {
                let attr = self.obj.bind(py).getattr(member).ok()?;
                Some(from_py(&attr))
            })
        }

        fn call_member(&self, member: &str, args: &[Value]) -> Result<Value, ErrorKind> {
            Python::with_gil(|py| {
                let attr = self
                    .obj
                    .bind(py)
                    .getattr(member)
                    .map_err(|_| ErrorKind::Name(format!("{}.{member}", self.name)))?;
                let args = args
                    .iter()
                    .map(|v| to_py(py, v))
                    .collect::<PyResult<Vec<_>>>()
                    .map_err(|e| python_error(py, e))?;
                let result = attr
                    .call1(PyTuple::new_bound(py, args))
                    .map_err(|e| python_error(py, e))?;
                Ok(from_py(&result))
            })
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn python_error(py: Python<'_>, e: PyErr) -> ErrorKind {
        ErrorKind::Passthrough { language: "python".to_owned(), message: describe(py, &e) }
    }

    fn describe(py: Python<'_>, e: &PyErr) -> String {
        let kind = e
            .get_type_bound(py)
            .getattr("__name__")
            .and_then(|n| n.extract::<String>())
            .unwrap_or_else(|_| "Exception".to_owned());
        format!("{kind}: {}", e.value_bound(py))
    }

    // ── Value conversion ──────────────────────────────────────────────────

    /// Solar → Python.  Function references become their name.
    fn to_py(py: Python<'_>, value: &Value) -> PyResult<PyObject> {
        Ok(match value {
            Value::Nil => py.None(),
            Value::Bool(b) => b.to_object(py),
            Value::Int(n) => n.to_object(py),
            Value::Float(x) => x.to_object(py),
            Value::Str(s) => s.to_object(py),
            Value::Func(name) => name.to_object(py),
            Value::List(items) => {
                let list = PyList::empty_bound(py);
                for item in items {
                    list.append(to_py(py, item)?)?;
                }
                list.into_py(py)
            }
            Value::Dict(pairs) => {
                let dict = PyDict::new_bound(py);
                for (k, v) in pairs {
                    dict.set_item(to_py(py, k)?, to_py(py, v)?)?;
                }
                dict.into_py(py)
            }
            Value::Host(h) => match h.as_any().downcast_ref::<PyHost>() {
                Some(host) => host.obj.clone_ref(py),
                None => {
                    return Err(PyRuntimeError::new_err(format!(
                        "{} `{}` cannot be passed to Python",
                        h.type_name(),
                        h.name()
                    )))
                }
            },
        })
    }

    /// Python → Solar.  Anything without a Solar equivalent becomes a host
    /// object.
    fn from_py(obj: &Bound<'_, PyAny>) -> Value {
        if obj.is_none() {
            return Value::Nil;
        }
        if let Ok(b) = obj.downcast::<PyBool>() {
            return Value::Bool(b.is_true());
        }
        if obj.is_instance_of::<PyLong>() {
            return match obj.extract::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => Value::Float(obj.extract::<f64>().unwrap_or(f64::INFINITY)),
            };
        }
        if obj.is_instance_of::<PyFloat>() {
            if let Ok(x) = obj.extract::<f64>() {
                return Value::Float(x);
            }
        }
        if obj.is_instance_of::<PyString>() {
            if let Ok(s) = obj.extract::<String>() {
                return Value::Str(s);
            }
        }
        if let Ok(list) = obj.downcast::<PyList>() {
            return Value::List(list.iter().map(|v| from_py(&v)).collect());
        }
        if let Ok(tuple) = obj.downcast::<PyTuple>() {
            return Value::List(tuple.iter().map(|v| from_py(&v)).collect());
        }
        if let Ok(dict) = obj.downcast::<PyDict>() {
            return Value::Dict(dict.iter().map(|(k, v)| (from_py(&k), from_py(&v))).collect());
        }
        Value::Host(PyHost::wrap(obj))
    }

    // ── PythonEngine ──────────────────────────────────────────────────────

    /// Runs `python:` blocks and resolves `contain` paths through Python.
    ///
    /// The CPython interpreter is initialised at most once per process; each
    /// engine only keeps its own import cache.
    pub struct PythonEngine {
        modules: HashMap<String, HostRef>,
    }

    impl Default for PythonEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    impl PythonEngine {
        pub fn new() -> Self {
            PYTHON_INIT.get_or_init(pyo3::prepare_freethreaded_python);
            PythonEngine { modules: HashMap::new() }
        }

        fn seed(
            py: Python<'_>,
            globals: &Bound<'_, PyDict>,
            namespace: &Namespace,
            functions: &FunctionTable,
        ) -> PyResult<()> {
            for (name, value) in namespace {
                match value {
                    // Skipped names come back "deleted", which leaves them alone.
                    Value::Func(_) => continue,
                    Value::Host(h) if h.as_any().downcast_ref::<PyHost>().is_none() => continue,
                    _ => globals.set_item(name, to_py(py, value)?)?,
                }
            }

            let funcs = PyDict::new_bound(py);
            for info in functions.iter() {
                let Some(f) = info.pure else { continue };
                let (name, arity) = (info.name.clone(), info.arity);
                let wrapped = PyCFunction::new_closure_bound(
                    py,
                    None,
                    None,
                    move |args: &Bound<'_, PyTuple>, _kwargs: Option<&Bound<'_, PyDict>>| -> PyResult<PyObject> {
                        let py = args.py();
                        let args: Vec<Value> = args.iter().map(|a| from_py(&a)).collect();
                        arity
                            .check(&name, args.len())
                            .and_then(|()| f(&args))
                            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
                            .and_then(|v| to_py(py, &v))
                    },
                )?;
                funcs.set_item(&info.name, wrapped)?;
            }
            globals.set_item("funcs", funcs)?;
            Ok(())
        }

        fn collect(
            py: Python<'_>,
            globals: &Bound<'_, PyDict>,
            before: &Namespace,
        ) -> Namespace {
            let mut out = Namespace::new();
            for (key, obj) in globals.iter() {
                let Ok(name) = key.extract::<String>() else { continue };
                if name.starts_with("__") || name == "funcs" {
                    continue;
                }
                // Keep the original handle when Python left the object alone.
                let value = match before.get(&name) {
                    Some(old @ Value::Host(h))
                        if h
                            .as_any()
                            .downcast_ref::<PyHost>()
                            .is_some_and(|p| p.obj.bind(py).is(&obj)) =>
                    {
                        old.clone()
                    }
                    _ => from_py(&obj),
                };
                out.insert(name, value);
            }
            out
        }
    }

    impl PassthroughEngine for PythonEngine {
        fn language(&self) -> &str {
            "python"
        }

        fn execute(
            &mut self,
            code: &str,
            namespace: &Namespace,
            functions: &FunctionTable,
        ) -> PassthroughOutcome {
            Python::with_gil(|py| {
                let globals = PyDict::new_bound(py);
                if let Err(e) = Self::seed(py, &globals, namespace, functions) {
                    return PassthroughOutcome {
                        namespace: namespace.clone(),
                        error: Some(describe(py, &e)),
                    };
                }
                let error = py.run_bound(code, Some(&globals), None).err().map(|e| describe(py, &e));
                PassthroughOutcome { namespace: Self::collect(py, &globals, namespace), error }
            })
        }
    }

    impl ImportResolver for PythonEngine {
        fn resolve(&mut self, path: &str) -> Result<HostRef, ImportFailure> {
            if let Some(module) = self.modules.get(path) {
                return Ok(Rc::clone(module));
            }
            let module = Python::with_gil(|py| match py.import_bound(path) {
                Ok(module) => Ok(PyHost::wrap(module.as_any())),
                Err(e) if e.is_instance_of::<PyModuleNotFoundError>(py) => {
                    Err(ImportFailure::NotFound(path.to_owned()))
                }
                Err(e) => Err(ImportFailure::Failed(describe(py, &e))),
            })?;
            debug!(module = path, "imported python module");
            self.modules.insert(path.to_owned(), Rc::clone(&module));
            Ok(module)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "python"))]
mod tests {
    use std::rc::Rc;

    use super::python_impl::*;
    use crate::bridge::{FunctionTable, ImportFailure, ImportResolver, Namespace, PassthroughEngine};
    use crate::script::builtins::Registry;
    use crate::script::error::ErrorKind;
    use crate::script::value::Value;
    use crate::script::Interpreter;

    fn ns(pairs: &[(&str, Value)]) -> Namespace {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn block_sees_and_sets_bindings() {
        let mut eng = PythonEngine::new();
        let before = ns(&[("a", Value::Int(2)), ("xs", Value::List(vec![Value::Int(1)]))]);
        let out = eng.execute("z = a * 10\nxs.append(5)", &before, &FunctionTable::default());
        assert_eq!(out.error, None);
        assert_eq!(out.namespace.get("z"), Some(&Value::Int(20)));
        assert_eq!(out.namespace.get("xs"), Some(&Value::List(vec![Value::Int(1), Value::Int(5)])));
    }

    #[test]
    fn error_keeps_partial_namespace() {
        let mut eng = PythonEngine::new();
        let out = eng.execute("w = 3\nraise ValueError('boom')", &Namespace::new(), &FunctionTable::default());
        assert_eq!(out.error.as_deref(), Some("ValueError: boom"));
        assert_eq!(out.namespace.get("w"), Some(&Value::Int(3)));
    }

    #[test]
    fn pure_builtins_are_callable() {
        let mut eng = PythonEngine::new();
        let table = FunctionTable::from_registry(&Registry::with_builtins());
        let out = eng.execute("s = funcs['upper']('hi')", &Namespace::new(), &table);
        assert_eq!(out.namespace.get("s"), Some(&Value::Str("HI".into())));
        assert!(out.namespace.get("funcs").is_none());
    }

    #[test]
    fn import_is_cached() {
        let mut eng = PythonEngine::new();
        let a = eng.resolve("math").unwrap();
        let b = eng.resolve("math").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.call_member("sqrt", &[Value::Int(9)]), Ok(Value::Float(3.0)));
        assert!(matches!(
            eng.resolve("no_such_module_here"),
            Err(ImportFailure::NotFound(_))
        ));
    }

    #[test]
    fn interpreter_round_trip() {
        let mut interp = Interpreter::new();
        interp.add_engine(Box::new(PythonEngine::new()));
        interp.add_resolver(Box::new(PythonEngine::new()));
        interp
            .run_source("contain json\nlet n = 4\npython:\n  z = n + 1\nend_python\nprint z, json.dumps([1])")
            .unwrap();
        assert_eq!(interp.output, vec!["5 [1]"]);
        let err = interp.run_source("python:\n  1 / 0\nend_python").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Passthrough { .. }));
    }
}
