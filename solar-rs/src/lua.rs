//! Optional Lua 5.4 passthrough via the `mlua` crate.
//!
//! Enabled with the `lua` Cargo feature:
//! ```text
//! cargo build --features lua
//! cargo test  --features lua
//! ```
//!
//! A `lua:` … `end_lua` block runs with its own environment table.  Visible
//! Solar bindings are set in it as globals; Lua's standard library stays
//! reachable through the environment's `__index`.  Pure built-ins are exposed
//! as the `funcs` table:
//!
//! ```text
//! lua:
//!     n = funcs.len(name) * 2
//! end_lua
//! ```
//!
//! Lists become sequences (1-based), dicts become tables.  A table whose keys
//! are exactly `1..n` comes back as a list; any other table comes back as a
//! dict.  Functions and userdata come back as host objects.

#[cfg(feature = "lua")]
pub use lua_impl::{LuaEngine, LuaHost};

#[cfg(feature = "lua")]
mod lua_impl {
    use std::any::Any;
    use std::fmt;
    use std::rc::Rc;

    use mlua::prelude::*;

    use crate::bridge::{FunctionTable, Namespace, PassthroughEngine, PassthroughOutcome};
    use crate::script::error::ErrorKind;
    use crate::script::value::{HostObject, Value};

    // ── LuaHost ───────────────────────────────────────────────────────────

    /// A Lua value with no Solar equivalent.
    pub struct LuaHost {
        lua: Lua,
        value: LuaValue,
    }

    impl fmt::Debug for LuaHost {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("LuaHost").field("type", &self.value.type_name()).finish()
        }
    }

    impl HostObject for LuaHost {
        fn type_name(&self) -> &str {
            self.value.type_name()
        }

        fn name(&self) -> &str {
            "lua"
        }

        fn get_member(&self, member: &str) -> Option<Value> {
            match &self.value {
                LuaValue::Table(t) => t.get::<LuaValue>(member).ok().map(|v| from_lua(&self.lua, &v)),
                _ => None,
            }
        }

        fn call_member(&self, member: &str, args: &[Value]) -> Result<Value, ErrorKind> {
            let func = match &self.value {
                LuaValue::Table(t) => t.get::<LuaValue>(member).ok(),
                _ => None,
            };
            let Some(LuaValue::Function(func)) = func else {
                return Err(ErrorKind::Name(format!("lua.{member}")));
            };
            let args = args
                .iter()
                .map(|v| to_lua(&self.lua, v))
                .collect::<LuaResult<Vec<_>>>()
                .map_err(lua_error)?;
            let ret: LuaMultiValue =
                func.call(LuaMultiValue::from_vec(args)).map_err(lua_error)?;
            Ok(ret.iter().next().map_or(Value::Nil, |v| from_lua(&self.lua, v)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn lua_error(e: LuaError) -> ErrorKind {
        ErrorKind::Passthrough { language: "lua".to_owned(), message: e.to_string() }
    }

    // ── Value conversion ──────────────────────────────────────────────────

    fn to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
        Ok(match value {
            Value::Nil => LuaValue::Nil,
            Value::Bool(b) => LuaValue::Boolean(*b),
            Value::Int(n) => LuaValue::Integer(*n),
            Value::Float(x) => LuaValue::Number(*x),
            Value::Str(s) => LuaValue::String(lua.create_string(s)?),
            Value::Func(name) => LuaValue::String(lua.create_string(name)?),
            Value::List(items) => {
                let t = lua.create_table()?;
                for (i, item) in items.iter().enumerate() {
                    t.raw_set(i as i64 + 1, to_lua(lua, item)?)?;
                }
                LuaValue::Table(t)
            }
            Value::Dict(pairs) => {
                let t = lua.create_table()?;
                for (k, v) in pairs {
                    t.raw_set(to_lua(lua, k)?, to_lua(lua, v)?)?;
                }
                LuaValue::Table(t)
            }
            Value::Host(h) => match h.as_any().downcast_ref::<LuaHost>() {
                Some(host) => host.value.clone(),
                None => {
                    return Err(LuaError::RuntimeError(format!(
                        "{} `{}` cannot be passed to Lua",
                        h.type_name(),
                        h.name()
                    )))
                }
            },
        })
    }

    fn from_lua(lua: &Lua, value: &LuaValue) -> Value {
        match value {
            LuaValue::Nil => Value::Nil,
            LuaValue::Boolean(b) => Value::Bool(*b),
            LuaValue::Integer(n) => Value::Int(*n),
            LuaValue::Number(x) => Value::Float(*x),
            LuaValue::String(s) => Value::Str(s.to_string_lossy().to_string()),
            LuaValue::Table(t) => table_to_value(lua, t),
            other => Value::Host(Rc::new(LuaHost { lua: lua.clone(), value: other.clone() })),
        }
    }

    fn table_to_value(lua: &Lua, t: &LuaTable) -> Value {
        let pairs: Vec<(LuaValue, LuaValue)> =
            t.clone().pairs::<LuaValue, LuaValue>().filter_map(Result::ok).collect();
        let len = t.raw_len();
        let is_sequence = pairs.len() == len
            && pairs
                .iter()
                .all(|(k, _)| matches!(k, LuaValue::Integer(i) if *i >= 1 && *i as usize <= len));
        if is_sequence {
            let items = (1..=len)
                .map(|i| t.raw_get::<LuaValue>(i as i64).map_or(Value::Nil, |v| from_lua(lua, &v)))
                .collect();
            return Value::List(items);
        }
        Value::Dict(pairs.iter().map(|(k, v)| (from_lua(lua, k), from_lua(lua, v))).collect())
    }

    // ── LuaEngine ─────────────────────────────────────────────────────────

    /// A Lua 5.4 state that runs `lua:` blocks.  Globals a block defines
    /// stay in its own environment; the shared state only keeps the standard
    /// library.
    pub struct LuaEngine {
        lua: Lua,
    }

    impl Default for LuaEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    impl LuaEngine {
        pub fn new() -> Self {
            LuaEngine { lua: Lua::new() }
        }

        fn environment(&self, namespace: &Namespace, functions: &FunctionTable) -> LuaResult<LuaTable> {
            let lua = &self.lua;
            let env = lua.create_table()?;
            let meta = lua.create_table()?;
            meta.set("__index", lua.globals())?;
            let _ = env.set_metatable(Some(meta));

            for (name, value) in namespace {
                match value {
                    Value::Func(_) => continue,
                    Value::Host(h) if h.as_any().downcast_ref::<LuaHost>().is_none() => continue,
                    _ => env.raw_set(name.as_str(), to_lua(lua, value)?)?,
                }
            }

            let funcs = lua.create_table()?;
            for info in functions.iter() {
                let Some(f) = info.pure else { continue };
                let (name, arity) = (info.name.clone(), info.arity);
                let wrapped = lua.create_function(move |lua, args: LuaMultiValue| {
                    let args: Vec<Value> = args.iter().map(|a| from_lua(lua, a)).collect();
                    let result = arity
                        .check(&name, args.len())
                        .and_then(|()| f(&args))
                        .map_err(|e| LuaError::RuntimeError(e.to_string()))?;
                    to_lua(lua, &result)
                })?;
                funcs.raw_set(info.name.as_str(), wrapped)?;
            }
            env.raw_set("funcs", funcs)?;
            Ok(env)
        }

        fn collect(&self, env: &LuaTable) -> Namespace {
            let mut out = Namespace::new();
            for (key, value) in env.clone().pairs::<LuaValue, LuaValue>().filter_map(Result::ok) {
                let LuaValue::String(name) = key else { continue };
                let name = name.to_string_lossy().to_string();
                if name == "funcs" {
                    continue;
                }
                out.insert(name, from_lua(&self.lua, &value));
            }
            out
        }
    }

    impl PassthroughEngine for LuaEngine {
        fn language(&self) -> &str {
            "lua"
        }

        fn execute(
            &mut self,
            code: &str,
            namespace: &Namespace,
            functions: &FunctionTable,
        ) -> PassthroughOutcome {
            let env = match self.environment(namespace, functions) {
                Ok(env) => env,
                Err(e) => {
                    return PassthroughOutcome {
                        namespace: namespace.clone(),
                        error: Some(e.to_string()),
                    }
                }
            };
            let error = self
                .lua
                .load(code)
                .set_name("=lua block")
                .set_environment(env.clone())
                .exec()
                .err()
                .map(|e| e.to_string());
            PassthroughOutcome { namespace: self.collect(&env), error }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "lua"))]
mod tests {
    use super::lua_impl::*;
    use crate::bridge::{FunctionTable, Namespace, PassthroughEngine};
    use crate::script::builtins::Registry;
    use crate::script::value::Value;
    use crate::script::Interpreter;

    fn ns(pairs: &[(&str, Value)]) -> Namespace {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn block_sees_and_sets_bindings() {
        let mut eng = LuaEngine::new();
        let before = ns(&[("a", Value::Int(2)), ("name", Value::Str("sol".into()))]);
        let out = eng.execute("z = a * 10\nname = string.upper(name)", &before, &FunctionTable::default());
        assert_eq!(out.error, None);
        assert_eq!(out.namespace.get("z"), Some(&Value::Int(20)));
        assert_eq!(out.namespace.get("name"), Some(&Value::Str("SOL".into())));
    }

    #[test]
    fn tables_convert_back() {
        let mut eng = LuaEngine::new();
        let out = eng.execute("xs = {1, 2, 3}\nd = {k = true}", &Namespace::new(), &FunctionTable::default());
        assert_eq!(
            out.namespace.get("xs"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
        assert_eq!(
            out.namespace.get("d"),
            Some(&Value::Dict(vec![(Value::Str("k".into()), Value::Bool(true))]))
        );
    }

    #[test]
    fn error_keeps_partial_namespace() {
        let mut eng = LuaEngine::new();
        let out = eng.execute("w = 3\nerror('boom')", &Namespace::new(), &FunctionTable::default());
        assert!(out.error.as_deref().is_some_and(|e| e.contains("boom")));
        assert_eq!(out.namespace.get("w"), Some(&Value::Int(3)));
    }

    #[test]
    fn blocks_do_not_share_globals() {
        let mut eng = LuaEngine::new();
        eng.execute("leaked = 1", &Namespace::new(), &FunctionTable::default());
        let out = eng.execute("seen = leaked", &Namespace::new(), &FunctionTable::default());
        assert_eq!(out.namespace.get("seen"), None);
    }

    #[test]
    fn pure_builtins_are_callable() {
        let mut eng = LuaEngine::new();
        let table = FunctionTable::from_registry(&Registry::with_builtins());
        let out = eng.execute("n = funcs.len('abcd')", &Namespace::new(), &table);
        assert_eq!(out.namespace.get("n"), Some(&Value::Int(4)));
    }

    #[test]
    fn interpreter_round_trip() {
        let mut interp = Interpreter::new();
        interp.add_engine(Box::new(LuaEngine::new()));
        interp.run_source("let n = 4\nlua:\n  z = n + 1\nend_lua\nprint z").unwrap();
        assert_eq!(interp.output, vec!["5"]);
    }
}
