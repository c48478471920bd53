//! Scoped variable store.
//!
//! Scopes live in an arena indexed by [`ScopeId`]; each frame points at its
//! parent, and frame 0 is the global scope.  Released frames go on a free list
//! and are reused by the next push.

use std::collections::{BTreeMap, HashMap};

use super::value::Value;

pub type ScopeId = usize;

/// The global scope.
pub const GLOBAL: ScopeId = 0;

/// Name → value snapshot handed to passthrough engines.
pub type Namespace = BTreeMap<String, Value>;

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, Value>,
    parent: Option<ScopeId>,
}

#[derive(Debug)]
pub struct Environment {
    frames: Vec<Option<Frame>>,
    free: Vec<ScopeId>,
    current: ScopeId,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment { frames: vec![Some(Frame::default())], free: Vec::new(), current: GLOBAL }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    fn frame(&self, id: ScopeId) -> Option<&Frame> {
        self.frames.get(id).and_then(Option::as_ref)
    }

    fn frame_mut(&mut self, id: ScopeId) -> Option<&mut Frame> {
        self.frames.get_mut(id).and_then(Option::as_mut)
    }

    /// Allocate a frame with the given parent and make it current.
    ///
    /// Returns the previously current scope, to be handed back to [`pop`].
    ///
    /// [`pop`]: Environment::pop
    fn push(&mut self, parent: ScopeId) -> ScopeId {
        let frame = Frame { vars: HashMap::new(), parent: Some(parent) };
        let id = match self.free.pop() {
            Some(id) => {
                self.frames[id] = Some(frame);
                id
            }
            None => {
                self.frames.push(Some(frame));
                self.frames.len() - 1
            }
        };
        std::mem::replace(&mut self.current, id)
    }

    /// Enter a block scope nested in the current one (loop iterations).
    pub fn push_child(&mut self) -> ScopeId {
        self.push(self.current)
    }

    /// Enter a function-call frame; its parent is always the global scope.
    pub fn push_call(&mut self) -> ScopeId {
        self.push(GLOBAL)
    }

    /// Release the current frame and return to `saved`.
    pub fn pop(&mut self, saved: ScopeId) {
        let id = self.current;
        if id != GLOBAL {
            self.frames[id] = None;
            self.free.push(id);
        }
        self.current = saved;
    }

    /// Innermost scope (from the current one outwards) that binds `name`.
    fn find(&self, name: &str) -> Option<ScopeId> {
        let mut id = Some(self.current);
        while let Some(cur) = id {
            let frame = self.frame(cur)?;
            if frame.vars.contains_key(name) {
                return Some(cur);
            }
            id = frame.parent;
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let id = self.find(name)?;
        self.frame(id)?.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Search-before-create: rebind `name` where it is visible, otherwise
    /// create it in the current scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        let target = self.find(name).unwrap_or(self.current);
        if let Some(frame) = self.frame_mut(target) {
            frame.vars.insert(name.to_owned(), value);
        }
    }

    /// Create (or overwrite) `name` in the current scope.
    pub fn define(&mut self, name: &str, value: Value) {
        let cur = self.current;
        if let Some(frame) = self.frame_mut(cur) {
            frame.vars.insert(name.to_owned(), value);
        }
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frame_mut(GLOBAL) {
            frame.vars.insert(name.to_owned(), value);
        }
    }

    /// Every binding visible from the current scope; inner bindings shadow
    /// outer ones.
    pub fn visible(&self) -> Namespace {
        let mut chain = Vec::new();
        let mut id = Some(self.current);
        while let Some(cur) = id {
            let Some(frame) = self.frame(cur) else { break };
            chain.push(frame);
            id = frame.parent;
        }
        let mut out = Namespace::new();
        for frame in chain.into_iter().rev() {
            for (k, v) in &frame.vars {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    /// Number of allocated frames, the global one included.
    pub fn live_scopes(&self) -> usize {
        self.frames.len() - self.free.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get_global() {
        let mut env = Environment::new();
        env.define("x", Value::Int(1));
        assert_eq!(env.get("x"), Some(&Value::Int(1)));
        assert_eq!(env.get("y"), None);
    }

    #[test]
    fn assign_rebinds_outer() {
        let mut env = Environment::new();
        env.define("n", Value::Int(0));
        let saved = env.push_child();
        env.assign("n", Value::Int(5));
        env.assign("tmp", Value::Int(9));
        env.pop(saved);
        assert_eq!(env.get("n"), Some(&Value::Int(5)));
        assert!(!env.contains("tmp"));
    }

    #[test]
    fn define_shadows() {
        let mut env = Environment::new();
        env.define("i", Value::Str("outer".into()));
        let saved = env.push_child();
        env.define("i", Value::Int(0));
        assert_eq!(env.get("i"), Some(&Value::Int(0)));
        env.pop(saved);
        assert_eq!(env.get("i"), Some(&Value::Str("outer".into())));
    }

    #[test]
    fn call_frame_cannot_see_caller_locals() {
        let mut env = Environment::new();
        env.define("g", Value::Int(1));
        let outer = env.push_child();
        env.define("local", Value::Int(2));
        let inner = env.push_call();
        assert!(env.contains("g"));
        assert!(!env.contains("local"));
        env.pop(inner);
        assert!(env.contains("local"));
        env.pop(outer);
    }

    #[test]
    fn frames_are_reused() {
        let mut env = Environment::new();
        for _ in 0..10 {
            let saved = env.push_child();
            env.define("x", Value::Nil);
            env.pop(saved);
        }
        assert_eq!(env.live_scopes(), 1);
        let a = env.push_child();
        let b = env.push_child();
        assert_eq!(env.live_scopes(), 3);
        env.pop(b);
        env.pop(a);
        assert_eq!(env.live_scopes(), 1);
    }

    #[test]
    fn reused_frame_starts_empty() {
        let mut env = Environment::new();
        let saved = env.push_child();
        env.define("stale", Value::Int(1));
        env.pop(saved);
        let saved = env.push_child();
        assert!(!env.contains("stale"));
        env.pop(saved);
    }

    #[test]
    fn visible_applies_shadowing() {
        let mut env = Environment::new();
        env.define("a", Value::Int(1));
        env.define("b", Value::Int(2));
        let saved = env.push_child();
        env.define("b", Value::Int(20));
        let ns = env.visible();
        assert_eq!(ns.get("a"), Some(&Value::Int(1)));
        assert_eq!(ns.get("b"), Some(&Value::Int(20)));
        env.pop(saved);
    }
}
