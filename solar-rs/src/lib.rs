//! Solar: a small scripting language with passthrough blocks for Python and
//! Lua, native module imports and a UI/game command surface.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod frontend;
pub mod lua;
pub mod python;
pub mod script;
