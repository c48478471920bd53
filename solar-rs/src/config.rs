//! `solarrc` configuration file parser.
//!
//! One setting per line:
//!
//! | Key | Value |
//! |-----|-------|
//! | `log = <filter>` | default `tracing` filter, e.g. `solar=debug` |
//! | `prelude = <path>` | Solar script run before every program |
//! | `max_call_depth = <n>` | nesting limit for user-function calls |
//! | `python = on\|off` | attach the Python engine (when compiled in) |
//! | `lua = on\|off` | attach the Lua engine (when compiled in) |
//!
//! Lines starting with `#` or `;` are comments.  Unknown keys and bad values
//! are reported but never stop the rest of the file from loading.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::script::interp::DEFAULT_MAX_CALL_DEPTH;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log: Option<String>,
    pub prelude: Option<PathBuf>,
    pub max_call_depth: usize,
    pub python: bool,
    pub lua: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log: None,
            prelude: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            python: true,
            lua: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config text.  Returns the config and every problem found.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError { line: lineno, message: format!("expected `key = value`, got `{line}`") });
                continue;
            };
            if let Err(message) = config.apply(key.trim(), unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Where to look for the config file: `$SOLAR_CONFIG`, then `solarrc` in
    /// the platform config directory, then `./.solarrc`.  `None` if none of
    /// them exists.
    pub fn locate() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("SOLAR_CONFIG") {
            return Some(PathBuf::from(path));
        }
        let user = ProjectDirs::from("", "", "solar").map(|d| d.config_dir().join("solarrc"));
        user.into_iter()
            .chain(std::iter::once(PathBuf::from(".solarrc")))
            .find(|p| p.is_file())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "log" => self.log = Some(value.to_owned()),
            "prelude" => self.prelude = Some(PathBuf::from(value)),
            "max_call_depth" => {
                self.max_call_depth = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("max_call_depth must be a positive integer, got `{value}`"))?;
            }
            "python" => self.python = parse_bool(key, value)?,
            "lua" => self.lua = parse_bool(key, value)?,
            other => return Err(format!("unknown setting `{other}`")),
        }
        Ok(())
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("{key} must be on or off, got `{value}`")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
