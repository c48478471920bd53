//! Command-line argument parsing.
//!
//! Usage:
//!   solar run [--no-prelude] [--config <path>] <file|->
//!   solar check <file|->
//!   solar ast <file|->
//!   solar tokens <file|->
//!   solar version

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

// ── Public types ──────────────────────────────────────────────────────────────

/// Solar - a small scripting language with Python and Lua passthrough
#[derive(Debug, Parser)]
#[command(name = "solar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a Solar program (`-` reads it from stdin)
    Run {
        file: PathBuf,

        /// Skip the prelude script named in the config file
        #[arg(long)]
        no_prelude: bool,

        /// Config file to use instead of the default search
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Lex and parse a program without running it
    Check { file: PathBuf },

    /// Print the parsed statement tree
    Ast { file: PathBuf },

    /// Print the token stream
    Tokens { file: PathBuf },

    /// Print the version
    Version,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()`; clap exits with usage on error.
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("solar").chain(argv.iter().copied()))
}

/// Read program text from a path, or from stdin when the path is `-`.
pub fn read_source(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut src = String::new();
        std::io::stdin().read_to_string(&mut src)?;
        Ok(src)
    } else {
        std::fs::read_to_string(path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_with_flags() {
        let cli = parse_argv(&["run", "--no-prelude", "--config", "rc", "game.solar"]).unwrap();
        match cli.command {
            Command::Run { file, no_prelude, config } => {
                assert_eq!(file, PathBuf::from("game.solar"));
                assert!(no_prelude);
                assert_eq!(config, Some(PathBuf::from("rc")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn run_from_stdin() {
        let cli = parse_argv(&["run", "-"]).unwrap();
        assert!(matches!(cli.command, Command::Run { ref file, no_prelude: false, config: None } if file == Path::new("-")));
    }

    #[test]
    fn inspection_commands() {
        assert!(matches!(parse_argv(&["check", "a.solar"]).unwrap().command, Command::Check { .. }));
        assert!(matches!(parse_argv(&["ast", "a.solar"]).unwrap().command, Command::Ast { .. }));
        assert!(matches!(parse_argv(&["tokens", "a.solar"]).unwrap().command, Command::Tokens { .. }));
        assert!(matches!(parse_argv(&["version"]).unwrap().command, Command::Version));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_argv(&["run"]).is_err());
        assert!(parse_argv(&[]).is_err());
        assert!(parse_argv(&["explode"]).is_err());
    }

    #[test]
    fn read_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.solar");
        std::fs::write(&path, "print 1\n").unwrap();
        assert_eq!(read_source(&path).unwrap(), "print 1\n");
    }
}
