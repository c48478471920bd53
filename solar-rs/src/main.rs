use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crossterm::style::Stylize;
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use solar::cli::{self, Command};
use solar::config::Config;
use solar::script::error::SolarError;
use solar::script::lexer::tokenize;
use solar::script::stmt::parse_program;
use solar::script::Interpreter;

#[derive(Debug, Error)]
enum Failure {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Solar(#[from] SolarError),
}

fn main() {
    let args = cli::parse_args();

    let (config, config_errors) = load_config(&args.command);
    init_logging(&config);
    for e in &config_errors {
        warn!("config: {e}");
    }

    if let Err(e) = run(args.command, &config) {
        report(&e);
        std::process::exit(1);
    }
}

fn load_config(command: &Command) -> (Config, Vec<String>) {
    let explicit = match command {
        Command::Run { config, .. } => config.clone(),
        _ => None,
    };
    let Some(path) = explicit.or_else(Config::locate) else {
        return (Config::default(), Vec::new());
    };
    match Config::load_file(&path) {
        Ok((config, errors)) => {
            let errors = errors.iter().map(|e| format!("{}: {e}", path.display())).collect();
            (config, errors)
        }
        Err(e) => (Config::default(), vec![format!("cannot read {}: {e}", path.display())]),
    }
}

/// `SOLAR_LOG` wins over the config file's `log`; the fallback is `warn`.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env("SOLAR_LOG")
        .or_else(|_| EnvFilter::try_new(config.log.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read(path: &Path) -> Result<String, Failure> {
    cli::read_source(path).map_err(|source| Failure::Read { path: path.to_owned(), source })
}

fn run(command: Command, config: &Config) -> Result<(), Failure> {
    match command {
        Command::Run { file, no_prelude, .. } => {
            let mut interp = Interpreter::new();
            interp.set_echo(true);
            interp.set_read_stdin(true);
            interp.set_max_call_depth(config.max_call_depth);
            attach_engines(&mut interp, config);

            if let Some(prelude) = config.prelude.as_deref().filter(|_| !no_prelude) {
                debug!(path = %prelude.display(), "running prelude");
                interp.run_source(&read(prelude)?)?;
            }
            interp.run_source(&read(&file)?)?;
        }
        Command::Check { file } => {
            parse_program(&read(&file)?)?;
            println!("{}: ok", file.display());
        }
        Command::Ast { file } => {
            for stmt in parse_program(&read(&file)?)? {
                println!("{stmt:#?}");
            }
        }
        Command::Tokens { file } => {
            for tok in tokenize(&read(&file)?)? {
                println!("{}:{}\t{}", tok.pos.line, tok.pos.column, tok.kind);
            }
        }
        Command::Version => println!("solar {}", env!("CARGO_PKG_VERSION")),
    }
    Ok(())
}

#[allow(unused_variables)]
fn attach_engines(interp: &mut Interpreter, config: &Config) {
    #[cfg(feature = "python")]
    if config.python {
        interp.add_engine(Box::new(solar::python::PythonEngine::new()));
        interp.add_resolver(Box::new(solar::python::PythonEngine::new()));
    }
    #[cfg(feature = "lua")]
    if config.lua {
        interp.add_engine(Box::new(solar::lua::LuaEngine::new()));
    }
}

fn report(e: &Failure) {
    let msg = match e {
        Failure::Solar(e) => format!("Oh noes! Solar threw an error: {e}"),
        Failure::Read { .. } => format!("solar: {e}"),
    };
    if std::io::stderr().is_terminal() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{msg}");
    }
}
