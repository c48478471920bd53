//! End-to-end tests that run the built `solar` binary.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::NamedTempFile;

fn solar() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_solar"));
    // Keep the user's own config and log filter out of the way.
    cmd.env("SOLAR_CONFIG", "/dev/null").env_remove("SOLAR_LOG");
    cmd
}

fn script(src: &str) -> NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".solar").tempfile().unwrap();
    f.write_all(src.as_bytes()).unwrap();
    f
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn run_prints_output() {
    let f = script("let x = 6\nprint x * 7\nprint \"done\"\n");
    let out = solar().arg("run").arg(f.path()).output().unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "42\ndone\n");
}

#[test]
fn runtime_error_banner_and_exit_code() {
    let f = script("print \"before\"\nprint missing\n");
    let out = solar().arg("run").arg(f.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out), "before\n");
    let err = stderr(&out);
    assert!(err.contains("Oh noes! Solar threw an error:"), "{err}");
    assert!(err.contains("line 2"), "{err}");
    assert!(err.contains("NameError"), "{err}");
}

#[test]
fn parse_error_runs_nothing() {
    let f = script("print \"hi\"\nif true:\n  print \"x\"\n");
    let out = solar().arg("run").arg(f.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out), "");
    assert!(stderr(&out).contains("ParseError"));
}

#[test]
fn run_reads_stdin_and_input() {
    let mut child = solar()
        .args(["run", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"print \"from stdin\"\nprint input()\n")
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    assert_eq!(stdout(&out), "from stdin\nnil\n");
}

#[test]
fn prelude_from_config() {
    let prelude = script("let greeting = \"hey\"\n");
    let mut rc = tempfile::NamedTempFile::new().unwrap();
    writeln!(rc, "prelude = {}", prelude.path().display()).unwrap();
    let main = script("print greeting\n");

    let out = solar()
        .arg("run")
        .arg("--config")
        .arg(rc.path())
        .arg(main.path())
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out), "hey\n");

    let out = solar()
        .args(["run", "--no-prelude", "--config"])
        .arg(rc.path())
        .arg(main.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn config_depth_limit() {
    let mut rc = tempfile::NamedTempFile::new().unwrap();
    writeln!(rc, "max_call_depth = 5").unwrap();
    let main = script("solar_def down(n): return down(n + 1) end\ndown(0)\n");
    let out = solar().arg("run").arg("--config").arg(rc.path()).arg(main.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("RecursionError: call depth exceeded 5"));
}

#[test]
fn check_ast_and_tokens() {
    let f = script("let a = 1\n");
    let out = solar().arg("check").arg(f.path()).output().unwrap();
    assert!(out.status.success());
    assert!(stdout(&out).ends_with(": ok\n"));

    let out = solar().arg("ast").arg(f.path()).output().unwrap();
    assert!(stdout(&out).contains("Let"));

    let out = solar().arg("tokens").arg(f.path()).output().unwrap();
    let text = stdout(&out);
    assert!(text.starts_with("1:1\t"), "{text}");
    assert_eq!(text.lines().count(), 6, "{text}");
}

#[test]
fn version() {
    let out = solar().arg("version").output().unwrap();
    assert_eq!(stdout(&out), format!("solar {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_file() {
    let out = solar().args(["run", "/nonexistent/prog.solar"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("cannot read"));
}
