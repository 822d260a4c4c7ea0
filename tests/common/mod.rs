//! Common test utilities for the integration suites.

use std::process::{Command, Output};

use tessera::edsc::EdscContext;
use tessera::{Module, ScalarKind};

/// Run the `tessera` binary with `args`.
#[allow(dead_code)]
pub fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tessera"))
        .args(args)
        .env("TESSERA_LOG", "warn")
        .output()
        .expect("Failed to execute tessera")
}

/// Stdout of a successful CLI run.
#[allow(dead_code)]
pub fn cli_stdout(args: &[&str]) -> String {
    let output = run_cli(args);
    assert!(
        output.status.success(),
        "tessera {args:?} failed: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A module with one function `name() -> i32` returning `value`.
#[allow(dead_code)]
pub fn literal_module(name: &str, value: i64) -> Module {
    let mut m = Module::new();
    let i32_ty = m.scalar_type(ScalarKind::Int(32)).unwrap();
    let f = m.make_function(name, &[], &[i32_ty]).unwrap();

    let cx = EdscContext::new();
    let scope = cx.enter().unwrap();
    let mut e = m.emitter(&cx, f).unwrap();
    let c = e.bind_constant_int(32, value).unwrap();
    e.emit(cx.ret(&[c]).unwrap()).unwrap();
    drop(e);
    scope.exit();
    m
}
