//! Integration tests for the sysc CLI: drives the actual compiled binary against small
//! JSON-AST fixtures and checks the assembly it prints.

use std::fs;
use std::process::Command;

use sysc_ast::{FnDecl, Module, Node, Type};
use sysc_common::Span;
use tempfile::TempDir;

fn fixture_returning(value: i32) -> Module {
    Module {
        functions: vec![FnDecl {
            name: "main".into(),
            params: vec![],
            ret: Type::Int,
            body: Node::Block {
                span: Span::dummy(),
                nodes: vec![Node::Return {
                    value: Some(Box::new(Node::Int { value, span: Span::dummy() })),
                    span: Span::dummy(),
                }],
            },
            span: Span::dummy(),
        }],
    }
}

fn write_fixture(dir: &TempDir, module: &Module) -> std::path::PathBuf {
    let path = dir.path().join("input.json");
    fs::write(&path, serde_json::to_string(module).unwrap()).unwrap();
    path
}

#[test]
fn arm_output_contains_a_global_main_label() {
    let dir = TempDir::new().unwrap();
    let input = write_fixture(&dir, &fixture_returning(0));

    let output = Command::new(env!("CARGO_BIN_EXE_sysc"))
        .arg(&input)
        .arg("--arm")
        .output()
        .expect("sysc should run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let asm = String::from_utf8(output.stdout).unwrap();
    assert!(asm.contains(".global main"));
    assert!(asm.contains("main:"));
}

#[test]
fn rv_output_writes_to_the_requested_file() {
    let dir = TempDir::new().unwrap();
    let input = write_fixture(&dir, &fixture_returning(7));
    let out_path = dir.path().join("out.s");

    let status = Command::new(env!("CARGO_BIN_EXE_sysc"))
        .arg(&input)
        .arg("--rv")
        .arg("-o")
        .arg(&out_path)
        .status()
        .expect("sysc should run");

    assert!(status.success());
    let asm = fs::read_to_string(&out_path).unwrap();
    assert!(asm.contains(".globl main"));
    assert!(asm.contains("ret"));
}

#[test]
fn malformed_input_exits_with_failure_not_a_panic() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.json");
    fs::write(&input, "not json").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_sysc")).arg(&input).output().expect("sysc should run");

    assert!(!output.status.success());
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());
}
