#![allow(dead_code)]
use std::path::Path;

use monty::ast::Stmt;
use monty::resolver::{Resolution, Resolver};
use monty::{lexer, parser};
use test_support::load_cases;

/// `(label, source)` for every case tagged as a benchmark workload.
pub fn workloads() -> Vec<(String, String)> {
    let cases = load_cases(Path::new("tests/programs")).expect("load cases");
    cases
        .into_iter()
        .filter(|case| case.spec.bench.enabled)
        .map(|case| {
            let source = case.source().expect("read workload");
            (case.name, source)
        })
        .collect()
}

pub fn load_program(source: &str) -> (Vec<Stmt>, Resolution) {
    let scanned = lexer::tokenize(source);
    assert!(!scanned.has_errors(), "lex errors: {:?}", scanned.errors);
    let parsed = parser::parse_tokens(scanned.tokens);
    assert!(!parsed.has_errors(), "parse errors: {:?}", parsed.errors);
    let statements = parsed.into_statements();
    let resolution = Resolver::new().resolve(&statements);
    assert!(!resolution.has_errors(), "resolve errors: {:?}", resolution.errors);
    (statements, resolution)
}
