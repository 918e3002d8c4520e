//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the core library and the CLI MUST NOT block the
//! runtime.
//! **Required**: `tokio::io`, `tokio::net`, async `reqwest`, not `std::fs`,
//! `std::net`, `reqwest::blocking` or std stdin/stdout.
//!
//! Blocking calls in plain `fn`s are allowed: config loading runs once before
//! the first await, and logging setup runs before the runtime does any work.

use architectural_enforcement::{enclosing_function, production_sources, Enclosing};

/// Patterns that block the calling thread
const BLOCKING_PATTERNS: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("use std::fs", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("use std::net", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
];

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (line_number, code) in file.production_lines() {
            for (pattern, what) in BLOCKING_PATTERNS {
                if !code.contains(pattern) {
                    continue;
                }
                let is_import = code.trim_start().starts_with("use ");
                if is_import || enclosing_function(&file.lines, line_number - 1) == Enclosing::Async
                {
                    violations.push(file.violation(line_number, what));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O found in async code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::io::stdin() / tokio::io::stdout()");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - reqwest::Client::post().send().await");
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (config loading, logging setup)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

/// The only sync file read is the config loader
#[test]
fn test_config_loader_is_sync() {
    let config = production_sources()
        .into_iter()
        .find(|f| f.path.ends_with("core/src/config.rs"))
        .expect("config.rs not found");

    let (line_number, _) = config
        .production_lines()
        .find(|(_, code)| code.contains("std::fs::"))
        .expect("config loader should read the file with std::fs");
    assert_eq!(
        enclosing_function(&config.lines, line_number - 1),
        Enclosing::Sync
    );
}

#[test]
fn test_detector_flags_pub_async_fn() {
    let code = [
        "pub async fn load(&self) {",
        "    let text = std::fs::read_to_string(\"x\")?;",
        "}",
    ];
    assert_eq!(enclosing_function(&code, 1), Enclosing::Async);
}

#[test]
fn test_detector_allows_sync_fn() {
    let code = [
        "fn main() {",
        "    let contents = std::fs::read_to_string(\"config.toml\")?;",
        "}",
    ];
    assert_eq!(enclosing_function(&code, 1), Enclosing::Sync);
}
