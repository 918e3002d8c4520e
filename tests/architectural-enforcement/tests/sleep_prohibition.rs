//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep to wait for events.
//! **Exceptions**: the push channel's delay between reconnect attempts, and
//! periodic work driven by `tokio::time::interval`.

use architectural_enforcement::{production_sources, strip_comment};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (line_number, code) in file.production_lines() {
            if !(code.contains("::sleep(") || code.contains(".sleep(")) {
                continue;
            }
            let idx = line_number - 1;
            if is_reconnect_delay(&file.lines, idx) || is_interval_pattern(&file.lines, idx) {
                continue;
            }
            violations.push(file.violation(line_number, "sleep"));
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Delay between push channel reconnect attempts");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

/// Sleep scheduled as part of the reconnect loop
fn is_reconnect_delay<S: AsRef<str>>(lines: &[S], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(15);
    let end = (current_idx + 5).min(lines.len());

    lines[start..end].iter().any(|line| {
        let line = strip_comment(line.as_ref()).to_lowercase();
        line.contains("reconnect") || line.contains("attempt")
    })
}

/// Sleep next to an interval-driven loop
fn is_interval_pattern<S: AsRef<str>>(lines: &[S], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(20);
    let end = (current_idx + 5).min(lines.len());

    lines[start..end]
        .iter()
        .any(|line| line.as_ref().contains("interval.tick()") || line.as_ref().contains("tokio::time::interval"))
}

#[test]
fn test_reconnect_delay_detection() {
    let code = [
        "shared.attempts.store(attempts + 1, Ordering::SeqCst);",
        "tracing::info!(\"Scheduling reconnect\");",
        "tokio::select! {",
        "    () = tokio::time::sleep(delay) => {}",
        "}",
    ];
    assert!(is_reconnect_delay(&code, 3));
}

#[test]
fn test_polling_sleep_is_not_excused() {
    let code = [
        "async fn wait_for_answer() {",
        "    while !done() {",
        "        tokio::time::sleep(Duration::from_millis(10)).await;",
        "    }",
        "}",
    ];
    assert!(!is_reconnect_delay(&code, 2));
    assert!(!is_interval_pattern(&code, 2));
}
