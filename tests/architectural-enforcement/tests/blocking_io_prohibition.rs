//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Code on the pipeline path MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::io`, `tokio::net`, not `std::fs`, `std::net`
//!
//! `config.rs` is exempt: the config file is read once, before any
//! pipeline is assembled.

use architectural_enforcement::scan;

const EXEMPT: &[&str] = &["config.rs"];

fn blocking_io_rule(code: &str) -> Option<&'static str> {
    if code.contains("std::fs") {
        Some("Blocking file I/O")
    } else if code.contains("std::net") {
        Some("Blocking network I/O")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O")
    } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
        Some("Blocking stdin/stdout")
    } else if code.contains("std::io::Read") || code.contains("std::io::BufRead") {
        Some("Blocking read trait")
    } else {
        None
    }
}

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan(EXEMPT, blocking_io_rule);

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::File::open().await");
        eprintln!("  - tokio::io::stdin(), tokio::io::stdout()");
        eprintln!("  - tokio::io::AsyncBufRead, tokio::io::AsyncWrite");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_blocking_io_rule_detection() {
    assert_eq!(
        blocking_io_rule("let text = std::fs::read_to_string(path)?;"),
        Some("Blocking file I/O")
    );
    assert_eq!(
        blocking_io_rule("let input = std::io::stdin();"),
        Some("Blocking stdin/stdout")
    );
    assert_eq!(blocking_io_rule(".with_writer(std::io::stderr)"), None);
    assert_eq!(blocking_io_rule("let file = tokio::fs::File::open(path).await?;"), None);
}
