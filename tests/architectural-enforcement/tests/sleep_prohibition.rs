//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Library and CLI code MUST NOT sleep. A pump only moves when
//! its consumer pulls; anything that needs to wait awaits the producer, a
//! channel or a cancellation token instead.
//! **Exceptions**: Test code (timing a slow branch is fine there)

use architectural_enforcement::scan;

fn sleep_rule(code: &str) -> Option<&'static str> {
    if code.contains("thread::sleep") {
        Some("Blocking sleep")
    } else if code.contains("time::sleep") || code.contains("sleep_until") {
        Some("Async sleep")
    } else {
        None
    }
}

/// Test that production code does not contain sleep calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(&[], sleep_rule);

    if !violations.is_empty() {
        eprintln!("\n❌ Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ Instead:");
        eprintln!("  - Await the upstream stream or channel");
        eprintln!("  - Select on a CancellationToken");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_sleep_rule_detection() {
    assert_eq!(
        sleep_rule("    std::thread::sleep(Duration::from_millis(5));"),
        Some("Blocking sleep")
    );
    assert_eq!(
        sleep_rule("tokio::time::sleep(delay).await;"),
        Some("Async sleep")
    );
    assert_eq!(sleep_rule("let item = upstream.next().await;"), None);
}
