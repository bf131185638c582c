//! Failure counts from suite logs.
//!
//! Each reader returns `None` when the log carries no recognizable summary,
//! which the aggregator treats as a failure rather than a pass.

use crate::domain::models::ResultFormat;

/// Read the failure count of a finished run.
pub fn parse_failure_count(log: &str, format: ResultFormat, exit_code: i32) -> Option<u32> {
    match format {
        ResultFormat::Cargo => parse_cargo(log),
        ResultFormat::Pytest => parse_pytest(log),
        ResultFormat::Jest => parse_jest(log),
        ResultFormat::Go => parse_go(log),
        ResultFormat::ExitCode => Some(u32::from(exit_code != 0)),
        ResultFormat::Auto => parse_cargo(log)
            .or_else(|| parse_pytest(log))
            .or_else(|| parse_jest(log))
            .or_else(|| parse_go(log)),
    }
}

/// Extract a numeric count preceding a keyword from a summary line.
///
/// E.g., from "10 passed; 2 failed" extract 2 for keyword "failed".
fn extract_count(line: &str, separators: &[char], keyword: &str) -> Option<u32> {
    for part in line.split(separators) {
        let trimmed = part.trim();
        if !trimmed.contains(keyword) {
            continue;
        }
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        for (i, word) in words.iter().enumerate() {
            if word.starts_with(keyword) && i > 0 {
                if let Ok(n) = words[i - 1].parse::<u32>() {
                    return Some(n);
                }
            }
        }
    }
    None
}

/// `test result: FAILED. 1 passed; 2 failed; ...`, summed across test binaries.
fn parse_cargo(log: &str) -> Option<u32> {
    let mut total = None;
    for line in log.lines() {
        let trimmed = line.trim();
        if let Some(summary) = trimmed.strip_prefix("test result:") {
            let failed = extract_count(summary, &[';', '.'], "failed").unwrap_or(0);
            total = Some(total.unwrap_or(0) + failed);
        }
    }
    total
}

/// `==== 2 failed, 3 passed, 1 error in 0.12s ====`
fn parse_pytest(log: &str) -> Option<u32> {
    let summary = log.lines().rev().map(str::trim).find(|line| {
        line.starts_with('=')
            && line.ends_with('=')
            && line.contains(" in ")
            && ["passed", "failed", "error", "no tests ran"]
                .iter()
                .any(|k| line.contains(k))
    })?;
    let inner = summary.trim_matches('=').trim();
    let failed = extract_count(inner, &[','], "failed").unwrap_or(0);
    let errors = extract_count(inner, &[','], "error").unwrap_or(0);
    Some(failed + errors)
}

/// `Tests:       1 failed, 3 passed, 4 total`
fn parse_jest(log: &str) -> Option<u32> {
    let summary = log
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Tests:"))?;
    Some(extract_count(summary, &[','], "failed").unwrap_or(0))
}

/// `--- FAIL: TestX` for top-level tests, `FAIL\tpkg` for failed packages.
fn parse_go(log: &str) -> Option<u32> {
    let mut seen_summary = false;
    let mut failed_tests = 0;
    let mut failed_packages = 0;
    for line in log.lines() {
        if line.starts_with("--- FAIL:") {
            failed_tests += 1;
            seen_summary = true;
        } else if line.starts_with("FAIL\t") || line.starts_with("FAIL ") {
            failed_packages += 1;
            seen_summary = true;
        } else if line.starts_with("ok  \t") || line.starts_with("ok ") || line == "PASS" {
            seen_summary = true;
        }
    }
    seen_summary.then(|| if failed_tests > 0 { failed_tests } else { failed_packages })
}
