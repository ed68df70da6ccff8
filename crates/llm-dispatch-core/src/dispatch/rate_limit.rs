//! Rate-limit detection over captured output.

use crate::domain::DispatchResult;

/// Returns `true` when a failed run's output matches any configured pattern.
///
/// Matching is case-insensitive substring containment over stdout and
/// stderr joined by `\n`, so a pattern never matches across the two streams.
/// Successful runs and empty pattern lists never match.
pub fn is_rate_limited(result: &DispatchResult, patterns: &[String]) -> bool {
    if result.exit_code == 0 {
        return false;
    }
    matches_any(&result.stdout, &result.stderr, patterns)
}

fn matches_any(stdout: &str, stderr: &str, patterns: &[String]) -> bool {
    let patterns: Vec<String> = patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| p.to_lowercase())
        .collect();
    if patterns.is_empty() {
        return false;
    }

    let haystack = format!("{stdout}\n{stderr}").to_lowercase();
    patterns.iter().any(|p| haystack.contains(p.as_str()))
}
