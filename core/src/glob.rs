// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Glob-style matching of dot-separated task-type namespaces against a
//! worker's declared capability patterns.
//!
//! `*` matches exactly one segment; `**` matches zero or more segments.
//! `sources.*` matches `sources.youtube` but not `sources.youtube.shorts`;
//! `sources.**` matches any depth under `sources`.

/// True if `task_type` is matched by `pattern`.
pub fn matches(pattern: &str, task_type: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let type_segments: Vec<&str> = task_type.split('.').collect();
    match_segments(&pattern_segments, &type_segments)
}

fn match_segments(pattern: &[&str], ty: &[&str]) -> bool {
    match pattern.first() {
        None => ty.is_empty(),
        Some(&"**") => {
            // ** consumes zero or more segments; try every split point.
            (0..=ty.len()).any(|n| match_segments(&pattern[1..], &ty[n..]))
        }
        Some(&"*") => match ty.first() {
            Some(_) => match_segments(&pattern[1..], &ty[1..]),
            None => false,
        },
        Some(literal) => match ty.first() {
            Some(segment) if segment == literal => match_segments(&pattern[1..], &ty[1..]),
            _ => false,
        },
    }
}

/// True if `task_type` matches at least one pattern in `capabilities`.
pub fn matches_any(capabilities: &[String], task_type: &str) -> bool {
    capabilities.iter().any(|pattern| matches(pattern, task_type))
}
