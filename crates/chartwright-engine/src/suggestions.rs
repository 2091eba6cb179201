//! Fuzzy matching for error help text
//!
//! Unknown function names and unresolved template names are compared against
//! what is actually available using Levenshtein distance.

use crate::functions::BUILTINS;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Helm-style helpers that are commonly expected but intentionally absent
const UNSUPPORTED_HINTS: &[(&str, &str)] = &[
    ("lookup", "cluster lookups are not available while rendering"),
    ("randAlphaNum", "rendering is deterministic; pass generated values in through values"),
    ("now", "rendering is deterministic; pass timestamps in through values"),
];

/// Find closest matches from a list of candidates, best first
pub fn find_closest_matches<'a>(
    input: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    max_results: usize,
) -> Vec<&'a str> {
    let mut matches: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = strsim::levenshtein(input, candidate);
            (distance > 0 && distance <= MAX_SUGGESTION_DISTANCE).then_some((distance, candidate))
        })
        .collect();

    matches.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    matches.dedup_by(|a, b| a.1 == b.1);
    matches.truncate(max_results);
    matches.into_iter().map(|(_, candidate)| candidate).collect()
}

fn did_you_mean(matches: &[&str]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let quoted: Vec<String> = matches.iter().map(|m| format!("`{}`", m)).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

/// Suggest corrections for an unknown function
pub fn suggest_unknown_function(name: &str) -> Option<String> {
    if let Some((_, hint)) = UNSUPPORTED_HINTS.iter().find(|(n, _)| *n == name) {
        return Some(format!("`{}` is not supported: {}", name, hint));
    }

    // Case-only typos (`toyaml`, `ToYaml`) are the most common mistake
    if let Some(exact) = BUILTINS.keys().find(|k| k.eq_ignore_ascii_case(name)) {
        return Some(format!("Did you mean `{}`?", exact));
    }

    did_you_mean(&find_closest_matches(name, BUILTINS.keys().copied(), 3))
}

/// Suggest corrections for an unresolved template name
pub fn suggest_template_name<'a>(
    name: &str,
    available: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let available: Vec<&str> = available.into_iter().collect();
    if available.is_empty() {
        return Some("No named templates are defined; declare one with {{ define \"name\" }}".to_string());
    }
    did_you_mean(&find_closest_matches(name, available, 3))
}
