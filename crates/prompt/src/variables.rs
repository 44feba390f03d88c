//! Placeholder scanning.
//!
//! A placeholder is `{{name}}` where `name` matches `[A-Za-z0-9_]+`. No
//! whitespace is allowed inside the braces.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

pub(crate) static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is valid")
});

/// Distinct variable names referenced by `text`, in order of first appearance.
///
/// # Example
/// ```
/// use promptly_prompt::extract_variables;
///
/// let vars = extract_variables("{{a}} then {{b}} then {{a}}");
/// assert_eq!(vars, vec!["a", "b"]);
/// ```
pub fn extract_variables(text: &str) -> Vec<String> {
    collect_variables([text])
}

/// Union of the variables of several fragments, in order of first appearance.
pub fn collect_variables<'a, I>(fragments: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut names = Vec::new();

    for fragment in fragments {
        for captures in PLACEHOLDER_RE.captures_iter(fragment) {
            let name = &captures[1];
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }

    names
}
