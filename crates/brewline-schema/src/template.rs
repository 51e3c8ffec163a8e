//! `{{key}}` substitution for templated manifests.
//!
//! A templated manifest carries markers such as `{{version}}` and
//! `{{sha256}}`. Rendering must resolve every marker; the manifest parser
//! rejects any that survive.

use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use thiserror::Error;

pub(crate) static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]*)\s*\}\}").expect("valid placeholder regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unresolved template placeholders: {}", .0.join(", "))]
    Unresolved(Vec<String>),
}

/// Returns true if `value` still contains a `{{...}}` marker.
pub fn contains_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Sorted, deduplicated keys of every marker in `input`.
pub fn placeholders(input: &str) -> Vec<String> {
    let keys: BTreeSet<String> = PLACEHOLDER
        .captures_iter(input)
        .map(|c| c[1].to_owned())
        .collect();
    keys.into_iter().collect()
}

/// Replace every `{{key}}` in `input` with `vars[key]`.
///
/// Fails with the full list of keys that have no value.
pub fn render_template(
    input: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let missing: Vec<String> = placeholders(input)
        .into_iter()
        .filter(|k| !vars.contains_key(k))
        .collect();
    if !missing.is_empty() {
        return Err(TemplateError::Unresolved(missing));
    }

    let rendered = PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}
