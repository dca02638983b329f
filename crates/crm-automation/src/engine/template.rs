//! `{{path}}` placeholder substitution for message, email and task text.
//!
//! Paths resolve against the run's collected data, with an optional `data.`
//! prefix. Unresolved placeholders are left in place. `context.` paths would
//! need a live entity lookup that is not implemented, so they are rejected
//! with an error rather than rendered as literal text.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::steps::StepError;

use super::evaluator::{coerce_string, lookup_path};

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
            .expect("placeholder pattern is valid")
    })
}

/// Resolve a dotted path inside collected data. `data.` is optional.
pub fn lookup_data<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("data.").unwrap_or(path);
    match path.split_once('.') {
        Some((head, rest)) => lookup_path(data.get(head)?, rest),
        None => data.get(path),
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, data: &Map<String, Value>) -> Result<String, StepError> {
    let pattern = placeholder_pattern();

    if let Some(captures) = pattern
        .captures_iter(template)
        .find(|c| c[1].starts_with("context."))
    {
        return Err(StepError::Template(format!(
            "context placeholders are not supported: {}",
            &captures[0]
        )));
    }

    let rendered = pattern.replace_all(template, |captures: &Captures| {
        match lookup_data(data, &captures[1]) {
            Some(value) if !value.is_null() => coerce_string(value),
            _ => captures[0].to_string(),
        }
    });

    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Map<String, Value> {
        json!({
            "contactName": "Sam",
            "amount": 1200,
            "deal": {"title": "Renewal", "tags": ["vip"]},
            "missing": null,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_render_with_and_without_prefix() {
        assert_eq!(render("Hi {{data.contactName}}", &data()).unwrap(), "Hi Sam");
        assert_eq!(render("Hi {{ contactName }}!", &data()).unwrap(), "Hi Sam!");
    }

    #[test]
    fn test_render_nested_and_non_string_values() {
        let out = render("{{deal.title}} for {{amount}} ({{deal.tags}})", &data()).unwrap();
        assert_eq!(out, "Renewal for 1200 ([\"vip\"])");
    }

    #[test]
    fn test_unresolved_placeholder_kept() {
        let out = render("Hello {{data.unknown}} and {{missing}}", &data()).unwrap();
        assert_eq!(out, "Hello {{data.unknown}} and {{missing}}");
    }

    #[test]
    fn test_context_placeholder_rejected() {
        let err = render("Hi {{context.firstName}}", &data()).unwrap_err();
        assert!(matches!(err, StepError::Template(_)));
        assert!(err.to_string().contains("{{context.firstName}}"));
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(render("no placeholders", &data()).unwrap(), "no placeholders");
    }
}
