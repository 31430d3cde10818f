//! `{{var}}` prompt templates.
//!
//! `{{config.path}}` resolves from the TOML tree at load time. Any other name
//! is a runtime variable filled per request. `\{{` is a literal `{{` and stays
//! escaped until the runtime pass.

use std::collections::HashMap;

use crate::error::{ResearchError, ResearchResult};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// Text with escapes already removed.
    Literal(String),
    Var(String),
}

fn parse(template: &str) -> ResearchResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("\\{{") {
            literal.push_str("{{");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("{{") {
            let end = after.find("}}").ok_or_else(|| {
                let head: String = after.chars().take(40).collect();
                ResearchError::Template(format!("Unclosed template variable: {{{{{head}"))
            })?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Var(after[..end].trim().to_string()));
            rest = &after[end + 2..];
        } else {
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                literal.push(ch);
            }
            rest = chars.as_str();
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn escape(text: &str) -> String {
    text.replace("{{", "\\{{")
}

/// Resolve `{{config.*}}` variables from the TOML value tree.
/// Runtime variables are left in place.
pub fn resolve_config_vars(template: &str, toml_value: &toml::Value) -> ResearchResult<String> {
    let mut result = String::with_capacity(template.len());

    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => result.push_str(&escape(&text)),
            Segment::Var(name) => match name.strip_prefix("config.") {
                Some(path) => {
                    let value = lookup_toml_path(toml_value, path).ok_or_else(|| {
                        ResearchError::Template(format!("Config variable not found: {{{{{name}}}}}"))
                    })?;
                    result.push_str(&escape(&toml_value_to_string(value)));
                }
                None => {
                    result.push_str("{{");
                    result.push_str(&name);
                    result.push_str("}}");
                }
            },
        }
    }

    Ok(result)
}

/// Fill runtime `{{var}}` placeholders and unescape `\{{`.
///
/// Unknown names are left as `{{name}}`. Values are inserted verbatim and
/// never re-scanned.
pub fn resolve_runtime_vars(template: &str, vars: &HashMap<&str, &str>) -> String {
    let Ok(segments) = parse(template) else {
        return template.replace("\\{{", "{{");
    };

    let mut result = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Var(name) => match vars.get(name.as_str()) {
                Some(value) => result.push_str(value),
                None => {
                    result.push_str("{{");
                    result.push_str(&name);
                    result.push_str("}}");
                }
            },
        }
    }
    result
}

/// Check every `{{...}}` is a resolvable `config.*` path or an allowed runtime variable.
pub fn validate_template(
    template: &str,
    toml_value: &toml::Value,
    allowed_runtime: &[&str],
) -> ResearchResult<()> {
    for segment in parse(template)? {
        let Segment::Var(name) = segment else {
            continue;
        };
        if let Some(path) = name.strip_prefix("config.") {
            if lookup_toml_path(toml_value, path).is_none() {
                return Err(ResearchError::Template(format!(
                    "Config variable not found: {{{{{name}}}}}"
                )));
            }
        } else if !allowed_runtime.contains(&name.as_str()) {
            return Err(ResearchError::Template(format!(
                "Unknown template variable: {{{{{name}}}}}. Allowed runtime vars: {allowed_runtime:?}"
            )));
        }
    }
    Ok(())
}

/// Walk the TOML value tree by dotted path (e.g., "analyst.focus").
fn lookup_toml_path<'a>(value: &'a toml::Value, path: &str) -> Option<&'a toml::Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn toml_value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Array(arr) => arr
            .iter()
            .map(toml_value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        toml::Value::Table(_) => "[table]".to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_toml() -> toml::Value {
        toml::from_str(
            r#"
            [analyst]
            focus = "equity markets"
            regions = ["US", "EU"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_config_vars_and_keeps_runtime_vars() {
        let toml = test_toml();
        let result = resolve_config_vars(
            "Focus on {{config.analyst.focus}} in {{ config.analyst.regions }} for {{query}}",
            &toml,
        )
        .unwrap();
        assert_eq!(result, "Focus on equity markets in US, EU for {{query}}");
    }

    #[test]
    fn resolves_runtime_vars() {
        let result = resolve_runtime_vars(
            "Year: {{current_year}}, Query: {{query}}, Other: {{other}}",
            &HashMap::from([("current_year", "2026"), ("query", "ACME")]),
        );
        assert_eq!(result, "Year: 2026, Query: ACME, Other: {{other}}");
    }

    #[test]
    fn escaped_braces_survive_both_passes() {
        let toml = test_toml();
        let loaded = resolve_config_vars(r#"Return \{{"query": "x"}} for {{query}}"#, &toml).unwrap();
        let filled = resolve_runtime_vars(&loaded, &HashMap::from([("query", "ACME")]));
        assert_eq!(filled, r#"Return {{"query": "x"}} for ACME"#);
    }

    #[test]
    fn runtime_values_are_not_rescanned() {
        let result = resolve_runtime_vars(
            "Content: {{content}}",
            &HashMap::from([("content", "{{query}} appears in the page")]),
        );
        assert_eq!(result, "Content: {{query}} appears in the page");
    }

    #[test]
    fn errors_on_missing_config_var() {
        assert!(resolve_config_vars("{{config.nonexistent.field}}", &test_toml()).is_err());
    }

    #[test]
    fn errors_on_unclosed_var() {
        let err = validate_template("Hello {{query", &test_toml(), &["query"]).unwrap_err();
        assert!(err.to_string().contains("Unclosed"));
    }

    #[test]
    fn validates_template() {
        let toml = test_toml();
        assert!(validate_template("{{config.analyst.focus}} {{url}}", &toml, &["url"]).is_ok());
        assert!(validate_template("{{unknown_var}}", &toml, &["url"]).is_err());
        assert!(validate_template(r"\{{unknown_var}}", &toml, &["url"]).is_ok());
    }
}
