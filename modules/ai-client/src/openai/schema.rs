use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Trait for types that can be used as OpenAI structured output.
///
/// Automatically implemented for any type that implements `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate an OpenAI-compatible JSON schema for this type.
    fn openai_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        strict_schema(serde_json::to_value(schema).unwrap_or_default())
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Rewrite a generated schema into the shape strict mode accepts.
///
/// OpenAI requires:
/// 1. `additionalProperties: false` on all object schemas
/// 2. ALL properties listed in `required`, even nullable ones
/// 3. Fully inlined schemas (no `$ref` references)
pub fn strict_schema(mut value: serde_json::Value) -> serde_json::Value {
    fix_object_schemas(&mut value);
    inline_refs(&mut value);

    if let serde_json::Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }

    value
}

fn fix_object_schemas(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type").and_then(|t| t.as_str()) == Some("object") {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );

                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(all_keys));
                }
            }

            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut serde_json::Value) {
    let definitions = match value {
        serde_json::Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(type_name) = map
                .get("$ref")
                .and_then(|r| r.as_str())
                .and_then(|r| r.strip_prefix("#/definitions/"))
            {
                if let Some(def) = definitions.get(type_name) {
                    *value = def.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            // schemars wraps documented refs in a single-element allOf
            let single = match map.get("allOf") {
                Some(serde_json::Value::Array(all_of)) if all_of.len() == 1 => all_of.first().cloned(),
                _ => None,
            };
            if let Some(inner) = single {
                *value = inner;
                inline_refs_recursive(value, definitions);
                return;
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Metric {
        name: String,
        unit: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Report {
        headline: String,
        metrics: Vec<Metric>,
        lead: Metric,
    }

    #[test]
    fn all_properties_required_even_optional() {
        let schema = Metric::openai_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("should have required array")
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"name"));
        assert!(required.contains(&"unit"));
        assert_eq!(schema["additionalProperties"], serde_json::Value::Bool(false));
    }

    #[test]
    fn nested_refs_are_inlined() {
        let schema = Report::openai_schema();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));

        let lead = &schema["properties"]["lead"];
        assert!(lead.get("$ref").is_none());
        assert_eq!(lead["type"], "object");
        assert_eq!(lead["additionalProperties"], serde_json::Value::Bool(false));

        let items = &schema["properties"]["metrics"]["items"];
        assert_eq!(items["type"], "object");
        assert!(!serde_json::to_string(&schema).unwrap().contains("$ref"));
    }

    #[test]
    fn strict_schema_handles_raw_values() {
        let raw = serde_json::json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
        });
        let fixed = strict_schema(raw);
        assert_eq!(fixed["required"], serde_json::json!(["a"]));
        assert_eq!(fixed["additionalProperties"], false);
    }
}
