//! JSON Schema validation, schema inference, and data sampling
//!
//! Validation backs both the transform output check and the
//! structured-JSON LLM response contract. Inference produces the
//! shape-of-data schema that guides mapping synthesis.

use rand::seq::index::sample;
use serde_json::{json, Map, Value};

/// Validate `value` against `schema`, reporting the first offending
/// instance path on failure.
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    let validator = jsonschema::draft202012::new(schema)
        .map_err(|e| format!("invalid schema: {}", e))?;

    let result = match validator.iter_errors(value).next() {
        None => Ok(()),
        Some(err) => Err(format!("{}: {}", err.instance_path, err)),
    };
    result
}

/// Infer a JSON Schema describing the shape of `value`. Arrays are
/// described by their first element only.
pub fn infer_schema(value: &Value) -> Value {
    match value {
        Value::Null => json!({"type": "null"}),
        Value::Bool(_) => json!({"type": "boolean"}),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                json!({"type": "integer"})
            } else {
                json!({"type": "number"})
            }
        }
        Value::String(_) => json!({"type": "string"}),
        Value::Array(items) => match items.first() {
            Some(first) => json!({"type": "array", "items": infer_schema(first)}),
            None => json!({"type": "array"}),
        },
        Value::Object(map) => {
            let mut properties = Map::new();
            for (key, item) in map {
                properties.insert(key.clone(), infer_schema(item));
            }
            json!({"type": "object", "properties": properties})
        }
    }
}

/// Produce a compact, randomized view of `value` for prompt context:
/// arrays are cut to at most `per_array` sampled elements (in original
/// order), and the serialized output is truncated to `max_chars`.
pub fn sample_for_prompt(value: &Value, per_array: usize, max_chars: usize) -> String {
    let sampled = sample_value(value, per_array);
    let mut text = serde_json::to_string(&sampled).unwrap_or_default();
    if text.len() > max_chars {
        let mut cut = max_chars;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn sample_value(value: &Value, per_array: usize) -> Value {
    match value {
        Value::Array(items) if items.len() > per_array => {
            let mut rng = rand::thread_rng();
            let mut indices: Vec<usize> = sample(&mut rng, items.len(), per_array).into_vec();
            indices.sort_unstable();
            Value::Array(
                indices
                    .into_iter()
                    .map(|i| sample_value(&items[i], per_array))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items.iter().map(|v| sample_value(v, per_array)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sample_value(v, per_array)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_instance_path() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        assert!(validate(&json!({"name": "x"}), &schema).is_ok());
        let err = validate(&json!({"name": 42}), &schema).unwrap_err();
        assert!(err.contains("name"), "path missing from: {}", err);
    }

    #[test]
    fn infers_nested_shapes_from_first_array_element() {
        let data = json!({"items": [{"id": 1, "name": "a"}, {"id": 2}], "ratio": 0.5});
        let schema = infer_schema(&data);
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {
                    "items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {"type": "integer"},
                                "name": {"type": "string"}
                            }
                        }
                    },
                    "ratio": {"type": "number"}
                }
            })
        );
    }

    #[test]
    fn sampling_bounds_array_sizes() {
        let big: Vec<Value> = (0..100).map(|i| json!(i)).collect();
        let text = sample_for_prompt(&Value::Array(big), 5, 10_000);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 5);
    }

    #[test]
    fn sampling_truncates_output() {
        let data = json!({"s": "x".repeat(500)});
        let text = sample_for_prompt(&data, 5, 100);
        assert!(text.len() <= 100);
    }
}
