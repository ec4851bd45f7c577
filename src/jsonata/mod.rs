//! JSONata expression interpreter
//!
//! A tree-walking interpreter covering the mapping subset used by
//! synthesized transforms: paths with predicates, object and array
//! constructors, arithmetic and comparison, string concatenation,
//! conditionals, lambdas, and the higher-order and aggregation
//! builtins (`$map`, `$filter`, `$sum`, `$count`, `$distinct`,
//! `$lookup`, `$match`, ...).

mod eval;
mod lexer;
mod parser;

use serde_json::Value;

use crate::error::{IntegrationError, IntegrationResult};

/// Apply a JSONata expression to a JSON value.
///
/// An expression that evaluates to nothing (JSONata "undefined") maps
/// to `null`.
pub fn apply(value: &Value, expr: &str) -> IntegrationResult<Value> {
    let tokens = lexer::tokenize(expr).map_err(IntegrationError::Expression)?;
    let ast = parser::parse(tokens).map_err(IntegrationError::Expression)?;
    let result = eval::evaluate(&ast, value).map_err(IntegrationError::Expression)?;
    Ok(result.unwrap_or(Value::Null))
}

/// Outcome of applying a mapping and validating the result.
#[derive(Debug)]
pub struct MappingOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// Apply `expr` to `value`, then validate the result against `schema`.
/// Failures report the first offending validation path so the error can
/// be fed back into the transform synthesizer.
pub fn validate_and_apply(value: &Value, expr: &str, schema: &Value) -> MappingOutcome {
    let data = match apply(value, expr) {
        Ok(data) => data,
        Err(e) => {
            return MappingOutcome {
                success: false,
                data: None,
                error: Some(e.to_string()),
            }
        }
    };

    match crate::schema::validate(&data, schema) {
        Ok(()) => MappingOutcome {
            success: true,
            data: Some(data),
            error: None,
        },
        Err(e) => MappingOutcome {
            success: false,
            data: Some(data),
            error: Some(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_access_and_paths() {
        let data = json!({"user": {"first": "J", "last": "D"}});
        assert_eq!(apply(&data, "user.first").unwrap(), json!("J"));
        assert_eq!(apply(&data, "user.missing").unwrap(), Value::Null);
    }

    #[test]
    fn path_maps_over_arrays() {
        let data = json!({"items": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(apply(&data, "items.name").unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn string_concatenation() {
        let data = json!({"user": {"first": "J", "last": "D"}});
        assert_eq!(
            apply(&data, r#"user.first & " " & user.last"#).unwrap(),
            json!("J D")
        );
    }

    #[test]
    fn object_and_array_constructors() {
        let data = json!({"user": {"first": "J", "last": "D"}});
        assert_eq!(
            apply(&data, r#"{"name": user.first & user.last, "tags": ["x", 1]}"#).unwrap(),
            json!({"name": "JD", "tags": ["x", 1]})
        );
    }

    #[test]
    fn predicates_filter_and_index() {
        let data = json!({"items": [
            {"name": "a", "price": 5},
            {"name": "b", "price": 15},
            {"name": "c", "price": 25}
        ]});
        assert_eq!(
            apply(&data, "items[price > 10].name").unwrap(),
            json!(["b", "c"])
        );
        assert_eq!(apply(&data, "items[0].name").unwrap(), json!("a"));
        assert_eq!(apply(&data, "items[-1].name").unwrap(), json!("c"));
    }

    #[test]
    fn arithmetic_and_comparison() {
        let data = json!({"a": 6, "b": 4});
        assert_eq!(apply(&data, "a * b + 1").unwrap(), json!(25));
        assert_eq!(apply(&data, "a / b").unwrap(), json!(1.5));
        assert_eq!(apply(&data, "a % b").unwrap(), json!(2));
        assert_eq!(apply(&data, "a > b").unwrap(), json!(true));
        assert_eq!(apply(&data, "a = 6").unwrap(), json!(true));
        assert_eq!(apply(&data, "a != b").unwrap(), json!(true));
    }

    #[test]
    fn conditional_expression() {
        let data = json!({"n": 3});
        assert_eq!(
            apply(&data, r#"n > 2 ? "big" : "small""#).unwrap(),
            json!("big")
        );
        assert_eq!(apply(&data, r#"n > 5 ? "big""#).unwrap(), Value::Null);
    }

    #[test]
    fn aggregation_builtins() {
        let data = json!({"xs": [3, 1, 2, 3]});
        assert_eq!(apply(&data, "$sum(xs)").unwrap(), json!(9));
        assert_eq!(apply(&data, "$count(xs)").unwrap(), json!(4));
        assert_eq!(apply(&data, "$distinct(xs)").unwrap(), json!([3, 1, 2]));
    }

    #[test]
    fn map_and_filter_with_lambdas() {
        let data = json!({"xs": [1, 2, 3, 4]});
        assert_eq!(
            apply(&data, "$map(xs, function($v) { $v * 2 })").unwrap(),
            json!([2, 4, 6, 8])
        );
        assert_eq!(
            apply(&data, "$filter(xs, function($v) { $v > 2 })").unwrap(),
            json!([3, 4])
        );
    }

    #[test]
    fn lookup_and_string_functions() {
        let data = json!({"obj": {"k": "v"}, "s": "Hello World"});
        assert_eq!(apply(&data, r#"$lookup(obj, "k")"#).unwrap(), json!("v"));
        assert_eq!(apply(&data, "$uppercase(s)").unwrap(), json!("HELLO WORLD"));
        assert_eq!(
            apply(&data, r#"$split(s, " ")"#).unwrap(),
            json!(["Hello", "World"])
        );
    }

    #[test]
    fn regex_match() {
        let data = json!({"s": "ab1cd2"});
        let matches = apply(&data, r#"$match(s, "[0-9]")"#).unwrap();
        assert_eq!(
            matches,
            json!([
                {"match": "1", "index": 2, "groups": []},
                {"match": "2", "index": 5, "groups": []}
            ])
        );
        assert_eq!(apply(&data, r#"$contains(s, "cd")"#).unwrap(), json!(true));
    }

    #[test]
    fn context_and_root_variables() {
        let data = json!({"a": {"b": 2}});
        assert_eq!(apply(&data, "a.$").unwrap(), json!({"b": 2}));
        assert_eq!(apply(&data, "a.$$.a.b").unwrap(), json!(2));
    }

    #[test]
    fn validate_and_apply_reports_schema_path() {
        let data = json!({"user": {"first": "J", "last": "D"}});
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let ok = validate_and_apply(&data, r#"{"name": user.first & user.last}"#, &schema);
        assert!(ok.success);
        assert_eq!(ok.data.unwrap(), json!({"name": "JD"}));

        let bad = validate_and_apply(&data, r#"{"name": 42}"#, &schema);
        assert!(!bad.success);
        assert!(bad.error.is_some());
    }
}
