//! Variable interpolation for request templates
//!
//! Template fields may reference `{name}` placeholders bound at
//! execution time from the payload, the credentials, and the reserved
//! pagination variables.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::ApiConfig;
use crate::error::{IntegrationError, IntegrationResult};

/// Variable names always treated as bound; the executor supplies them
/// on every pagination iteration.
pub const RESERVED_VARS: [&str; 3] = ["page", "offset", "limit"];

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex"))
}

/// Stringify a bound value for substitution. Only scalars may be
/// spliced into a template.
fn stringify(name: &str, value: &Value) -> IntegrationResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(IntegrationError::Configuration(format!(
            "variable '{}' is not a scalar and cannot be interpolated",
            name
        ))),
    }
}

/// Replace every bound `{name}` in `template` by its stringified value.
/// Unbound placeholders remain literal.
pub fn interpolate(template: &str, vars: &HashMap<String, Value>) -> IntegrationResult<String> {
    let re = placeholder_re();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let name = &caps[1];
        out.push_str(&template[last..whole.start()]);
        match vars.get(name) {
            Some(value) => out.push_str(&stringify(name, value)?),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Placeholder names referenced by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Placeholder names referenced anywhere in the config's interpolated
/// fields (url path, header values, query values, body) that are bound
/// neither by `known_vars` nor by the reserved pagination variables.
///
/// The executor aborts before any HTTP call when this is non-empty.
pub fn unbound_variables(config: &ApiConfig, known_vars: &HashMap<String, Value>) -> Vec<String> {
    let mut referenced = BTreeSet::new();

    let mut scan = |s: &str| {
        for name in placeholders(s) {
            referenced.insert(name);
        }
    };

    if let Some(path) = &config.url_path {
        scan(path);
    }
    scan(&config.url_host);
    if let Some(headers) = &config.headers {
        for v in headers.values() {
            scan(v);
        }
    }
    if let Some(params) = &config.query_params {
        for v in params.values() {
            scan(v);
        }
    }
    if let Some(body) = &config.body {
        scan(body);
    }

    referenced
        .into_iter()
        .filter(|name| !known_vars.contains_key(name.as_str()))
        .filter(|name| !RESERVED_VARS.contains(&name.as_str()))
        .collect()
}
