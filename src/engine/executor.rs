//! Request execution
//!
//! Runs an [`ApiConfig`]: binds variables, walks the pagination loop,
//! extracts the payload via the data path, and aggregates pages.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::adapters::http_caller::{CallOptions, HttpCaller, HttpRequest};
use crate::domain::{ApiConfig, PaginationType, RequestOptions};
use crate::engine::interpolate::{interpolate, unbound_variables};
use crate::error::{IntegrationError, IntegrationResult};

/// Hard ceiling on pagination iterations.
pub const MAX_PAGINATION_ITERATIONS: usize = 500;

/// What execution produced, plus whether the data path resolved fully
/// (fed back to the synthesizer when it did not).
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub data: Value,
    pub data_path_success: bool,
}

/// Execute `config` against the upstream API.
pub async fn execute_api(
    http: &HttpCaller,
    config: &ApiConfig,
    payload: &Value,
    credentials: &HashMap<String, String>,
    options: &RequestOptions,
) -> IntegrationResult<ExecutionOutcome> {
    let mut vars: HashMap<String, Value> = HashMap::new();
    if let Value::Object(map) = payload {
        for (k, v) in map {
            vars.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in credentials {
        vars.insert(k.clone(), Value::String(v.clone()));
    }

    // Unresolved placeholders abort before any HTTP traffic
    let unbound = unbound_variables(config, &vars);
    if !unbound.is_empty() {
        return Err(IntegrationError::UnresolvedVariables(unbound));
    }

    let call_options = CallOptions {
        retries: options.retries,
        retry_delay: Duration::from_millis(options.retry_delay_ms),
    };
    let timeout = Duration::from_millis(options.timeout_ms);

    let pagination = config.pagination.filter(|p| p.pagination_type != PaginationType::Disabled);
    let page_size = pagination.map(|p| p.page_size as usize).unwrap_or(0);

    let mut page: u64 = 1;
    let mut offset: u64 = 0;
    let mut all_results: Vec<Value> = Vec::new();
    let mut scalar_result: Option<Value> = None;
    let mut previous_page: Option<String> = None;
    let mut data_path_success = true;

    for iteration in 0..MAX_PAGINATION_ITERATIONS {
        if let Some(p) = &pagination {
            match p.pagination_type {
                PaginationType::PageBased => {
                    vars.insert("page".to_string(), Value::Number(page.into()));
                }
                PaginationType::OffsetBased => {
                    vars.insert("offset".to_string(), Value::Number(offset.into()));
                }
                PaginationType::Disabled => {}
            }
            vars.insert("limit".to_string(), Value::Number(p.page_size.into()));
        }

        let request = build_request(config, &vars, timeout)?;
        debug!(url = %request.url, iteration, "executing request");
        let response = http.call(&request, call_options).await?;

        let (extracted, path_ok) = navigate_data_path(&response, config.data_path.as_deref());
        data_path_success &= path_ok;

        match extracted {
            Value::Array(items) => {
                let serialized = serde_json::to_string(&items).unwrap_or_default();
                if previous_page.as_deref() == Some(serialized.as_str()) {
                    // Endpoint ignored the paging params and replayed
                    // the same page
                    debug!(iteration, "identical page received, stopping pagination");
                    break;
                }
                let count = items.len();
                all_results.extend(items);
                previous_page = Some(serialized);

                if pagination.is_none() || count < page_size {
                    break;
                }
            }
            other => {
                // A non-array payload ends the loop; on the first
                // iteration it is the whole result
                if iteration == 0 {
                    scalar_result = Some(other);
                } else if !other.is_null() {
                    all_results.push(other);
                }
                break;
            }
        }

        page += 1;
        offset += page_size as u64;
    }

    let data = match scalar_result {
        Some(value) => value,
        None => {
            let mut results = all_results;
            if results.len() == 1 {
                results.remove(0)
            } else {
                Value::Array(results)
            }
        }
    };

    Ok(ExecutionOutcome {
        data,
        data_path_success,
    })
}

fn build_request(
    config: &ApiConfig,
    vars: &HashMap<String, Value>,
    timeout: Duration,
) -> IntegrationResult<HttpRequest> {
    let url = interpolate(&config.url(), vars)?;

    let mut headers = HashMap::new();
    if let Some(map) = &config.headers {
        for (k, v) in map {
            headers.insert(k.clone(), interpolate(v, vars)?);
        }
    }

    let mut query_params = HashMap::new();
    if let Some(map) = &config.query_params {
        for (k, v) in map {
            query_params.insert(k.clone(), interpolate(v, vars)?);
        }
    }

    let body = match &config.body {
        Some(template) if !template.is_empty() => {
            let rendered = interpolate(template, vars)?;
            let parsed: Value = serde_json::from_str(&rendered).map_err(|e| {
                IntegrationError::Configuration(format!(
                    "request body is not valid JSON after interpolation: {}",
                    e
                ))
            })?;
            Some(parsed)
        }
        _ => None,
    };

    Ok(HttpRequest {
        method: config.method,
        url,
        headers,
        query_params,
        body,
        timeout,
    })
}

/// Walk a dot-separated path into `value`. A leading `$` segment means
/// root and is skipped. A missing segment keeps the last valid value
/// (forgiving navigation) and reports `false` so the synthesizer can
/// react.
pub fn navigate_data_path(value: &Value, data_path: Option<&str>) -> (Value, bool) {
    let path = match data_path {
        Some(p) if !p.trim().is_empty() => p,
        _ => return (value.clone(), true),
    };

    let mut current = value;
    for segment in path.split('.') {
        if segment.is_empty() || segment == "$" {
            continue;
        }
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => {
                warn!(segment, path, "data path segment missing, keeping last valid value");
                return (current.clone(), false);
            }
        }
    }
    (current.clone(), true)
}
