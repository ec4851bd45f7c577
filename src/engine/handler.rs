//! Integration handler
//!
//! Ties the pipeline together: resolve or synthesize a config, execute
//! it, feed failures back into synthesis (bounded), transform the
//! result, record the run, and notify webhooks. This is the
//! self-healing loop behind `call` and `extract`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::docs_fetcher::DocsFetcher;
use crate::adapters::http_caller::{CallOptions, HttpCaller, HttpRequest};
use crate::domain::{
    ApiConfig, ApiInput, ExtractConfig, ExtractInput, RequestOptions, RunResult, TransformConfig,
    TransformInput,
};
use crate::engine::executor::{execute_api, navigate_data_path};
use crate::engine::fileparse;
use crate::engine::queue::JobQueue;
use crate::error::{IntegrationError, IntegrationResult};
use crate::jsonata;
use crate::persistence::Datastore;
use crate::synth::endpoint::endpoint_cache_id;
use crate::synth::extract::extract_cache_id;
use crate::synth::{
    ChatModel, EndpointSynthesizer, ExtractSynthesizer, SchemaGenerator, TransformSynthesizer,
};

/// Synthesis rounds before a failing call is surfaced.
const MAX_REPAIR_ATTEMPTS: u32 = 5;

pub struct IntegrationHandler {
    store: Arc<dyn Datastore>,
    http: HttpCaller,
    webhook_client: reqwest::Client,
    /// Single-flight worker for fire-and-forget jobs (webhook delivery)
    jobs: JobQueue,
    endpoint_synth: EndpointSynthesizer,
    extract_synth: ExtractSynthesizer,
    transform_synth: TransformSynthesizer,
    schema_gen: SchemaGenerator,
}

impl IntegrationHandler {
    pub fn new(
        store: Arc<dyn Datastore>,
        model: Arc<dyn ChatModel>,
        schema_model: Arc<dyn ChatModel>,
    ) -> Self {
        let docs = DocsFetcher::new();
        Self {
            store,
            http: HttpCaller::new(),
            webhook_client: reqwest::Client::new(),
            jobs: JobQueue::new(),
            endpoint_synth: EndpointSynthesizer::new(model.clone(), docs.clone()),
            extract_synth: ExtractSynthesizer::new(model.clone(), docs),
            transform_synth: TransformSynthesizer::new(model),
            schema_gen: SchemaGenerator::new(schema_model),
        }
    }

    /// The headline operation: instruction in, validated data out.
    ///
    /// Execution failures are recorded as failed runs and returned in
    /// the run record, not as `Err`; `Err` is reserved for unusable
    /// input and datastore trouble.
    pub async fn call(
        &self,
        mut input: ApiInput,
        payload: Value,
        credentials: HashMap<String, String>,
        options: RequestOptions,
    ) -> IntegrationResult<RunResult> {
        let run = RunResult::begin();

        // Resolve a starting config: pinned id, cache, or synthesis
        let mut current: Option<ApiConfig> = None;
        if let Some(id) = &input.id {
            match self.store.get_api_config(id).await? {
                Some(config) => {
                    if input.instruction.is_empty() {
                        input.instruction = config.instruction.clone();
                    }
                    current = Some(config);
                }
                None => {
                    return Err(IntegrationError::Configuration(format!(
                        "no stored config with id {}",
                        id
                    )))
                }
            }
        } else if options.cache_mode.reads() {
            let cache_id = endpoint_cache_id(&input, &payload);
            if let Some(config) = self.store.get_api_config(&cache_id).await? {
                debug!(id = %cache_id, "api config cache hit");
                current = Some(config);
            }
        }

        let mut messages = Vec::new();
        let mut previous: Option<ApiConfig> = None;
        let mut last_error: Option<String> = None;
        let mut attempt: u32 = 0;

        let (config, raw_data) = loop {
            let config = match current.take() {
                Some(config) => config,
                None => {
                    let prepared = self
                        .endpoint_synth
                        .prepare(
                            &input,
                            &payload,
                            &credentials,
                            last_error.as_deref(),
                            previous.as_ref(),
                            std::mem::take(&mut messages),
                            attempt,
                        )
                        .await?;
                    messages = prepared.messages;
                    prepared.config
                }
            };

            match execute_api(&self.http, &config, &payload, &credentials, &options).await {
                Ok(outcome) => {
                    if !outcome.data_path_success {
                        debug!(id = %config.id, "data path did not fully resolve");
                    }
                    break (config, outcome.data);
                }
                Err(e) if e.is_repairable() && attempt < MAX_REPAIR_ATTEMPTS => {
                    warn!(attempt, error = %e, "execution failed, re-synthesizing");
                    last_error = Some(e.to_string());
                    previous = Some(config);
                    attempt += 1;
                }
                Err(e) => {
                    let error = if e.is_repairable() {
                        IntegrationError::RepairExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        }
                    } else {
                        e
                    };
                    let failed = run.with_config(&config, &config.id).fail(error.to_string());
                    self.store.create_run(&failed).await?;
                    self.notify_webhook(&options, &failed).await;
                    return Ok(failed);
                }
            }
        };

        // Transform stage; failures here are still user-visible runs
        let transform_input = TransformInput {
            id: None,
            instruction: config.instruction.clone(),
            response_schema: config.response_schema.clone(),
            response_mapping: config.response_mapping.clone(),
        };
        let (final_data, mapping) = match self
            .apply_transform(&transform_input, &raw_data, &options)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let failed = run.with_config(&config, &config.id).fail(e.to_string());
                self.store.create_run(&failed).await?;
                self.notify_webhook(&options, &failed).await;
                return Ok(failed);
            }
        };

        let mut config = config;
        if mapping.is_some() {
            config.response_mapping = mapping;
        }
        if options.cache_mode.writes() {
            self.store.upsert_api_config(&config.id, &config).await?;
        }

        let completed = run.with_config(&config, &config.id).succeed(final_data);
        self.store.create_run(&completed).await?;
        self.notify_webhook(&options, &completed).await;
        info!(id = %config.id, run = %completed.id, "call completed");
        Ok(completed)
    }

    /// File extraction: download (or take uploaded bytes), decompress,
    /// parse, navigate, transform.
    pub async fn extract(
        &self,
        input: ExtractInput,
        payload: Value,
        credentials: HashMap<String, String>,
        options: RequestOptions,
    ) -> IntegrationResult<RunResult> {
        let run = RunResult::begin();

        // Uploaded bytes bypass config synthesis entirely
        if let Some(bytes) = &input.file {
            let result = self.parse_file_bytes(bytes, &input);
            return match result {
                Ok(data) => self.finish_extract(run, None, data, &input, &options).await,
                Err(e) => {
                    let failed = run.fail(e.to_string());
                    self.store.create_run(&failed).await?;
                    self.notify_webhook(&options, &failed).await;
                    Ok(failed)
                }
            };
        }

        let mut current: Option<ExtractConfig> = None;
        if let Some(id) = &input.id {
            match self.store.get_extract_config(id).await? {
                Some(config) => current = Some(config),
                None => {
                    return Err(IntegrationError::Configuration(format!(
                        "no stored extract config with id {}",
                        id
                    )))
                }
            }
        } else if options.cache_mode.reads() {
            let cache_id = extract_cache_id(&input, &payload);
            if let Some(config) = self.store.get_extract_config(&cache_id).await? {
                debug!(id = %cache_id, "extract config cache hit");
                current = Some(config);
            }
        }

        let mut messages = Vec::new();
        let mut last_error: Option<String> = None;
        let mut attempt: u32 = 0;

        let (config, data) = loop {
            let config = match current.take() {
                Some(config) => config,
                None => {
                    let prepared = self
                        .extract_synth
                        .prepare(
                            &input,
                            &payload,
                            &credentials,
                            last_error.as_deref(),
                            std::mem::take(&mut messages),
                            attempt,
                        )
                        .await?;
                    messages = prepared.messages;
                    prepared.config
                }
            };

            match self.run_extract(&config, &credentials, &options).await {
                Ok(data) => break (config, data),
                Err(e) if e.is_repairable() && attempt < MAX_REPAIR_ATTEMPTS => {
                    warn!(attempt, error = %e, "extract failed, re-synthesizing");
                    last_error = Some(e.to_string());
                    attempt += 1;
                }
                Err(e) => {
                    let error = if e.is_repairable() {
                        IntegrationError::RepairExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        }
                    } else {
                        e
                    };
                    let failed = run.with_config(&config, &config.id).fail(error.to_string());
                    self.store.create_run(&failed).await?;
                    self.notify_webhook(&options, &failed).await;
                    return Ok(failed);
                }
            }
        };

        if options.cache_mode.writes() {
            self.store.upsert_extract_config(&config.id, &config).await?;
        }
        self.finish_extract(run, Some(config), data, &input, &options)
            .await
    }

    /// Standalone transform of caller-supplied data.
    pub async fn transform(
        &self,
        input: TransformInput,
        data: Value,
        options: RequestOptions,
    ) -> IntegrationResult<RunResult> {
        let run = RunResult::begin();

        let config = match self
            .transform_synth
            .prepare(self.store.as_ref(), options.cache_mode, &input, &data)
            .await
        {
            Ok(Some(config)) => config,
            Ok(None) => {
                return Err(IntegrationError::Configuration(
                    "transform requires a response schema and non-empty data".to_string(),
                ))
            }
            Err(e) => {
                let failed = run.fail(e.to_string());
                self.store.create_run(&failed).await?;
                self.notify_webhook(&options, &failed).await;
                return Ok(failed);
            }
        };

        let expression = config.response_mapping.clone().unwrap_or_else(|| "$".to_string());
        let outcome = jsonata::validate_and_apply(&data, &expression, &config.response_schema);
        let (final_data, config) = if outcome.success {
            (outcome.data.unwrap_or(Value::Null), config)
        } else {
            // A cached or caller-supplied mapping no longer fits this
            // data; the pair is unsealed, so synthesize a fresh one
            match self.reseal_transform(config, &data, &options).await {
                Ok(result) => result,
                Err(e) => {
                    let failed = run.fail(e.to_string());
                    self.store.create_run(&failed).await?;
                    self.notify_webhook(&options, &failed).await;
                    return Ok(failed);
                }
            }
        };

        let completed = run.with_config(&config, &config.id).succeed(final_data);
        self.store.create_run(&completed).await?;
        self.notify_webhook(&options, &completed).await;
        Ok(completed)
    }

    /// Generate a JSON Schema from an instruction and optional sample.
    pub async fn generate_schema(
        &self,
        instruction: &str,
        response_data: Option<&str>,
    ) -> IntegrationResult<Value> {
        self.schema_gen.generate(instruction, response_data).await
    }

    async fn run_extract(
        &self,
        config: &ExtractConfig,
        credentials: &HashMap<String, String>,
        options: &RequestOptions,
    ) -> IntegrationResult<Value> {
        let mut vars: HashMap<String, Value> = HashMap::new();
        for (k, v) in credentials {
            vars.insert(k.clone(), Value::String(v.clone()));
        }

        let url = crate::engine::interpolate::interpolate(&config.url(), &vars)?;
        let mut headers = HashMap::new();
        if let Some(map) = &config.headers {
            for (k, v) in map {
                headers.insert(k.clone(), crate::engine::interpolate::interpolate(v, &vars)?);
            }
        }
        let mut query_params = HashMap::new();
        if let Some(map) = &config.query_params {
            for (k, v) in map {
                query_params.insert(k.clone(), crate::engine::interpolate::interpolate(v, &vars)?);
            }
        }

        let request = HttpRequest {
            method: config.method,
            url,
            headers,
            query_params,
            body: None,
            timeout: std::time::Duration::from_millis(options.timeout_ms),
        };
        let call_options = CallOptions {
            retries: options.retries,
            retry_delay: std::time::Duration::from_millis(options.retry_delay_ms),
        };

        let bytes = self.http.fetch_bytes(&request, call_options).await?;
        let decompressed = fileparse::decompress(&bytes, config.decompression_method)?;
        let parsed = fileparse::parse(&decompressed, config.file_type)?;
        let (data, path_ok) = navigate_data_path(&parsed, config.data_path.as_deref());
        if !path_ok {
            debug!(id = %config.id, "extract data path did not fully resolve");
        }
        Ok(data)
    }

    fn parse_file_bytes(&self, bytes: &[u8], input: &ExtractInput) -> IntegrationResult<Value> {
        let decompressed =
            fileparse::decompress(bytes, input.decompression_method.unwrap_or_default())?;
        let parsed = fileparse::parse(&decompressed, input.file_type.unwrap_or_default())?;
        let (data, _) = navigate_data_path(&parsed, input.data_path.as_deref());
        Ok(data)
    }

    async fn finish_extract(
        &self,
        run: RunResult,
        config: Option<ExtractConfig>,
        data: Value,
        input: &ExtractInput,
        options: &RequestOptions,
    ) -> IntegrationResult<RunResult> {
        let transform_input = TransformInput {
            id: None,
            instruction: input.instruction.clone(),
            response_schema: input.response_schema.clone(),
            response_mapping: input.response_mapping.clone(),
        };
        let result = self
            .apply_transform(&transform_input, &data, options)
            .await;

        let run = match &config {
            Some(c) => run.with_config(c, &c.id),
            None => run,
        };
        let completed = match result {
            Ok((final_data, _)) => run.succeed(final_data),
            Err(e) => run.fail(e.to_string()),
        };
        self.store.create_run(&completed).await?;
        self.notify_webhook(options, &completed).await;
        Ok(completed)
    }

    /// Apply the transform stage when a response schema is requested.
    /// Returns the (possibly reshaped) data and the mapping that
    /// produced it.
    async fn apply_transform(
        &self,
        input: &TransformInput,
        data: &Value,
        options: &RequestOptions,
    ) -> IntegrationResult<(Value, Option<String>)> {
        let config = match self
            .transform_synth
            .prepare(self.store.as_ref(), options.cache_mode, input, data)
            .await?
        {
            Some(config) => config,
            None => return Ok((data.clone(), None)),
        };

        let expression = config.response_mapping.clone().unwrap_or_else(|| "$".to_string());
        let outcome = jsonata::validate_and_apply(data, &expression, &config.response_schema);
        if outcome.success {
            return Ok((outcome.data.unwrap_or(Value::Null), Some(expression)));
        }

        let (final_data, resealed) = self.reseal_transform(config, data, options).await?;
        Ok((final_data, resealed.response_mapping))
    }

    /// Regenerate a mapping whose output no longer validates, and
    /// refresh the cache entry.
    async fn reseal_transform(
        &self,
        mut config: TransformConfig,
        data: &Value,
        options: &RequestOptions,
    ) -> IntegrationResult<(Value, TransformConfig)> {
        let generated = self
            .transform_synth
            .generate_mapping(&config.response_schema, data, &config.instruction)
            .await?;
        let final_data = jsonata::apply(data, &generated.expression)?;
        config.response_mapping = Some(generated.expression);
        config.confidence = Some(generated.confidence);
        config.confidence_reasoning = Some(generated.confidence_reasoning);
        config.updated_at = crate::domain::now_millis();
        if options.cache_mode.writes() {
            self.store
                .upsert_transform_config(&config.id, &config)
                .await?;
        }
        Ok((final_data, config))
    }

    /// Deliver the run outcome to the caller's webhook. Fire-and-forget
    /// through the job queue, deduplicated per run.
    async fn notify_webhook(&self, options: &RequestOptions, run: &RunResult) {
        let Some(url) = &options.webhook_url else {
            return;
        };
        let payload = json!({
            "runId": run.id,
            "success": run.success,
            "data": run.data,
            "error": run.error,
        });
        let client = self.webhook_client.clone();
        let url = url.clone();
        self.jobs.enqueue(format!("webhook:{}", run.id), async move {
            client
                .post(&url)
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        });
    }
}
