//! Request executor
//!
//! Wraps an HTTP transport with a per-attempt timeout, exponential-backoff
//! retry for idempotent reads, and a response cache keyed by the normalized
//! request signature. A cache hit skips the network entirely.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use oracle_core::{RequestConfig, RequestError, RequestResult};

use crate::state::TtlCache;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// A fully built request handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-attempt limit; the executor enforces it as well
    pub timeout: Duration,
}

/// Raw transport response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Transport seam: the real implementation uses reqwest
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> RequestResult<HttpResponse>;
}

/// reqwest-backed transport
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> RequestResult<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RequestError::Timeout {
                    endpoint: request.url.clone(),
                    timeout_ms: request.timeout.as_millis() as u64,
                }
            } else {
                RequestError::Network {
                    endpoint: request.url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| RequestError::Network {
            endpoint: request.url.clone(),
            message: e.to_string(),
        })?;

        Ok(HttpResponse { status, body })
    }
}

/// Per-call request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Safe to retry and cache. Defaults to true for GET only.
    pub idempotent: bool,
    pub cache_ttl: Option<Duration>,
    pub skip_cache: bool,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: HttpMethod::Get,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            idempotent: true,
            cache_ttl: None,
            skip_cache: false,
            max_retries: None,
            timeout: None,
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            idempotent: false,
            ..Self::get()
        }
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Mark a POST as a read (e.g. batch lookups) so it is retried and cached
    pub fn read_only(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Retrying, cache-aware JSON request executor
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    cache: TtlCache<String, Value>,
    config: RequestConfig,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, config: RequestConfig) -> Self {
        Self {
            transport,
            cache: TtlCache::new(config.cache_ttl()),
            config,
        }
    }

    /// Executor over a reqwest client. Timeouts are set per request.
    pub fn with_reqwest(config: RequestConfig) -> RequestResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RequestError::Validation(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::new(Arc::new(ReqwestTransport::new(client)), config))
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn clear_cache(&self) {
        self.cache.clear_all();
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.entry_count()
    }

    /// Execute and decode the JSON body into `T`
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> RequestResult<T> {
        let value = self.request(endpoint, options).await?;
        serde_json::from_value(value).map_err(|e| RequestError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    /// Execute `endpoint` with retry, timeout and caching.
    ///
    /// Only idempotent requests are cached and retried. 4xx responses other
    /// than 408/429 fail immediately.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> RequestResult<Value> {
        validate_endpoint(endpoint)?;

        let cacheable = options.idempotent && !options.skip_cache;
        let cache_key = cache_key(endpoint, &options);
        let ttl = options.cache_ttl.unwrap_or(self.config.cache_ttl());

        if cacheable {
            if let Some(hit) = self.cache.get_within(&cache_key, ttl) {
                debug!(endpoint = %endpoint, "Response cache hit");
                return Ok(hit);
            }
        }

        let timeout = options.timeout.unwrap_or(self.config.timeout());
        let request = HttpRequest {
            method: options.method,
            url: endpoint.trim().to_string(),
            query: options.query.clone(),
            headers: options.headers.clone(),
            body: options.body.clone(),
            timeout,
        };

        let max_retries = if options.idempotent {
            options.max_retries.unwrap_or(self.config.max_retries)
        } else {
            0
        };

        let mut attempt: u32 = 0;
        loop {
            match self.attempt(&request).await {
                Ok(value) => {
                    if cacheable {
                        self.cache.insert(cache_key, value.clone());
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let backoff = self.config.retry_base_delay() * 2u32.saturating_pow(attempt);
                    warn!(
                        method = %request.method,
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        max_attempts = max_retries + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retryable request failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(endpoint = %endpoint, attempts = attempt + 1, error = %e, "Request failed");
                    return Err(e);
                }
            }
        }
    }

    /// One attempt: the in-flight call is dropped when the timeout fires
    async fn attempt(&self, request: &HttpRequest) -> RequestResult<Value> {
        let call = self.transport.execute(request);
        let response = match tokio::time::timeout(request.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RequestError::Timeout {
                    endpoint: request.url.clone(),
                    timeout_ms: request.timeout.as_millis() as u64,
                })
            }
        };

        if !(200..300).contains(&response.status) {
            return Err(RequestError::Http {
                status: response.status,
                endpoint: request.url.clone(),
                message: truncate(&response.body, 256),
            });
        }

        serde_json::from_str(&response.body).map_err(|e| RequestError::Decode {
            endpoint: request.url.clone(),
            message: e.to_string(),
        })
    }
}

fn validate_endpoint(endpoint: &str) -> RequestResult<()> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(())
    } else {
        Err(RequestError::Validation(format!("Endpoint must be an http(s) URL: {endpoint}")))
    }
}

/// Method + endpoint (trailing slash dropped) + sorted query + body
fn cache_key(endpoint: &str, options: &RequestOptions) -> String {
    let mut query = options.query.clone();
    query.sort();

    let query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let body = options.body.as_ref().map(Value::to_string).unwrap_or_default();

    format!(
        "{} {}?{}#{}",
        options.method,
        endpoint.trim().trim_end_matches('/'),
        query,
        body
    )
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport shared by the crate's unit tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum Scripted {
        Respond(u16, String),
        Fail(RequestError),
        Hang,
    }

    /// Responses are matched by URL suffix; each route plays its script in
    /// order and repeats the last step.
    #[derive(Default)]
    pub struct FakeTransport {
        routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: AtomicUsize,
        log: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(&self, suffix: &str, step: Scripted) -> &Self {
            self.routes
                .lock()
                .entry(suffix.to_string())
                .or_default()
                .push_back(step);
            self
        }

        pub fn json(&self, suffix: &str, body: serde_json::Value) -> &Self {
            self.route(suffix, Scripted::Respond(200, body.to_string()))
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.log.lock().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn execute(&self, request: &HttpRequest) -> RequestResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(request.clone());

            let step = {
                let mut routes = self.routes.lock();
                let script = routes
                    .iter_mut()
                    .filter(|(suffix, _)| request.url.ends_with(suffix.as_str()))
                    .max_by_key(|(suffix, _)| suffix.len())
                    .map(|(_, script)| script);

                match script {
                    Some(script) if script.len() > 1 => script.pop_front(),
                    Some(script) => script.front().map(|s| match s {
                        Scripted::Respond(status, body) => Scripted::Respond(*status, body.clone()),
                        Scripted::Fail(e) => Scripted::Fail(e.clone()),
                        Scripted::Hang => Scripted::Hang,
                    }),
                    None => None,
                }
            };

            match step {
                Some(Scripted::Respond(status, body)) => Ok(HttpResponse { status, body }),
                Some(Scripted::Fail(e)) => Err(e),
                Some(Scripted::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                None => Ok(HttpResponse {
                    status: 404,
                    body: format!("no route for {}", request.url),
                }),
            }
        }
    }
}
