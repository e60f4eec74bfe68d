use std::{collections::BTreeMap, fmt, time::Duration};

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::time::sleep;

use crate::{
    error::kind_for_status,
    logger::{Logger, LoggerConfig},
    options::{ClientOption, Settings, RETRY_BACKOFF_STEP},
    wire::ErrorEnvelope,
    ClientError, Context, Error, ErrorKind, Result,
};

/// JSON REST client with bounded retries and classified errors.
///
/// Configuration is fixed at construction; a `Client` is cheap to clone and
/// safe to share between tasks issuing concurrent requests.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    headers: BTreeMap<String, String>,
    header_map: HeaderMap,
    retries: usize,
    timeout: Duration,
    logger: Logger,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("retries", &self.retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Client {
    /// Creates a client from an ordered list of options.
    ///
    /// Defaults: 3 retries, 30 second per-attempt timeout, no base URL, no
    /// extra headers, a fresh `reqwest::Client`, and a logger tagged with
    /// `component = "client"`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use corekit::{Client, ClientOption};
    ///
    /// let client = Client::new([
    ///     ClientOption::BaseUrl("https://api.example.com".to_owned()),
    ///     ClientOption::Header("X-Api-Key".to_owned(), "secret".to_owned()),
    /// ])
    /// .expect("valid client options");
    /// ```
    pub fn new<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = ClientOption>,
    {
        let settings = Settings::from_options(options);
        let header_map = build_header_map(&settings.headers)?;

        let logger = match settings.logger {
            Some(logger) => logger,
            None => {
                let mut config = LoggerConfig {
                    service_name: settings.service_name.clone(),
                    ..LoggerConfig::default()
                };
                config
                    .initial_fields
                    .insert("component".to_owned(), json!("client"));
                Logger::new(&config)?
            }
        };

        let http = match settings.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(settings.timeout)
                .build()
                .map_err(|err| Error::Build(format!("failed to build http client: {err}")))?,
        };

        Ok(Self {
            http,
            base_url: settings.base_url,
            headers: settings.headers,
            header_map,
            retries: settings.retries,
            timeout: settings.timeout,
            logger,
        })
    }

    /// Starts a fluent builder; equivalent to [`Client::new`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Headers configured on the client, excluding the JSON defaults.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Sends a GET request and decodes the JSON response.
    pub async fn get<T>(&self, ctx: &Context, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request::<(), T>(ctx, Method::GET, path, None).await
    }

    /// Sends a POST request with a JSON body and decodes the JSON response.
    pub async fn post<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(ctx, Method::POST, path, Some(body)).await
    }

    /// Sends a PUT request with a JSON body and decodes the JSON response.
    pub async fn put<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(ctx, Method::PUT, path, Some(body)).await
    }

    /// Sends a PATCH request with a JSON body and decodes the JSON response.
    pub async fn patch<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(ctx, Method::PATCH, path, Some(body)).await
    }

    /// Sends a DELETE request and decodes the JSON response.
    pub async fn delete<T>(&self, ctx: &Context, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request::<(), T>(ctx, Method::DELETE, path, None).await
    }

    /// Performs one logical call and decodes a successful body into `T`.
    ///
    /// `body: None` sends no body at all. A 2xx body that does not decode
    /// into `T` is reported as [`ErrorKind::InvalidRequest`].
    pub async fn request<B, T>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = self.execute(ctx, method, path, body).await?;
        serde_json::from_slice(&bytes).map_err(|err| {
            ClientError::new(
                ErrorKind::InvalidRequest,
                format!("failed to parse response: {err}"),
            )
            .into()
        })
    }

    /// Like [`Client::request`] but discards the response body unread.
    pub async fn send<B>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(ctx, method, path, body).await.map(|_| ())
    }

    async fn execute<B>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let url = resolve_url(&self.base_url, path);
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(Error::Encode)?;

        let response = self
            .send_with_retry(ctx, &method, &url, payload.as_deref())
            .await?;

        let status = response.status();
        let body = tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason),
            body = response.bytes() => body.map_err(|err| {
                ClientError::new(
                    ErrorKind::ConnectionFailed,
                    format!("failed to read response body: {err}"),
                )
            })?,
        };

        if !status.is_success() {
            self.logger
                .debug(&format!("{method} {url} failed with status {}", status.as_u16()));
            return Err(classify_status(status, &body));
        }

        Ok(body.to_vec())
    }

    async fn send_with_retry(
        &self,
        ctx: &Context,
        method: &Method,
        url: &str,
        payload: Option<&[u8]>,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0usize;
        loop {
            if let Some(reason) = ctx.err() {
                return Err(reason);
            }

            let mut request = self
                .http
                .request(method.clone(), url)
                .headers(self.header_map.clone())
                .timeout(self.timeout);
            if let Some(payload) = payload {
                request = request.body(payload.to_vec());
            }

            let response = tokio::select! {
                biased;
                reason = ctx.done() => return Err(reason),
                response = request.send() => response,
            };

            match response {
                // Any response ends the loop; status handling happens once, after.
                Ok(response) => return Ok(response),
                // A request that cannot be built fails the same way every time.
                Err(err) if err.is_builder() => {
                    return Err(Error::Build(format!("failed to build request: {err}")));
                }
                Err(err) => {
                    if attempt >= self.retries {
                        self.logger.warn(&format!(
                            "{method} {url} failed after {} attempts: {err}",
                            attempt + 1
                        ));
                        return Err(exhausted_transport_error(&err).into());
                    }
                    self.wait_before_retry(ctx, attempt, &err).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// Waits `(attempt + 1) * 100ms`, aborting early if `ctx` ends.
    async fn wait_before_retry(
        &self,
        ctx: &Context,
        attempt: usize,
        cause: &reqwest::Error,
    ) -> Result<()> {
        let delay = backoff_delay(attempt);
        self.logger.debug(&format!(
            "retrying request after {} ms (attempt {}): {cause}",
            delay.as_millis(),
            attempt + 1
        ));

        tokio::select! {
            biased;
            reason = ctx.done() => Err(reason),
            _ = sleep(delay) => Ok(()),
        }
    }
}

/// Linear backoff: `(attempt + 1) * RETRY_BACKOFF_STEP`.
pub(crate) fn backoff_delay(attempt: usize) -> Duration {
    let factor = u32::try_from(attempt.saturating_add(1)).unwrap_or(u32::MAX);
    RETRY_BACKOFF_STEP.saturating_mul(factor)
}

/// Joins `path` onto `base_url`.
///
/// Absolute `http(s)://` paths are used verbatim. Otherwise exactly one `/`
/// separates base and path; a path starting with `?` or `#` is appended as is.
pub(crate) fn resolve_url(base_url: &str, path: &str) -> String {
    if base_url.is_empty() || is_absolute_url(path) {
        return path.to_owned();
    }
    if path.is_empty() || path.starts_with('?') || path.starts_with('#') {
        return format!("{base_url}{path}");
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn is_absolute_url(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn build_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    map.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    map.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| Error::Build(format!("invalid header name {name:?}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| Error::Build(format!("invalid value for header {name}: {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Per-attempt timeouts included; `Timeout` stays reserved.
fn exhausted_transport_error(err: &reqwest::Error) -> ClientError {
    ClientError::new(ErrorKind::ConnectionFailed, err.to_string())
}

fn classify_status(status: StatusCode, body: &[u8]) -> Error {
    let text = String::from_utf8_lossy(body).into_owned();
    let Some(kind) = kind_for_status(status.as_u16()) else {
        return Error::UnexpectedStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_owned(),
            body: text,
        };
    };

    match ErrorEnvelope::parse(&text) {
        Some(envelope) => ClientError {
            kind,
            message: envelope.message.unwrap_or_default(),
            code: envelope.code,
        }
        .into(),
        None => ClientError::new(kind, text)
            .with_code(status.as_u16().to_string())
            .into(),
    }
}

/// Fluent construction of a [`Client`]; each call records a [`ClientOption`].
#[derive(Clone, Debug, Default)]
pub struct ClientBuilder {
    options: Vec<ClientOption>,
}

impl ClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.push(ClientOption::BaseUrl(url.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .push(ClientOption::Header(name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.options.push(ClientOption::Headers(headers));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.push(ClientOption::Timeout(timeout));
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.options.push(ClientOption::Retries(retries));
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.options.push(ClientOption::HttpClient(http));
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.options.push(ClientOption::Logger(logger));
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.options.push(ClientOption::ServiceName(name.into()));
        self
    }

    /// Options recorded so far, in application order.
    pub fn options(&self) -> &[ClientOption] {
        &self.options
    }

    pub fn build(self) -> Result<Client> {
        Client::new(self.options)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use super::{backoff_delay, classify_status, resolve_url, Client};
    use crate::{Error, ErrorKind};

    #[test]
    fn resolve_url_joins_with_single_slash() {
        assert_eq!(resolve_url("http://x", "/users"), "http://x/users");
        assert_eq!(resolve_url("http://x/", "/users"), "http://x/users");
        assert_eq!(resolve_url("http://x/", "users"), "http://x/users");
        assert_eq!(resolve_url("http://x/api", "v1/items"), "http://x/api/v1/items");
        assert_eq!(resolve_url("http://x", "?page=2"), "http://x?page=2");
        assert_eq!(resolve_url("http://x", ""), "http://x");
    }

    #[test]
    fn resolve_url_keeps_absolute_paths() {
        assert_eq!(
            resolve_url("http://x", "https://other/y"),
            "https://other/y"
        );
        assert_eq!(resolve_url("", "http://only/z"), "http://only/z");
        assert_eq!(resolve_url("", "/relative"), "/relative");
    }

    #[test]
    fn backoff_is_linear() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(4), Duration::from_millis(500));
    }

    #[test]
    fn envelope_message_and_code_are_used() {
        let err = classify_status(
            StatusCode::NOT_FOUND,
            br#"{"message":"not found","code":"404"}"#,
        );
        let client_err = err.as_client_error().expect("must be classified");
        assert_eq!(client_err.kind, ErrorKind::NotFound);
        assert_eq!(client_err.message, "not found");
        assert_eq!(client_err.code.as_deref(), Some("404"));
    }

    #[test]
    fn raw_body_and_status_code_used_without_envelope() {
        let err = classify_status(StatusCode::BAD_GATEWAY, b"upstream down");
        let client_err = err.as_client_error().expect("must be classified");
        assert_eq!(client_err.kind, ErrorKind::ServerError);
        assert_eq!(client_err.message, "upstream down");
        assert_eq!(client_err.code.as_deref(), Some("502"));
    }

    #[test]
    fn numeric_code_falls_back_to_raw_body() {
        let body = br#"{"message":"bad","code":17}"#;
        let err = classify_status(StatusCode::BAD_REQUEST, body);
        let client_err = err.as_client_error().expect("must be classified");
        assert_eq!(client_err.kind, ErrorKind::InvalidRequest);
        assert_eq!(client_err.message, r#"{"message":"bad","code":17}"#);
        assert_eq!(client_err.code.as_deref(), Some("400"));
    }

    #[test]
    fn unmapped_status_is_unexpected() {
        let err = classify_status(StatusCode::NOT_MODIFIED, b"");
        match err {
            Error::UnexpectedStatus { status, reason, .. } => {
                assert_eq!(status, 304);
                assert_eq!(reason, "Not Modified");
            }
            other => panic!("expected unexpected status, got {other:?}"),
        }
    }

    #[test]
    fn invalid_header_fails_construction() {
        let err = Client::builder()
            .header("bad header", "value")
            .build()
            .expect_err("header names with spaces must be rejected");
        assert!(matches!(err, Error::Build(_)));
    }

    #[test]
    fn builder_records_options_in_order() {
        let builder = Client::builder()
            .base_url("http://x")
            .header("X-Key", "1")
            .retries(0);
        let names: Vec<_> = builder.options().iter().map(|option| option.name()).collect();
        assert_eq!(names, ["WithBaseURL", "WithHeader", "WithRetries"]);

        let client = builder.build().expect("client must build");
        assert_eq!(client.base_url(), "http://x");
        assert_eq!(client.retries(), 0);
        assert_eq!(client.headers()["X-Key"], "1");
    }

    #[test]
    fn debug_hides_header_values() {
        let client = Client::builder()
            .header("Authorization", "Bearer secret-token")
            .build()
            .expect("client must build");
        let debug = format!("{client:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("secret-token"));
    }
}
