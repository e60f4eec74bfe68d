//! Preconfigured `axum` router.
//!
//! [`with_options`] wraps a set of routes with the standard middleware stack,
//! outermost first: request id, request span, request logging, timeout, panic
//! recovery. Handlers can extract the request-scoped [`Logger`] with
//! `Extension<Logger>` when request logging is enabled.
//!
//! A request that outlives the timeout is answered with `504 Gateway Timeout`.
//! A panicking handler is answered with the `500` error envelope and logged
//! with its request id and a backtrace.

use std::{any::Any, backtrace::Backtrace, sync::Arc, time::Duration};

use axum::{
    body::{self, Body},
    error_handling::HandleErrorLayer,
    extract::{ConnectInfo, Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap, HeaderName, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    BoxError, Router,
};
use serde_json::Value as JsonValue;
use tokio::time::Instant;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
};
use tracing::Instrument;

use crate::{
    api::{self, ApiError},
    logger::Logger,
};

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest request body recorded when `log_request_body` is set.
pub const MAX_LOGGED_BODY: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct RouterOptions {
    pub enable_logging: bool,
    pub enable_recovery: bool,
    pub enable_request_id: bool,
    pub enable_timeout: bool,
    /// Adds `GET /health`.
    pub enable_healthcheck: bool,
    pub timeout: Duration,
    pub logger_options: LoggerOptions,
    /// Base logger for request events.
    pub logger: Logger,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            enable_logging: true,
            enable_recovery: true,
            enable_request_id: true,
            enable_timeout: true,
            enable_healthcheck: true,
            timeout: DEFAULT_TIMEOUT,
            logger_options: LoggerOptions::default(),
            logger: Logger::default(),
        }
    }
}

/// Request logging settings.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggerOptions {
    pub log_request_headers: bool,
    pub log_response_headers: bool,
    /// Records bodies that declare a `Content-Length` of at most
    /// [`MAX_LOGGED_BODY`] bytes.
    pub log_request_body: bool,
    /// Exact paths that are not logged.
    pub skip_paths: Vec<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            log_request_headers: false,
            log_response_headers: false,
            log_request_body: false,
            skip_paths: vec!["/health".to_owned(), "/metrics".to_owned()],
        }
    }
}

/// Wraps `routes` with the default middleware stack.
pub fn new(routes: Router) -> Router {
    with_options(RouterOptions::default(), routes)
}

/// Wraps `routes` with the middleware enabled in `options`.
///
/// Routes added to the returned router afterwards are not covered by the
/// middleware. When the health check is enabled, `routes` must not already
/// define `GET /health`.
pub fn with_options(options: RouterOptions, routes: Router) -> Router {
    let mut router = routes;

    if options.enable_healthcheck {
        router = router.route("/health", get(health));
    }

    // `layer` wraps everything added so far, so the innermost layer goes first.
    if options.enable_recovery {
        router = router.layer(CatchPanicLayer::custom(recover));
    }
    if options.enable_timeout {
        router = router.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(timeout_response))
                .layer(TimeoutLayer::new(options.timeout)),
        );
    }
    if options.enable_logging {
        let state = Arc::new(RequestLogging {
            logger: options.logger,
            options: options.logger_options,
        });
        router = router.layer(middleware::from_fn_with_state(state, log_requests));
    }
    router = router.layer(middleware::from_fn(request_span));
    if options.enable_request_id {
        let header = HeaderName::from_static(X_REQUEST_ID);
        router = router
            .layer(PropagateRequestIdLayer::new(header.clone()))
            .layer(SetRequestIdLayer::new(header, MakeRequestUuid));
    }

    router
}

async fn health() -> &'static str {
    "OK"
}

async fn timeout_response(err: BoxError) -> StatusCode {
    if err.is::<tower::timeout::error::Elapsed>() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        tracing::error!(error = %err, "unhandled middleware error");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Runs the rest of the stack inside a `request` span so events logged
/// anywhere below, panic recovery included, carry the request id.
async fn request_span(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let span = tracing::info_span!(
        "request",
        request_id = request_id.as_deref(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

// The backtrace is taken where the panic is caught, not where it was raised.
fn recover(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    };
    let stack = Backtrace::force_capture();
    tracing::error!(panic = %detail, stack = %stack, "panic recovered");
    api::write_error(ApiError::server_error("internal server error"))
}

struct RequestLogging {
    logger: Logger,
    options: LoggerOptions,
}

async fn log_requests(
    State(state): State<Arc<RequestLogging>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if state.options.skip_paths.iter().any(|skip| *skip == path) {
        return next.run(request).await;
    }

    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let mut logger = state.logger.with_fields([
        ("method", JsonValue::from(request.method().as_str())),
        ("path", JsonValue::from(path)),
        ("request_id", JsonValue::from(request_id)),
    ]);
    if let Some(ConnectInfo(addr)) = request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
    {
        logger = logger.with_field("remote_addr", addr.to_string());
    }
    if state.options.log_request_headers {
        logger = logger.with_field("request_headers", headers_to_json(request.headers()));
    }
    if state.options.log_request_body {
        let (buffered, body) = match buffer_body(request).await {
            Ok(buffered) => buffered,
            Err(response) => return response,
        };
        request = buffered;
        if let Some(body) = body {
            logger = logger.with_field("request_body", body);
        }
    }

    request.extensions_mut().insert(logger.clone());
    logger.info("HTTP request started");

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let mut completed = logger.with_fields([
        ("status", JsonValue::from(response.status().as_u16())),
        (
            "duration_ms",
            JsonValue::from(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
        ),
    ]);
    if state.options.log_response_headers {
        completed = completed.with_field("response_headers", headers_to_json(response.headers()));
    }
    completed.info("HTTP request completed");

    response
}

/// Reads a small body so it can be logged, then puts it back.
async fn buffer_body(request: Request) -> Result<(Request, Option<String>), Response> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if !declared.is_some_and(|len| len > 0 && len <= MAX_LOGGED_BODY) {
        return Ok((request, None));
    }

    let (parts, incoming) = request.into_parts();
    let bytes = body::to_bytes(incoming, MAX_LOGGED_BODY)
        .await
        .map_err(|_| api::write_error(ApiError::bad_request("failed to read request body")))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok((Request::from_parts(parts, Body::from(bytes)), Some(text)))
}

fn headers_to_json(headers: &HeaderMap) -> JsonValue {
    let map = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), JsonValue::from(value)))
        })
        .collect::<serde_json::Map<_, _>>();
    JsonValue::Object(map)
}
