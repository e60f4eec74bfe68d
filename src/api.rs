//! JSON response helpers for axum handlers.
//!
//! Every body written here is pretty-printed with two-space indentation and
//! ends with a newline. Success bodies look like
//! `{"status_code": 200, "data": .., "meta": ..}` (`meta` omitted when
//! absent); error bodies look like `{"error": {"status_code": .., "message": ..}}`.

use std::fmt;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::json::{self, JsonError};

/// Generic keyed container for response payloads.
pub type Envelope = serde_json::Map<String, JsonValue>;

/// API error carried to the client as `{"error": {..}}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("API Error {status_code}: {message}")]
pub struct ApiError {
    pub status_code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, err: impl fmt::Display) -> Self {
        Self {
            status_code: status.as_u16(),
            message: err.to_string(),
        }
    }

    /// 500: unexpected failures that are not the caller's fault.
    pub fn server_error(err: impl fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }

    /// 400: malformed or invalid input.
    pub fn bad_request(err: impl fmt::Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err)
    }

    pub fn not_found(err: impl fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, err)
    }

    pub fn unauthorized(err: impl fmt::Display) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, err)
    }

    pub fn forbidden(err: impl fmt::Display) -> Self {
        Self::new(StatusCode::FORBIDDEN, err)
    }

    /// 422: well-formed input that fails semantic checks.
    pub fn unprocessable_entity(err: impl fmt::Display) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, err)
    }

    /// The status as an HTTP status code; out-of-range values become 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Standard success body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse<T, M = JsonValue> {
    pub status_code: u16,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<M>,
}

/// Serializes `data` as pretty JSON with `status` and any extra `headers`.
///
/// `Content-Type: application/json` always wins over a caller-supplied
/// content type.
pub fn write_json<T>(
    status: StatusCode,
    data: &T,
    headers: Option<HeaderMap>,
) -> Result<Response, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let mut body = serde_json::to_vec_pretty(data)?;
    body.push(b'\n');

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    if let Some(headers) = headers {
        response.headers_mut().extend(headers);
    }
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// Writes `data` (and optional `meta`) as a 200 success body.
pub fn write_success<T, M>(data: T, meta: Option<M>) -> Result<Response, serde_json::Error>
where
    T: Serialize,
    M: Serialize,
{
    let body = SuccessResponse {
        status_code: StatusCode::OK.as_u16(),
        data,
        meta,
    };
    write_json(StatusCode::OK, &body, None)
}

/// Writes an error body. API errors keep their status; anything else is a 500.
pub fn write_error(err: impl Into<HandlerError>) -> Response {
    let api_err = err.into().into_api_error();
    let status = api_err.status();
    match write_json(status, &ErrorBody { error: &api_err }, None) {
        Ok(response) => response,
        Err(_) => (status, api_err.message).into_response(),
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a ApiError,
}

/// Decodes a request body strictly, mapping failures to a 400.
pub fn decode_body<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    json::decode(body).map_err(ApiError::bad_request)
}

/// Error returned by handlers; converts into an error response and logs it.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Internal(err.into())
    }

    pub fn into_api_error(self) -> ApiError {
        match self {
            Self::Api(err) => err,
            Self::Internal(err) => ApiError::server_error(err),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err)
    }
}

impl From<JsonError> for HandlerError {
    fn from(err: JsonError) -> Self {
        Self::Api(ApiError::bad_request(err))
    }
}

impl From<crate::Error> for HandlerError {
    fn from(err: crate::Error) -> Self {
        Self::internal(err)
    }
}

/// Result type for handlers written against this module.
pub type HandlerResult<T = Response> = Result<T, HandlerError>;

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(err = %self, "HTTP API Error");
        write_error(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        write_error(self)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::to_bytes,
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Response},
    };
    use serde::Deserialize;
    use serde_json::{json, Value as JsonValue};

    use super::{
        decode_body, write_error, write_json, write_success, ApiError, Envelope, HandlerError,
        SuccessResponse,
    };

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body must be readable");
        String::from_utf8(bytes.to_vec()).expect("body must be utf-8")
    }

    #[test]
    fn api_error_display_and_factories() {
        let err = ApiError::not_found("user missing");
        assert_eq!(err.status_code, 404);
        assert_eq!(err.to_string(), "API Error 404: user missing");

        assert_eq!(ApiError::server_error("x").status_code, 500);
        assert_eq!(ApiError::bad_request("x").status_code, 400);
        assert_eq!(ApiError::unauthorized("x").status_code, 401);
        assert_eq!(ApiError::forbidden("x").status_code, 403);
        assert_eq!(ApiError::unprocessable_entity("x").status_code, 422);
    }

    #[test]
    fn envelope_serializes_keys() {
        let mut envelope = Envelope::new();
        envelope.insert("message".to_owned(), json!("Hello"));
        let text = serde_json::to_string(&envelope).expect("envelope must serialize");
        assert_eq!(text, r#"{"message":"Hello"}"#);
    }

    #[tokio::test]
    async fn write_json_pretty_prints_with_trailing_newline() {
        let response = write_json(StatusCode::OK, &json!({"key": "value"}), None)
            .expect("json must serialize");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body_text(response).await, "{\n  \"key\": \"value\"\n}\n");

        let response = write_json(StatusCode::OK, &["apple", "banana"], None)
            .expect("json must serialize");
        assert_eq!(body_text(response).await, "[\n  \"apple\",\n  \"banana\"\n]\n");
    }

    #[tokio::test]
    async fn write_json_copies_extra_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-custom-header", HeaderValue::from_static("test"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let response = write_json(StatusCode::CREATED, &json!({"count": 42}), Some(headers))
            .expect("json must serialize");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-custom-header"], "test");
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(body_text(response).await, "{\n  \"count\": 42\n}\n");
    }

    #[tokio::test]
    async fn write_success_omits_absent_meta() {
        let response =
            write_success(json!({"key": "value"}), None::<JsonValue>).expect("must serialize");
        let text = body_text(response).await;
        assert!(!text.contains("meta"));

        let parsed: SuccessResponse<JsonValue> =
            serde_json::from_str(&text).expect("body must parse");
        assert_eq!(parsed.status_code, 200);
        assert_eq!(parsed.data["key"], "value");
        assert!(parsed.meta.is_none());
    }

    #[tokio::test]
    async fn write_success_includes_meta() {
        let response = write_success(vec!["a", "b"], Some(json!({"count": 2})))
            .expect("must serialize");
        let parsed: SuccessResponse<Vec<String>> =
            serde_json::from_str(&body_text(response).await).expect("body must parse");
        assert_eq!(parsed.data, ["a", "b"]);
        assert_eq!(parsed.meta, Some(json!({"count": 2})));
    }

    #[tokio::test]
    async fn write_error_keeps_api_status() {
        let response = write_error(ApiError::bad_request("invalid request"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: JsonValue =
            serde_json::from_str(&body_text(response).await).expect("body must parse");
        assert_eq!(
            body,
            json!({"error": {"status_code": 400, "message": "invalid request"}})
        );
    }

    #[tokio::test]
    async fn write_error_maps_other_errors_to_500() {
        let response = write_error(HandlerError::internal("test error"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            "{\n  \"error\": {\n    \"status_code\": 500,\n    \"message\": \"test error\"\n  }\n}\n"
        );
    }

    #[tokio::test]
    async fn handler_error_into_response() {
        let response = HandlerError::from(ApiError::not_found("gone")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn decode_body_maps_to_bad_request() {
        #[derive(Debug, Deserialize)]
        struct Input {
            #[allow(dead_code)]
            name: String,
        }

        let err = decode_body::<Input>(b"").expect_err("empty body must fail");
        assert_eq!(err.status_code, 400);
        assert_eq!(err.message, "body must not be empty");

        let err = decode_body::<Input>(br#"{"name":"a","role":"admin"}"#)
            .expect_err("unknown field must fail");
        assert_eq!(err.status_code, 400);
        assert_eq!(err.message, r#"body contains unknown field "role""#);
    }
}
