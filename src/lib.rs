//! `corekit` bundles the building blocks shared by small JSON services.
//!
//! The centerpiece is [`Client`], a JSON REST client that retries transport
//! failures with linear backoff and classifies every failure into an
//! [`ErrorKind`]:
//! - [`Client::get`], [`Client::post`], [`Client::put`], [`Client::patch`],
//!   [`Client::delete`]
//! - [`Client::request`] for any method
//! - [`Client::send`] when the response body is not needed
//!
//! Alongside it:
//! - [`api`]: JSON success and error envelopes for `axum` handlers
//! - [`router`]: an `axum` router with request id, logging, timeout and
//!   panic recovery middleware
//! - [`json`]: strict request-body decoding
//! - [`config`]: environment-driven configuration
//! - [`logger`]: a structured logging handle over `tracing`
//! - [`validate`]: per-field input validation
//! - [`strings`], [`timeutils`]: formatting helpers

mod client;
mod context;
mod error;
mod options;
mod wire;

pub mod api;
pub mod config;
pub mod json;
pub mod logger;
pub mod router;
pub mod strings;
pub mod timeutils;
pub mod validate;

pub use client::{Client, ClientBuilder};
pub use context::Context;
pub use error::{kind_for_status, ClientError, Error, ErrorKind};
pub use options::{ClientOption, DEFAULT_RETRIES, DEFAULT_TIMEOUT, RETRY_BACKOFF_STEP};
pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, Error>;
