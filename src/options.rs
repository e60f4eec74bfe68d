use std::{collections::BTreeMap, time::Duration};

use crate::logger::Logger;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: usize = 3;
/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Backoff step; the wait after attempt `n` (0-indexed) is `(n + 1) * step`.
pub const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// One configuration step for [`Client::new`](crate::Client::new).
///
/// Options are applied in order. Scalar options overwrite earlier values;
/// header options merge, with later values for the same name winning.
#[derive(Clone, Debug)]
pub enum ClientOption {
    /// Prefix joined onto relative request paths.
    BaseUrl(String),
    /// Underlying transport. Its own timeout is superseded per attempt by
    /// [`ClientOption::Timeout`].
    HttpClient(reqwest::Client),
    /// Adds one header to every request.
    Header(String, String),
    /// Adds several headers to every request.
    Headers(BTreeMap<String, String>),
    /// Per-attempt timeout.
    Timeout(Duration),
    /// Additional attempts after the first transport failure.
    Retries(usize),
    Logger(Logger),
    /// Service name attached to the default logger.
    ServiceName(String),
}

impl ClientOption {
    /// Human-readable option name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BaseUrl(_) => "WithBaseURL",
            Self::HttpClient(_) => "WithHTTPClient",
            Self::Header(..) => "WithHeader",
            Self::Headers(_) => "WithHeaders",
            Self::Timeout(_) => "WithTimeout",
            Self::Retries(_) => "WithRetries",
            Self::Logger(_) => "WithLogger",
            Self::ServiceName(_) => "WithServiceName",
        }
    }

    pub(crate) fn apply(self, settings: &mut Settings) {
        match self {
            Self::BaseUrl(url) => settings.base_url = url,
            Self::HttpClient(http) => settings.http = Some(http),
            Self::Header(name, value) => {
                settings.headers.insert(name, value);
            }
            Self::Headers(headers) => settings.headers.extend(headers),
            Self::Timeout(timeout) => settings.timeout = timeout,
            Self::Retries(retries) => settings.retries = retries,
            Self::Logger(logger) => settings.logger = Some(logger),
            Self::ServiceName(name) => settings.service_name = name,
        }
    }
}

/// Accumulated option values before validation.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub base_url: String,
    pub http: Option<reqwest::Client>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub retries: usize,
    pub logger: Option<Logger>,
    pub service_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            http: None,
            headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            logger: None,
            service_name: String::new(),
        }
    }
}

impl Settings {
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = ClientOption>,
    {
        let mut settings = Self::default();
        for option in options {
            option.apply(&mut settings);
        }
        settings
    }
}
