//! Mock route definitions
//!
//! A mock route short-circuits the network: a matching request gets the
//! configured response after an artificial latency, without any I/O.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wildmatch::WildMatch;

/// A user-defined mock route
///
/// `path` is matched against the request path by exact equality or, when it
/// ends in `/*`, as a wildcard prefix. A regex `condition` overrides the
/// path match entirely when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockRoute {
    pub id: String,
    pub path: String,
    /// Optional regex evaluated against the request path instead of `path`
    pub condition: Option<String>,
    pub status: u16,
    pub latency_ms: u64,
    pub content_type: String,
    pub body: String,
}

impl MockRoute {
    /// Create a route answering `path` with a JSON body
    pub fn new(path: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path: path.into(),
            condition: None,
            status,
            latency_ms: 0,
            content_type: "application/json".to_string(),
            body: body.into(),
        }
    }

    /// Attach a regex condition
    pub fn with_condition(mut self, pattern: impl Into<String>) -> Self {
        self.condition = Some(pattern.into());
        self
    }

    /// Set the artificial latency applied before the response is returned
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set the response content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Check if this route matches the given request path
    ///
    /// A regex condition wins over the declared path. Otherwise the path
    /// matches on exact equality, or as a wildcard when it ends in `/*`.
    pub fn matches_path(&self, request_path: &str) -> bool {
        if let Some(pattern) = &self.condition {
            return regex::Regex::new(pattern)
                .map(|re| re.is_match(request_path))
                .unwrap_or(false);
        }

        if self.path == request_path {
            return true;
        }

        if self.path.ends_with("/*") {
            return WildMatch::new(&self.path).matches(request_path);
        }

        false
    }

    /// Fast-path check used before dispatch: the declared path contained
    /// anywhere in the final URL
    pub fn matches_url(&self, url: &str) -> bool {
        !self.path.is_empty() && url.contains(&self.path)
    }
}
