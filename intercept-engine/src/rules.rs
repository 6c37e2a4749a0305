//! Proxy rule definitions
//!
//! Rules are an ordered list evaluated first-match-wins. The matcher
//! decides whether a rule applies; the action decides what happens to the
//! request.

use reqforge_common::RequestData;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How a rule pattern is compared against the outgoing request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "match", content = "pattern", rename_all = "lowercase")]
pub enum RuleMatcher {
    /// Exact full URL
    Url(String),
    /// Exact host
    Host(String),
    /// Exact pathname
    Path(String),
    /// Regex tested against the full URL
    Regex(String),
}

impl RuleMatcher {
    /// Check whether this matcher applies to the request
    pub fn matches(&self, request: &RequestData) -> bool {
        match self {
            RuleMatcher::Url(pattern) => request.url == *pattern,
            RuleMatcher::Host(pattern) => match url::Url::parse(&request.url) {
                Ok(parsed) => parsed.host_str() == Some(pattern.as_str()),
                Err(_) => false,
            },
            RuleMatcher::Path(pattern) => request.path() == *pattern,
            RuleMatcher::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(&request.url))
                .unwrap_or(false),
        }
    }
}

/// What a matching rule does to the request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RuleAction {
    /// Synthesize a 403 immediately, no network call
    Block,

    /// Sleep, then pass through unmodified
    Delay { delay_ms: u64 },

    /// Synthesize the configured response, no network call
    Mock {
        status: u16,
        #[serde(default)]
        headers: HashMap<String, String>,
        body: String,
    },

    /// Synthesize a 302 pointing at the target
    Redirect { target_url: String },

    /// Rewrite the outgoing request, perform the real call, then
    /// optionally override the response
    Modify {
        #[serde(default)]
        request_headers: HashMap<String, String>,
        #[serde(default)]
        request_body: Option<String>,
        #[serde(default)]
        response_status: Option<u16>,
        #[serde(default)]
        response_headers: HashMap<String, String>,
        #[serde(default)]
        response_body: Option<String>,
    },
}

/// One user-defined proxy rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub matcher: RuleMatcher,
    pub action: RuleAction,
}

impl ProxyRule {
    pub fn new(name: impl Into<String>, matcher: RuleMatcher, action: RuleAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            enabled: true,
            matcher,
            action,
        }
    }

    /// Create the rule disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check if this rule triggers for the request
    pub fn matches(&self, request: &RequestData) -> bool {
        self.enabled && self.matcher.matches(request)
    }
}
