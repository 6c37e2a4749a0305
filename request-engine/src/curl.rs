//! cURL command import
//!
//! Pattern extraction of `-X`, `-H 'Key: Value'` and `--data`/`--data-raw`
//! from a pasted curl command line. Unmatched patterns yield empty fields;
//! this parser never fails.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

lazy_static! {
    static ref METHOD_RE: Regex = Regex::new(r"-X\s+([A-Za-z]+)").unwrap();
    static ref URL_RE: Regex = Regex::new(r#"https?://[^\s'"]+"#).unwrap();
    static ref HEADER_RE: Regex =
        Regex::new(r#"-H\s+(?:'([^:']+):\s*([^']*)'|"([^:"]+):\s*([^"]*)")"#).unwrap();
    static ref DATA_RE: Regex =
        Regex::new(r#"--data(?:-raw)?\s+(?:'([^']*)'|"([^"]*)")"#).unwrap();
}

/// The request fields recovered from a curl command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCurl {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Parse a curl command line into request fields
///
/// The method defaults to GET when no `-X` flag is present.
pub fn parse_curl(input: &str) -> ParsedCurl {
    let method = METHOD_RE
        .captures(input)
        .map(|caps| caps[1].to_uppercase())
        .unwrap_or_else(|| "GET".to_string());

    let url = URL_RE
        .find(input)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut headers = HashMap::new();
    for caps in HEADER_RE.captures_iter(input) {
        let (key, value) = match (caps.get(1), caps.get(3)) {
            (Some(key), _) => (key.as_str(), caps.get(2).map_or("", |m| m.as_str())),
            (_, Some(key)) => (key.as_str(), caps.get(4).map_or("", |m| m.as_str())),
            _ => continue,
        };
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }

    let body = DATA_RE.captures(input).map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str())
            .to_string()
    });

    ParsedCurl {
        method,
        url,
        headers,
        body,
    }
}
