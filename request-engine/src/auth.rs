//! Auth material synthesis from a declarative configuration
//!
//! Every field is passed through the variable resolver before use. Absent
//! or empty fields silently produce no auth material; malformed input never
//! raises.

use crate::scope::VariableScopes;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where an API key is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
}

/// Declarative auth configuration for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    ApiKey {
        key: String,
        value: String,
        location: ApiKeyLocation,
    },
}

impl AuthConfig {
    /// Build the headers this configuration contributes to the request
    pub fn headers(&self, scopes: &VariableScopes) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        match self {
            AuthConfig::None => {}
            AuthConfig::Bearer { token } => {
                let token = scopes.resolve(token);
                if !token.is_empty() {
                    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
                }
            }
            AuthConfig::Basic { username, password } => {
                let username = scopes.resolve(username);
                let password = scopes.resolve(password);
                if !username.is_empty() || !password.is_empty() {
                    let encoded = BASE64.encode(format!("{}:{}", username, password));
                    headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
                }
            }
            AuthConfig::ApiKey {
                key,
                value,
                location: ApiKeyLocation::Header,
            } => {
                let key = scopes.resolve(key);
                let value = scopes.resolve(value);
                if !key.is_empty() && !value.is_empty() {
                    headers.insert(key, value);
                }
            }
            AuthConfig::ApiKey {
                location: ApiKeyLocation::Query,
                ..
            } => {}
        }
        headers
    }

    /// Build the query parameters this configuration contributes
    pub fn query_params(&self, scopes: &VariableScopes) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let AuthConfig::ApiKey {
            key,
            value,
            location: ApiKeyLocation::Query,
        } = self
        {
            let key = scopes.resolve(key);
            let value = scopes.resolve(value);
            if !key.is_empty() && !value.is_empty() {
                params.insert(key, value);
            }
        }
        params
    }
}
