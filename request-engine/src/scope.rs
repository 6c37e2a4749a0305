//! Layered variable scopes and `{{name}}` template resolution
//!
//! Resolution precedence is session > active environment > global > chain
//! variables. Unresolved placeholders are left as literal `{{key}}` tokens
//! so the user can see which variables are missing.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"\{\{([^{}]*?)\}\}").unwrap();
}

/// The full variable scope set for one workspace
///
/// `session` is never persisted; `chain_vars` holds values extracted from
/// prior responses at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableScopes {
    pub global: HashMap<String, String>,
    pub scoped: HashMap<String, HashMap<String, String>>,
    pub session: HashMap<String, String>,
    pub active_env: String,
    pub chain_vars: HashMap<String, String>,
}

impl VariableScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the active environment
    pub fn set_active_env(&mut self, name: impl Into<String>) {
        self.active_env = name.into();
    }

    /// Set a global variable
    pub fn set_global(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.global.insert(key.into(), value.into());
    }

    /// Set a variable in a named environment
    pub fn set_env_var(
        &mut self,
        env: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.scoped
            .entry(env.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Set a session-scoped variable
    pub fn set_session(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.session.insert(key.into(), value.into());
    }

    /// Record a variable extracted from a prior response
    pub fn set_chain_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.chain_vars.insert(key.into(), value.into());
    }

    /// Look up a variable following the precedence chain
    pub fn lookup(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.session.get(key) {
            return Some(value);
        }
        if let Some(env) = self.scoped.get(&self.active_env) {
            if let Some(value) = env.get(key) {
                return Some(value);
            }
        }
        if let Some(value) = self.global.get(key) {
            return Some(value);
        }
        self.chain_vars.get(key).map(String::as_str)
    }

    /// Substitute every `{{name}}` token in the template
    ///
    /// Whitespace inside the braces is trimmed before lookup. Unknown keys
    /// pass through unchanged. There is no escape for a literal `{{`.
    pub fn resolve(&self, template: &str) -> String {
        TOKEN_RE
            .replace_all(template, |caps: &regex::Captures| {
                let key = caps[1].trim();
                match self.lookup(key) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
