//! Intercept Engine - Mock routes and proxy rules for reqforge
//!
//! The `Interceptor` sits between the request orchestrator and the real
//! transport. It evaluates proxy rules and mock routes first-match-wins
//! and falls back to the wrapped transport when nothing matches.

pub mod interceptor;
pub mod rules;

pub use interceptor::{InterceptStats, Interceptor, RuleDisposition, TrafficLogEntry};
pub use rules::{ProxyRule, RuleAction, RuleMatcher};
