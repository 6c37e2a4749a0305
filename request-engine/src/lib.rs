//! Request Engine - Core request execution for reqforge
//!
//! This crate provides the execution pipeline for outgoing HTTP requests:
//! variable resolution, auth synthesis, retry with circuit breaking, and
//! the orchestrator that composes and dispatches a request through the
//! installed transport.

pub mod auth;
pub mod curl;
pub mod error;
pub mod history;
pub mod jwt;
pub mod orchestrator;
pub mod retry;
pub mod scope;
pub mod transport;

pub use auth::{ApiKeyLocation, AuthConfig};
pub use curl::{parse_curl, ParsedCurl};
pub use error::{EngineError, EngineResult};
pub use history::{HistoryItem, HistoryStore};
pub use jwt::{decode_jwt, DecodedJwt};
pub use orchestrator::{CollectionStore, RequestOrchestrator, RequestSpec};
pub use retry::{CircuitBreaker, RetryExecutor, RetryPolicy};
pub use scope::VariableScopes;
pub use transport::{HttpTransport, Transport, TransportStack};
