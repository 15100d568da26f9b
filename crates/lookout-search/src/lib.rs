//! Client for the full-text search store.
//!
//! Wraps the store's REST API (search, count, document indexing, cluster
//! health) behind the [`SearchBackend`] trait so the engine can be driven
//! against a fake in tests. Also owns the trigger-query builder.

pub mod client;
pub mod error;
pub mod query;

use async_trait::async_trait;
use serde_json::Value;

use lookout_common::types::SearchResponse;

pub use client::SearchClient;
pub use error::{Result, SearchError};

/// The operations the rule engine needs from the search store.
///
/// All calls are expected to run under the caller's deadline; the concrete
/// client additionally carries its own per-request timeout.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// POST `body` to `/{index}/_search` and parse the response envelope.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse>;

    /// POST `body` to `/{index}/_count`.
    async fn count(&self, index: &str, body: &Value) -> Result<i64>;

    /// PUT a document under an explicit id.
    async fn index(&self, index: &str, id: &str, doc: &Value) -> Result<()>;

    /// POST a document and let the store assign the id.
    async fn index_auto_id(&self, index: &str, doc: &Value) -> Result<()>;

    /// GET `/_cluster/health`; a red cluster or a failed call is
    /// [`SearchError::Unavailable`].
    async fn health_probe(&self) -> Result<()>;
}
