//! DocAdapter port - ドキュメントシステムの境界
//!
//! - fetch: 本文とリビジョンを取得
//! - write: ベースリビジョン付きの楽観的書き戻し
//!
//! エラーは区別できる必要がある: Conflict / NotFound / Unavailable（一時的）/ Rejected（恒久的）

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::DocSystem;
use crate::error::DocError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub title: String,
    pub content: String,
    pub revision: String,
}

#[async_trait]
pub trait DocAdapter: Send + Sync {
    fn system(&self) -> DocSystem;

    async fn fetch(&self, doc_id: &str) -> Result<FetchedContent, DocError>;

    /// Replace the document body if its revision is still `base_revision`.
    ///
    /// Returns the new revision.
    async fn write(
        &self,
        doc_id: &str,
        base_revision: &str,
        new_content: &str,
    ) -> Result<String, DocError>;
}

/// Adapters keyed by the system they serve.
#[derive(Clone, Default)]
pub struct DocAdapters {
    adapters: HashMap<DocSystem, Arc<dyn DocAdapter>>,
}

impl DocAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter; a later one for the same system replaces it.
    pub fn with(mut self, adapter: Arc<dyn DocAdapter>) -> Self {
        self.adapters.insert(adapter.system(), adapter);
        self
    }

    pub fn get(&self, system: DocSystem) -> Option<&Arc<dyn DocAdapter>> {
        self.adapters.get(&system)
    }

    pub fn supports(&self, system: DocSystem) -> bool {
        self.adapters.contains_key(&system)
    }
}
