//! InMemoryDocAdapter - リビジョン付きのドキュメントストア（開発用）
//!
//! 障害注入: fetch を N 回 Unavailable にする / write を Rejected にする。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::domain::DocSystem;
use crate::error::DocError;
use crate::ports::{DocAdapter, FetchedContent};

#[derive(Debug, Clone)]
struct StoredDoc {
    title: String,
    content: String,
    revision: u64,
}

pub struct InMemoryDocAdapter {
    system: DocSystem,
    docs: RwLock<HashMap<String, StoredDoc>>,
    unavailable_fetches: AtomicU32,
    reject_writes: AtomicBool,
}

fn poison_err<T>(_: PoisonError<T>) -> DocError {
    DocError::Unavailable("doc table lock poisoned".to_string())
}

impl InMemoryDocAdapter {
    pub fn new(system: DocSystem) -> Self {
        Self {
            system,
            docs: RwLock::new(HashMap::new()),
            unavailable_fetches: AtomicU32::new(0),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Create or overwrite a document; each call bumps the revision.
    pub fn put(&self, doc_id: &str, title: &str, content: &str) -> u64 {
        let Ok(mut docs) = self.docs.write() else {
            return 0;
        };
        let revision = docs.get(doc_id).map_or(1, |d| d.revision + 1);
        docs.insert(
            doc_id.to_string(),
            StoredDoc {
                title: title.to_string(),
                content: content.to_string(),
                revision,
            },
        );
        revision
    }

    /// Simulate someone editing the doc outside the workflow.
    pub fn edit(&self, doc_id: &str, content: &str) -> u64 {
        let title = self.title(doc_id).unwrap_or_default();
        self.put(doc_id, &title, content)
    }

    pub fn content(&self, doc_id: &str) -> Option<String> {
        self.docs.read().ok()?.get(doc_id).map(|d| d.content.clone())
    }

    pub fn revision(&self, doc_id: &str) -> Option<u64> {
        self.docs.read().ok()?.get(doc_id).map(|d| d.revision)
    }

    fn title(&self, doc_id: &str) -> Option<String> {
        self.docs.read().ok()?.get(doc_id).map(|d| d.title.clone())
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.unavailable_fetches.store(n, Ordering::SeqCst);
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocAdapter for InMemoryDocAdapter {
    fn system(&self) -> DocSystem {
        self.system
    }

    async fn fetch(&self, doc_id: &str) -> Result<FetchedContent, DocError> {
        let injected = self
            .unavailable_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DocError::Unavailable(format!("{} timed out", self.system)));
        }

        let docs = self.docs.read().map_err(poison_err)?;
        let doc = docs
            .get(doc_id)
            .ok_or_else(|| DocError::NotFound(doc_id.to_string()))?;
        Ok(FetchedContent {
            title: doc.title.clone(),
            content: doc.content.clone(),
            revision: doc.revision.to_string(),
        })
    }

    async fn write(
        &self,
        doc_id: &str,
        base_revision: &str,
        new_content: &str,
    ) -> Result<String, DocError> {
        let mut docs = self.docs.write().map_err(poison_err)?;
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| DocError::NotFound(doc_id.to_string()))?;

        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DocError::Rejected(format!("{doc_id} is read-only")));
        }
        let current = doc.revision.to_string();
        if current != base_revision {
            return Err(DocError::Conflict {
                doc_id: doc_id.to_string(),
                base: base_revision.to_string(),
                current,
            });
        }

        doc.content = new_content.to_string();
        doc.revision += 1;
        Ok(doc.revision.to_string())
    }
}
