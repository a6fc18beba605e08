//! Scripted identity sources and instrumented document stores for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use acctfetch_shared::{AcctFetchError, DocumentPayload, LookupError, RawRecord, Result};

use crate::lookup::DocumentStore;
use crate::source::IdentitySource;

/// Yields a fixed list of records, then either ends or fails.
pub(crate) struct ScriptedSource {
    records: VecDeque<RawRecord>,
    fail_at_end: bool,
    pub(crate) pulls: usize,
}

impl ScriptedSource {
    pub(crate) fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: records.into(),
            fail_at_end: false,
            pulls: 0,
        }
    }

    /// Return a read error instead of end of stream once the records run out.
    pub(crate) fn then_fail(mut self) -> Self {
        self.fail_at_end = true;
        self
    }
}

#[async_trait]
impl IdentitySource for ScriptedSource {
    async fn next(&mut self) -> Result<Option<RawRecord>> {
        self.pulls += 1;
        match self.records.pop_front() {
            Some(record) => Ok(Some(record)),
            None if self.fail_at_end => Err(AcctFetchError::Source("page fetch failed".into())),
            None => Ok(None),
        }
    }
}

/// In-memory document store that counts concurrent entries.
#[derive(Default)]
pub(crate) struct MemoryStore {
    docs: HashMap<String, DocumentPayload>,
    transient: HashSet<String>,
    panics: HashSet<String>,
    delay: Duration,
    live: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    collections: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_doc(mut self, key: &str, doc: serde_json::Value) -> Self {
        let doc = doc.as_object().cloned().unwrap_or_default();
        self.docs.insert(key.to_string(), doc);
        self
    }

    pub(crate) fn with_transient(mut self, key: &str) -> Self {
        self.transient.insert(key.to_string());
        self
    }

    pub(crate) fn with_panic(mut self, key: &str) -> Self {
        self.panics.insert(key.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of lookups observed running at once.
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn collections_seen(&self) -> Vec<String> {
        self.collections.lock().unwrap().clone()
    }
}

/// Decrements the live counter even if the lookup unwinds.
struct LiveGuard<'a>(&'a AtomicUsize);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> std::result::Result<DocumentPayload, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.collections.lock().unwrap().push(collection.to_string());

        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = LiveGuard(&self.live);
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics.contains(key) {
            panic!("store client crashed on {key}");
        }
        if self.transient.contains(key) {
            return Err(LookupError::Transient("deadline exceeded".into()));
        }
        self.docs
            .get(key)
            .cloned()
            .ok_or_else(|| LookupError::not_found(key))
    }
}
