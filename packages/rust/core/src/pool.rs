//! Bounded worker pool.
//!
//! The dispatcher acquires a semaphore permit before each spawn, so at most
//! `limit` units of work exist at any instant no matter how many records
//! the source yields. The permit lives inside the task and is released when
//! the task finishes, panics included. Finished tasks are reaped on each
//! submit, so bookkeeping tracks live work rather than the whole run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, trace};

use acctfetch_shared::{AcctFetchError, Result};

/// Runs submitted futures with a fixed concurrency ceiling.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    /// Key of the record each unreaped task is working on.
    keys: HashMap<Id, String>,
    /// `(key, reason)` for reaped tasks that did not run to completion.
    aborted: Vec<(String, String)>,
    limit: usize,
    peak: usize,
}

impl WorkerPool {
    /// Create a pool admitting at most `limit` concurrent tasks.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            tasks: JoinSet::new(),
            keys: HashMap::new(),
            aborted: Vec::new(),
            limit,
            peak: 0,
        }
    }

    /// Wait for a free slot, then spawn `work` tagged with `key`.
    pub async fn submit<F>(&mut self, key: String, work: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AcctFetchError::validation("worker pool admission gate closed"))?;

        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.settle(joined);
        }

        let busy = self.limit - self.semaphore.available_permits();
        self.peak = self.peak.max(busy);
        trace!(%key, busy, "dispatching");

        let handle = self.tasks.spawn(async move {
            let _permit = permit;
            work.await;
        });
        self.keys.insert(handle.id(), key);
        Ok(())
    }

    /// Block until every submitted task has finished.
    ///
    /// Returns `(key, reason)` for each task that did not run to completion.
    pub async fn drain(&mut self) -> Vec<(String, String)> {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.settle(joined);
        }
        std::mem::take(&mut self.aborted)
    }

    fn settle(&mut self, joined: std::result::Result<(Id, ()), JoinError>) {
        match joined {
            Ok((id, ())) => {
                self.keys.remove(&id);
            }
            Err(e) => {
                let key = self.keys.remove(&e.id()).unwrap_or_default();
                error!(%key, error = %e, "worker task did not complete");
                self.aborted.push((key, e.to_string()));
            }
        }
    }

    /// Most slots observed taken at dispatch time.
    pub fn peak(&self) -> usize {
        self.peak
    }
}
