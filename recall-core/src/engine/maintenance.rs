//! Background maintenance: deferred index flushes and shutdown draining.
//!
//! Ingest enqueues ticks and never waits. One named worker thread drains
//! the queue, flushing dirty state on demand, on a periodic timer, and
//! once more on shutdown.

use crate::archive::ArchiveLog;
use crate::dedup::Deduplicator;
use crate::foreshadow::ForeshadowTracker;
use crate::graph::KnowledgeGraph;
use crate::index::IndexSet;
use crate::scope::ScopeId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

const PERIODIC_FLUSH: Duration = Duration::from_secs(60);

/// Queue messages for the maintenance worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// An ingest happened; nothing urgent
    Ingest,
    /// Dirty counters crossed a threshold
    FlushNow,
    /// Drain, flush, exit
    Shutdown,
}

/// Everything the worker (and explicit flushes) touch.
#[derive(Clone)]
pub struct Shared {
    pub indexes: Arc<IndexSet>,
    pub graph: Arc<KnowledgeGraph>,
    pub dedup: Arc<Deduplicator>,
    pub foreshadow: Option<Arc<ForeshadowTracker>>,
    pub scopes: Arc<Mutex<HashMap<ScopeId, Arc<ArchiveLog>>>>,
    pub catalog: Arc<Mutex<HashMap<String, ScopeId>>>,
    pub catalog_path: PathBuf,
}

/// Flush every dirty component. Failures are logged per component; the
/// rest still flush.
pub fn flush_all(shared: &Shared) {
    if let Err(e) = shared.indexes.flush_all() {
        warn!(error = %e, "index flush failed");
    }
    if let Err(e) = shared.graph.flush() {
        warn!(error = %e, "graph flush failed");
    }
    if let Err(e) = shared.dedup.flush() {
        warn!(error = %e, "dedup flush failed");
    }
    if let Some(tracker) = &shared.foreshadow {
        if let Err(e) = tracker.flush() {
            warn!(error = %e, "foreshadowing flush failed");
        }
    }
    let archives: Vec<Arc<ArchiveLog>> = shared.scopes.lock().values().cloned().collect();
    for archive in archives {
        if let Err(e) = archive.flush() {
            warn!(error = %e, "archive flush failed");
        }
    }
    let catalog = shared.catalog.lock().clone();
    if let Err(e) = crate::archive::write_json_atomic(&shared.catalog_path, &catalog) {
        warn!(error = %e, "catalog flush failed");
    }
}

fn worker(receiver: &Receiver<Tick>, shared: &Shared) {
    let mut since_flush = 0u64;
    loop {
        match receiver.recv_timeout(PERIODIC_FLUSH) {
            Ok(Tick::Ingest) => {
                since_flush += 1;
            }
            Ok(Tick::FlushNow) => {
                debug!(since_flush, "threshold flush");
                flush_all(shared);
                since_flush = 0;
            }
            Ok(Tick::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                flush_all(shared);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                if since_flush > 0 {
                    debug!(since_flush, "periodic flush");
                    flush_all(shared);
                    since_flush = 0;
                }
            }
        }
    }
}

/// Handle owning the worker thread. Dropping it drains and joins.
pub struct MaintenanceHandle {
    sender: Sender<Tick>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceHandle {
    /// Spawn the worker.
    pub fn spawn(shared: Shared) -> Self {
        let (sender, receiver) = mpsc::channel();
        let join = std::thread::Builder::new()
            .name("recall-maintenance".to_string())
            .spawn(move || worker(&receiver, &shared))
            .ok();
        Self {
            sender,
            join: Mutex::new(join),
        }
    }

    /// Fire-and-forget notify.
    pub fn notify(&self, tick: Tick) {
        let _ = self.sender.send(tick);
    }

    /// Stop the worker, flushing everything first.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Tick::Shutdown);
        if let Some(handle) = self.join.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
