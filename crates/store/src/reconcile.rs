//! Asynchronous secondary-index reconciliation
//!
//! The schema registry's declared index paths are the desired state;
//! reconciliation converges the physical indexes to it. Work is applied
//! by a dedicated worker so DDL-like operations serialize per target
//! table and schema upserts never block on index completion.
//!
//! Removed indexes are dropped before added indexes are created, to
//! avoid transient double-maintenance cost. Index names are deterministic
//! functions of (table, sanitized path), so re-running a reconciliation
//! with the same sets is a no-op.

use crate::column::ColumnStore;
use crate::partition::{sanitize, table_name, PartitionManager};
use crate::predicate::chain_expr;
use loam_core::PathChain;
use loam_registry::{SchemaDefinition, SchemaObserver};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Deterministic index name for a declared path on a table
pub fn index_name(table: &str, path: &str) -> String {
    format!("ix_{table}_{}", sanitize(path))
}

struct Job {
    table: String,
    removed: BTreeSet<String>,
    added: BTreeSet<String>,
}

struct Inner {
    queue: Mutex<VecDeque<Job>>,
    ready: Condvar,
    drained: Condvar,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
}

/// Single-worker index reconciler
pub struct IndexReconciler {
    store: Arc<dyn ColumnStore>,
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IndexReconciler {
    pub fn new(store: Arc<dyn ColumnStore>) -> Arc<Self> {
        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            drained: Condvar::new(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        });

        let reconciler = Arc::new(Self {
            store: Arc::clone(&store),
            inner: Arc::clone(&inner),
            worker: Mutex::new(None),
        });

        let handle = {
            let inner = Arc::clone(&inner);
            let store = Arc::clone(&store);
            std::thread::Builder::new()
                .name("loam-reconcile".to_string())
                .spawn(move || worker_loop(inner, store))
                .expect("spawn reconciler worker")
        };
        *reconciler.worker.lock() = Some(handle);
        reconciler
    }

    /// Queue a reconciliation; fire-and-forget relative to the caller
    pub fn enqueue(&self, table: &str, added: BTreeSet<String>, removed: BTreeSet<String>) {
        if added.is_empty() && removed.is_empty() {
            return;
        }
        let mut queue = self.inner.queue.lock();
        queue.push_back(Job {
            table: table.to_string(),
            removed,
            added,
        });
        self.inner.ready.notify_one();
    }

    /// Reconcile the physical indexes of `table` from `old` to `new`
    /// synchronously, returning the number of DDL statements issued
    ///
    /// Idempotent: reconciling with identical sets issues no DDL.
    pub fn reconcile(
        &self,
        table: &str,
        old: &BTreeSet<String>,
        new: &BTreeSet<String>,
    ) -> loam_core::Result<usize> {
        let removed: BTreeSet<String> = old.difference(new).cloned().collect();
        let added: BTreeSet<String> = new.difference(old).cloned().collect();
        apply(&*self.store, table, &removed, &added)
    }

    /// Block until every queued reconciliation has been applied
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.in_flight.load(Ordering::Acquire) > 0 {
            self.inner.drained.wait(&mut queue);
        }
    }
}

impl Drop for IndexReconciler {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.ready.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<Inner>, store: Arc<dyn ColumnStore>) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.in_flight.store(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.ready.wait(&mut queue);
            }
        };

        if let Err(e) = apply(&*store, &job.table, &job.removed, &job.added) {
            error!(table = %job.table, error = %e, "index reconciliation failed");
        }

        inner.in_flight.store(0, Ordering::Release);
        let _queue = inner.queue.lock();
        inner.drained.notify_all();
    }
}

/// Drop removed indexes, then create added ones
fn apply(
    store: &dyn ColumnStore,
    table: &str,
    removed: &BTreeSet<String>,
    added: &BTreeSet<String>,
) -> loam_core::Result<usize> {
    let existing = store.index_names(table)?;
    let mut statements = 0;

    for path in removed {
        let name = index_name(table, path);
        if existing.contains(&name) {
            store.drop_index(table, &name)?;
            statements += 1;
            debug!(%table, index = %name, "index dropped");
        }
    }

    for path in added {
        let name = index_name(table, path);
        if existing.contains(&name) {
            continue;
        }
        let chain = PathChain::parse(path)?;
        let expression = chain_expr(&chain, true);
        store.create_index(table, &name, &expression)?;
        statements += 1;
        debug!(%table, index = %name, %expression, "index created");
    }

    Ok(statements)
}

/// The partition and index lifecycle manager
///
/// Subscribes to the schema registry: upserts provision the current and
/// next partition for the schema's table; declared-index-path changes are
/// queued for asynchronous reconciliation.
pub struct PartitionIndexManager {
    partitions: PartitionManager,
    reconciler: Arc<IndexReconciler>,
}

impl PartitionIndexManager {
    pub fn new(store: Arc<dyn ColumnStore>) -> Self {
        Self {
            partitions: PartitionManager::new(Arc::clone(&store)),
            reconciler: IndexReconciler::new(store),
        }
    }

    pub fn reconciler(&self) -> &Arc<IndexReconciler> {
        &self.reconciler
    }

    pub fn partitions(&self) -> &PartitionManager {
        &self.partitions
    }
}

impl SchemaObserver for PartitionIndexManager {
    fn schema_upserted(&self, schema: &SchemaDefinition) {
        let key = schema.key();
        if let Err(e) = self.partitions.ensure_current_and_next(
            &key,
            schema.partition_granularity,
            chrono::Utc::now(),
        ) {
            error!(schema = %key, error = %e, "partition provisioning failed");
        }
    }

    fn index_paths_changed(
        &self,
        schema: &SchemaDefinition,
        added: BTreeSet<String>,
        removed: BTreeSet<String>,
    ) {
        let table = table_name(&schema.key());
        self.reconciler.enqueue(&table, added, removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryColumnStore;

    fn paths(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn index_names_are_deterministic() {
        assert_eq!(index_name("t", "user.email"), "ix_t_user_email");
        assert_eq!(index_name("t", "items[*].sku"), "ix_t_items____sku");
        assert_eq!(index_name("t", "user.email"), index_name("t", "user.email"));
    }

    #[test]
    fn reconcile_creates_missing_indexes() {
        let store = Arc::new(MemoryColumnStore::new());
        let reconciler = IndexReconciler::new(store.clone());

        let n = reconciler
            .reconcile("t", &BTreeSet::new(), &paths(&["email", "profile.age"]))
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.index_names("t").unwrap().len(), 2);
        assert_eq!(
            store.index_expression("t", "ix_t_email").as_deref(),
            Some("data->>'email'")
        );
    }

    #[test]
    fn reconcile_same_sets_twice_issues_no_ddl() {
        let store = Arc::new(MemoryColumnStore::new());
        let reconciler = IndexReconciler::new(store.clone());
        let declared = paths(&["email", "age"]);

        reconciler
            .reconcile("t", &BTreeSet::new(), &declared)
            .unwrap();
        let before = store.ddl_log().len();

        let n = reconciler.reconcile("t", &declared, &declared).unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.ddl_log().len(), before);
    }

    #[test]
    fn removed_indexes_drop_before_added_ones_create() {
        let store = Arc::new(MemoryColumnStore::new());
        let reconciler = IndexReconciler::new(store.clone());

        reconciler
            .reconcile("t", &BTreeSet::new(), &paths(&["email"]))
            .unwrap();
        reconciler
            .reconcile("t", &paths(&["email"]), &paths(&["age"]))
            .unwrap();

        let log = store.ddl_log();
        let drop_pos = log.iter().position(|s| s.starts_with("DROP INDEX")).unwrap();
        let create_pos = log
            .iter()
            .position(|s| s.contains("ix_t_age"))
            .unwrap();
        assert!(drop_pos < create_pos);
        assert_eq!(
            store.index_names("t").unwrap(),
            paths(&["ix_t_age"])
        );
    }

    #[test]
    fn wildcard_paths_index_the_container() {
        let store = Arc::new(MemoryColumnStore::new());
        let reconciler = IndexReconciler::new(store.clone());

        reconciler
            .reconcile("t", &BTreeSet::new(), &paths(&["items[*].value"]))
            .unwrap();
        let name = index_name("t", "items[*].value");
        assert_eq!(
            store.index_expression("t", &name).as_deref(),
            Some("data->>'items'")
        );
    }

    #[test]
    fn enqueue_applies_asynchronously() {
        let store = Arc::new(MemoryColumnStore::new());
        let reconciler = IndexReconciler::new(store.clone());

        reconciler.enqueue("t", paths(&["email"]), BTreeSet::new());
        reconciler.drain();

        assert_eq!(store.index_names("t").unwrap().len(), 1);
    }

    #[test]
    fn empty_diff_enqueues_nothing() {
        let store = Arc::new(MemoryColumnStore::new());
        let reconciler = IndexReconciler::new(store.clone());
        reconciler.enqueue("t", BTreeSet::new(), BTreeSet::new());
        reconciler.drain();
        assert!(store.ddl_log().is_empty());
    }

    #[test]
    fn observer_provisions_partitions_and_queues_indexes() {
        let store = Arc::new(MemoryColumnStore::new());
        let manager = PartitionIndexManager::new(store.clone());
        let schema = SchemaDefinition::new("acme", "crm", "user", "v1")
            .with_indexed_path("email");

        manager.schema_upserted(&schema);
        manager.index_paths_changed(
            &schema,
            paths(&["email"]),
            BTreeSet::new(),
        );
        manager.reconciler().drain();

        let table = table_name(&schema.key());
        assert_eq!(store.partitions(&table).len(), 2);
        assert_eq!(store.index_names(&table).unwrap().len(), 1);
    }
}
