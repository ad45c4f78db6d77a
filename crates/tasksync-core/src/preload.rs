//! Session-scoped bulk preload.
//!
//! A `PreloadCoordinator` fetches a wide date range when a session starts so
//! that the first screens can render from memory. The task cache reads its
//! snapshot, subscribes to late arrivals, and may wait once, bounded, on a
//! fetch that is still running.

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::CoreError;
use crate::models::Task;
use crate::repository::RemoteTaskStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadSnapshot {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tasks_by_date: BTreeMap<NaiveDate, Vec<Task>>,
}

impl PreloadSnapshot {
    pub fn from_tasks(start: NaiveDate, end: NaiveDate, tasks: Vec<Task>) -> Self {
        let mut tasks_by_date: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
        for task in tasks.into_iter().filter(|t| t.date >= start && t.date <= end) {
            tasks_by_date.entry(task.date).or_default().push(task);
        }
        Self {
            start,
            end,
            tasks_by_date,
        }
    }

    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= start && end <= self.end
    }

    /// Tasks dated within `start..=end`.
    pub fn tasks_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<Task> {
        self.tasks_by_date
            .range(start..=end)
            .flat_map(|(_, tasks)| tasks.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type PreloadListener = Arc<dyn Fn(&PreloadSnapshot) + Send + Sync>;

pub struct PreloadCoordinator {
    store: Arc<dyn RemoteTaskStore>,
    snapshot: RwLock<Option<Arc<PreloadSnapshot>>>,
    listeners: Mutex<Vec<(ListenerId, PreloadListener)>>,
    next_listener: AtomicU64,
    /// Bumped by `invalidate`; a fetch that started under an older generation is discarded.
    generation: AtomicU64,
    loading: watch::Sender<bool>,
}

impl fmt::Debug for PreloadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadCoordinator")
            .field("has_snapshot", &self.snapshot.read().is_some())
            .field("listeners", &self.listeners.lock().len())
            .field("loading", &self.is_loading())
            .finish_non_exhaustive()
    }
}

impl PreloadCoordinator {
    pub fn new(store: Arc<dyn RemoteTaskStore>) -> Arc<Self> {
        let (loading, _) = watch::channel(false);
        Arc::new(Self {
            store,
            snapshot: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            loading,
        })
    }

    pub fn get_snapshot(&self) -> Option<Arc<PreloadSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn on_update(&self, listener: PreloadListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn off_update(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    /// Fetches `start..=end` from the store, keeps it as the session snapshot
    /// and hands it to every listener.
    #[instrument(skip(self))]
    pub async fn preload(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Arc<PreloadSnapshot>, CoreError> {
        if start > end {
            return Err(CoreError::InvalidInput(format!(
                "Preload range is inverted: {} > {}",
                start, end
            )));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        self.loading.send_replace(true);
        let fetched = self.store.list(start, end).await;
        self.loading.send_replace(false);

        let tasks = fetched.map_err(|e| {
            warn!(error = %e, "Preload fetch failed");
            e
        })?;

        let snapshot = Arc::new(PreloadSnapshot::from_tasks(start, end, tasks));
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Preload finished after invalidation, discarding");
            return Ok(snapshot);
        }

        *self.snapshot.write() = Some(Arc::clone(&snapshot));
        info!(
            days = snapshot.tasks_by_date.len(),
            "Preload snapshot ready"
        );

        let listeners: Vec<PreloadListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }

        Ok(snapshot)
    }

    /// Runs [`preload`](Self::preload) on the runtime. The coordinator reports
    /// itself as loading from the moment this returns.
    pub fn spawn_preload(
        self: &Arc<Self>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> JoinHandle<Result<Arc<PreloadSnapshot>, CoreError>> {
        self.loading.send_replace(true);
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.preload(start, end).await })
    }

    /// Waits for an in-flight preload to finish, for at most `timeout`.
    pub async fn wait_until_loaded(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.loading.subscribe();
        let finished = tokio::time::timeout(timeout, rx.wait_for(|loading| !*loading))
            .await
            .is_ok();
        if finished {
            Ok(())
        } else {
            Err(CoreError::Timeout)
        }
    }

    /// Drops the snapshot and discards any fetch still in flight. Listeners
    /// stay subscribed and receive the next preload.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.snapshot.write() = None;
        self.loading.send_replace(false);
    }
}
