//! Optimistic task synchronization.
//!
//! `TaskSync` owns the session's task cache. Every mutation is applied to the
//! cache before the remote store is contacted, so readers never wait on the
//! network for a change they just made. When the store rejects the change the
//! cache is rolled back and a [`FailureNotice`] is broadcast.
//!
//! Records created locally carry a temporary id until the store answers.
//! Edits, toggles and deletes against such a record are recorded on the
//! record itself and replayed against the durable id once the create
//! resolves.
//!
//! Rollback restores the snapshot taken just before the optimistic apply. If
//! other mutations have been installed in the meantime, only the records this
//! mutation touched are reverted, and only those that have not been written
//! again since.

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheState, Entry, PendingIntent};
use crate::error::CoreError;
use crate::models::{LocalIdGenerator, NewTask, Task, TaskId, TaskPatch};
use crate::notify::{NoopScheduler, NotificationScheduler};
use crate::preload::{ListenerId, PreloadCoordinator, PreloadSnapshot};
use crate::range::{intersect, uncovered, window_for, RangeCache};
use crate::repository::RemoteTaskStore;
use crate::widget::{NoopPublisher, WidgetPublisher};

/// Tuning knobs for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Longest a range read waits for an in-flight preload before fetching on its own.
    pub preload_wait: Duration,
    /// Buffered failure notices per subscriber.
    pub failure_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            preload_wait: Duration::from_secs(3),
            failure_channel_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Move,
    Toggle,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Move => write!(f, "move"),
            Operation::Toggle => write!(f, "toggle"),
        }
    }
}

/// One per failed mutation, for the UI to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub operation: Operation,
    pub task_id: TaskId,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// The record was not on the selected date, or already on the target date.
    Ignored,
}

type Today = Box<dyn Fn() -> NaiveDate + Send + Sync>;

/// Result of installing an optimistic change.
struct Applied<R> {
    snapshot: Arc<CacheState>,
    version: u64,
    value: R,
}

struct Inner {
    store: Arc<dyn RemoteTaskStore>,
    publisher: Arc<dyn WidgetPublisher>,
    scheduler: Arc<dyn NotificationScheduler>,
    preload: Option<Arc<PreloadCoordinator>>,
    listener: Mutex<Option<ListenerId>>,
    state: Mutex<Arc<CacheState>>,
    ranges: Mutex<RangeCache>,
    selected: Mutex<NaiveDate>,
    preload_waited: AtomicBool,
    /// True once a write has cleared the fetched ranges since the last snapshot arrived.
    snapshot_stale: AtomicBool,
    ids: LocalIdGenerator,
    today: Today,
    failures: broadcast::Sender<FailureNotice>,
    config: SyncConfig,
}

impl Inner {
    fn current(&self) -> Arc<CacheState> {
        Arc::clone(&self.state.lock())
    }

    /// Folds a late preload snapshot into dates nobody has loaded yet.
    fn absorb_snapshot(&self, snapshot: &PreloadSnapshot) {
        let tasks = snapshot.tasks_between(snapshot.start, snapshot.end);
        let filled = {
            let mut guard = self.state.lock();
            let mut next = (**guard).clone();
            let version = next.bump();
            let filled = next.fill_unloaded(snapshot.start, snapshot.end, &tasks, version);
            *guard = Arc::new(next);
            filled
        };
        self.ranges.lock().mark_fetched(snapshot.start, snapshot.end);
        self.snapshot_stale.store(false, Ordering::SeqCst);
        debug!(filled, "Absorbed late preload snapshot");
    }

    /// Forgets every fetched range so the next visit goes back to the store.
    fn forget_ranges(&self) {
        self.ranges.lock().clear();
        self.snapshot_stale.store(true, Ordering::SeqCst);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let (Some(preload), Some(id)) = (&self.preload, self.listener.lock().take()) {
            preload.off_update(id);
        }
    }
}

/// The session's optimistic task cache.
pub struct TaskSync {
    inner: Arc<Inner>,
}

impl fmt::Debug for TaskSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSync")
            .field("version", &self.inner.current().version())
            .field("fetched_ranges", &self.inner.ranges.lock().len())
            .field("selected", &*self.inner.selected.lock())
            .finish_non_exhaustive()
    }
}

pub struct TaskSyncBuilder {
    store: Arc<dyn RemoteTaskStore>,
    publisher: Arc<dyn WidgetPublisher>,
    scheduler: Arc<dyn NotificationScheduler>,
    preload: Option<Arc<PreloadCoordinator>>,
    ids: LocalIdGenerator,
    today: Today,
    config: SyncConfig,
}

impl TaskSyncBuilder {
    pub fn publisher(mut self, publisher: Arc<dyn WidgetPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn NotificationScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn preload(mut self, preload: Arc<PreloadCoordinator>) -> Self {
        self.preload = Some(preload);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the source of "today" for the widget and the initial selection.
    pub fn today(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn id_generator(mut self, ids: LocalIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn build(self) -> TaskSync {
        let (failures, _) = broadcast::channel(self.config.failure_channel_capacity.max(1));
        let selected = (self.today)();
        let inner = Arc::new(Inner {
            store: self.store,
            publisher: self.publisher,
            scheduler: self.scheduler,
            preload: self.preload,
            listener: Mutex::new(None),
            state: Mutex::new(Arc::new(CacheState::new())),
            ranges: Mutex::new(RangeCache::new()),
            selected: Mutex::new(selected),
            preload_waited: AtomicBool::new(false),
            snapshot_stale: AtomicBool::new(false),
            ids: self.ids,
            today: self.today,
            failures,
            config: self.config,
        });

        if let Some(preload) = &inner.preload {
            let weak: Weak<Inner> = Arc::downgrade(&inner);
            let id = preload.on_update(Arc::new(move |snapshot: &PreloadSnapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.absorb_snapshot(snapshot);
                }
            }));
            *inner.listener.lock() = Some(id);
        }

        TaskSync { inner }
    }
}

impl TaskSync {
    pub fn builder(store: Arc<dyn RemoteTaskStore>) -> TaskSyncBuilder {
        TaskSyncBuilder {
            store,
            publisher: Arc::new(NoopPublisher),
            scheduler: Arc::new(NoopScheduler),
            preload: None,
            ids: LocalIdGenerator::new(),
            today: Box::new(|| Local::now().date_naive()),
            config: SyncConfig::default(),
        }
    }

    pub fn new(store: Arc<dyn RemoteTaskStore>) -> Self {
        Self::builder(store).build()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn tasks_for(&self, date: NaiveDate) -> Vec<Task> {
        self.inner.current().tasks_for(date)
    }

    /// Everything loaded so far, each day in display order.
    pub fn snapshot(&self) -> BTreeMap<NaiveDate, Vec<Task>> {
        self.inner.current().view()
    }

    pub fn find(&self, id: &TaskId) -> Option<Task> {
        self.inner.current().find_visible(id).map(|e| e.task.clone())
    }

    pub fn is_loaded(&self, date: NaiveDate) -> bool {
        self.inner.current().is_loaded(date)
    }

    pub fn has_fetched(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.inner.ranges.lock().has_fetched(start, end)
    }

    pub fn fetched_ranges(&self) -> Vec<String> {
        self.inner.ranges.lock().keys()
    }

    pub fn select_date(&self, date: NaiveDate) {
        *self.inner.selected.lock() = date;
    }

    pub fn selected_date(&self) -> NaiveDate {
        *self.inner.selected.lock()
    }

    pub fn today(&self) -> NaiveDate {
        (self.inner.today)()
    }

    pub fn failures(&self) -> broadcast::Receiver<FailureNotice> {
        self.inner.failures.subscribe()
    }

    /// Makes sure the three-month window around `(year, month_index)` is in
    /// the cache, fetching whatever the preload snapshot does not cover.
    #[instrument(skip(self))]
    pub async fn load_month(&self, year: i32, month_index: i32) -> Result<(), CoreError> {
        let (start, end) = window_for(year, month_index)?;
        if self.has_fetched(start, end) {
            debug!(%start, %end, "Window already fetched");
            return Ok(());
        }

        let mut missing = vec![(start, end)];
        if let Some(preload) = &self.inner.preload {
            if preload.is_loading() && !self.inner.preload_waited.swap(true, Ordering::SeqCst) {
                if let Err(e) = preload.wait_until_loaded(self.inner.config.preload_wait).await {
                    debug!(error = %e, "Preload still running, fetching directly");
                }
            }
            let snapshot = preload
                .get_snapshot()
                .filter(|_| !self.inner.snapshot_stale.load(Ordering::SeqCst));
            if let Some(snapshot) = snapshot {
                if let Some((from, to)) = intersect((start, end), (snapshot.start, snapshot.end)) {
                    let tasks = snapshot.tasks_between(from, to);
                    self.install(|state, version| {
                        state.fill_unloaded(from, to, &tasks, version);
                    });
                }
                missing = uncovered((start, end), (snapshot.start, snapshot.end));
            }
        }

        for (from, to) in missing {
            let tasks = self.inner.store.list(from, to).await.map_err(|e| {
                warn!(%from, %to, error = %e, "Range fetch failed");
                e
            })?;
            debug!(%from, %to, count = tasks.len(), "Fetched range");
            self.install(|state, version| state.merge_range(from, to, tasks, version));
        }

        self.inner.ranges.lock().mark_fetched(start, end);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Adds a task. The cache shows it under a temporary id until the store
    /// assigns a durable one.
    #[instrument(skip(self, data), fields(date = %data.date))]
    pub async fn create(&self, data: NewTask) -> Result<Task, CoreError> {
        data.validate()?;
        let temp_id = self.inner.ids.next_id();
        let task = Task::from_new(temp_id.clone(), data.clone());

        let applied = self
            .transact(|state, version| {
                state.insert(Entry::provisional(task, version));
                Ok(Some(()))
            })?
            .ok_or(CoreError::Unknown)?;
        debug!(id = %temp_id, "Applied optimistic create");
        self.publish_today().await;

        match self.inner.store.create(data).await {
            Ok(created) => self.finish_create(&temp_id, created).await,
            Err(e) => {
                let err = self.fail(Operation::Create, &temp_id, &applied, &[temp_id.clone()], e);
                self.discard_provisional(&temp_id);
                self.publish_today().await;
                Err(err)
            }
        }
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), CoreError> {
        patch.validate()?;
        let Some(applied) = self.transact(|state, version| {
            require_visible(state, id)?;
            state.modify(id, version, |entry| {
                patch.apply_to(&mut entry.task);
                if let Some(intent) = entry.intent_mut() {
                    intent.edited = true;
                    intent.toggled |= patch.is_completed.is_some();
                }
            });
            Ok(Some(()))
        })?
        else {
            return Ok(());
        };
        self.publish_today().await;

        let Some(durable) = id.as_durable() else {
            debug!("Recorded edit against provisional record");
            return Ok(());
        };
        match self.inner.store.update(durable, patch).await {
            Ok(_) => {
                self.inner.forget_ranges();
                self.refresh_notifications(id).await;
                Ok(())
            }
            Err(e) => Err(self.rollback_and_report(Operation::Update, id, &applied, e).await),
        }
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: &TaskId) -> Result<(), CoreError> {
        let Some(applied) = self.transact(|state, version| {
            let removed = require_visible(state, id)?.task.clone();
            if id.is_temporary() {
                state.modify(id, version, |entry| {
                    if let Some(intent) = entry.intent_mut() {
                        intent.deleted = true;
                    }
                });
            } else {
                state.remove(id);
            }
            Ok(Some(removed))
        })?
        else {
            return Ok(());
        };
        self.publish_today().await;

        let Some(durable) = id.as_durable() else {
            debug!("Recorded delete against provisional record");
            return Ok(());
        };
        match self.inner.store.delete(durable).await {
            Ok(()) => {
                self.inner.forget_ranges();
                self.cancel_notifications(&applied.value).await;
                Ok(())
            }
            Err(e) => Err(self.rollback_and_report(Operation::Delete, id, &applied, e).await),
        }
    }

    /// Moves a task to another date. Only a task on the currently selected
    /// date can be moved; anything else is silently ignored.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn move_task(&self, id: &TaskId, to: NaiveDate) -> Result<MoveOutcome, CoreError> {
        let selected = self.selected_date();
        let Some(applied) = self.transact(|state, version| {
            let current = require_visible(state, id)?.task.date;
            if current != selected || current == to {
                return Ok(None);
            }
            state.modify(id, version, |entry| {
                entry.task.date = to;
                if let Some(intent) = entry.intent_mut() {
                    intent.edited = true;
                }
            });
            Ok(Some(()))
        })?
        else {
            debug!(%selected, %to, "Move ignored");
            return Ok(MoveOutcome::Ignored);
        };
        self.publish_today().await;

        let Some(durable) = id.as_durable() else {
            debug!("Recorded move against provisional record");
            return Ok(MoveOutcome::Moved);
        };
        match self.inner.store.update(durable, TaskPatch::moving_to(to)).await {
            Ok(_) => {
                self.inner.forget_ranges();
                self.refresh_notifications(id).await;
                Ok(MoveOutcome::Moved)
            }
            Err(e) => Err(self.rollback_and_report(Operation::Move, id, &applied, e).await),
        }
    }

    /// Flips completion and returns the new state.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn toggle(&self, id: &TaskId) -> Result<bool, CoreError> {
        let applied = self
            .transact(|state, version| {
                require_visible(state, id)?;
                let completed = state.modify(id, version, |entry| {
                    entry.task.is_completed = !entry.task.is_completed;
                    if let Some(intent) = entry.intent_mut() {
                        intent.toggled = true;
                    }
                    entry.task.is_completed
                });
                Ok(completed)
            })?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let completed = applied.value;
        self.publish_today().await;

        let Some(durable) = id.as_durable() else {
            debug!("Recorded toggle against provisional record");
            return Ok(completed);
        };
        match self.inner.store.set_completed(durable, completed).await {
            Ok(_) => {
                self.refresh_notifications(id).await;
                Ok(completed)
            }
            Err(e) => Err(self.rollback_and_report(Operation::Toggle, id, &applied, e).await),
        }
    }

    /// Ends the session: empties the cache and the fetched-range set and
    /// invalidates the preload snapshot.
    pub fn logout(&self) {
        {
            let mut guard = self.inner.state.lock();
            let cleared = guard.cleared();
            *guard = Arc::new(cleared);
        }
        self.inner.ranges.lock().clear();
        self.inner.preload_waited.store(false, Ordering::SeqCst);
        self.inner.snapshot_stale.store(false, Ordering::SeqCst);
        if let Some(preload) = &self.inner.preload {
            preload.invalidate();
        }
        info!("Session cache cleared");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Clones the current state, lets `f` edit the clone and installs it.
    /// `f` returning `Ok(None)` means there is nothing to change.
    fn transact<R>(
        &self,
        f: impl FnOnce(&mut CacheState, u64) -> Result<Option<R>, CoreError>,
    ) -> Result<Option<Applied<R>>, CoreError> {
        let mut guard = self.inner.state.lock();
        let snapshot = Arc::clone(&guard);
        let mut next = (*snapshot).clone();
        let version = next.bump();
        let Some(value) = f(&mut next, version)? else {
            return Ok(None);
        };
        *guard = Arc::new(next);
        Ok(Some(Applied {
            snapshot,
            version,
            value,
        }))
    }

    /// Installs a change that has no rollback story (fetch results, id swaps).
    fn install<R>(&self, f: impl FnOnce(&mut CacheState, u64) -> R) -> R {
        let mut guard = self.inner.state.lock();
        let mut next = (**guard).clone();
        let version = next.bump();
        let result = f(&mut next, version);
        *guard = Arc::new(next);
        result
    }

    fn rollback<R>(&self, applied: &Applied<R>, touched: &[TaskId]) {
        let mut guard = self.inner.state.lock();
        if guard.version() == applied.version {
            let restored = guard.restored(&applied.snapshot);
            *guard = Arc::new(restored);
            return;
        }
        let mut next = (**guard).clone();
        next.bump();
        next.restore_records(&applied.snapshot, touched, applied.version);
        *guard = Arc::new(next);
    }

    /// Rolls back and emits the failure notice. Returns the error to hand back.
    fn fail<R>(
        &self,
        operation: Operation,
        id: &TaskId,
        applied: &Applied<R>,
        touched: &[TaskId],
        error: CoreError,
    ) -> CoreError {
        warn!(%operation, id = %id, error = %error, "Remote call failed, rolling back");
        self.rollback(applied, touched);
        self.notify_failure(operation, id, &error);
        error
    }

    async fn rollback_and_report<R>(
        &self,
        operation: Operation,
        id: &TaskId,
        applied: &Applied<R>,
        error: CoreError,
    ) -> CoreError {
        let error = self.fail(operation, id, applied, &[id.clone()], error);
        self.publish_today().await;
        error
    }

    fn notify_failure(&self, operation: Operation, id: &TaskId, error: &CoreError) {
        // No subscribers is fine.
        let _ = self.inner.failures.send(FailureNotice {
            operation,
            task_id: id.clone(),
            message: error.to_string(),
        });
    }

    fn discard_provisional(&self, id: &TaskId) {
        if self.inner.current().find(id).is_some() {
            self.install(|state, _| state.remove(id));
        }
    }

    /// Swaps in the durable id and replays whatever happened to the record
    /// while the create was in flight.
    async fn finish_create(&self, temp_id: &TaskId, created: Task) -> Result<Task, CoreError> {
        let durable_id = created.id.clone();
        let confirmed = self.install(|state, _| state.confirm(temp_id, &durable_id));
        let Some((local, intent)) = confirmed else {
            debug!(id = %durable_id, "Created record no longer cached");
            return Ok(created);
        };
        info!(temp = %temp_id, id = %durable_id, "Create confirmed");

        let Some(durable) = durable_id.as_durable() else {
            return Ok(local);
        };

        if intent.deleted {
            return self.finish_pending_delete(&durable_id, durable, local).await;
        }

        let mut remote = created;
        if let Err(e) = self.replay_pending(durable, &local, intent, &mut remote).await {
            // The store is behind the local copy; fall back to what it has.
            warn!(id = %durable_id, error = %e, "Catch-up after create failed");
            self.install(|state, version| {
                state.insert(Entry::confirmed(remote.clone(), version));
            });
            self.notify_failure(Operation::Update, &durable_id, &e);
            self.publish_today().await;
            return Ok(remote);
        }

        self.refresh_notifications(&durable_id).await;
        self.publish_today().await;
        Ok(self.find(&durable_id).unwrap_or(local))
    }

    async fn finish_pending_delete(
        &self,
        durable_id: &TaskId,
        durable: &str,
        local: Task,
    ) -> Result<Task, CoreError> {
        self.install(|state, _| state.remove(durable_id));
        match self.inner.store.delete(durable).await {
            Ok(()) => {
                debug!(id = %durable_id, "Honoured delete recorded during create");
                self.inner.forget_ranges();
                Ok(local)
            }
            Err(e) => {
                warn!(id = %durable_id, error = %e, "Delete recorded during create failed");
                self.install(|state, version| {
                    state.insert(Entry::confirmed(local.clone(), version));
                });
                self.notify_failure(Operation::Delete, durable_id, &e);
                self.publish_today().await;
                Ok(local)
            }
        }
    }

    async fn replay_pending(
        &self,
        durable: &str,
        local: &Task,
        intent: PendingIntent,
        remote: &mut Task,
    ) -> Result<(), CoreError> {
        if intent.edited {
            *remote = self
                .inner
                .store
                .update(durable, TaskPatch::from_task(local))
                .await?;
            self.inner.forget_ranges();
        }
        if intent.toggled && remote.is_completed != local.is_completed {
            *remote = self
                .inner
                .store
                .set_completed(durable, local.is_completed)
                .await?;
        }
        Ok(())
    }

    async fn publish_today(&self) {
        let today = self.today();
        let tasks = self.tasks_for(today);
        if let Err(e) = self.inner.publisher.publish(today, &tasks).await {
            warn!(error = %e, "Widget publish failed");
        }
    }

    async fn cancel_notifications(&self, task: &Task) {
        let Some(handles) = task.notification_ids.as_ref().filter(|h| !h.is_empty()) else {
            return;
        };
        if let Err(e) = self.inner.scheduler.cancel(handles).await {
            warn!(id = %task.id, error = %e, "Cancelling reminders failed");
        }
    }

    /// Re-arms reminders for a stored record: old handles are cancelled and a
    /// timed, open task gets new ones.
    async fn refresh_notifications(&self, id: &TaskId) {
        let Some(task) = self.find(id) else {
            return;
        };
        self.cancel_notifications(&task).await;

        let handles = if task.time.is_some() && !task.is_completed {
            match self.inner.scheduler.schedule(&task).await {
                Ok(handles) => handles,
                Err(e) => {
                    warn!(id = %id, error = %e, "Scheduling reminders failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let handles = (!handles.is_empty()).then_some(handles);
        if handles == task.notification_ids {
            return;
        }

        self.install(|state, version| {
            state.modify(id, version, |entry| entry.task.notification_ids = handles.clone());
        });
        if let Some(durable) = id.as_durable() {
            let patch = TaskPatch {
                notification_ids: Some(handles),
                ..Default::default()
            };
            if let Err(e) = self.inner.store.update(durable, patch).await {
                warn!(id = %id, error = %e, "Storing reminder handles failed");
            }
        }
    }
}

fn require_visible<'a>(state: &'a CacheState, id: &TaskId) -> Result<&'a Entry, CoreError> {
    state
        .find_visible(id)
        .ok_or_else(|| CoreError::NotFound(id.to_string()))
}
