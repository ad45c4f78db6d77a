#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tasksync_core::cache::sort_for_display;
use tasksync_core::error::CoreError;
use tasksync_core::models::{LocalIdGenerator, NewTask, Task, TaskId, TaskPatch};
use tasksync_core::notify::NotificationScheduler;
use tasksync_core::repository::RemoteTaskStore;
use tasksync_core::sync::{TaskSync, TaskSyncBuilder};
use tasksync_core::widget::WidgetPublisher;
use tokio::sync::Notify;

pub const FIXED_MILLIS: u64 = 1_700_000_000_000;
pub const TEMP_ID: &str = "temp-1700000000000";

pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("valid date")
}

/// The fixed "today" used by every sync under test.
pub fn today() -> NaiveDate {
    date("2025-06-10")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    List,
    Create,
    Update,
    SetCompleted,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(NaiveDate, NaiveDate),
    Create(NewTask),
    Update(String, TaskPatch),
    SetCompleted(String, bool),
    Delete(String),
}

/// In-memory remote store that records every call. Durable ids count up
/// from 42. Individual methods can be made to fail or to wait on a gate.
#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<BTreeMap<String, Task>>,
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    failing: Mutex<HashSet<Method>>,
    gates: Mutex<HashMap<Method, Arc<Notify>>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        store.next_id.store(42, Ordering::SeqCst);
        Arc::new(store)
    }

    /// Puts a durable row in place without recording a call.
    pub fn seed(&self, id: &str, data: NewTask) -> Task {
        let task = Task::from_new(TaskId::durable(id), data);
        self.rows
            .lock()
            .unwrap()
            .insert(id.to_string(), task.clone());
        task
    }

    pub fn mark_completed(&self, id: &str) {
        if let Some(task) = self.rows.lock().unwrap().get_mut(id) {
            task.is_completed = true;
        }
    }

    pub fn fail(&self, method: Method) {
        self.failing.lock().unwrap().insert(method);
    }

    pub fn recover(&self, method: Method) {
        self.failing.lock().unwrap().remove(&method);
    }

    /// Makes calls to `method` wait until the returned gate is notified.
    pub fn gate(&self, method: Method) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(method, Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    (call, method),
                    (Call::List(..), Method::List)
                        | (Call::Create(_), Method::Create)
                        | (Call::Update(..), Method::Update)
                        | (Call::SetCompleted(..), Method::SetCompleted)
                        | (Call::Delete(_), Method::Delete)
                )
            })
            .count()
    }

    pub fn row(&self, id: &str) -> Option<Task> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// What the store holds for `date`, in display order.
    pub fn day(&self, date: NaiveDate) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.date == date)
            .cloned()
            .collect();
        sort_for_display(&mut tasks);
        tasks
    }

    async fn enter(&self, method: Method, call: Call) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(call);
        let gate = self.gates.lock().unwrap().get(&method).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(&method) {
            return Err(CoreError::Remote("offline".to_string()));
        }
        Ok(())
    }

    fn existing(&self, id: &str) -> Result<Task, CoreError> {
        self.row(id).ok_or_else(|| CoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl RemoteTaskStore for FakeStore {
    async fn list(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Task>, CoreError> {
        self.enter(Method::List, Call::List(start, end)).await?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.date >= start && t.date <= end)
            .cloned()
            .collect())
    }

    async fn create(&self, data: NewTask) -> Result<Task, CoreError> {
        self.enter(Method::Create, Call::Create(data.clone())).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        Ok(self.seed(&id, data))
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, CoreError> {
        self.enter(Method::Update, Call::Update(id.to_string(), patch.clone()))
            .await?;
        let mut task = self.existing(id)?;
        patch.apply_to(&mut task);
        self.rows
            .lock()
            .unwrap()
            .insert(id.to_string(), task.clone());
        Ok(task)
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Task, CoreError> {
        self.enter(Method::SetCompleted, Call::SetCompleted(id.to_string(), completed))
            .await?;
        let mut task = self.existing(id)?;
        task.is_completed = completed;
        self.rows
            .lock()
            .unwrap()
            .insert(id.to_string(), task.clone());
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.enter(Method::Delete, Call::Delete(id.to_string())).await?;
        self.rows
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }
}

/// Records every publish; optionally fails them all.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(NaiveDate, Vec<String>)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn last(&self) -> Option<(NaiveDate, Vec<String>)> {
        self.published.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl WidgetPublisher for RecordingPublisher {
    async fn publish(&self, date: NaiveDate, tasks: &[Task]) -> Result<(), CoreError> {
        let titles = tasks.iter().map(|t| t.title.clone()).collect();
        self.published.lock().unwrap().push((date, titles));
        if self.fail {
            return Err(CoreError::Io(std::io::Error::other("widget unavailable")));
        }
        Ok(())
    }
}

/// Hands out `reminder-<n>` handles and records cancellations.
#[derive(Default)]
pub struct RecordingScheduler {
    next: AtomicU64,
    scheduled: Mutex<Vec<TaskId>>,
    cancelled: Mutex<Vec<Vec<String>>>,
}

impl RecordingScheduler {
    pub fn scheduled(&self) -> Vec<TaskId> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<Vec<String>> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationScheduler for RecordingScheduler {
    async fn schedule(&self, task: &Task) -> Result<Vec<String>, CoreError> {
        self.scheduled.lock().unwrap().push(task.id.clone());
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(vec![format!("reminder-{}", n)])
    }

    async fn cancel(&self, handles: &[String]) -> Result<(), CoreError> {
        self.cancelled.lock().unwrap().push(handles.to_vec());
        Ok(())
    }
}

/// Builder with a fixed today and a fixed temporary id clock.
pub fn builder(store: &Arc<FakeStore>) -> TaskSyncBuilder {
    TaskSync::builder(store.clone())
        .today(today)
        .id_generator(LocalIdGenerator::with_clock(|| FIXED_MILLIS))
}

pub fn sync_over(store: &Arc<FakeStore>) -> TaskSync {
    builder(store).build()
}

pub fn titles(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|t| t.title.clone()).collect()
}
