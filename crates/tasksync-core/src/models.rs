use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::error::CoreError;

/// Prefix carried by the rendered form of a [`TaskId::Temporary`].
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Session-local suffix of a temporary id. Millisecond timestamps, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u64);

impl LocalId {
    pub fn new(suffix: u64) -> Self {
        Self(suffix)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Identity of a task record.
///
/// A record created locally carries a `Temporary` id until the remote store
/// confirms it and hands back a `Durable` one. Operations on a temporary
/// record never reach the remote store; they are recorded against the
/// record and replayed once the create resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskId {
    Temporary(LocalId),
    Durable(String),
}

impl TaskId {
    pub fn durable(id: impl Into<String>) -> Self {
        TaskId::Durable(id.into())
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, TaskId::Temporary(_))
    }

    /// The remote key, if the store knows this record.
    pub fn as_durable(&self) -> Option<&str> {
        match self {
            TaskId::Durable(id) => Some(id),
            TaskId::Temporary(_) => None,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Temporary(local) => write!(f, "{}{}", TEMP_ID_PREFIX, local.value()),
            TaskId::Durable(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task id: {0:?}")]
pub struct ParseTaskIdError(String);

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseTaskIdError(s.to_string()));
        }
        match s.strip_prefix(TEMP_ID_PREFIX) {
            Some(suffix) => suffix
                .parse::<u64>()
                .map(|n| TaskId::Temporary(LocalId::new(n)))
                .map_err(|_| ParseTaskIdError(s.to_string())),
            None => Ok(TaskId::Durable(s.to_string())),
        }
    }
}

impl TryFrom<String> for TaskId {
    type Error = ParseTaskIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

/// Hands out temporary ids. Timestamp based, bumped past the previous value
/// when two ids are requested within the same millisecond.
pub struct LocalIdGenerator {
    last: AtomicU64,
    clock: Clock,
}

impl LocalIdGenerator {
    pub fn new() -> Self {
        Self::with_clock(|| u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default())
    }

    pub fn with_clock(clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            last: AtomicU64::new(0),
            clock: Box::new(clock),
        }
    }

    pub fn next_id(&self) -> TaskId {
        let now = (self.clock)();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        TaskId::Temporary(LocalId::new(now.max(previous.saturating_add(1))))
    }
}

impl Default for LocalIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdGenerator")
            .field("last", &self.last.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Parses a clock time as entered by a user or stored by the backend.
/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(s: &str) -> Result<NaiveTime, CoreError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| CoreError::InvalidInput(format!("Invalid time '{}', expected HH:MM", s)))
}

pub fn format_time(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_some(&super::format_time(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.filter(|s| !s.is_empty())
            .map(|s| super::parse_time(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Bucket key in the cache.
    pub date: NaiveDate,
    #[serde(default, with = "hhmm")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    /// Scheduler handles. Written after the record is stored, never part of a create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_ids: Option<Vec<String>>,
}

impl Task {
    pub fn from_new(id: TaskId, data: NewTask) -> Self {
        Self {
            id,
            title: data.title,
            date: data.date,
            time: data.time,
            link: data.link,
            note: data.note,
            is_completed: false,
            notification_ids: None,
        }
    }
}

/// Create payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, with = "hhmm")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            date,
            time: None,
            link: None,
            note: None,
        }
    }

    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_title(&self.title)
    }
}

fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() {
        return Err(CoreError::InvalidInput("Task title must not be empty".to_string()));
    }
    Ok(())
}

/// Partial update. `None` leaves a field alone; nullable fields use a nested
/// option so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<Option<NaiveTime>>,
    pub link: Option<Option<String>>,
    pub note: Option<Option<String>>,
    pub is_completed: Option<bool>,
    pub notification_ids: Option<Option<Vec<String>>>,
}

impl TaskPatch {
    pub fn moving_to(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    /// Every user-editable field of `task`. Used to catch the store up with
    /// edits made while the record was still provisional.
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            date: Some(task.date),
            time: Some(task.time),
            link: Some(task.link.clone()),
            note: Some(task.note.clone()),
            is_completed: None,
            notification_ids: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(time) = self.time {
            task.time = time;
        }
        if let Some(link) = &self.link {
            task.link = link.clone();
        }
        if let Some(note) = &self.note {
            task.note = note.clone();
        }
        if let Some(done) = self.is_completed {
            task.is_completed = done;
        }
        if let Some(ids) = &self.notification_ids {
            task.notification_ids = ids.clone();
        }
    }
}
