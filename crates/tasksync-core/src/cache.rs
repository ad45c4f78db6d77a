//! In-memory task cache keyed by date.
//!
//! `CacheState` is treated as an immutable value: the mutator clones the
//! current state, edits the clone and installs it in one step. The previous
//! value doubles as the rollback snapshot.
//!
//! A date key that is present means the date has been loaded (possibly with
//! no tasks). A task id lives under at most one date.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{Task, TaskId};

/// Intent recorded against a provisional record while its create is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingIntent {
    pub edited: bool,
    pub toggled: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Known to the remote store under a durable id.
    Confirmed,
    /// Created locally, waiting for the store to assign an id.
    Provisional(PendingIntent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub task: Task,
    /// Cache version at which this entry was last written.
    pub revision: u64,
    pub phase: Phase,
}

impl Entry {
    pub fn confirmed(task: Task, revision: u64) -> Self {
        Self {
            task,
            revision,
            phase: Phase::Confirmed,
        }
    }

    pub fn provisional(task: Task, revision: u64) -> Self {
        Self {
            task,
            revision,
            phase: Phase::Provisional(PendingIntent::default()),
        }
    }

    /// Deleted provisional records stay as tombstones until their create resolves.
    pub fn is_visible(&self) -> bool {
        !matches!(self.phase, Phase::Provisional(PendingIntent { deleted: true, .. }))
    }

    pub fn intent_mut(&mut self) -> Option<&mut PendingIntent> {
        match &mut self.phase {
            Phase::Provisional(intent) => Some(intent),
            Phase::Confirmed => None,
        }
    }
}

/// Display order within a day: open tasks first, then by time with untimed
/// tasks leading. Stable, so ties keep insertion order.
pub fn display_order(a: &Task, b: &Task) -> Ordering {
    a.is_completed
        .cmp(&b.is_completed)
        .then_with(|| a.time.cmp(&b.time))
}

pub fn sort_for_display(tasks: &mut [Task]) {
    tasks.sort_by(display_order);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheState {
    version: u64,
    buckets: BTreeMap<NaiveDate, Vec<Entry>>,
}

impl CacheState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Advances the version and returns it. Called once per installed change.
    pub fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Empty state that keeps counting from the current version.
    pub fn cleared(&self) -> Self {
        Self {
            version: self.version + 1,
            buckets: BTreeMap::new(),
        }
    }

    pub fn is_loaded(&self, date: NaiveDate) -> bool {
        self.buckets.contains_key(&date)
    }

    /// Visible tasks of `date` in display order.
    pub fn tasks_for(&self, date: NaiveDate) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .buckets
            .get(&date)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.is_visible())
                    .map(|e| e.task.clone())
                    .collect()
            })
            .unwrap_or_default();
        sort_for_display(&mut tasks);
        tasks
    }

    /// Read view of every loaded date.
    pub fn view(&self) -> BTreeMap<NaiveDate, Vec<Task>> {
        self.buckets
            .keys()
            .map(|date| (*date, self.tasks_for(*date)))
            .collect()
    }

    pub fn find(&self, id: &TaskId) -> Option<&Entry> {
        self.buckets
            .values()
            .flat_map(|entries| entries.iter())
            .find(|e| &e.task.id == id)
    }

    /// Like [`find`](Self::find) but hides tombstones.
    pub fn find_visible(&self, id: &TaskId) -> Option<&Entry> {
        self.find(id).filter(|e| e.is_visible())
    }

    /// Inserts `entry` under its task's date, dropping any other copy of the same id.
    pub fn insert(&mut self, entry: Entry) {
        self.remove(&entry.task.id);
        self.buckets.entry(entry.task.date).or_default().push(entry);
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Entry> {
        for entries in self.buckets.values_mut() {
            if let Some(pos) = entries.iter().position(|e| &e.task.id == id) {
                return Some(entries.remove(pos));
            }
        }
        None
    }

    fn position(&self, id: &TaskId) -> Option<(NaiveDate, usize)> {
        self.buckets.iter().find_map(|(date, entries)| {
            entries
                .iter()
                .position(|e| &e.task.id == id)
                .map(|pos| (*date, pos))
        })
    }

    /// Edits the entry for `id`, moving it to another bucket when its date
    /// changes. An entry that stays on its date keeps its position. Returns
    /// `None` if the id is unknown.
    pub fn modify<R>(
        &mut self,
        id: &TaskId,
        revision: u64,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> Option<R> {
        let (date, pos) = self.position(id)?;
        let entries = self.buckets.get_mut(&date)?;
        let result = f(&mut entries[pos]);
        entries[pos].revision = revision;
        if entries[pos].task.date != date {
            let entry = entries.remove(pos);
            self.buckets.entry(entry.task.date).or_default().push(entry);
        }
        Some(result)
    }

    /// Swaps a temporary id for the durable one assigned by the store and
    /// marks the record confirmed. Returns the record as it stood along with
    /// whatever intent was recorded while it was provisional.
    pub fn confirm(
        &mut self,
        temporary: &TaskId,
        durable: &TaskId,
    ) -> Option<(Task, PendingIntent)> {
        for entries in self.buckets.values_mut() {
            if let Some(entry) = entries.iter_mut().find(|e| &e.task.id == temporary) {
                let intent = match entry.phase {
                    Phase::Provisional(intent) => intent,
                    Phase::Confirmed => PendingIntent::default(),
                };
                entry.task.id = durable.clone();
                entry.phase = Phase::Confirmed;
                return Some((entry.task.clone(), intent));
            }
        }
        None
    }

    /// Replaces every bucket in `start..=end` with `tasks` from the store, so
    /// each of those dates counts as loaded afterwards. Provisional entries
    /// survive. Any other copy of a fetched id outside the range is dropped.
    pub fn merge_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        tasks: Vec<Task>,
        revision: u64,
    ) {
        let mut fetched: BTreeMap<NaiveDate, Vec<Entry>> = BTreeMap::new();
        for task in tasks.into_iter().filter(|t| t.date >= start && t.date <= end) {
            self.remove(&task.id);
            fetched
                .entry(task.date)
                .or_default()
                .push(Entry::confirmed(task, revision));
        }

        for date in start.iter_days().take_while(|d| *d <= end) {
            let kept: Vec<Entry> = self
                .buckets
                .remove(&date)
                .unwrap_or_default()
                .into_iter()
                .filter(|e| matches!(e.phase, Phase::Provisional(_)))
                .collect();
            let mut bucket = fetched.remove(&date).unwrap_or_default();
            bucket.extend(kept);
            self.buckets.insert(date, bucket);
        }
    }

    /// Loads `tasks` only into dates of `start..=end` that were never loaded.
    /// Tasks whose id is already cached elsewhere are skipped.
    pub fn fill_unloaded(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        tasks: &[Task],
        revision: u64,
    ) -> usize {
        let mut filled = 0;
        for date in start.iter_days().take_while(|d| *d <= end) {
            if self.buckets.contains_key(&date) {
                continue;
            }
            let bucket: Vec<Entry> = tasks
                .iter()
                .filter(|t| t.date == date && self.find(&t.id).is_none())
                .cloned()
                .map(|t| Entry::confirmed(t, revision))
                .collect();
            self.buckets.insert(date, bucket);
            filled += 1;
        }
        filled
    }

    /// Reverts the given records to their state in `snapshot`, skipping any
    /// record that was written after `since`. Restored records go back to
    /// their old position where possible.
    pub fn restore_records(&mut self, snapshot: &CacheState, ids: &[TaskId], since: u64) {
        for id in ids {
            if self.find(id).is_some_and(|e| e.revision > since) {
                continue;
            }
            if let Some(removed) = self.remove(id) {
                let date = removed.task.date;
                let emptied = self.buckets.get(&date).is_some_and(Vec::is_empty);
                if emptied && !snapshot.buckets.contains_key(&date) {
                    self.buckets.remove(&date);
                }
            }
            let Some((date, pos)) = snapshot.position(id) else {
                continue;
            };
            let previous = snapshot.buckets[&date][pos].clone();
            let bucket = self.buckets.entry(date).or_default();
            bucket.insert(pos.min(bucket.len()), previous);
        }
    }

    /// `snapshot`'s content under a version that continues from this state.
    pub fn restored(&self, snapshot: &CacheState) -> Self {
        Self {
            version: self.version.max(snapshot.version) + 1,
            buckets: snapshot.buckets.clone(),
        }
    }
}
