use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::models::{RecordId, Task};
use crate::reminders::reminder_window;

/// A task is due soon while `now` is inside its reminder window and it is
/// not yet completed.
pub fn is_due_soon<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>) -> bool {
    if task.completed {
        return false;
    }
    reminder_window(task, &now.timezone())
        .map(|window| window.contains(now))
        .unwrap_or(false)
}

/// Rounded completion percent; an empty batch is 0.
pub fn completion_ratio(tasks: &[Task]) -> u32 {
    if tasks.is_empty() {
        return 0;
    }
    let completed = tasks.iter().filter(|task| task.completed).count();
    (completed as f64 * 100.0 / tasks.len() as f64).round() as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

impl DayProgress {
    pub fn of(tasks: &[Task]) -> Self {
        Self {
            completed: tasks.iter().filter(|task| task.completed).count(),
            total: tasks.len(),
            percent: completion_ratio(tasks),
        }
    }
}

/// Last computed due-soon flags, keyed by task id.
#[derive(Debug, Default)]
pub struct DueSoonTracker {
    flags: Mutex<HashMap<RecordId, bool>>,
}

impl DueSoonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes every flag from scratch; returns the ids that are due soon.
    pub fn refresh<Tz: TimeZone>(&self, tasks: &[Task], now: &DateTime<Tz>) -> Vec<RecordId> {
        let fresh: HashMap<RecordId, bool> = tasks
            .iter()
            .map(|task| (task.id, is_due_soon(task, now)))
            .collect();
        let mut due: Vec<RecordId> = fresh
            .iter()
            .filter(|(_, due)| **due)
            .map(|(id, _)| *id)
            .collect();
        due.sort_unstable();

        let mut guard = self.flags.lock().expect("due-soon flags poisoned");
        *guard = fresh;
        due
    }

    /// `false` for tasks the tracker has not seen.
    pub fn flag(&self, task_id: RecordId) -> bool {
        let guard = self.flags.lock().expect("due-soon flags poisoned");
        guard.get(&task_id).copied().unwrap_or(false)
    }
}
