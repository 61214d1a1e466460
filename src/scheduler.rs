use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::task::AbortHandle;

use crate::models::{RecordId, Task};
use crate::reminders::{plan_reminders, PlannedReminder};

/// Receives a task whose reminder timer elapsed.
pub trait ReminderFired: Send + Sync + 'static {
    fn reminder_fired(&self, task: &Task);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

/// Cancellable reference to one armed timer. Cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct ReminderHandle {
    id: HandleId,
    abort: AbortHandle,
}

impl ReminderHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Only the scheduler cancels, so the registry never reports a dead timer as armed.
    pub(crate) fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledReminder {
    pub task_id: RecordId,
    pub fire_at: DateTime<Utc>,
    pub handle: ReminderHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Idle,
    Armed,
    Fired,
    Superseded,
}

#[derive(Debug, Default)]
struct Registry {
    armed: HashMap<RecordId, ScheduledReminder>,
    /// Outcome of the last handle that left `armed`.
    outcomes: HashMap<RecordId, ReminderState>,
    next_handle: u64,
}

impl Registry {
    fn supersede_all(&mut self) -> usize {
        self.outcomes.clear();
        let count = self.armed.len();
        for (task_id, reminder) in self.armed.drain() {
            reminder.handle.cancel();
            self.outcomes.insert(task_id, ReminderState::Superseded);
        }
        count
    }
}

/// Owns every armed reminder timer of the visible day.
///
/// All registry changes (arm, cancel, supersede, fire) happen under one mutex,
/// so a batch replacement is atomic to anyone observing the registry.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Mutex<Registry>>,
    handler: Arc<dyn ReminderFired>,
}

impl ReminderScheduler {
    pub fn new(handler: Arc<dyn ReminderFired>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::default())),
            handler,
        }
    }

    /// Cancels every outstanding timer, then arms one per eligible task.
    /// Must be called from within a tokio runtime. Returns the armed count.
    pub fn replace_batch(&self, tasks: &[Task]) -> usize {
        self.replace_batch_at(tasks, &Local::now())
    }

    pub fn replace_batch_at<Tz: TimeZone>(&self, tasks: &[Task], now: &DateTime<Tz>) -> usize {
        let mut guard = self.inner.lock().expect("reminder registry poisoned");
        let superseded = guard.supersede_all();
        for planned in plan_reminders(tasks, now) {
            self.arm(&mut guard, planned);
        }
        let armed = guard.armed.len();
        log::info!(
            "scheduler: batch replaced tasks={} superseded={superseded} armed={armed}",
            tasks.len()
        );
        armed
    }

    /// Cancels one task's timer. Returns false when nothing was armed for it.
    pub fn cancel(&self, task_id: RecordId) -> bool {
        let mut guard = self.inner.lock().expect("reminder registry poisoned");
        let Some(reminder) = guard.armed.remove(&task_id) else {
            return false;
        };
        reminder.handle.cancel();
        guard.outcomes.insert(task_id, ReminderState::Superseded);
        log::info!("scheduler: cancelled reminder task_id={task_id}");
        true
    }

    pub fn cancel_all(&self) -> usize {
        let mut guard = self.inner.lock().expect("reminder registry poisoned");
        let cancelled = guard.supersede_all();
        if cancelled > 0 {
            log::info!("scheduler: cancelled {cancelled} reminder(s)");
        }
        cancelled
    }

    /// Armed reminders ordered by fire time.
    pub fn armed(&self) -> Vec<ScheduledReminder> {
        let guard = self.inner.lock().expect("reminder registry poisoned");
        let mut out: Vec<_> = guard.armed.values().cloned().collect();
        out.sort_by_key(|reminder| (reminder.fire_at, reminder.task_id));
        out
    }

    pub fn armed_count(&self) -> usize {
        let guard = self.inner.lock().expect("reminder registry poisoned");
        guard.armed.len()
    }

    pub fn state_of(&self, task_id: RecordId) -> ReminderState {
        let guard = self.inner.lock().expect("reminder registry poisoned");
        if guard.armed.contains_key(&task_id) {
            return ReminderState::Armed;
        }
        guard
            .outcomes
            .get(&task_id)
            .copied()
            .unwrap_or(ReminderState::Idle)
    }

    fn arm(&self, registry: &mut Registry, planned: PlannedReminder) {
        registry.next_handle += 1;
        let id = HandleId(registry.next_handle);
        let task_id = planned.task.id;
        let inner = Arc::clone(&self.inner);
        let handler = Arc::clone(&self.handler);
        let task = planned.task;
        let delay = planned.delay;

        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(&inner, handler.as_ref(), &task, id);
        });

        let reminder = ScheduledReminder {
            task_id,
            fire_at: planned.fire_at,
            handle: ReminderHandle {
                id,
                abort: join.abort_handle(),
            },
        };
        log::debug!(
            "scheduler: armed task_id={task_id} fire_at={} handle={}",
            reminder.fire_at.to_rfc3339(),
            id.0
        );
        // A batch listing the same task twice keeps only the last timer.
        if let Some(previous) = registry.armed.insert(task_id, reminder) {
            previous.handle.cancel();
        }
        registry.outcomes.remove(&task_id);
    }
}

fn fire(inner: &Mutex<Registry>, handler: &dyn ReminderFired, task: &Task, id: HandleId) {
    {
        let mut guard = inner.lock().expect("reminder registry poisoned");
        let current = guard.armed.get(&task.id).map(|reminder| reminder.handle.id());
        if current != Some(id) {
            log::debug!("scheduler: stale timer task_id={} handle={}", task.id, id.0);
            return;
        }
        guard.armed.remove(&task.id);
        guard.outcomes.insert(task.id, ReminderState::Fired);
    }
    log::info!("scheduler: reminder fired task_id={}", task.id);
    handler.reminder_fired(task);
}
