use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::task::JoinHandle;

use crate::events::StatePayload;
use crate::models::{RecordId, Task};
use crate::notify::{NotificationPresenter, PermissionState};
use crate::placement::Timeline;
use crate::progress::{DayProgress, DueSoonTracker};
use crate::scheduler::ReminderScheduler;
use crate::time_grid::TimeGrid;

/// The visible day: its task batch, armed reminders and due-soon flags.
#[derive(Clone)]
pub struct Planner {
    inner: Arc<Mutex<PlannerData>>,
    scheduler: ReminderScheduler,
    presenter: Arc<NotificationPresenter>,
    due_soon: Arc<DueSoonTracker>,
}

#[derive(Debug, Default)]
struct PlannerData {
    date: Option<String>,
    tasks: Vec<Task>,
}

impl Planner {
    pub fn new(presenter: Arc<NotificationPresenter>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlannerData::default())),
            scheduler: ReminderScheduler::new(presenter.clone()),
            presenter,
            due_soon: Arc::new(DueSoonTracker::new()),
        }
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn presenter(&self) -> &Arc<NotificationPresenter> {
        &self.presenter
    }

    /// Switches the visible day and takes its batch.
    pub fn show_day(&self, date: impl Into<String>, tasks: Vec<Task>) -> usize {
        self.show_day_at(date, tasks, &Local::now())
    }

    pub fn show_day_at<Tz: TimeZone>(
        &self,
        date: impl Into<String>,
        tasks: Vec<Task>,
        now: &DateTime<Tz>,
    ) -> usize {
        let mut guard = self.inner.lock().expect("planner poisoned");
        guard.date = Some(date.into());
        self.replace_locked(&mut guard, tasks, now)
    }

    /// Replaces the batch of the visible day and re-arms every reminder.
    /// Returns the number of armed reminders.
    pub fn on_batch_changed(&self, tasks: Vec<Task>) -> usize {
        self.on_batch_changed_at(tasks, &Local::now())
    }

    pub fn on_batch_changed_at<Tz: TimeZone>(&self, tasks: Vec<Task>, now: &DateTime<Tz>) -> usize {
        let mut guard = self.inner.lock().expect("planner poisoned");
        self.replace_locked(&mut guard, tasks, now)
    }

    fn replace_locked<Tz: TimeZone>(
        &self,
        data: &mut PlannerData,
        tasks: Vec<Task>,
        now: &DateTime<Tz>,
    ) -> usize {
        let armed = self.scheduler.replace_batch_at(&tasks, now);
        self.due_soon.refresh(&tasks, now);
        data.tasks = tasks;
        armed
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("planner poisoned");
        guard.tasks.clone()
    }

    pub fn visible_date(&self) -> Option<String> {
        let guard = self.inner.lock().expect("planner poisoned");
        guard.date.clone()
    }

    /// Recomputes due-soon flags; returns the ids that are due soon.
    pub fn tick(&self) -> Vec<RecordId> {
        self.tick_at(&Local::now())
    }

    /// Holds the planner lock so a concurrent batch change cannot be overwritten
    /// with flags computed from the previous batch.
    pub fn tick_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<RecordId> {
        let guard = self.inner.lock().expect("planner poisoned");
        self.due_soon.refresh(&guard.tasks, now)
    }

    pub fn due_soon_flag(&self, task_id: RecordId) -> bool {
        self.due_soon.flag(task_id)
    }

    pub fn permission_state(&self) -> PermissionState {
        self.presenter.permission_state()
    }

    pub fn request_permission(&self) -> PermissionState {
        let state = self.presenter.request_permission();
        log::info!("planner: notification permission {state:?}");
        state
    }

    pub fn progress(&self) -> DayProgress {
        let guard = self.inner.lock().expect("planner poisoned");
        DayProgress::of(&guard.tasks)
    }

    pub fn timeline(&self, grid: &TimeGrid) -> Timeline {
        let guard = self.inner.lock().expect("planner poisoned");
        Timeline::build(grid, &guard.tasks)
    }

    pub fn acknowledge(&self, tag: &str) -> bool {
        self.presenter.acknowledge(tag)
    }

    pub fn state_payload(&self) -> StatePayload {
        let guard = self.inner.lock().expect("planner poisoned");
        StatePayload {
            date: guard.date.clone(),
            tasks: guard.tasks.clone(),
            progress: DayProgress::of(&guard.tasks),
        }
    }
}

/// Re-evaluates due-soon flags every `every` until the handle is aborted.
pub fn start_due_soon_poll(planner: Planner, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let due = planner.tick();
            if !due.is_empty() {
                log::debug!("planner: due soon {due:?}");
            }
        }
    })
}
