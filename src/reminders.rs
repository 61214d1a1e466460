use chrono::{DateTime, Duration, LocalResult, TimeZone, Utc};

use crate::models::Task;
use crate::time_grid::{parse_date_key, time_to_minutes};

/// `[fire_at, starts_at)` for one task, in the zone it was computed in.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderWindow<Tz: TimeZone> {
    pub fire_at: DateTime<Tz>,
    pub starts_at: DateTime<Tz>,
}

impl<Tz: TimeZone> ReminderWindow<Tz> {
    pub fn contains(&self, now: &DateTime<Tz>) -> bool {
        self.fire_at <= *now && *now < self.starts_at
    }
}

#[derive(Debug, Clone)]
pub struct PlannedReminder {
    pub task: Task,
    pub fire_at: DateTime<Utc>,
    pub delay: std::time::Duration,
}

/// The task's date at its start time (seconds zeroed) in `tz`.
///
/// A local time skipped by a DST jump has no instant; a repeated one
/// resolves to the earlier instant.
pub fn task_instant<Tz: TimeZone>(task: &Task, tz: &Tz) -> Option<DateTime<Tz>> {
    let start = task.start_time()?;
    let minutes = time_to_minutes(start).ok()?;
    let date = parse_date_key(&task.date).ok()?;
    let naive = date.and_hms_opt(minutes / 60, minutes % 60, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// Reminder window of a task with reminders enabled, else `None`.
pub fn reminder_window<Tz: TimeZone>(task: &Task, tz: &Tz) -> Option<ReminderWindow<Tz>> {
    if !task.reminder_enabled {
        return None;
    }
    let starts_at = task_instant(task, tz)?;
    let fire_at = starts_at.clone() - Duration::minutes(i64::from(task.reminder_lead_minutes()));
    Some(ReminderWindow { fire_at, starts_at })
}

pub fn fire_at<Tz: TimeZone>(task: &Task, tz: &Tz) -> Option<DateTime<Tz>> {
    reminder_window(task, tz).map(|window| window.fire_at)
}

/// Reminders of `tasks` whose fire instant is strictly after `now`.
///
/// Tasks without a usable date, start time, or with reminders off are idle;
/// tasks whose fire instant has already passed are skipped quietly.
pub fn plan_reminders<Tz: TimeZone>(tasks: &[Task], now: &DateTime<Tz>) -> Vec<PlannedReminder> {
    let tz = now.timezone();
    let mut planned = Vec::new();
    for task in tasks {
        let Some(window) = reminder_window(task, &tz) else {
            continue;
        };
        if window.fire_at <= *now {
            log::debug!(
                "reminders: skip task_id={} fire_at={} already passed",
                task.id,
                window.fire_at.with_timezone(&Utc).to_rfc3339()
            );
            continue;
        }
        let Ok(delay) = window.fire_at.clone().signed_duration_since(now.clone()).to_std() else {
            continue;
        };
        planned.push(PlannedReminder {
            task: task.clone(),
            fire_at: window.fire_at.with_timezone(&Utc),
            delay,
        });
    }
    planned
}
