use serde::Serialize;

use crate::models::Task;
use crate::notify::Alert;
use crate::progress::DayProgress;

pub const EVENT_ALERT: &str = "reminder_alert";
pub const EVENT_STATE_UPDATED: &str = "state_updated";

#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub date: Option<String>,
    pub tasks: Vec<Task>,
    pub progress: DayProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissReason {
    Acknowledged,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertEvent {
    Presented { alert: Alert },
    Dismissed { tag: String, reason: DismissReason },
}

impl AlertEvent {
    pub fn tag(&self) -> &str {
        match self {
            AlertEvent::Presented { alert } => &alert.tag,
            AlertEvent::Dismissed { tag, .. } => tag,
        }
    }
}
