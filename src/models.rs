use serde::{Deserialize, Serialize};

pub type RecordId = u64;

pub const DEFAULT_DURATION_MINUTES: u32 = 30;
pub const DEFAULT_REMINDER_MINUTES: u32 = 5;

/// Picker palette offered when creating a category. Stored colors are not
/// restricted to it.
pub const CATEGORY_COLORS: [&str; 10] = [
    "#3b82f6", "#8b5cf6", "#10b981", "#f59e0b", "#ec4899", "#06b6d4", "#a855f7", "#6b7280",
    "#ef4444", "#14b8a6",
];

pub const CATEGORY_ICONS: [&str; 12] = [
    "📚", "✏️", "🧹", "⚽", "🎮", "📖", "🎵", "📌", "🎨", "🏃", "🍎", "💻",
];

/// Seeded into an empty category collection on first open.
pub const DEFAULT_CATEGORIES: [(&str, &str, &str); 8] = [
    ("School", "#3b82f6", "📚"),
    ("Homework", "#8b5cf6", "✏️"),
    ("Chores", "#10b981", "🧹"),
    ("Sports", "#f59e0b", "⚽"),
    ("Fun", "#ec4899", "🎮"),
    ("Reading", "#06b6d4", "📖"),
    ("Music", "#a855f7", "🎵"),
    ("Other", "#6b7280", "📌"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Calendar day key, `YYYY-MM-DD`.
    pub date: String,
    /// Wall-clock `HH:MM`; `None` (or empty) means unscheduled.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_reminder_enabled")]
    pub reminder_enabled: bool,
    #[serde(default = "default_reminder_minutes")]
    pub reminder_minutes: u32,
    #[serde(default)]
    pub category_id: Option<RecordId>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Task {
    /// Start time with blank values folded into `None`.
    pub fn start_time(&self) -> Option<&str> {
        self.start_time
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn is_scheduled(&self) -> bool {
        self.start_time().is_some()
    }

    /// Reminder lead time; a stored zero falls back to the default.
    pub fn reminder_lead_minutes(&self) -> u32 {
        if self.reminder_minutes == 0 {
            DEFAULT_REMINDER_MINUTES
        } else {
            self.reminder_minutes
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        if self.duration == 0 {
            DEFAULT_DURATION_MINUTES
        } else {
            self.duration
        }
    }
}

/// Payload for creating a task; the store assigns id, `completed` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub start_time: Option<String>,
    /// `None` takes the planner's configured default.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default = "default_reminder_enabled")]
    pub reminder_enabled: bool,
    /// `None` takes the planner's configured default.
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
    #[serde(default)]
    pub category_id: Option<RecordId>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            date: date.into(),
            start_time: None,
            duration: None,
            reminder_enabled: true,
            reminder_minutes: None,
            category_id: None,
        }
    }

    /// Fills the fields the caller left unset.
    pub fn with_defaults(mut self, duration: u32, reminder_minutes: u32) -> Self {
        self.duration.get_or_insert(duration);
        self.reminder_minutes.get_or_insert(reminder_minutes);
        self
    }

    pub fn at(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }

    pub fn into_task(self, id: RecordId, created_at: Option<String>) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            date: self.date,
            start_time: self.start_time,
            duration: self.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
            completed: false,
            reminder_enabled: self.reminder_enabled,
            reminder_minutes: self.reminder_minutes.unwrap_or(DEFAULT_REMINDER_MINUTES),
            category_id: self.category_id,
            created_at,
        }
    }
}

/// Partial update. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub date: Option<String>,
    pub start_time: Option<Option<String>>,
    pub duration: Option<u32>,
    pub completed: Option<bool>,
    pub reminder_enabled: Option<bool>,
    pub reminder_minutes: Option<u32>,
    pub category_id: Option<Option<RecordId>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(date) = &self.date {
            task.date = date.clone();
        }
        if let Some(start_time) = &self.start_time {
            task.start_time = start_time.clone();
        }
        if let Some(duration) = self.duration {
            task.duration = duration;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(enabled) = self.reminder_enabled {
            task.reminder_enabled = enabled;
        }
        if let Some(minutes) = self.reminder_minutes {
            task.reminder_minutes = minutes;
        }
        if let Some(category_id) = self.category_id {
            task.category_id = category_id;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl NewCategory {
    pub fn into_category(self, id: RecordId) -> Category {
        Category {
            id,
            name: self.name,
            color: self.color,
            icon: self.icon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setting {
    pub key: String,
    pub value: serde_json::Value,
}

/// Full backup of the three collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub settings: Vec<Setting>,
    #[serde(default)]
    pub export_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TasksFile {
    pub schema_version: u32,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoriesFile {
    pub schema_version: u32,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Vec<Setting>,
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_MINUTES
}

fn default_reminder_enabled() -> bool {
    true
}

fn default_reminder_minutes() -> u32 {
    DEFAULT_REMINDER_MINUTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_serde_applies_defaults_for_missing_fields() {
        let json = r#"
        {
          "id": 3,
          "title": "Piano practice",
          "date": "2026-10-16"
        }
        "#;

        let task: Task = serde_json::from_str(json).expect("task should deserialize");
        assert_eq!(task.duration, 30);
        assert!(!task.completed);
        assert!(task.reminder_enabled);
        assert_eq!(task.reminder_minutes, 5);
        assert!(task.start_time.is_none());
        assert!(task.category_id.is_none());
    }

    #[test]
    fn task_uses_camel_case_keys() {
        let task = TaskDraft::new("Soccer", "2026-10-16")
            .at("17:00")
            .into_task(9, None);
        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(value["startTime"], "17:00");
        assert_eq!(value["reminderEnabled"], true);
        assert_eq!(value["reminderMinutes"], 5);
        assert!(value.get("start_time").is_none());
    }

    #[test]
    fn draft_defaults_only_fill_unset_fields() {
        let mut draft = TaskDraft::new("Chess", "2026-10-16");
        draft.reminder_minutes = Some(10);
        let task = draft.with_defaults(45, 15).into_task(1, None);
        assert_eq!(task.duration, 45);
        assert_eq!(task.reminder_minutes, 10);

        let plain = TaskDraft::new("Chess", "2026-10-16").into_task(2, None);
        assert_eq!(plain.duration, DEFAULT_DURATION_MINUTES);
        assert_eq!(plain.reminder_minutes, DEFAULT_REMINDER_MINUTES);
    }

    #[test]
    fn blank_start_time_counts_as_unscheduled() {
        let mut task = TaskDraft::new("Read", "2026-10-16").into_task(1, None);
        assert!(!task.is_scheduled());
        task.start_time = Some("  ".into());
        assert!(!task.is_scheduled());
        task.start_time = Some("08:30".into());
        assert_eq!(task.start_time(), Some("08:30"));
    }

    #[test]
    fn zero_lead_time_and_duration_fall_back_to_defaults() {
        let mut task = TaskDraft::new("Dishes", "2026-10-16").into_task(1, None);
        task.reminder_minutes = 0;
        task.duration = 0;
        assert_eq!(task.reminder_lead_minutes(), DEFAULT_REMINDER_MINUTES);
        assert_eq!(task.duration_minutes(), DEFAULT_DURATION_MINUTES);
        task.reminder_minutes = 15;
        assert_eq!(task.reminder_lead_minutes(), 15);
    }

    #[test]
    fn patch_sets_and_clears_optional_fields() {
        let mut task = TaskDraft::new("Essay", "2026-10-16")
            .at("09:00")
            .into_task(1, None);
        task.category_id = Some(2);

        let patch = TaskPatch {
            title: Some("Essay draft".into()),
            start_time: Some(None),
            category_id: Some(None),
            completed: Some(true),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut task);

        assert_eq!(task.title, "Essay draft");
        assert!(task.start_time.is_none());
        assert!(task.category_id.is_none());
        assert!(task.completed);
        assert_eq!(task.date, "2026-10-16");
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn snapshot_layout_uses_export_date_key_and_tolerates_missing_collections() {
        let snapshot = Snapshot {
            tasks: Vec::new(),
            categories: Vec::new(),
            settings: vec![Setting {
                key: "darkMode".into(),
                value: serde_json::json!(true),
            }],
            export_date: "2026-10-16T08:00:00.000Z".into(),
        };
        let value = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert_eq!(value["exportDate"], "2026-10-16T08:00:00.000Z");
        assert_eq!(value["settings"][0]["key"], "darkMode");

        let partial: Snapshot =
            serde_json::from_str(r#"{ "tasks": [] }"#).expect("partial snapshot");
        assert!(partial.categories.is_empty());
        assert!(partial.settings.is_empty());
    }
}
