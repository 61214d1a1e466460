use std::sync::Arc;

use chrono::Local;
use tokio::sync::broadcast;

use crate::config::{PlannerConfig, DARK_MODE_SETTING_KEY};
use crate::events::{StatePayload, EVENT_STATE_UPDATED};
use crate::models::{Category, NewCategory, RecordId, Snapshot, Task, TaskDraft, TaskPatch};
use crate::notify::PermissionState;
use crate::placement::{drop_on_slot, toggle_completion};
use crate::state::Planner;
use crate::storage::{StoreError, TaskStore};
use crate::time_grid::{parse_date_key, time_to_minutes, today_key, TimeGrid};

const UPDATE_CAPACITY: usize = 16;

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub trait CommandCtx {
    fn store(&self) -> &dyn TaskStore;
    fn planner(&self) -> &Planner;
    fn config(&self) -> &PlannerConfig;
    fn emit_state_updated(&self, payload: StatePayload);
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn store_err<T>(error: StoreError) -> CommandResult<T> {
    err(&format!("storage error: {error}"))
}

/// Host context backed by a shared store; state updates go out on a broadcast channel.
pub struct StoreCtx {
    store: Arc<dyn TaskStore>,
    planner: Planner,
    config: PlannerConfig,
    updates: broadcast::Sender<StatePayload>,
}

impl StoreCtx {
    pub fn new(store: Arc<dyn TaskStore>, planner: Planner, config: PlannerConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            store,
            planner,
            config,
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatePayload> {
        self.updates.subscribe()
    }
}

impl CommandCtx for StoreCtx {
    fn store(&self) -> &dyn TaskStore {
        self.store.as_ref()
    }

    fn planner(&self) -> &Planner {
        &self.planner
    }

    fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn emit_state_updated(&self, payload: StatePayload) {
        log::debug!(
            "commands: {EVENT_STATE_UPDATED} date={:?} tasks={}",
            payload.date,
            payload.tasks.len()
        );
        let _ = self.updates.send(payload);
    }
}

/// Re-reads the visible day from the store and hands it to the planner.
pub fn refresh(ctx: &impl CommandCtx) -> Result<(), StoreError> {
    if let Some(date) = ctx.planner().visible_date() {
        let tasks = ctx.store().list_tasks_for_date(&date)?;
        ctx.planner().on_batch_changed(tasks);
    }
    ctx.emit_state_updated(ctx.planner().state_payload());
    Ok(())
}

fn refresh_then<T>(ctx: &impl CommandCtx, data: T) -> CommandResult<T> {
    match refresh(ctx) {
        Ok(()) => ok(data),
        Err(error) => store_err(error),
    }
}

pub fn load_day(ctx: &impl CommandCtx, date: &str) -> CommandResult<StatePayload> {
    if let Err(error) = parse_date_key(date) {
        return err(&error.to_string());
    }
    let tasks = match ctx.store().list_tasks_for_date(date) {
        Ok(tasks) => tasks,
        Err(error) => return store_err(error),
    };
    let armed = ctx.planner().show_day(date, tasks);
    log::info!("commands: loaded day {date} armed={armed}");
    let payload = ctx.planner().state_payload();
    ctx.emit_state_updated(payload.clone());
    ok(payload)
}

/// Normalizes a start time; blank means unscheduled.
fn clean_start_time(start_time: Option<String>) -> Result<Option<String>, String> {
    match start_time.map(|value| value.trim().to_string()) {
        None => Ok(None),
        Some(value) if value.is_empty() => Ok(None),
        Some(value) => time_to_minutes(&value)
            .map(|_| Some(value))
            .map_err(|error| error.to_string()),
    }
}

pub fn create_task(ctx: &impl CommandCtx, draft: TaskDraft) -> CommandResult<Task> {
    let config = ctx.config();
    let mut draft =
        draft.with_defaults(config.default_duration_minutes, config.default_reminder_minutes);
    draft.title = draft.title.trim().to_string();
    if draft.title.is_empty() {
        return err("title is required");
    }
    if draft.date.trim().is_empty() {
        draft.date = ctx
            .planner()
            .visible_date()
            .unwrap_or_else(|| today_key(&Local::now()));
    } else if let Err(error) = parse_date_key(&draft.date) {
        return err(&error.to_string());
    }
    draft.start_time = match clean_start_time(draft.start_time) {
        Ok(value) => value,
        Err(message) => return err(&message),
    };
    let task = match ctx.store().create_task(draft) {
        Ok(task) => task,
        Err(error) => return store_err(error),
    };
    refresh_then(ctx, task)
}

pub fn update_task(ctx: &impl CommandCtx, id: RecordId, patch: TaskPatch) -> CommandResult<Task> {
    let mut patch = patch;
    if let Some(title) = patch.title.as_mut() {
        *title = title.trim().to_string();
        if title.is_empty() {
            return err("title is required");
        }
    }
    if let Some(date) = &patch.date {
        if let Err(error) = parse_date_key(date) {
            return err(&error.to_string());
        }
    }
    if let Some(start_time) = patch.start_time.take() {
        patch.start_time = match clean_start_time(start_time) {
            Ok(value) => Some(value),
            Err(message) => return err(&message),
        };
    }
    if patch.is_empty() {
        return match ctx.store().get_task(id) {
            Ok(Some(task)) => ok(task),
            Ok(None) => store_err(StoreError::NotFound(id)),
            Err(error) => store_err(error),
        };
    }
    let task = match ctx.store().update_task(id, &patch) {
        Ok(task) => task,
        Err(error) => return store_err(error),
    };
    refresh_then(ctx, task)
}

pub fn toggle_complete(ctx: &impl CommandCtx, id: RecordId) -> CommandResult<Task> {
    let task = match ctx.store().get_task(id) {
        Ok(Some(task)) => task,
        Ok(None) => return store_err(StoreError::NotFound(id)),
        Err(error) => return store_err(error),
    };
    match ctx.store().update_task(id, &toggle_completion(&task)) {
        Ok(task) => refresh_then(ctx, task),
        Err(error) => store_err(error),
    }
}

/// Outcome of dropping a task card on a timeline slot.
pub fn drop_task_on_slot(
    ctx: &impl CommandCtx,
    grid: &TimeGrid,
    id: RecordId,
    slot_index: usize,
) -> CommandResult<Task> {
    let Some(patch) = drop_on_slot(grid, slot_index) else {
        return err(&format!("slot {slot_index} is outside the grid"));
    };
    match ctx.store().update_task(id, &patch) {
        Ok(task) => refresh_then(ctx, task),
        Err(error) => store_err(error),
    }
}

pub fn delete_task(ctx: &impl CommandCtx, id: RecordId) -> CommandResult<bool> {
    match ctx.store().delete_task(id) {
        Ok(removed) => refresh_then(ctx, removed),
        Err(error) => store_err(error),
    }
}

pub fn list_categories(ctx: &impl CommandCtx) -> CommandResult<Vec<Category>> {
    match ctx.store().list_categories() {
        Ok(categories) => ok(categories),
        Err(error) => store_err(error),
    }
}

pub fn add_category(ctx: &impl CommandCtx, category: NewCategory) -> CommandResult<Category> {
    let mut category = category;
    category.name = category.name.trim().to_string();
    if category.name.is_empty() {
        return err("category name is required");
    }
    match ctx.store().add_category(category) {
        Ok(category) => ok(category),
        Err(error) => store_err(error),
    }
}

pub fn dark_mode(ctx: &impl CommandCtx) -> CommandResult<bool> {
    match ctx.store().get_setting(DARK_MODE_SETTING_KEY) {
        Ok(value) => ok(value.and_then(|value| value.as_bool()).unwrap_or(false)),
        Err(error) => store_err(error),
    }
}

pub fn set_dark_mode(ctx: &impl CommandCtx, enabled: bool) -> CommandResult<bool> {
    match ctx
        .store()
        .set_setting(DARK_MODE_SETTING_KEY, serde_json::Value::Bool(enabled))
    {
        Ok(()) => ok(enabled),
        Err(error) => store_err(error),
    }
}

pub fn request_notification_permission(ctx: &impl CommandCtx) -> CommandResult<PermissionState> {
    ok(ctx.planner().request_permission())
}

pub fn export_snapshot(ctx: &impl CommandCtx) -> CommandResult<Snapshot> {
    match ctx.store().export_all() {
        Ok(snapshot) => ok(snapshot),
        Err(error) => store_err(error),
    }
}

pub fn import_snapshot(ctx: &impl CommandCtx, snapshot: Snapshot) -> CommandResult<bool> {
    match ctx.store().import_all(snapshot) {
        Ok(()) => refresh_then(ctx, true),
        Err(error) => store_err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Alert, AlertSink, ManualPermission, NotificationPresenter, SinkError};
    use crate::scheduler::ReminderState;
    use crate::storage::JsonStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct QuietSink;

    impl AlertSink for QuietSink {
        fn show(&self, _alert: &Alert) -> Result<(), SinkError> {
            Ok(())
        }

        fn dismiss(&self, _tag: &str) {}

        fn focus_host(&self) {}
    }

    struct TestCtx {
        _root: tempfile::TempDir,
        store: JsonStore,
        planner: Planner,
        config: PlannerConfig,
        emitted: Mutex<Vec<StatePayload>>,
    }

    impl TestCtx {
        fn new() -> Self {
            Self::with_config(PlannerConfig::default())
        }

        fn with_config(config: PlannerConfig) -> Self {
            let root = tempfile::tempdir().unwrap();
            let store = JsonStore::open(root.path()).unwrap();
            let presenter = Arc::new(NotificationPresenter::new(
                Arc::new(
                    ManualPermission::new(PermissionState::Default)
                        .answering(PermissionState::Granted),
                ),
                Arc::new(QuietSink),
            ));
            Self {
                _root: root,
                store,
                planner: Planner::new(presenter),
                config,
                emitted: Mutex::new(Vec::new()),
            }
        }

        fn emitted(&self) -> Vec<StatePayload> {
            self.emitted.lock().unwrap().clone()
        }
    }

    impl CommandCtx for TestCtx {
        fn store(&self) -> &dyn TaskStore {
            &self.store
        }

        fn planner(&self) -> &Planner {
            &self.planner
        }

        fn config(&self) -> &PlannerConfig {
            &self.config
        }

        fn emit_state_updated(&self, payload: StatePayload) {
            self.emitted.lock().unwrap().push(payload);
        }
    }

    // Far enough ahead that reminders are always armed.
    const DAY: &str = "2099-01-05";

    fn draft(title: &str, start: Option<&str>) -> TaskDraft {
        let mut draft = TaskDraft::new(title, DAY);
        draft.start_time = start.map(str::to_string);
        draft
    }

    #[tokio::test]
    async fn create_requires_a_title() {
        let ctx = TestCtx::new();
        let result = create_task(&ctx, draft("   ", None));
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("title is required"));
        assert!(ctx.store.list_all_tasks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_malformed_times_and_dates() {
        let ctx = TestCtx::new();
        assert!(!create_task(&ctx, draft("a", Some("9am"))).ok);
        let mut bad_date = draft("b", None);
        bad_date.date = "05/01/2099".into();
        assert!(!create_task(&ctx, bad_date).ok);
    }

    #[tokio::test]
    async fn create_on_visible_day_arms_its_reminder() {
        let ctx = TestCtx::new();
        assert!(load_day(&ctx, DAY).ok);

        let mut undated = draft("Soccer", Some("17:00"));
        undated.date = String::new();
        let result = create_task(&ctx, undated);
        assert!(result.ok);
        let task = result.data.unwrap();
        assert_eq!(task.date, DAY);
        assert_eq!(task.title, "Soccer");

        assert_eq!(ctx.planner.tasks().len(), 1);
        assert_eq!(ctx.planner.scheduler().state_of(task.id), ReminderState::Armed);
        let last = ctx.emitted().pop().unwrap();
        assert_eq!(last.tasks.len(), 1);
    }

    #[tokio::test]
    async fn configured_defaults_fill_unset_draft_fields() {
        let ctx = TestCtx::with_config(PlannerConfig {
            default_duration_minutes: 50,
            default_reminder_minutes: 15,
            ..PlannerConfig::default()
        });
        let task = create_task(&ctx, draft("Piano", Some("16:00"))).data.unwrap();
        assert_eq!(task.duration, 50);
        assert_eq!(task.reminder_minutes, 15);

        let mut explicit = draft("Swim", Some("18:00"));
        explicit.duration = Some(90);
        explicit.reminder_minutes = Some(10);
        let task = create_task(&ctx, explicit).data.unwrap();
        assert_eq!(task.duration, 90);
        assert_eq!(task.reminder_minutes, 10);
    }

    #[tokio::test]
    async fn blank_start_time_is_stored_as_unscheduled() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let task = create_task(&ctx, draft("Read", Some("  "))).data.unwrap();
        assert!(task.start_time.is_none());
        assert_eq!(ctx.planner.scheduler().state_of(task.id), ReminderState::Idle);
    }

    #[tokio::test]
    async fn editing_start_time_re_arms() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let task = create_task(&ctx, draft("Piano", Some("16:00"))).data.unwrap();
        let before = ctx.planner.scheduler().armed()[0].fire_at;

        let patch = TaskPatch {
            start_time: Some(Some("18:00".into())),
            ..TaskPatch::default()
        };
        let updated = update_task(&ctx, task.id, patch).data.unwrap();
        assert_eq!(updated.start_time(), Some("18:00"));
        let armed = ctx.planner.scheduler().armed();
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].fire_at - before, chrono::Duration::hours(2));
    }

    #[tokio::test]
    async fn update_rejects_empty_title_and_missing_task() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let task = create_task(&ctx, draft("Essay", None)).data.unwrap();
        let blank = TaskPatch {
            title: Some(" ".into()),
            ..TaskPatch::default()
        };
        assert!(!update_task(&ctx, task.id, blank).ok);

        let patch = TaskPatch {
            completed: Some(true),
            ..TaskPatch::default()
        };
        let missing = update_task(&ctx, 999, patch);
        assert!(!missing.ok);
        assert!(missing.error.unwrap().contains("999"));
    }

    #[tokio::test]
    async fn toggle_complete_updates_progress() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let a = create_task(&ctx, draft("a", Some("08:00"))).data.unwrap();
        create_task(&ctx, draft("b", Some("09:00")));

        let toggled = toggle_complete(&ctx, a.id).data.unwrap();
        assert!(toggled.completed);
        assert_eq!(ctx.planner.progress().percent, 50);

        let back = toggle_complete(&ctx, a.id).data.unwrap();
        assert!(!back.completed);
        assert_eq!(ctx.planner.progress().percent, 0);
        assert!(!toggle_complete(&ctx, 404).ok);
    }

    #[tokio::test]
    async fn drop_on_slot_schedules_the_task() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let grid = TimeGrid::new(6, 22, 30).unwrap();
        let task = create_task(&ctx, draft("Chores", None)).data.unwrap();

        let placed = drop_task_on_slot(&ctx, &grid, task.id, 4).data.unwrap();
        assert_eq!(placed.start_time(), Some("08:00"));
        let timeline = ctx.planner.timeline(&grid);
        assert_eq!(timeline.rows[4].tasks[0].id, task.id);
        assert!(timeline.unscheduled.is_empty());
        assert_eq!(ctx.planner.scheduler().state_of(task.id), ReminderState::Armed);

        assert!(!drop_task_on_slot(&ctx, &grid, task.id, 32).ok);
    }

    #[tokio::test]
    async fn delete_supersedes_the_reminder() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let task = create_task(&ctx, draft("Walk", Some("10:00"))).data.unwrap();
        assert!(delete_task(&ctx, task.id).data.unwrap());
        assert_eq!(
            ctx.planner.scheduler().state_of(task.id),
            ReminderState::Superseded
        );
        assert!(!delete_task(&ctx, task.id).data.unwrap());
    }

    #[tokio::test]
    async fn tasks_of_other_days_stay_out_of_the_batch() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        let mut other = draft("Tomorrow", Some("10:00"));
        other.date = "2099-01-06".into();
        let task = create_task(&ctx, other).data.unwrap();
        assert!(ctx.planner.tasks().is_empty());
        assert_eq!(ctx.planner.scheduler().state_of(task.id), ReminderState::Idle);
    }

    #[tokio::test]
    async fn load_day_rejects_bad_keys() {
        let ctx = TestCtx::new();
        assert!(!load_day(&ctx, "tomorrow").ok);
        assert!(ctx.emitted().is_empty());
    }

    #[test]
    fn categories_and_dark_mode() {
        let ctx = TestCtx::new();
        assert_eq!(list_categories(&ctx).data.unwrap().len(), 8);
        assert!(!add_category(
            &ctx,
            NewCategory {
                name: " ".into(),
                color: "#000000".into(),
                icon: "📌".into(),
            }
        )
        .ok);
        let art = add_category(
            &ctx,
            NewCategory {
                name: "Art".into(),
                color: "#ef4444".into(),
                icon: "🎨".into(),
            },
        )
        .data
        .unwrap();
        assert_eq!(art.name, "Art");

        assert_eq!(dark_mode(&ctx).data, Some(false));
        assert!(set_dark_mode(&ctx, true).ok);
        assert_eq!(dark_mode(&ctx).data, Some(true));
    }

    #[test]
    fn permission_request_goes_through_the_planner() {
        let ctx = TestCtx::new();
        assert_eq!(
            request_notification_permission(&ctx).data,
            Some(PermissionState::Granted)
        );
    }

    #[tokio::test]
    async fn import_replaces_and_reloads_the_visible_day() {
        let ctx = TestCtx::new();
        load_day(&ctx, DAY);
        create_task(&ctx, draft("old", Some("08:00")));
        let exported = export_snapshot(&ctx).data.unwrap();
        assert_eq!(exported.tasks.len(), 1);

        let snapshot = Snapshot {
            tasks: vec![
                TaskDraft::new("new", DAY).at("11:00").into_task(10, None),
                TaskDraft::new("newer", DAY).at("12:00").into_task(11, None),
            ],
            categories: exported.categories,
            settings: Vec::new(),
            export_date: exported.export_date,
        };
        assert!(import_snapshot(&ctx, snapshot).ok);
        let titles: Vec<_> = ctx.planner.tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["new", "newer"]);
        assert_eq!(ctx.planner.scheduler().armed_count(), 2);
    }

    #[tokio::test]
    async fn store_ctx_broadcasts_state_updates() {
        let root = tempfile::tempdir().unwrap();
        let store: Arc<dyn TaskStore> = Arc::new(JsonStore::open(root.path()).unwrap());
        let presenter = Arc::new(NotificationPresenter::new(
            Arc::new(ManualPermission::new(PermissionState::Granted)),
            Arc::new(QuietSink),
        ));
        let ctx = StoreCtx::new(store, Planner::new(presenter), PlannerConfig::default());
        let mut updates = ctx.subscribe();

        load_day(&ctx, DAY);
        let payload = updates.try_recv().expect("state update");
        assert_eq!(payload.date.as_deref(), Some(DAY));
    }
}
