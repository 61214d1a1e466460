use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::events::{AlertEvent, DismissReason};
use crate::models::{RecordId, Task};
use crate::scheduler::ReminderFired;

pub const ALERT_TITLE: &str = "Task Reminder";
pub const DEFAULT_DISMISS_AFTER: Duration = Duration::from_secs(30);
pub const TONE_BEEPS: usize = 3;
#[cfg(all(feature = "app", unix, not(target_os = "macos")))]
const DESKTOP_APP_NAME: &str = "daytrack";

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    Default,
    Unsupported,
}

pub trait PermissionSource: Send + Sync {
    fn state(&self) -> PermissionState;
    /// Shows the one user-gesture prompt. Only called while the state is `Default`.
    fn prompt(&self) -> PermissionState;
}

/// A permission that never changes, e.g. a terminal host that can always print.
pub struct FixedPermission(PermissionState);

impl FixedPermission {
    pub fn new(state: PermissionState) -> Self {
        Self(state)
    }
}

impl PermissionSource for FixedPermission {
    fn state(&self) -> PermissionState {
        self.0
    }

    fn prompt(&self) -> PermissionState {
        self.0
    }
}

/// In-memory permission whose prompt answers with a preset reply.
pub struct ManualPermission {
    state: Mutex<PermissionState>,
    reply: Mutex<PermissionState>,
    prompts: AtomicUsize,
}

impl ManualPermission {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
            reply: Mutex::new(PermissionState::Denied),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn answering(self, reply: PermissionState) -> Self {
        *self.reply.lock().expect("permission poisoned") = reply;
        self
    }

    pub fn set(&self, state: PermissionState) {
        *self.state.lock().expect("permission poisoned") = state;
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl PermissionSource for ManualPermission {
    fn state(&self) -> PermissionState {
        *self.state.lock().expect("permission poisoned")
    }

    fn prompt(&self) -> PermissionState {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let reply = *self.reply.lock().expect("permission poisoned");
        self.set(reply);
        reply
    }
}

/// Resolves to `Granted` or `Denied`, prompting only from the `Default` state.
pub fn request_permission(source: &dyn PermissionSource) -> PermissionState {
    match source.state() {
        PermissionState::Granted => PermissionState::Granted,
        PermissionState::Denied => PermissionState::Denied,
        PermissionState::Unsupported => {
            log::info!("notify: notifications are not supported by this host");
            PermissionState::Denied
        }
        PermissionState::Default => match source.prompt() {
            PermissionState::Granted => PermissionState::Granted,
            _ => PermissionState::Denied,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// One visible alert per tag; presenting the same tag replaces it.
    pub tag: String,
    pub task_id: RecordId,
    pub title: String,
    pub body: String,
}

impl Alert {
    pub fn tag_for(task_id: RecordId) -> String {
        format!("task-{task_id}")
    }

    pub fn for_task(task: &Task) -> Self {
        Self {
            tag: Self::tag_for(task.id),
            task_id: task.id,
            title: ALERT_TITLE.to_string(),
            body: format!("{} starts soon!", task.title),
        }
    }
}

#[derive(Debug)]
pub struct SinkError(pub String);

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "alert sink error: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

pub trait AlertSink: Send + Sync {
    fn show(&self, alert: &Alert) -> Result<(), SinkError>;
    fn dismiss(&self, tag: &str);
    /// Brings the host application to the foreground.
    fn focus_host(&self);
}

/// Prints alerts as text lines.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl AlertSink for ConsoleSink {
    fn show(&self, alert: &Alert) -> Result<(), SinkError> {
        let mut out = self.out.lock().expect("console sink poisoned");
        writeln!(out, "[{}] {}: {}", alert.tag, alert.title, alert.body)
            .and_then(|_| out.flush())
            .map_err(|err| SinkError(err.to_string()))
    }

    fn dismiss(&self, tag: &str) {
        log::debug!("console: dismissed {tag}");
    }

    fn focus_host(&self) {
        log::debug!("console: focus requested");
    }
}

#[derive(Debug)]
pub enum CueError {
    Io(std::io::Error),
    Device(String),
}

impl std::fmt::Display for CueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CueError::Io(err) => write!(f, "io error: {err}"),
            CueError::Device(message) => write!(f, "device error: {message}"),
        }
    }
}

impl std::error::Error for CueError {}

impl From<std::io::Error> for CueError {
    fn from(value: std::io::Error) -> Self {
        CueError::Io(value)
    }
}

/// A best-effort side-channel signal played after an alert is shown.
pub trait AlertCue: Send + Sync {
    fn name(&self) -> &'static str;
    fn play(&self, alert: &Alert) -> Result<(), CueError>;
}

/// Audible cue: a short run of terminal bells.
pub struct ToneCue {
    out: Mutex<Box<dyn Write + Send>>,
    beeps: usize,
}

impl ToneCue {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            beeps: TONE_BEEPS,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl AlertCue for ToneCue {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn play(&self, _alert: &Alert) -> Result<(), CueError> {
        let mut out = self.out.lock().expect("tone cue poisoned");
        for _ in 0..self.beeps {
            out.write_all(b"\x07")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// OS notifications through the session's notification daemon.
///
/// Presenting a tag that is still on screen replaces that notification
/// in place instead of stacking a second one.
#[cfg(all(feature = "app", unix, not(target_os = "macos")))]
pub struct DesktopSink {
    shown: Mutex<HashMap<String, notify_rust::NotificationHandle>>,
}

#[cfg(all(feature = "app", unix, not(target_os = "macos")))]
impl DesktopSink {
    pub fn new() -> Self {
        Self {
            shown: Mutex::new(HashMap::new()),
        }
    }

    /// `None` when no notification daemon answers on the session bus.
    pub fn detect() -> Option<Self> {
        match notify_rust::get_server_information() {
            Ok(server) => {
                log::info!("notify: desktop notifications via {} {}", server.name, server.version);
                Some(Self::new())
            }
            Err(err) => {
                log::info!("notify: no notification daemon: {err}");
                None
            }
        }
    }

    fn notification_for(alert: &Alert) -> notify_rust::Notification {
        let mut notification = notify_rust::Notification::new();
        notification
            .appname(DESKTOP_APP_NAME)
            .summary(&alert.title)
            .body(&alert.body)
            .icon("alarm-clock")
            .urgency(notify_rust::Urgency::Critical)
            .timeout(notify_rust::Timeout::Never);
        notification
    }
}

#[cfg(all(feature = "app", unix, not(target_os = "macos")))]
impl Default for DesktopSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "app", unix, not(target_os = "macos")))]
impl AlertSink for DesktopSink {
    fn show(&self, alert: &Alert) -> Result<(), SinkError> {
        let mut notification = Self::notification_for(alert);
        let mut shown = self.shown.lock().expect("desktop sink poisoned");
        if let Some(previous) = shown.get(&alert.tag) {
            notification.id(previous.id());
        }
        let handle = notification
            .show()
            .map_err(|err| SinkError(err.to_string()))?;
        shown.insert(alert.tag.clone(), handle);
        Ok(())
    }

    fn dismiss(&self, tag: &str) {
        let handle = self.shown.lock().expect("desktop sink poisoned").remove(tag);
        if let Some(handle) = handle {
            handle.close();
            log::debug!("desktop: closed {tag}");
        }
    }

    fn focus_host(&self) {
        log::debug!("desktop: headless host has no window to focus");
    }
}

/// Desktop notifications when a daemon is running, else lines on stdout.
#[cfg(feature = "app")]
pub fn host_sink() -> Arc<dyn AlertSink> {
    #[cfg(all(unix, not(target_os = "macos")))]
    if let Some(desktop) = DesktopSink::detect() {
        return Arc::new(desktop);
    }
    Arc::new(ConsoleSink::stdout())
}

struct ActiveAlert {
    presentation: u64,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct ActiveAlerts {
    by_tag: HashMap<String, ActiveAlert>,
    next_presentation: u64,
}

/// Turns a fired reminder into a visible alert.
///
/// Permission is checked when the timer fires, so a grant given after
/// reminders were armed takes effect without a re-scan. A failing cue is
/// logged and never affects the alert itself.
pub struct NotificationPresenter {
    permission: Arc<dyn PermissionSource>,
    sink: Arc<dyn AlertSink>,
    cues: Mutex<Vec<Arc<dyn AlertCue>>>,
    events: broadcast::Sender<AlertEvent>,
    dismiss_after: Duration,
    active: Arc<Mutex<ActiveAlerts>>,
}

impl NotificationPresenter {
    pub fn new(permission: Arc<dyn PermissionSource>, sink: Arc<dyn AlertSink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            permission,
            sink,
            cues: Mutex::new(Vec::new()),
            events,
            dismiss_after: DEFAULT_DISMISS_AFTER,
            active: Arc::new(Mutex::new(ActiveAlerts::default())),
        }
    }

    pub fn with_dismiss_after(mut self, dismiss_after: Duration) -> Self {
        self.dismiss_after = dismiss_after;
        self
    }

    pub fn add_cue(&self, cue: Arc<dyn AlertCue>) {
        self.cues.lock().expect("cue list poisoned").push(cue);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission.state()
    }

    pub fn request_permission(&self) -> PermissionState {
        request_permission(self.permission.as_ref())
    }

    pub fn is_showing(&self, tag: &str) -> bool {
        let guard = self.active.lock().expect("alert registry poisoned");
        guard.by_tag.contains_key(tag)
    }

    /// Shows the reminder alert for `task`. Returns whether it was shown.
    pub fn present(&self, task: &Task) -> bool {
        let permission = self.permission.state();
        if permission != PermissionState::Granted {
            log::debug!(
                "notify: skip task_id={} permission={permission:?}",
                task.id
            );
            return false;
        }

        let alert = Alert::for_task(task);
        if let Err(err) = self.sink.show(&alert) {
            log::warn!("notify: show failed tag={} err={err}", alert.tag);
            return false;
        }
        self.track(&alert.tag);
        log::info!("notify: presented tag={}", alert.tag);
        let _ = self.events.send(AlertEvent::Presented {
            alert: alert.clone(),
        });
        self.play_cues(&alert);
        true
    }

    /// User clicked the alert: focus the host and dismiss it.
    pub fn acknowledge(&self, tag: &str) -> bool {
        let removed = {
            let mut guard = self.active.lock().expect("alert registry poisoned");
            guard.by_tag.remove(tag)
        };
        let Some(active) = removed else {
            return false;
        };
        if let Some(timer) = active.timer {
            timer.abort();
        }
        self.sink.focus_host();
        self.sink.dismiss(tag);
        let _ = self.events.send(AlertEvent::Dismissed {
            tag: tag.to_string(),
            reason: DismissReason::Acknowledged,
        });
        true
    }

    fn play_cues(&self, alert: &Alert) {
        let cues = self.cues.lock().expect("cue list poisoned").clone();
        for cue in cues {
            if let Err(err) = cue.play(alert) {
                log::warn!("notify: {} cue failed tag={} err={err}", cue.name(), alert.tag);
            }
        }
    }

    fn track(&self, tag: &str) {
        let mut guard = self.active.lock().expect("alert registry poisoned");
        guard.next_presentation += 1;
        let presentation = guard.next_presentation;
        let timer = self.spawn_auto_dismiss(tag.to_string(), presentation);
        let previous = guard
            .by_tag
            .insert(tag.to_string(), ActiveAlert { presentation, timer });
        if let Some(timer) = previous.and_then(|active| active.timer) {
            timer.abort();
        }
    }

    fn spawn_auto_dismiss(&self, tag: String, presentation: u64) -> Option<AbortHandle> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::warn!("notify: no async runtime, {tag} will not auto-dismiss");
                return None;
            }
        };
        let active = Arc::clone(&self.active);
        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        let delay = self.dismiss_after;
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut guard = active.lock().expect("alert registry poisoned");
                match guard.by_tag.get(&tag) {
                    Some(current) if current.presentation == presentation => {
                        guard.by_tag.remove(&tag);
                    }
                    _ => return,
                }
            }
            sink.dismiss(&tag);
            log::debug!("notify: auto-dismissed tag={tag}");
            let _ = events.send(AlertEvent::Dismissed {
                tag,
                reason: DismissReason::TimedOut,
            });
        });
        Some(join.abort_handle())
    }
}

impl ReminderFired for NotificationPresenter {
    fn reminder_fired(&self, task: &Task) {
        self.present(task);
    }
}
