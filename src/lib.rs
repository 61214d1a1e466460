pub mod commands;
pub mod config;
pub mod events;
pub mod logging;
pub mod models;
pub mod notify;
pub mod placement;
pub mod progress;
pub mod reminders;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod time_grid;

#[cfg(all(feature = "app", not(test)))]
use std::path::PathBuf;

/// Headless host: keeps today's reminders armed and raises desktop alerts.
#[cfg(all(feature = "app", not(test)))]
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = config::data_dir_from_env();
    let _logger = logging::init_logging(&data_dir)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(host_loop(data_dir))
}

#[cfg(all(feature = "app", not(test)))]
async fn host_loop(data_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use chrono::Local;
    use tokio::sync::broadcast::error::RecvError;

    use crate::commands::StoreCtx;
    use crate::config::PlannerConfig;
    use crate::events::EVENT_ALERT;
    use crate::notify::{
        host_sink, FixedPermission, NotificationPresenter, PermissionState, ToneCue,
    };
    use crate::state::{start_due_soon_poll, Planner};
    use crate::storage::{JsonStore, TaskStore};
    use crate::time_grid::today_key;

    let store: Arc<dyn TaskStore> = Arc::new(JsonStore::open(&data_dir)?);
    let config = PlannerConfig::load(store.as_ref())?;
    let grid = config.grid()?;

    let presenter = NotificationPresenter::new(
        Arc::new(FixedPermission::new(PermissionState::Granted)),
        host_sink(),
    )
    .with_dismiss_after(config.alert_dismiss_after());
    if config.sound_enabled {
        presenter.add_cue(Arc::new(ToneCue::stdout()));
    }
    let presenter = Arc::new(presenter);
    let mut alerts = presenter.subscribe();

    let planner = Planner::new(presenter);
    let ctx = StoreCtx::new(store.clone(), planner.clone(), config.clone());

    let mut day = today_key(&Local::now());
    let loaded = commands::load_day(&ctx, &day);
    if !loaded.ok {
        return Err(loaded.error.unwrap_or_default().into());
    }
    let timeline = planner.timeline(&grid);
    log::info!(
        "host: {day} slots={} placed={} unscheduled={} armed={}",
        timeline.rows.len(),
        timeline.rows.iter().map(|row| row.tasks.len()).sum::<usize>(),
        timeline.unscheduled.len(),
        planner.scheduler().armed_count()
    );

    let poll = start_due_soon_poll(planner.clone(), config.due_soon_poll());
    let mut reload = tokio::time::interval(config.store_reload());
    reload.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = reload.tick() => {
                let changed = store.reload().unwrap_or_else(|error| {
                    log::warn!("host: store reload failed: {error}");
                    false
                });
                let today = today_key(&Local::now());
                if today != day {
                    log::info!("host: day rolled over {day} -> {today}");
                    day = today;
                    let result = commands::load_day(&ctx, &day);
                    if let Some(error) = result.error {
                        log::warn!("host: load_day failed: {error}");
                    }
                } else if changed {
                    if let Err(error) = commands::refresh(&ctx) {
                        log::warn!("host: refresh failed: {error}");
                    }
                }
            }
            event = alerts.recv() => match event {
                Ok(event) => log::info!(
                    "host: {EVENT_ALERT} {}",
                    serde_json::to_string(&event).unwrap_or_default()
                ),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("host: missed {missed} alert event(s)")
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("host: shutting down");
                break;
            }
        }
    }

    poll.abort();
    planner.scheduler().cancel_all();
    Ok(())
}
