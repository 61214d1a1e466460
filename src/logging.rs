use std::path::{Path, PathBuf};

pub const LOG_FILE_BASENAME: &str = "daytrack";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_DIR: &str = "logs";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 10;
pub const LOG_SPEC_ENV: &str = "DAYTRACK_LOG";

/// Log files live next to the collections, under `<data dir>/logs`.
pub fn log_directory(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_DIR)
}

fn default_spec() -> &'static str {
    if cfg!(debug_assertions) {
        "warn,daytrack_lib=debug,daytrack=debug"
    } else {
        "warn,daytrack_lib=info,daytrack=info"
    }
}

/// Picks the first non-blank of `DAYTRACK_LOG` and `RUST_LOG`, else the built-in default.
pub fn resolve_log_spec(daytrack_log: Option<String>, rust_log: Option<String>) -> String {
    daytrack_log
        .filter(|value| !value.trim().is_empty())
        .or_else(|| rust_log.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default_spec().to_string())
}

/// Starts file logging; warnings and errors are echoed to stderr so a
/// terminal host still sees them. Keep the handle alive until exit.
#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(
    data_dir: &Path,
) -> Result<flexi_logger::LoggerHandle, flexi_logger::FlexiLoggerError> {
    use flexi_logger::{detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};

    let directory = log_directory(data_dir);
    std::fs::create_dir_all(&directory)?;
    let spec = resolve_log_spec(
        std::env::var(LOG_SPEC_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
    );

    let handle = Logger::try_with_str(&spec)?
        .log_to_file(
            FileSpec::default()
                .directory(&directory)
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .append()
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .start()?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        log::error!("panic at {location}: {}", panic_message(info.payload()));
        default_hook(info);
    }));

    log::info!("logging to {} spec={spec}", directory.display());
    Ok(handle)
}

#[cfg(any(test, feature = "app"))]
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
