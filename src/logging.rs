use std::path::Path;
use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, EnvFilter, Layer};

/// File name of the experiment log inside the artifact directory.
pub const LOG_FILE: &str = "experiment.log";

/// If a global tracing subscriber is not already configured, log to
/// `<artifact_dir>/experiment.log` and to stderr, and add a panic hook that
/// points at the log file.
///
/// The stderr layer honours `RUST_LOG` and defaults to `info`.
pub fn install_logger(artifact_dir: &Path) {
    let file_path = artifact_dir.join(LOG_FILE);
    let writer = tracing_appender::rolling::never(artifact_dir, LOG_FILE);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::INFO)
        .with_filter(filter_fn(|m| {
            if let Some(path) = m.module_path() {
                // The wgpu crate is logging too much, so we skip `info` level.
                if path.starts_with("wgpu") && *m.level() >= Level::INFO {
                    return false;
                }
            }
            true
        }));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    if registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok()
    {
        update_panic_hook(&file_path);
    }
}

fn update_panic_hook(file_path: &Path) {
    let hook = std::panic::take_hook();
    let file_path = file_path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the experiment logs here => \
             '{file_path}'\n============="
        );
        hook(info);
    }));
}
