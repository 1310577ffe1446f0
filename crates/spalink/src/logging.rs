// Tracing bootstrap: env-filter from config or RUST_LOG, optional JSON
// output, optional daily-rotated file logs.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use spalink_config::LoggingSection;

/// Install the global subscriber. The returned guard must be held for
/// the process lifetime or file logs lose their tail on exit.
pub fn init(logging: &LoggingSection, verbosity: u8) -> Option<WorkerGuard> {
    let fallback = match verbosity {
        0 => logging.level.clone(),
        1 => "info".into(),
        2 => "debug".into(),
        _ => "trace".into(),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if let Some(directory) = &logging.directory {
        let appender = tracing_appender::rolling::daily(directory, "spalink.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if logging.json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
        }
        return Some(guard);
    }

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
    None
}
