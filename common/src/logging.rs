use time::{macros::format_description, UtcOffset};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;

/// Installs the global subscriber, writing timestamped lines to stderr.
///
/// Call this before starting any threads: the local UTC offset can only be
/// read while the process is single-threaded, otherwise UTC is used. Keep the
/// returned guard alive until exit so buffered lines get flushed.
pub fn init_logger(level: Level) -> WorkerGuard {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[year].[month].[day] [hour]:[minute]:[second]"),
    );
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    // a subscriber installed earlier (e.g. by a test) wins
    let _ = tracing_subscriber::fmt()
        .with_timer(timer)
        .with_target(false)
        .with_max_level(level)
        .with_writer(writer)
        .try_init();
    guard
}
