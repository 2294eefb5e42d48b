mod config;
mod error;
mod schema;
mod table;
mod value;

pub use config::{
    DEFAULT_STORAGE_DIR, FORMAT_VERSION, GROWTH_FACTOR, HEADER_SIZE, INITIAL_MAP_SIZE, MAGIC,
    MAX_COLUMNS, MAX_COLUMN_NAME_LEN, SYNC_INTERVAL_MS, SYNC_INTERVAL_ROWS,
};
pub use error::{RistrettoError, RistrettoResult};
pub use schema::{ColumnDescriptor, ColumnType, TableSchema};
pub use table::Table;
pub use value::Value;

use std::fs;
use std::path::Path;

use tracing_subscriber::prelude::*;

/// Installs the same layered stdout + daily-rolling-file subscriber the
/// project's server binaries use. Purely a convenience for embedders and
/// tests — the engine itself never calls this and logs through `tracing`
/// regardless of whether a subscriber is installed.
pub fn init_log() {
    let log_path = Path::new(config::LOG_PATH);
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let log_filename = log_path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("ristrettodb.log");
    let _ = fs::create_dir_all(log_dir);

    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_thread_names(true)
        .with_level(true);

    let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked deliberately: the guard must outlive the subscriber, and this
    // function is called at most once per process by an embedder.
    Box::leak(Box::new(guard));

    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_thread_names(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config::LOG_LEVEL))
        .with(stdout_log)
        .with(file_log)
        .try_init();
}
