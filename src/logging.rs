//! Logging setup.
//!
//! Structured logging through the `log` facade with an `env_logger`
//! backend. The level comes from, in priority order: the `RUST_LOG`
//! environment variable, the CLI `--quiet`/`-v`/`-vv` flags, then the info
//! default. Debug builds include timestamps and module paths; release
//! builds keep the output compact.

use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize the logging subsystem from CLI verbosity flags.
///
/// Call once at startup, before any logging. Calling twice panics
/// (`env_logger` initializes once per process).
pub fn init_logging(verbose: u8, quiet: bool) {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
        return;
    }

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = Builder::new();
    builder.filter_level(level);

    if cfg!(debug_assertions) {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.module_path().unwrap_or("?"),
                record.args()
            )
        });
    } else {
        builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    }

    builder.init();
}
