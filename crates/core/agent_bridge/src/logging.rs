use crate::config::ConfigError;
use crate::config::LogConfig;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::util::SubscriberInitExt;

/// The basic subscriber
macro_rules! subscriber_builder {
    () => {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal() && yansi::Condition::no_color())
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };
}

const DEFAULT_MAX_LEVEL: Level = Level::INFO;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfigArgs {
    /// Turn-on the DEBUG log level.
    ///
    /// If off only reports ERROR, WARN, and INFO, if on also reports DEBUG
    #[clap(long, global = true)]
    pub debug: bool,

    /// Configures the logging level.
    ///
    /// One of error/warn/info/debug/trace. Takes precedence over the `--debug` flag
    #[clap(long, global = true)]
    pub log_level: Option<Level>,
}

/// How the log events are filtered
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum LogFilter {
    MaxLevel(Level),
    RustLog,
}

/// Configures and enables logging taking into account flags, env variables and file config.
///
/// 1. Log config is taken from the file configuration first
/// 2. If `RUST_LOG` variable is set, it overrides file-based configuration
/// 3. If `--debug` or `--log-level` flags are set, they override previous steps
pub fn log_init(flags: &LogConfigArgs, config: &LogConfig) -> Result<(), ConfigError> {
    let rust_log_is_set = std::env::var("RUST_LOG").is_ok();
    let filter = log_filter(flags, rust_log_is_set, config)?;
    logger(filter).init();
    Ok(())
}

fn logger(filter: LogFilter) -> Arc<dyn tracing::Subscriber + Send + Sync> {
    let subscriber = subscriber_builder!();

    if let LogFilter::MaxLevel(level) = filter {
        return Arc::new(subscriber.with_max_level(level).finish());
    }

    Arc::new(
        subscriber
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_file(true)
            .with_line_number(true)
            .finish(),
    )
}

fn log_filter(
    flags: &LogConfigArgs,
    rust_log_is_set: bool,
    config: &LogConfig,
) -> Result<LogFilter, ConfigError> {
    let log_level = flags.log_level.or(flags.debug.then_some(Level::DEBUG));
    if let Some(log_level) = log_level {
        return Ok(LogFilter::MaxLevel(log_level));
    }

    if rust_log_is_set {
        return Ok(LogFilter::RustLog);
    }

    let level = config.max_level()?.unwrap_or(DEFAULT_MAX_LEVEL);
    Ok(LogFilter::MaxLevel(level))
}
