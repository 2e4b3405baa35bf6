//! File-backed logging, initialized once per opened database next to its
//! data directory, mirroring the teacher's `logger::init_for_db_in`
//! rolling-file-appender shape (trimmed to the single app log this crate
//! needs; the teacher's audit/metrics/dev6 channels have no minileaf
//! analogue).
use std::path::Path;

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

const MAX_LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
const ROLLED_FILE_RETENTION: u32 = 7;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

/// Initialize logging into `{data_dir}/logs/minileaf.log`, rolling at
/// 10 MiB with 7 files retained. Idempotent per process: a second call
/// from a second opened database is logged and ignored, since `log4rs`
/// only accepts one global config.
///
/// # Errors
/// Returns an error if the log directory cannot be created or the
/// appender cannot be built.
pub fn init_for_data_dir(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = log_dir.join("minileaf.log");
    let roller_pattern = format!("{}", log_dir.join("minileaf.{}.log").display());
    let roller = FixedWindowRoller::builder().build(&roller_pattern, ROLLED_FILE_RETENTION)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(MAX_LOG_FILE_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder().encoder(Box::new(PatternEncoder::new(PATTERN))).build(log_file, Box::new(policy))?;

    let config = LogConfig::builder()
        .appender(Appender::builder().build("app", Box::new(appender)))
        .build(Root::builder().appender("app").build(LevelFilter::Info))?;

    if log4rs::init_config(config).is_err() {
        log::debug!("logging already initialized for this process, skipping reinit for {}", data_dir.display());
    }
    Ok(())
}
