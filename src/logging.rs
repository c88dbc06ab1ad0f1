use std::fs::File;
use std::path::Path;

use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

pub const LOG_FILE_NAME: &str = "rephrase_anywhere.log";
const DEBUG_ENV: &str = "REPHRASE_DEBUG";

pub fn level_from_env() -> LevelFilter {
    match std::env::var(DEBUG_ENV) {
        Ok(value) if !value.is_empty() && value != "0" => LevelFilter::Debug,
        _ => LevelFilter::Info,
    }
}

/// Terminal plus a log file in `dir`. Failing to set up logging only
/// costs the log output; the app keeps running.
pub fn init(dir: &Path) {
    let level = level_from_env();
    let config = ConfigBuilder::new()
        .add_filter_allow_str(env!("CARGO_CRATE_NAME"))
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let path = dir.join(LOG_FILE_NAME);
    match File::create(&path) {
        Ok(file) => loggers.push(WriteLogger::new(level, config, file)),
        Err(e) => eprintln!("Warning: could not open log file {}: {}", path.display(), e),
    }

    if let Err(e) = CombinedLogger::init(loggers) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}
