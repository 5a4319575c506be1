use log::{LevelFilter, SetLoggerError};
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

pub mod config;
pub mod defines;
pub mod opcodes;
pub mod packet_buffer;

/// Map a config `Level` string onto a log level filter. Unknown values fall
/// back to `Info`.
pub fn level_filter_from_str(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warning" | "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn initialize_logger(
    log_level: LevelFilter,
    file_path: Option<&str>,
) -> Result<(), SetLoggerError> {
    // Build a stderr logger - always for now.
    let stderr = ConsoleAppender::builder().target(Target::Stderr).build();

    let mut config_builder = Config::builder();
    let mut root_builder = Root::builder();

    if let Some(path) = file_path {
        // Pattern: https://docs.rs/log4rs/*/log4rs/encode/pattern/index.html
        match FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{d} {l} - {m}\n")))
            .build(path)
        {
            Ok(logfile) => {
                config_builder = config_builder
                    .appender(Appender::builder().build("logfile", Box::new(logfile)));
                root_builder = root_builder.appender("logfile");
            }
            Err(e) => {
                eprintln!("Could not open log file {path}: {e}. Logging to stderr only.");
            }
        }
    }

    let config = config_builder
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(log_level)))
                .build("stderr", Box::new(stderr)),
        )
        .build(root_builder.appender("stderr").build(log_level))
        .expect("logger config is statically valid");

    let _handle = log4rs::init_config(config)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_strings_map_to_filters() {
        assert_eq!(level_filter_from_str("debug"), LevelFilter::Debug);
        assert_eq!(level_filter_from_str("Warning"), LevelFilter::Warn);
        assert_eq!(level_filter_from_str("ERROR"), LevelFilter::Error);
        assert_eq!(level_filter_from_str("bogus"), LevelFilter::Info);
    }
}
