use anyhow::{anyhow, Result};
use twyg::{LogLevel, OptsBuilder, Output};

use almanac_etl::config::LoggingConfig;

fn level_from_name(name: &str) -> Result<LogLevel> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" | "warning" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(anyhow!(
            "Unknown log level: {other} (expected trace, debug, info, warn or error)"
        )),
    }
}

/// Install the global logger. Logs go to stderr so `--stdout` output stays
/// clean.
pub fn init(config: &LoggingConfig, force_debug: bool) -> Result<()> {
    let level = if force_debug {
        LogLevel::Debug
    } else {
        level_from_name(&config.level)?
    };

    let opts = OptsBuilder::new()
        .coloured(config.coloured)
        .level(level)
        .report_caller(config.report_caller)
        .output(Output::Stderr)
        .build()
        .map_err(|e| anyhow!("Invalid logging options: {e:?}"))?;

    twyg::setup(opts).map_err(|e| anyhow!("Failed to set up logging: {e:?}"))?;
    Ok(())
}
