//! Logger setup for the binary.

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Routes records to `file` with a timestamped one-line format.
fn configure(builder: &mut Builder, file: File) {
    builder
        .target(Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        });
}

/// Sends all log records to `logfile`, truncating it.
///
/// Filters come from `RUST_LOG` in the usual `env_logger` syntax
/// (`debug`, `melt3d::linalg=debug`, `info,melt3d::sim=trace`, ...).
/// Can only succeed once per process.
pub fn init_logging(logfile: &Path) -> Result<()> {
    if let Some(dir) = logfile.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let file = File::create(logfile)
        .with_context(|| format!("Failed to create log file {}", logfile.display()))?;

    let mut builder = Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER));
    configure(&mut builder, file);
    builder.try_init().context("Logger already initialized")?;

    log::info!(
        "Logging to {} (max level: {})",
        logfile.display(),
        log::max_level()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use tempfile::tempdir;

    fn file_logger(filters: &str, file: File) -> env_logger::Logger {
        let mut builder = Builder::new();
        builder.parse_filters(filters);
        configure(&mut builder, file);
        builder.build()
    }

    fn enabled(logger: &env_logger::Logger, level: Level, target: &str) -> bool {
        logger.enabled(&Metadata::builder().level(level).target(target).build())
    }

    #[test]
    fn test_module_directives_are_honoured() -> Result<()> {
        let dir = tempdir()?;
        let file = File::create(dir.path().join("melt.log"))?;
        let logger = file_logger("info,melt3d::linalg=debug", file);

        assert_eq!(logger.filter(), LevelFilter::Debug);
        assert!(enabled(&logger, Level::Debug, "melt3d::linalg::krylov"));
        assert!(!enabled(&logger, Level::Debug, "melt3d::sim::stepping"));
        assert!(enabled(&logger, Level::Info, "melt3d::sim::stepping"));
        Ok(())
    }

    #[test]
    fn test_crate_directive_enables_debug() -> Result<()> {
        let dir = tempdir()?;
        let file = File::create(dir.path().join("melt.log"))?;
        let logger = file_logger("melt3d=debug", file);

        assert!(enabled(&logger, Level::Debug, "melt3d::linalg::krylov"));
        assert!(!enabled(&logger, Level::Trace, "melt3d::linalg::krylov"));
        Ok(())
    }

    #[test]
    fn test_records_go_to_the_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("melt.log");
        let logger = file_logger(DEFAULT_FILTER, File::create(&path)?);

        logger.log(
            &Record::builder()
                .args(format_args!("t = 0.5: Solve phi and U"))
                .level(Level::Info)
                .target("melt3d::sim::stepping")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("TFQMR iteration 1.0"))
                .level(Level::Debug)
                .target("melt3d::linalg::krylov")
                .build(),
        );
        logger.flush();

        let text = std::fs::read_to_string(&path)?;
        assert!(text.contains("INFO  melt3d::sim::stepping] t = 0.5: Solve phi and U"));
        assert!(!text.contains("TFQMR"));
        Ok(())
    }
}
