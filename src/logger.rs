/**
 * Sets up logging to the terminal and, optionally, to a file per run.
 */
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use crate::error::{Error, Result};


/// Name of this run's log file, e.g. seek-control-20240301-141502.log
pub fn log_file_name(program: &str) -> String {
    format!("{}-{}.log", program, Local::now().format("%Y%m%d-%H%M%S"))
}


fn log_file_path(program: &str, log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    Ok(log_dir.join(log_file_name(program)))
}


/**
 * Installs the global logger. Can only be called once per process.
 */
pub fn init(program: &str, level: LevelFilter, log_dir: Option<&Path>) -> Result<()> {
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Error)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
    ];
    let mut file_path = None;
    if let Some(log_dir) = log_dir {
        let path = log_file_path(program, log_dir)?;
        let file = File::create(&path)?;
        loggers.push(WriteLogger::new(level, config, file));
        file_path = Some(path);
    }

    CombinedLogger::init(loggers).map_err(|e| Error::Logger(e.to_string()))?;
    if let Some(path) = file_path {
        info!("Logging to {}", path.display());
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use super::{log_file_name, log_file_path};

    #[test]
    fn test_log_file_name() {
        let name = log_file_name("seek-control");
        assert!(name.starts_with("seek-control-"));
        assert!(name.ends_with(".log"));
        // program-YYYYmmdd-HHMMSS.log
        assert!(name.len() == "seek-control-".len() + 15 + ".log".len());
        assert!(name.as_bytes()["seek-control-".len() + 8] == b'-');
    }

    #[test]
    fn test_log_dir_created() {
        let dir = env::temp_dir().join(format!("seek-control-logs-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let path = log_file_path("actuator", &dir.join("nested")).unwrap();
        assert!(dir.join("nested").is_dir());
        assert!(path.starts_with(dir.join("nested")));
        let _ = fs::remove_dir_all(&dir);
    }
}
