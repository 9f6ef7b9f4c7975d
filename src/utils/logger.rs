use log::{error, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::utils::format_now;

/// Append-only log sink owned by a single monitor.
///
/// Every line is written as `[timestamp] [name] message` to the monitor's
/// own file and mirrored to stdout through the `log` facade. Writing never
/// fails from the caller's point of view.
#[derive(Debug, Clone)]
pub struct MonitorLogger {
    name: String,
    path: PathBuf,
}

impl MonitorLogger {
    /// Logger writing to `<log_dir>/<name>_monitor.log`
    pub fn new(name: &str, log_dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: log_dir.join(format!("{}_monitor.log", name)),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, message: &str) {
        let line = format!("[{}] [{}] {}", format_now(), self.name, message);
        info!("{}", line);

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = result {
            error!("Error writing to log {:?}: {}", self.path, e);
        }
    }
}
