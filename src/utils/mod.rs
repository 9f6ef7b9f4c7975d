pub mod logger;
pub mod state;

use std::fs;
use std::io::Write;
use std::path::Path;

pub use logger::MonitorLogger;
pub use state::StateStore;

/// Overwrite a file by writing a sibling temp file and renaming it into place
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &str) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let mut file = fs::File::create(tmp_path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    fs::rename(tmp_path, path)
}

/// Ensure directory exists, create if not
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path = path.as_ref();
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Keep at most `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Current local time in the log line format
pub fn format_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
