use anyhow::Result;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "sqlpilot";

/// Resolve the configuration file path.
///
/// `SQLPILOT_CONFIG` wins when set; otherwise `<config_dir>/sqlpilot/config.toml`,
/// falling back to `./sqlpilot.toml` when the platform has no config directory.
pub fn resolve_config_file() -> PathBuf {
    if let Some(explicit) = std::env::var_os("SQLPILOT_CONFIG").filter(|v| !v.is_empty()) {
        return PathBuf::from(explicit);
    }

    match dirs::config_dir() {
        Some(dir) => dir.join(APP_DIR).join("config.toml"),
        None => PathBuf::from("sqlpilot.toml"),
    }
}

/// Resolve log folder (absolute path) and make sure it exists.
pub fn resolve_log_folder(configured: Option<&Path>) -> Result<PathBuf> {
    let log_dir = match configured {
        Some(p) => p.to_path_buf(),
        None => default_log_folder(),
    };

    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder {:?}: {}", log_dir, e))?;
    Ok(log_dir)
}

fn default_log_folder() -> PathBuf {
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join(APP_DIR).join("logs");
    }

    // Fallback: current working directory
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("sqlpilot-logs")
}
