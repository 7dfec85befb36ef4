// Application configuration
//
// Layered with the `config` crate: built-in defaults, then an optional TOML file, then
// `SQLPILOT_*` environment variables.

use crate::utils::validation::{parse_log_level, validate_backend_url};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_COPY_CONFIRM_MS: u64 = 2000;
pub const DEFAULT_SYNTAX_THEME: &str = "base16-ocean.dark";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub backend_url: String,
    pub copy_confirm_ms: u64,
    pub log_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub syntax_theme: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            copy_confirm_ms: DEFAULT_COPY_CONFIRM_MS,
            log_level: "debug".to_string(),
            log_dir: None,
            syntax_theme: DEFAULT_SYNTAX_THEME.to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the default file location plus environment.
    pub fn load() -> Result<Self> {
        let path = crate::utils::path_resolver::resolve_config_file();
        Self::load_from(&path, "SQLPILOT")
    }

    /// Load from an explicit file (missing file is fine) and environment prefix.
    pub fn load_from(path: &Path, env_prefix: &str) -> Result<Self> {
        let defaults = AppConfig::default();
        let settings = config::Config::builder()
            .set_default("backend_url", defaults.backend_url.clone())?
            .set_default("copy_confirm_ms", defaults.copy_confirm_ms)?
            .set_default("log_level", defaults.log_level.clone())?
            .set_default("syntax_theme", defaults.syntax_theme.clone())?
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(env_prefix).try_parsing(true))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to read configuration {:?}: {}", path, e))?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Invalid configuration {:?}: {}", path, e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        validate_backend_url(&self.backend_url)?;
        parse_log_level(&self.log_level)?;
        if self.copy_confirm_ms == 0 {
            return Err(anyhow::anyhow!("copy_confirm_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn backend_base(&self) -> Result<Url> {
        validate_backend_url(&self.backend_url)
    }

    pub fn copy_confirm_duration(&self) -> Duration {
        Duration::from_millis(self.copy_confirm_ms)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        parse_log_level(&self.log_level).unwrap_or(log::LevelFilter::Debug)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow::anyhow!("Failed to render config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Each test uses its own env prefix so parallel tests never see each other's vars.

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(&tmp.path().join("absent.toml"), "SQLPILOT_T_DEFAULTS")
            .unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.copy_confirm_duration(), Duration::from_secs(2));
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "backend_url = \"http://10.0.0.5:9000\"\ncopy_confirm_ms = 750\nlog_level = \"info\""
        )
        .unwrap();

        let cfg = AppConfig::load_from(file.path(), "SQLPILOT_T_FILE").unwrap();
        assert_eq!(cfg.backend_url, "http://10.0.0.5:9000");
        assert_eq!(cfg.copy_confirm_ms, 750);
        assert_eq!(cfg.log_filter(), log::LevelFilter::Info);
        assert_eq!(cfg.syntax_theme, DEFAULT_SYNTAX_THEME);
        assert_eq!(cfg.backend_base().unwrap().as_str(), "http://10.0.0.5:9000/");
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "backend_url = \"http://from-file:8000\"").unwrap();

        std::env::set_var("SQLPILOT_T_ENV_BACKEND_URL", "http://from-env:8000");
        let cfg = AppConfig::load_from(file.path(), "SQLPILOT_T_ENV").unwrap();
        std::env::remove_var("SQLPILOT_T_ENV_BACKEND_URL");

        assert_eq!(cfg.backend_url, "http://from-env:8000");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "backend_url = \"ftp://nope\"").unwrap();
        assert!(AppConfig::load_from(file.path(), "SQLPILOT_T_BAD").is_err());

        let cfg = AppConfig {
            copy_confirm_ms: 0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn to_toml_round_trips_through_loader() {
        let cfg = AppConfig {
            backend_url: "https://nl2sql.internal".to_string(),
            ..AppConfig::default()
        };
        let rendered = cfg.to_toml().unwrap();
        assert!(rendered.contains("backend_url = \"https://nl2sql.internal\""));

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(rendered.as_bytes()).unwrap();
        let loaded = AppConfig::load_from(file.path(), "SQLPILOT_T_ROUNDTRIP").unwrap();
        assert_eq!(loaded, cfg);
    }
}
