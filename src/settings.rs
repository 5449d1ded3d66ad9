//! Runtime options for the engine: which docker to run, how long a poll may
//! take, and where the monitor settings live.
//!
//! Loaded from an optional TOML file, then overridden by `DOCKWATCH_*`
//! environment variables (for example `DOCKWATCH_TIMEOUT_SECS=20`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, ConfigError, Environment, File, FileFormat, Map};
use serde::Deserialize;

use crate::invoker::{CommandSpec, DEFAULT_DOCKER};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DOCKWATCH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Docker executable, name or path.
    pub docker: String,
    /// Time budget for one status command, in seconds.
    pub timeout_secs: u64,
    /// JSON file holding the interval and watch list.
    pub settings_path: PathBuf,
    /// How often to check the settings file for outside edits.
    pub store_poll_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            docker: DEFAULT_DOCKER.to_string(),
            timeout_secs: 10,
            settings_path: PathBuf::from("dockwatch.json"),
            store_poll_ms: 1000,
        }
    }
}

impl AppSettings {
    /// Load settings from `path` (if given and present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn store_poll_period(&self) -> Duration {
        Duration::from_millis(self.store_poll_ms)
    }

    pub fn status_command(&self) -> CommandSpec {
        CommandSpec::docker_status(self.docker.as_str())
    }

    pub fn names_command(&self) -> CommandSpec {
        CommandSpec::docker_names(self.docker.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env() -> Option<Map<String, String>> {
        Some(Map::new())
    }

    #[test]
    fn defaults_without_sources() {
        let settings = AppSettings::load_with_env(None, no_env()).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let path = Path::new("/nonexistent/dockwatch.toml");
        let settings = AppSettings::load_with_env(Some(path), no_env()).unwrap();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "docker = \"/usr/local/bin/podman\"").unwrap();
        writeln!(file, "timeout_secs = 3").unwrap();

        let settings = AppSettings::load_with_env(Some(file.path()), no_env()).unwrap();

        assert_eq!(settings.docker, "/usr/local/bin/podman");
        assert_eq!(settings.timeout(), Duration::from_secs(3));
        assert_eq!(settings.store_poll_ms, 1000);
        assert_eq!(settings.status_command().program, "/usr/local/bin/podman");
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = 3").unwrap();

        let mut env = Map::new();
        env.insert("DOCKWATCH_TIMEOUT_SECS".to_string(), "20".to_string());
        env.insert("DOCKWATCH_SETTINGS_PATH".to_string(), "/tmp/w.json".to_string());

        let settings = AppSettings::load_with_env(Some(file.path()), Some(env)).unwrap();

        assert_eq!(settings.timeout_secs, 20);
        assert_eq!(settings.settings_path, PathBuf::from("/tmp/w.json"));
    }

    #[test]
    fn malformed_value_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = \"soon\"").unwrap();

        assert!(AppSettings::load_with_env(Some(file.path()), no_env()).is_err());
    }
}
