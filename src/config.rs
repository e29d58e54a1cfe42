use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized};
use figment::value::{Uncased, UncasedStr};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::data::schema::Level;
use crate::data::source::{SourceRef, DEFAULT_PDS_URL_BASE};
use crate::error::{McsError, Result};

pub const ENV_DATA_DIR: &str = "MCS_DATA_DIR_BASE";
pub const ENV_LEVEL_1B_SUBDIR: &str = "MCS_LEVEL_1B_SUBDIR";
pub const ENV_LEVEL_2_SUBDIR: &str = "MCS_LEVEL_2_SUBDIR";

/// Where to find MCS data.
///
/// Layered as: defaults → JSON file → environment (and `.env`) → command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Load from the PDS archive instead of a local directory.
    pub pds: bool,
    /// Root of the local archive.
    pub data_dir: Option<PathBuf>,
    pub level_1b_subdir: String,
    pub level_2_subdir: String,
    pub pds_url_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pds: false,
            data_dir: None,
            level_1b_subdir: "level_1b".to_string(),
            level_2_subdir: "level_2_2d".to_string(),
            pds_url_base: DEFAULT_PDS_URL_BASE.to_string(),
        }
    }
}

/// Read a `.env` file from the working directory (or a parent) into the
/// process environment. Variables already set are left alone.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("Could not read .env: {e}"),
    }
}

/// Config field fed by each environment variable.
fn env_key(key: &UncasedStr) -> Uncased<'_> {
    let field = [
        (ENV_DATA_DIR, "data_dir"),
        (ENV_LEVEL_1B_SUBDIR, "level_1b_subdir"),
        (ENV_LEVEL_2_SUBDIR, "level_2_subdir"),
    ]
    .into_iter()
    .find(|(var, _)| key.as_str().eq_ignore_ascii_case(var));
    match field {
        Some((_, field)) => Uncased::from(field),
        None => Uncased::from(key.as_str()),
    }
}

impl Config {
    /// Defaults, overlaid with an optional JSON file and then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_dotenv();
        Self::extract(&Self::figment(path)?)
    }

    /// The layered providers, without reading them yet.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(McsError::NotFound(SourceRef::from(path)));
            }
            log::info!("Loading config from {}", path.display());
            figment = figment.merge(Json::file(path));
        }
        Ok(figment.merge(
            Env::raw()
                .only(&[ENV_DATA_DIR, ENV_LEVEL_1B_SUBDIR, ENV_LEVEL_2_SUBDIR])
                .map(env_key),
        ))
    }

    /// Read the layers into a config. Empty values fall back to the defaults.
    pub fn extract(figment: &Figment) -> Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| McsError::Config(e.to_string()))?;
        let defaults = Config::default();
        if config.data_dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
            config.data_dir = None;
        }
        if config.level_1b_subdir.is_empty() {
            config.level_1b_subdir = defaults.level_1b_subdir;
        }
        if config.level_2_subdir.is_empty() {
            config.level_2_subdir = defaults.level_2_subdir;
        }
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, pds: bool, data_dir: Option<PathBuf>) -> Self {
        if pds {
            self.pds = true;
        }
        if let Some(dir) = data_dir {
            self.data_dir = Some(dir);
        }
        self
    }

    /// Sub-directory holding one product level.
    pub fn subdir(&self, level: Level) -> &str {
        match level {
            Level::L1B => &self.level_1b_subdir,
            Level::L2 => &self.level_2_subdir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn load_in_jail(path: Option<&str>) -> std::result::Result<Config, figment::Error> {
        let figment = Config::figment(path.map(Path::new)).map_err(|e| e.to_string())?;
        Config::extract(&figment).map_err(|e| e.to_string().into())
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("mcs.json", r#"{ "pds": true, "level_2_subdir": "from_file" }"#)?;
            jail.set_env(ENV_DATA_DIR, "/mcs");
            jail.set_env(ENV_LEVEL_2_SUBDIR, "l2");
            jail.set_env(ENV_LEVEL_1B_SUBDIR, "");

            let config = load_in_jail(Some("mcs.json"))?;
            assert!(config.pds);
            assert_eq!(config.data_dir, Some(PathBuf::from("/mcs")));
            assert_eq!(config.subdir(Level::L2), "l2");
            assert_eq!(config.subdir(Level::L1B), "level_1b");
            assert_eq!(config.pds_url_base, DEFAULT_PDS_URL_BASE);
            Ok(())
        });
    }

    #[test]
    fn partial_json_keeps_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("mcs.json", r#"{ "level_1b_subdir": "rdr" }"#)?;
            let config = load_in_jail(Some("mcs.json"))?;
            assert!(!config.pds);
            assert_eq!(config.level_1b_subdir, "rdr");
            assert_eq!(config.level_2_subdir, "level_2_2d");
            Ok(())
        });
    }

    #[test]
    fn dotenv_file_feeds_the_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(".env", &format!("{ENV_LEVEL_1B_SUBDIR}=from_dotenv\n"))?;
            let config = Config::load(None).map_err(|e| e.to_string());
            std::env::remove_var(ENV_LEVEL_1B_SUBDIR);
            assert_eq!(config?.level_1b_subdir, "from_dotenv");
            Ok(())
        });
    }

    #[test]
    fn bad_json_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("mcs.json", "{ pds: yes")?;
            let figment = Config::figment(Some(Path::new("mcs.json"))).map_err(|e| e.to_string())?;
            assert!(matches!(Config::extract(&figment), Err(McsError::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn missing_config_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::figment(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn command_line_wins() {
        let config = Config::default().with_overrides(true, Some(PathBuf::from("/x")));
        assert!(config.pds);
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/x")));
    }
}
