use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::UidRoot;
use crate::error::UploaderError;

pub const DEFAULT_SERVER_URL: &str = "http://orthanc:8042";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_LOG_FILE: &str = "warnings.log";

/// On-disk config file. Every field is optional; missing ones fall back to defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub metadata_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub image_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub dicom_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub log_file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub uid_root: Option<UidRoot>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub metadata_file: Utf8PathBuf,
    pub image_dir: Utf8PathBuf,
    pub dicom_dir: Utf8PathBuf,
    pub log_file: Utf8PathBuf,
    pub uid_root: UidRoot,
    pub request_timeout: Option<Duration>,
}

impl Settings {
    /// Default layout below `data_dir`.
    pub fn with_data_dir(data_dir: &Utf8Path) -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            metadata_file: data_dir.join("allImageMetadata.xml"),
            image_dir: data_dir.join("allJPEGImages"),
            dicom_dir: data_dir.join("allDICOMImages"),
            log_file: Utf8PathBuf::from(DEFAULT_LOG_FILE),
            uid_root: UidRoot::default(),
            request_timeout: None,
        }
    }

    pub fn instances_url(&self) -> String {
        format!("{}/instances", self.server_url.trim_end_matches('/'))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_data_dir(Utf8Path::new(DEFAULT_DATA_DIR))
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<Utf8PathBuf>,
    pub server_url: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&Utf8Path>,
        overrides: ConfigOverrides,
    ) -> Result<Settings, UploaderError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => Config::default(),
        };
        Ok(Self::resolve_config(config, overrides))
    }

    pub fn read(path: &Utf8Path) -> Result<Config, UploaderError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| UploaderError::ConfigRead(path.to_owned()))?;
        serde_json::from_str(&content).map_err(|err| UploaderError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config, overrides: ConfigOverrides) -> Settings {
        let data_dir = overrides
            .data_dir
            .or(config.data_dir)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATA_DIR));
        let defaults = Settings::with_data_dir(&data_dir);

        Settings {
            server_url: overrides
                .server_url
                .or(config.server_url)
                .unwrap_or(defaults.server_url),
            metadata_file: config.metadata_file.unwrap_or(defaults.metadata_file),
            image_dir: config.image_dir.unwrap_or(defaults.image_dir),
            dicom_dir: config.dicom_dir.unwrap_or(defaults.dicom_dir),
            log_file: config.log_file.unwrap_or(defaults.log_file),
            uid_root: config.uid_root.unwrap_or(defaults.uid_root),
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
