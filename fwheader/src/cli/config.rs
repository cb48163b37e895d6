//! Command-line interface configuration
//!
//! An optional `fwheader.toml` supplies default field values for newly created
//! images and the text overflow policy. It is looked up in the current
//! directory, then its parent, then the user's configuration directory.

use std::{
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::debug;
use serde::Deserialize;

use crate::{
    header::{HeaderFields, TextOverflow},
    image::parse_edits,
    Error,
};

const CONFIG_FILE_NAME: &str = "fwheader.toml";
const ALLOWED_KEYS: &[&str] = &["defaults", "text_overflow"];

/// Default values for the editable header fields
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FieldDefaults {
    pub model_name: Option<String>,
    pub cpo_id: Option<String>,
    /// Three bytes of hex, e.g. `"010203"`
    pub version: Option<String>,
    /// One byte of hex, e.g. `"0x01"`
    pub image_type: Option<String>,
    /// One byte of hex, e.g. `"0x00"`
    pub debug_level: Option<String>,
}

impl FieldDefaults {
    /// The configured values, as header fields
    pub fn to_fields(&self) -> Result<HeaderFields, Error> {
        parse_edits(
            [
                ("model_name", &self.model_name),
                ("cpo_id", &self.cpo_id),
                ("version", &self.version),
                ("image_type", &self.image_type),
                ("debug_level", &self.debug_level),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.as_deref().map(|value| (name, value))),
        )
    }
}

/// Tool configuration
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Field values used by `create` when none are given on the command line
    #[serde(default)]
    pub defaults: FieldDefaults,
    /// What to do with text that does not fit in its field
    #[serde(default)]
    pub text_overflow: TextOverflow,
    /// Where this configuration was loaded from
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load the configuration file, if one exists.
    pub fn load() -> Result<Self, Error> {
        match Self::find_config_path()? {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No {CONFIG_FILE_NAME} found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load the configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let raw_data = read_to_string(path)
            .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;

        let mut config = Self::parse(&raw_data)?;
        config.path = Some(path.to_path_buf());
        debug!("Config: {:#?}", &config);

        Ok(config)
    }

    fn parse(raw_data: &str) -> Result<Self, Error> {
        let value = toml::from_str::<toml::Value>(raw_data)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        if let toml::Value::Table(top_level) = &value {
            Self::validate_keys(top_level)?;
        }

        toml::from_str(raw_data).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    fn validate_keys(top_level: &toml::map::Map<String, toml::Value>) -> Result<(), Error> {
        let unknown = top_level
            .keys()
            .filter(|key| !ALLOWED_KEYS.contains(&key.as_str()))
            .map(|key| format!("'{key}'"))
            .collect::<Vec<_>>();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "unknown key(s) {}, expected one of: {}",
                unknown.join(", "),
                ALLOWED_KEYS.join(", ")
            )))
        }
    }

    fn find_config_path() -> Result<Option<PathBuf>, Error> {
        let current_dir = env::current_dir()?;

        let local_config = current_dir.join(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Ok(Some(local_config));
        }

        if let Some(parent_folder) = current_dir.parent() {
            let workspace_config = parent_folder.join(CONFIG_FILE_NAME);
            if workspace_config.exists() {
                return Ok(Some(workspace_config));
            }
        }

        let global_config = ProjectDirs::from("rs", "fwheader", "fwheader")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists());

        Ok(global_config)
    }
}
