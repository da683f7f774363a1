//! Driver settings
//!
//! Settings live in the host's settings store under driver-namespaced
//! sections. The main section holds values shared by both hands; each hand
//! has its own section for values that must differ, such as the serial
//! number the device is registered under.
//!
//! [`SettingsStore`] is a TOML-backed store with the same section/key layout,
//! used by the simulated host.

use crate::error::HostError;
use crate::host::{ControllerRole, DriverSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MAIN_SETTINGS_SECTION: &str = "driver_simplecontroller";
pub const LEFT_SETTINGS_SECTION: &str = "driver_simplecontroller_left_controller";
pub const RIGHT_SETTINGS_SECTION: &str = "driver_simplecontroller_right_controller";

pub const KEY_MODEL_NUMBER: &str = "mycontroller_model_number";
pub const KEY_SERIAL_NUMBER: &str = "mycontroller_serial_number";
pub const KEY_POSE_UPDATE_INTERVAL_MS: &str = "pose_update_interval_ms";

pub const DEFAULT_POSE_UPDATE_INTERVAL_MS: u64 = 5;

const SETTINGS_DIR: &str = "simplecontroller";
const SETTINGS_FILE: &str = "settings.toml";

/// Settings shipped with the driver, used when no settings file exists.
pub const DEFAULT_SETTINGS: &str = r#"
[driver_simplecontroller]
mycontroller_model_number = "MyController"
pose_update_interval_ms = 5

[driver_simplecontroller_left_controller]
mycontroller_serial_number = "MYCONTROLLER_L"

[driver_simplecontroller_right_controller]
mycontroller_serial_number = "MYCONTROLLER_R"
"#;

pub fn role_section(role: ControllerRole) -> &'static str {
    match role {
        ControllerRole::LeftHand => LEFT_SETTINGS_SECTION,
        ControllerRole::RightHand => RIGHT_SETTINGS_SECTION,
    }
}

/// Reads a string setting; a missing or unreadable value yields an empty string.
pub fn read_string(settings: &dyn DriverSettings, section: &str, key: &str) -> String {
    match settings.get_string(section, key) {
        Ok(value) => value,
        Err(e) => {
            debug!("Falling back to empty value for {}/{}: {}", section, key, e);
            String::new()
        }
    }
}

/// Interval between two pose submissions of a device.
pub fn pose_update_interval(settings: &dyn DriverSettings) -> Duration {
    let millis = match settings.get_int32(MAIN_SETTINGS_SECTION, KEY_POSE_UPDATE_INTERVAL_MS) {
        Ok(value) if value > 0 => value as u64,
        Ok(value) => {
            warn!(
                "Ignoring non-positive pose update interval {}, using {}ms",
                value, DEFAULT_POSE_UPDATE_INTERVAL_MS
            );
            DEFAULT_POSE_UPDATE_INTERVAL_MS
        }
        Err(_) => DEFAULT_POSE_UPDATE_INTERVAL_MS,
    };
    Duration::from_millis(millis)
}

// Identity of one controller, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerIdentity {
    pub model_number: String,
    pub serial_number: String,
}

impl ControllerIdentity {
    pub fn load(settings: &dyn DriverSettings, role: ControllerRole) -> Self {
        Self {
            model_number: read_string(settings, MAIN_SETTINGS_SECTION, KEY_MODEL_NUMBER),
            serial_number: read_string(settings, role_section(role), KEY_SERIAL_NUMBER),
        }
    }
}

// Settings file errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Settings store with `[section]` tables of `key = value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsStore {
    sections: BTreeMap<String, toml::Table>,
}

impl SettingsStore {
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn with_defaults() -> Self {
        match Self::from_toml(DEFAULT_SETTINGS) {
            Ok(store) => store,
            Err(e) => {
                warn!("Built-in settings are invalid, starting empty: {}", e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_toml(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(store)
    }

    /// Loads the user's settings file if there is one, the built-in defaults
    /// otherwise.
    pub fn load_or_default() -> Result<Self, SettingsError> {
        let path = default_settings_path();
        if path.exists() {
            Self::load(&path)
        } else {
            info!(
                "No settings file at {}, using built-in defaults",
                path.display()
            );
            Ok(Self::with_defaults())
        }
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<toml::Value>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, section: &str, key: &str) -> Option<toml::Value> {
        self.sections.get_mut(section)?.remove(key)
    }

    fn value(&self, section: &str, key: &str) -> Result<&toml::Value, HostError> {
        self.sections
            .get(section)
            .and_then(|table| table.get(key))
            .ok_or_else(|| HostError::SettingNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }
}

impl DriverSettings for SettingsStore {
    fn get_string(&self, section: &str, key: &str) -> Result<String, HostError> {
        match self.value(section, key)? {
            toml::Value::String(value) => Ok(value.clone()),
            _ => Err(HostError::SettingWrongType {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn get_int32(&self, section: &str, key: &str) -> Result<i32, HostError> {
        match self.value(section, key)? {
            toml::Value::Integer(value) => {
                i32::try_from(*value).map_err(|_| HostError::SettingWrongType {
                    section: section.to_string(),
                    key: key.to_string(),
                })
            }
            _ => Err(HostError::SettingWrongType {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(SETTINGS_DIR);
    path.push(SETTINGS_FILE);
    path
}
