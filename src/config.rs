use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_DIR_NAME: &str = "rephrase-anywhere";

pub const MAX_CREATIVITY_LEVEL: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_shortcut")]
    pub shortcut: String,
    #[serde(
        rename = "user_system_prompt",
        alias = "user_instructions",
        default = "default_user_instructions"
    )]
    pub user_instructions: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_creativity_level")]
    pub creativity_level: u8,
}

fn default_enabled() -> bool {
    true
}

fn default_shortcut() -> String {
    "ctrl+shift+r".to_string()
}

fn default_user_instructions() -> String {
    "Improve this text by fixing grammer, spelling and making it more professional and clear while keeping the original meaning".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

fn default_creativity_level() -> u8 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            shortcut: default_shortcut(),
            user_instructions: default_user_instructions(),
            api_key: String::new(),
            model: default_model(),
            creativity_level: default_creativity_level(),
        }
    }
}

impl AppConfig {
    /// Sampling temperature for the rewrite request, `creativity_level / 10`.
    pub fn temperature(&self) -> f32 {
        f32::from(self.creativity_level.min(MAX_CREATIVITY_LEVEL)) / 10.0
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no config location available")]
    NoLocation,
}

/// Config shared between the settings controller and pipeline runs.
pub type SharedConfig = Arc<RwLock<AppConfig>>;

pub fn shared(config: AppConfig) -> SharedConfig {
    Arc::new(RwLock::new(config))
}

/// Copy of the current config. A poisoned lock still holds a complete
/// value, so it is read through.
pub fn snapshot(config: &SharedConfig) -> AppConfig {
    match config.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn replace(config: &SharedConfig, value: AppConfig) {
    match config.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Reads and writes the config file.
///
/// Candidate paths are tried in order on load; the first one is the
/// primary location where defaults get written when nothing exists yet.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    candidates: Vec<PathBuf>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(candidates: Vec<PathBuf>) -> Result<Self, ConfigError> {
        let path = candidates.first().cloned().ok_or(ConfigError::NoLocation)?;
        Ok(Self { candidates, path })
    }

    /// Next to the executable first, then the per-user config directory.
    pub fn default_locations() -> Result<Self, ConfigError> {
        let mut candidates = Vec::new();
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(dir.join(CONFIG_FILE_NAME));
        }
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        }
        Self::new(candidates)
    }

    /// Path the store currently saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the first existing candidate.
    ///
    /// A missing or unreadable config falls back to the defaults, which
    /// are persisted right away so the file exists for the next start.
    pub fn load(&mut self) -> AppConfig {
        let existing = self.candidates.iter().find(|path| path.exists()).cloned();

        let Some(path) = existing else {
            log::info!(
                "No config found, writing defaults to {}",
                self.candidates[0].display()
            );
            self.path = self.candidates[0].clone();
            return self.persist_defaults();
        };

        self.path = path;
        match read_config(&self.path) {
            Ok(config) => {
                log::info!("Loaded config from {}", self.path.display());
                config
            }
            Err(e) => {
                log::warn!("{}, falling back to defaults", e);
                self.persist_defaults()
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let contents = serde_json::to_string_pretty(config).map_err(|source| {
            ConfigError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        fs::write(&self.path, contents).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn persist_defaults(&self) -> AppConfig {
        let config = AppConfig::default();
        if let Err(e) = self.save(&config) {
            log::error!("Failed to persist default config: {}", e);
        }
        config
    }
}

/// Parses one config file without any fallback.
pub fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
