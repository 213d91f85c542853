//! Loading `warmpool.json`.

use std::fs;
use std::path::{Path, PathBuf};

use validator::Validate;
use warmpool_types::{ConfigError, WarmpoolConfig};

use crate::error::{AppError, AppResult};

pub const CONFIG_FILE: &str = "warmpool.json";
const DATA_DIR: &str = ".warmpool";

/// Data directory: `WARMPOOL_DATA_DIR`, else `~/.warmpool`. Created if missing.
pub fn get_data_dir() -> AppResult<PathBuf> {
    let data_dir = if let Ok(custom_dir) = std::env::var("WARMPOOL_DATA_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home =
            dirs::home_dir().ok_or_else(|| AppError::DataDir("Cannot get home directory".into()))?;
        home.join(DATA_DIR)
    };

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)?;
    }

    Ok(data_dir)
}

/// Config path: `WARMPOOL_CONFIG`, else `<data dir>/warmpool.json`.
pub fn config_path() -> AppResult<PathBuf> {
    match std::env::var("WARMPOOL_CONFIG") {
        Ok(path) => Ok(PathBuf::from(path)),
        Err(_) => Ok(get_data_dir()?.join(CONFIG_FILE)),
    }
}

pub fn load_config() -> AppResult<WarmpoolConfig> {
    load_config_from(&config_path()?)
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> AppResult<WarmpoolConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        return Ok(WarmpoolConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config: WarmpoolConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::from_json_error(&e))?;

    validate(&config)?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &WarmpoolConfig) -> AppResult<()> {
    validate(config)?;
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Resolve a possibly relative file name against the data directory.
pub fn resolve_in_data_dir(data_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

fn validate(config: &WarmpoolConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "config".to_string());
        ConfigError::ValidationError { field, message: errors.to_string() }
    })
}
