mod loader;
mod schema;

pub use loader::{config_from_env, load_config};
pub use loader::{DEFAULT_MODEL_ENV, FAST_KEY_ENV, GEMINI_KEY_ENV, HOSTED_KEY_ENV};
pub use schema::*;

use anyhow::Result;
use std::path::{Path, PathBuf};

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        loader::load_config(path)
    }

    pub fn from_env() -> Result<Self> {
        loader::config_from_env()
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".chatrelay").join("config.yaml"))
    }
}
