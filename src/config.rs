/// Where the app keeps its durable state
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the database location
pub const DB_ENV_VAR: &str = "EIDOS_DB";

const APP_DIR: &str = "eidos";
const DB_FILE: &str = "eidos.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding settings and photos
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve the configuration.
    ///
    /// Precedence: explicit path, then `EIDOS_DB`, then the platform data dir:
    /// - Linux: ~/.local/share/eidos/eidos.db
    /// - macOS: ~/Library/Application Support/eidos/eidos.db
    /// - Windows: %APPDATA%\eidos\eidos.db
    pub fn resolve(explicit_db: Option<&Path>) -> Self {
        Self::from_sources(explicit_db, std::env::var_os(DB_ENV_VAR))
    }

    fn from_sources(explicit_db: Option<&Path>, env_db: Option<OsString>) -> Self {
        let from_env = env_db.filter(|value| !value.is_empty()).map(PathBuf::from);

        let db_path = explicit_db
            .map(Path::to_path_buf)
            .or(from_env)
            .unwrap_or_else(default_db_path);

        Config { db_path }
    }
}

/// Get the path where the database should be stored
fn default_db_path() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    path.push(APP_DIR);
    path.push(DB_FILE);
    path
}
