//! Configuration loading and root folder resolution
//!
//! Root folder resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`REEL_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file never aborts startup: compiled
//! defaults apply and the caller logs the problem.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "REEL_ROOT_FOLDER";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "reel.db";

/// Compiled-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub database_file: String,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Contents of `reel/config.toml`
///
/// Every key is optional; absent keys fall back to [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub database_file: Option<String>,
    pub log_level: Option<String>,
    /// Import strategy used when the caller does not choose one
    pub default_strategy: Option<String>,
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load the platform config file, degrading to defaults on any failure
    ///
    /// Returns the problem with the file alongside the defaults so the caller
    /// can report it once logging is up.
    pub fn load_or_default() -> (Self, Option<String>) {
        Self::load_or_default_from(config_file_path().as_deref())
    }

    /// [`TomlConfig::load_or_default`] for an explicit (possibly absent) file
    pub fn load_or_default_from(path: Option<&Path>) -> (Self, Option<String>) {
        let Some(path) = path else {
            return (Self::default(), None);
        };

        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default(),
                Some(format!("Ignoring config file {}: {}", path.display(), e)),
            ),
        }
    }

    /// Configured log level or the compiled default
    pub fn log_level(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().log_level)
    }
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml: TomlConfig,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml: TomlConfig) -> Self {
        Self { cli_arg, toml }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml.root_folder {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and derives file locations inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            debug!("Created root folder {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self, toml: &TomlConfig) -> PathBuf {
        let file = toml
            .database_file
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE_FILE);
        self.root_folder.join(file)
    }
}

/// Platform config file location, if one exists
///
/// Linux checks `~/.config/reel/config.toml` then `/etc/reel/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("reel").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/reel/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/reel
        dirs::data_local_dir()
            .map(|d| d.join("reel"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/reel"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/reel
        dirs::data_dir()
            .map(|d| d.join("reel"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/reel"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\reel
        dirs::data_local_dir()
            .map(|d| d.join("reel"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\reel"))
    } else {
        PathBuf::from("./reel_data")
    }
}
