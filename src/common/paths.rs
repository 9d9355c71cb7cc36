//! Configuration and fixture paths

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "petfriends-check";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/petfriends-check/`
/// - macOS: `~/Library/Application Support/petfriends-check/`
/// - Windows: `%APPDATA%\petfriends-check\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve a fixture path against the directory of the suite that names it
///
/// Absolute paths are kept as they are. The process working directory is
/// never consulted.
pub fn resolve_fixture(suite_dir: &Path, fixture: &Path) -> PathBuf {
    if fixture.is_relative() {
        suite_dir.join(fixture)
    } else {
        fixture.to_path_buf()
    }
}

/// Directory a suite file lives in
pub fn suite_dir(suite_file: &Path) -> PathBuf {
    match suite_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
