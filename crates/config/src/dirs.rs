//! Cross-platform directory resolution for Taskmesh
//!
//! Desktop mode: Uses platform-appropriate directories via `directories` crate
//! Server mode: Uses legacy ~/.taskmesh for backwards compatibility

use eyre::{eyre, Result};
use std::path::PathBuf;

/// Application directories for Taskmesh
#[derive(Debug, Clone)]
pub struct AppDirs {
    /// Configuration directory
    pub config: PathBuf,
    /// Data directory
    pub data: PathBuf,
    /// Logs directory
    pub logs: PathBuf,
}

/// Resolve platform-appropriate directories for the application
///
/// # Platform-specific paths
///
/// ## Desktop mode (no `use-home-dir` feature)
/// - **macOS:** `~/Library/Application Support/Taskmesh`
/// - **Windows:** `C:\Users\{user}\AppData\Roaming\Taskmesh`
/// - **Linux:** `~/.local/share/Taskmesh`
///
/// ## Server mode (with `use-home-dir` feature)
/// - **All platforms:** `~/.taskmesh` (backwards compatible)
///
/// # Arguments
/// * `app_name` - Application name (e.g., "Taskmesh")
///
/// # Errors
/// Returns error if directories cannot be determined
#[cfg(not(feature = "use-home-dir"))]
pub fn resolve_app_dirs(app_name: &str) -> Result<AppDirs> {
    use directories::ProjectDirs;

    let proj = ProjectDirs::from("network", "taskmesh", app_name)
        .ok_or_else(|| eyre!("Cannot resolve platform directories"))?;

    let data_dir = proj.data_dir().to_path_buf();

    Ok(AppDirs {
        config: proj.config_dir().to_path_buf(),
        data: data_dir.clone(),
        logs: data_dir.join("logs"),
    })
}

/// Resolve directories using legacy ~/.taskmesh path
///
/// This mode is for server deployments that expect the traditional
/// home directory structure.
#[cfg(feature = "use-home-dir")]
pub fn resolve_app_dirs(_app_name: &str) -> Result<AppDirs> {
    let home = dirs::home_dir().ok_or_else(|| eyre!("Cannot determine home directory"))?;

    let base = home.join(".taskmesh");

    Ok(AppDirs {
        config: base.clone(),
        data: base.clone(),
        logs: base.join("logs"),
    })
}
