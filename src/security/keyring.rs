//! API key storage
//!
//! Lookup order: `OPENROUTER_API_KEY`, the OS keyring, then a 0600 file in
//! the config directory for systems without a usable keyring.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const SERVICE_NAME: &str = "tutor-agent";
const API_KEY_USERNAME: &str = "openrouter-api-key";
const API_KEY_FILE: &str = "api_key.txt";

/// Get the path for the fallback API key file
fn api_key_file_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "tutor-agent", "tutor-agent")
        .context("Failed to get project directories")?;
    let dir = base.config_dir();
    fs::create_dir_all(dir).context("Failed to create config directory")?;
    Ok(dir.join(API_KEY_FILE))
}

/// Set API key - tries keyring first, falls back to file
pub fn set_api_key(key: &str) -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if entry.set_password(key).is_ok() {
            // Backup copy in case keyring retrieval fails later
            let _ = save_to_file(&api_key_file_path()?, key);
            return Ok(());
        }
    }

    save_to_file(&api_key_file_path()?, key)?;
    println!("Note: Using file-based storage (keyring unavailable)");
    Ok(())
}

fn save_to_file(path: &Path, key: &str) -> Result<()> {
    fs::write(path, key).context("Failed to write API key file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }

    Ok(())
}

fn read_from_file(path: &Path) -> Result<String> {
    let key = fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read API key. Set {} or run 'tutor-agent config --set-api-key YOUR_KEY' first.",
            API_KEY_ENV
        )
    })?;
    Ok(key.trim().to_string())
}

/// Get API key from the environment, keyring or file, in that order
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        if let Ok(key) = entry.get_password() {
            return Ok(key);
        }
    }

    read_from_file(&api_key_file_path()?)
}

/// Delete API key from both keyring and file
pub fn delete_api_key() -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, API_KEY_USERNAME) {
        let _ = entry.delete_credential();
    }

    let path = api_key_file_path()?;
    if path.exists() {
        fs::remove_file(&path).context("Failed to delete API key file")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_fallback_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(API_KEY_FILE);
        save_to_file(&path, "sk-or-test\n").unwrap();
        assert_eq!(read_from_file(&path).unwrap(), "sk-or-test");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_fallback_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join(API_KEY_FILE);
        save_to_file(&path, "k").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_file_mentions_env_var() {
        let dir = tempdir().unwrap();
        let err = read_from_file(&dir.path().join("nope")).unwrap_err();
        assert!(format!("{:#}", err).contains(API_KEY_ENV));
    }
}
