use anyhow::Result;
use std::path::PathBuf;

const CHATAI_DIR: &str = ".chatai";
const CREDENTIALS_FILE: &str = "credentials.json";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the ChatAI data directory.
const CHATAI_DIR_ENV: &str = "CHATAI_DIR";

/// Resolve the data directory.
/// Priority: CHATAI_DIR env var > ~/.chatai/
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CHATAI_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(CHATAI_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = resolve_data_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn credentials_path() -> Result<PathBuf> {
    Ok(resolve_data_dir()?.join(CREDENTIALS_FILE))
}

pub fn logs_dir() -> Result<PathBuf> {
    let dir = ensure_data_dir()?.join(LOGS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    #[test]
    fn test_default_data_dir() {
        let _lock = env_lock();
        unsafe { std::env::remove_var(CHATAI_DIR_ENV) };
        let dir = resolve_data_dir().unwrap();
        assert!(dir.ends_with(CHATAI_DIR));
    }

    #[test]
    fn test_env_override() {
        let _lock = env_lock();
        unsafe { std::env::set_var(CHATAI_DIR_ENV, "/tmp/test-chatai") };
        let dir = resolve_data_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/test-chatai"));
        assert_eq!(
            credentials_path().unwrap(),
            PathBuf::from("/tmp/test-chatai/credentials.json")
        );
        unsafe { std::env::remove_var(CHATAI_DIR_ENV) };
    }
}
