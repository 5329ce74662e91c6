use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::services::device_api::User;

/// Login token and the user it belongs to, persisted between runs.
///
/// Stored as a plain JSON object on disk:
/// ```json
/// { "token": "eyJhbGciOi...", "user": { "id": "3", "name": "Ana", "mail": "ana@example.com" } }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl Session {
    /// Loads the session at `path`; `None` when nobody is logged in.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt session file {}", path.display()))?;
        Ok(Some(session))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)
            .with_context(|| format!("Failed to write session file {}", path.display()))
    }

    /// Removes the stored session. Missing file is not an error.
    pub fn clear(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn session() -> Session {
        Session {
            token: "tok".to_string(),
            user: User {
                id: "3".to_string(),
                name: Some("Ana".to_string()),
                mail: None,
            },
        }
    }

    #[test]
    fn test_save_load_clear() {
        let path = env::temp_dir().join("boia_dashboard_test_session/session.json");
        let _ = Session::clear(&path);

        assert_eq!(Session::load(&path).unwrap(), None);

        session().save(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), Some(session()));

        Session::clear(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), None);
        Session::clear(&path).unwrap();
    }

    #[test]
    fn test_corrupt_file() {
        let path = env::temp_dir().join("boia_dashboard_test_session_corrupt.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(Session::load(&path).is_err());

        std::fs::remove_file(&path).unwrap();
    }
}
