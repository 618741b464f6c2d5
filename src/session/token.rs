//! Persistent storage for the bearer token and the display fields that
//! accompany it. This is the only state that survives a restart.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
  pub token: String,
  pub nombre: Option<String>,
  pub rol: Option<String>,
}

/// Token storage shared by the API client, the session cache and the
/// notification listener.
#[derive(Debug, Clone)]
pub struct TokenStore {
  path: Option<PathBuf>,
  state: Arc<RwLock<Option<StoredSession>>>,
}

impl TokenStore {
  /// Open the session file in `dir`, loading any stored token.
  pub fn open(dir: &Path) -> Result<Self> {
    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create data directory {}: {}", dir.display(), e))?;

    let path = dir.join(SESSION_FILE);
    let state = match std::fs::read_to_string(&path) {
      Ok(contents) => match serde_json::from_str::<StoredSession>(&contents) {
        Ok(session) if !session.token.trim().is_empty() => Some(session),
        Ok(_) => None,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
          None
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
      Err(e) => return Err(eyre!("Failed to read session file {}: {}", path.display(), e)),
    };

    Ok(Self {
      path: Some(path),
      state: Arc::new(RwLock::new(state)),
    })
  }

  /// Store that never touches disk.
  #[cfg(test)]
  pub fn in_memory() -> Self {
    Self {
      path: None,
      state: Arc::new(RwLock::new(None)),
    }
  }

  pub fn token(&self) -> Option<String> {
    self.session().map(|s| s.token)
  }

  pub fn session(&self) -> Option<StoredSession> {
    self
      .state
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Save a new session. Blank tokens are rejected.
  pub fn set(&self, session: StoredSession) -> Result<()> {
    if session.token.trim().is_empty() {
      return Err(eyre!("Refusing to store an empty token"));
    }

    if let Some(path) = &self.path {
      let contents = serde_json::to_vec_pretty(&session)
        .map_err(|e| eyre!("Failed to serialize session: {}", e))?;
      write_private(path, &contents)
        .map_err(|e| eyre!("Failed to write session file {}: {}", path.display(), e))?;
    }

    *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    debug!("session stored");
    Ok(())
  }

  /// Forget token, name and role.
  pub fn clear(&self) {
    *self.state.write().unwrap_or_else(PoisonError::into_inner) = None;

    if let Some(path) = &self.path {
      match std::fs::remove_file(path) {
        Ok(()) => debug!("session file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove session file"),
      }
    }
  }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
  use std::io::Write;
  use std::os::unix::fs::OpenOptionsExt;

  let mut file = std::fs::OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .mode(0o600)
    .open(path)?;
  file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
  std::fs::write(path, contents)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("almacen-test-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
  }

  fn session(token: &str) -> StoredSession {
    StoredSession {
      token: token.to_string(),
      nombre: Some("Ana".to_string()),
      rol: Some("RRHH".to_string()),
    }
  }

  #[test]
  fn test_in_memory_roundtrip() {
    let store = TokenStore::in_memory();
    assert!(store.token().is_none());

    store.set(session("abc")).unwrap();
    assert_eq!(store.token().as_deref(), Some("abc"));

    store.clear();
    assert!(store.session().is_none());
  }

  #[test]
  fn test_blank_token_rejected() {
    let store = TokenStore::in_memory();
    assert!(store.set(session("   ")).is_err());
    assert!(store.token().is_none());
  }

  #[test]
  fn test_clones_share_state() {
    let store = TokenStore::in_memory();
    let other = store.clone();
    store.set(session("shared")).unwrap();
    assert_eq!(other.token().as_deref(), Some("shared"));
    other.clear();
    assert!(store.token().is_none());
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = scratch_dir("persist");
    let store = TokenStore::open(&dir).unwrap();
    store.set(session("persisted")).unwrap();

    let reopened = TokenStore::open(&dir).unwrap();
    assert_eq!(reopened.session(), Some(session("persisted")));

    reopened.clear();
    let after_clear = TokenStore::open(&dir).unwrap();
    assert!(after_clear.token().is_none());

    let _ = std::fs::remove_dir_all(&dir);
  }
}
