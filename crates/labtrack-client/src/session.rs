//! Persisted client session
//!
//! The only client state kept across runs is the signed-in user and the
//! user directory, stored as `{version, currentUser, users}`. A file written
//! by an older schema version is reset on load: the directory reverts to the
//! built-in users and nobody is signed in.
//!
//! Credentials are compared in plaintext. [`CredentialCheck`] is the seam
//! for a real identity provider.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Current session file schema version
pub const CURRENT_SESSION_VERSION: u32 = 2;

/// A lab user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub login: String,
    pub password: String,
}

impl User {
    fn new(id: &str, name: &str, position: &str, login: &str, password: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            position: position.to_string(),
            photo: None,
            login: login.to_string(),
            password: password.to_string(),
        }
    }
}

/// Built-in user directory
pub fn default_users() -> Vec<User> {
    vec![
        User::new("1", "Yaroslav Antipin", "Laboratory assistant", "antipin", "lab2024"),
        User::new("2", "Marina Nizienko", "Researcher", "nizienko", "science2024"),
        User::new("3", "Evgeny Koshevoy", "Senior researcher", "koshevoy", "senior2024"),
        User::new("4", "Polina Gavrilova", "Researcher", "gavrilova", "research2024"),
        User::new("5", "Egor Pogorelov", "Head of laboratory", "pogorelov", "director2024"),
    ]
}

/// On-disk session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub current_user: Option<User>,
    #[serde(default = "default_users")]
    pub users: Vec<User>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: CURRENT_SESSION_VERSION,
            current_user: None,
            users: default_users(),
        }
    }
}

impl SessionState {
    /// Bring a loaded state up to the current version
    ///
    /// Returns true if anything changed.
    pub fn migrate(&mut self) -> bool {
        if self.version >= CURRENT_SESSION_VERSION {
            return false;
        }
        tracing::info!(
            "Resetting session from version {} to {}",
            self.version,
            CURRENT_SESSION_VERSION
        );
        *self = Self::default();
        true
    }
}

/// Decides whether a login/password pair names a user
pub trait CredentialCheck {
    fn check(&self, login: &str, password: &str) -> Option<User>;
}

/// Plaintext comparison against a user list
pub struct DirectoryCheck<'a> {
    users: &'a [User],
}

impl<'a> DirectoryCheck<'a> {
    pub fn new(users: &'a [User]) -> Self {
        Self { users }
    }
}

impl CredentialCheck for DirectoryCheck<'_> {
    fn check(&self, login: &str, password: &str) -> Option<User> {
        let (login, password) = (login.trim(), password.trim());
        self.users
            .iter()
            .find(|user| user.login == login && user.password == password)
            .cloned()
    }
}

/// Session state plus where it is persisted
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    state: SessionState,
}

fn session_error(path: &Path, err: impl std::fmt::Display) -> SyncError {
    SyncError::Session(format!("{}: {}", path.display(), err))
}

impl SessionStore {
    /// A session that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: SessionState::default(),
        }
    }

    /// Load the session file at `path`, migrating it if needed
    ///
    /// A missing or empty file is a fresh session.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(session_error(&path, err)),
        };

        let mut state = if raw.trim().is_empty() {
            SessionState::default()
        } else {
            serde_json::from_str(&raw).map_err(|e| session_error(&path, e))?
        };

        let store_needs_save = state.migrate();
        let store = Self {
            path: Some(path),
            state,
        };
        if store_needs_save {
            store.save()?;
        }
        Ok(store)
    }

    /// Load the session from the platform data directory
    pub fn open_default() -> Result<Self, SyncError> {
        Self::open(default_session_path()?)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_user(&self) -> Option<&User> {
        self.state.current_user.as_ref()
    }

    pub fn users(&self) -> &[User] {
        &self.state.users
    }

    /// Sign in against the stored user list
    ///
    /// Returns `None` when the credentials match nobody; the session is left
    /// unchanged in that case.
    pub fn login(&mut self, login: &str, password: &str) -> Result<Option<User>, SyncError> {
        let user = DirectoryCheck::new(&self.state.users).check(login, password);
        self.sign_in(user)
    }

    /// Sign in through another credential check
    pub fn login_with(
        &mut self,
        check: &impl CredentialCheck,
        login: &str,
        password: &str,
    ) -> Result<Option<User>, SyncError> {
        let user = check.check(login, password);
        self.sign_in(user)
    }

    fn sign_in(&mut self, user: Option<User>) -> Result<Option<User>, SyncError> {
        let Some(user) = user else {
            tracing::info!("Rejected login attempt");
            return Ok(None);
        };
        tracing::info!("User {} signed in", user.login);
        self.state.current_user = Some(user.clone());
        self.save()?;
        Ok(Some(user))
    }

    pub fn logout(&mut self) -> Result<(), SyncError> {
        if let Some(user) = self.state.current_user.take() {
            tracing::info!("User {} signed out", user.login);
        }
        self.save()
    }

    /// Write the session file (temp file + rename)
    pub fn save(&self) -> Result<(), SyncError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| session_error(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| session_error(path, e))?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| session_error(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| session_error(path, e))
    }
}

/// `<data dir>/labtrack/session.json`
pub fn default_session_path() -> Result<PathBuf, SyncError> {
    dirs::data_dir()
        .map(|dir| dir.join("labtrack").join("session.json"))
        .ok_or_else(|| SyncError::Session("No data directory on this platform".to_string()))
}
