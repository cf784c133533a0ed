//! File-backed user store.
//!
//! Users live in memory for zero-latency lookups; every write serializes the
//! full set to a JSON state file. The file is written atomically (tmp sibling,
//! then rename) so a crash mid-write never corrupts the stored state. With no
//! state file configured the store is memory-only, which is what the tests
//! use.

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use veil_core::{ProxyError, UserRecord};

const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TOKEN_LEN: usize = 16;
const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const PASSWORD_LEN: usize = 12;

/// The shape serialized to / deserialized from the state file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedUsers {
    #[serde(default)]
    users: Vec<UserRecord>,
}

pub struct UserStore {
    users: DashMap<i64, UserRecord>,
    next_id: AtomicI64,
    state_file: Option<PathBuf>,
    // Serializes create-or-update so one email cannot race into two records.
    write_lock: Mutex<()>,
}

impl UserStore {
    /// Memory-only store (used by tests).
    pub fn in_memory() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicI64::new(1),
            state_file: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Load a store from `path`. A missing file means a fresh start; a
    /// malformed file is ignored with a warning.
    pub fn load(path: &Path) -> Self {
        let store = Self {
            users: DashMap::new(),
            next_id: AtomicI64::new(1),
            state_file: Some(path.to_path_buf()),
            write_lock: Mutex::new(()),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "No user state file found, starting fresh");
            return store;
        }

        let data = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read user state file");
                return store;
            }
        };

        let persisted: PersistedUsers = match serde_json::from_str(&data) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "User state file is malformed, ignoring");
                return store;
            }
        };

        let mut max_id = 0;
        for user in persisted.users {
            max_id = max_id.max(user.id);
            store.users.insert(user.id, user);
        }
        store.next_id.store(max_id + 1, Ordering::SeqCst);

        tracing::info!(
            users = store.users.len(),
            path = %path.display(),
            "User store restored from file"
        );
        store
    }

    pub fn get(&self, id: i64) -> Option<UserRecord> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.users
            .iter()
            .find(|u| u.value().email.eq_ignore_ascii_case(email))
            .map(|u| u.value().clone())
    }

    /// Create the user for `email`, or reset the password of an existing one.
    /// Returns the record and the freshly generated plaintext password (the
    /// only time it is ever available).
    pub fn create_or_update(&self, email: &str) -> Result<(UserRecord, String), ProxyError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ProxyError::Internal("user store lock poisoned".into()))?;

        let password = random_string(PASSWORD_CHARSET, PASSWORD_LEN);
        let password_hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
            .map_err(|e| ProxyError::Internal(format!("password hashing failed: {e}")))?;

        let record = match self.find_by_email(email) {
            Some(mut existing) => {
                existing.password_hash = password_hash;
                self.users.insert(existing.id, existing.clone());
                existing
            }
            None => {
                let record = UserRecord {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    email: email.to_string(),
                    password_hash,
                    app_token: random_string(TOKEN_CHARSET, TOKEN_LEN),
                    auth_token: random_string(TOKEN_CHARSET, TOKEN_LEN),
                    created_at: Some(chrono::Utc::now()),
                };
                self.users.insert(record.id, record.clone());
                record
            }
        };

        self.save();
        Ok((record, password))
    }

    /// Constant-time password check against the stored bcrypt hash.
    pub fn verify_password(user: &UserRecord, password: &str) -> bool {
        bcrypt::verify(password, &user.password_hash).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Save the current user set to the state file. No-op when memory-only;
    /// logs a warning rather than panicking on I/O errors.
    fn save(&self) {
        let Some(path) = &self.state_file else {
            return;
        };

        let mut users: Vec<UserRecord> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        let persisted = PersistedUsers { users };

        let json = match serde_json::to_string_pretty(&persisted) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize user state");
                return;
            }
        };

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!(error = %e, dir = %parent.display(), "Failed to create state dir");
            return;
        }

        let tmp = path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp, &json) {
            tracing::warn!(error = %e, path = %tmp.display(), "Failed to write tmp state file");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            tracing::warn!(error = %e, "Failed to rename tmp → user state file");
            return;
        }

        tracing::debug!(path = %path.display(), "User state saved");
    }
}

fn random_string(charset: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_assigns_sequential_ids_and_credentials() {
        let store = UserStore::in_memory();
        let (alice, _) = store.create_or_update("alice@example.com").unwrap();
        let (bob, _) = store.create_or_update("bob@example.com").unwrap();

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert_eq!(alice.app_token.len(), TOKEN_LEN);
        assert_eq!(alice.auth_token.len(), TOKEN_LEN);
        assert!(alice.app_token.bytes().all(|b| TOKEN_CHARSET.contains(&b)));
        assert_ne!(alice.app_token, alice.auth_token);
    }

    #[test]
    fn password_verifies_against_stored_hash() {
        let store = UserStore::in_memory();
        let (user, password) = store.create_or_update("alice@example.com").unwrap();
        assert!(UserStore::verify_password(&user, &password));
        assert!(!UserStore::verify_password(&user, "wrong"));
    }

    #[test]
    fn update_resets_password_but_keeps_identity_and_tokens() {
        let store = UserStore::in_memory();
        let (before, old_password) = store.create_or_update("alice@example.com").unwrap();
        let (after, new_password) = store.create_or_update("alice@example.com").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(before.id, after.id);
        assert_eq!(before.app_token, after.app_token);
        assert_eq!(before.auth_token, after.auth_token);
        assert!(UserStore::verify_password(&after, &new_password));
        assert!(!UserStore::verify_password(&after, &old_password));
    }

    #[test]
    fn email_lookup_is_case_insensitive() {
        let store = UserStore::in_memory();
        store.create_or_update("Alice@Example.com").unwrap();
        assert!(store.find_by_email("alice@example.com").is_some());
    }

    #[test]
    fn round_trip_through_state_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");

        let id = {
            let store = UserStore::load(&path);
            let (user, _) = store.create_or_update("alice@example.com").unwrap();
            user.id
        };

        let reloaded = UserStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        let user = reloaded.find_by_email("alice@example.com").unwrap();
        assert_eq!(user.id, id);

        // New ids continue after the highest persisted one.
        let (bob, _) = reloaded.create_or_update("bob@example.com").unwrap();
        assert_eq!(bob.id, id + 1);
    }

    #[test]
    fn load_missing_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let store = UserStore::load(&dir.path().join("nonexistent.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn load_malformed_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not valid json {{{{").unwrap();
        let store = UserStore::load(&path);
        assert!(store.is_empty());
    }
}
