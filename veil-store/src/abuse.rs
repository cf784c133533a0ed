//! Abuse/lockout controller.
//!
//! An append-only log of failed upstream authentications, queried through two
//! predicates over a sliding 24-hour window: a global one that shuts the
//! whole proxy down, and a per-user one that locks out a single caller.
//! Entries older than the window are pruned on append; pruning never changes
//! either predicate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FailureEntry {
    user_id: i64,
    datetime: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedFailures {
    #[serde(default)]
    failures: Vec<FailureEntry>,
}

pub struct AbuseLog {
    entries: RwLock<Vec<FailureEntry>>,
    state_file: Option<PathBuf>,

    /// Total failures within the window after which all proxying stops.
    global_threshold: u32,

    /// Per-user failures within the window a caller may accumulate before
    /// being blocked (blocked once the count exceeds this).
    max_failed_before_block: u32,
}

fn window() -> Duration {
    Duration::hours(24)
}

impl AbuseLog {
    /// Memory-only log (used by tests).
    pub fn in_memory(global_threshold: u32, max_failed_before_block: u32) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            state_file: None,
            global_threshold,
            max_failed_before_block,
        }
    }

    /// Load the log from `path`; missing or malformed files start fresh.
    pub fn load(path: &Path, global_threshold: u32, max_failed_before_block: u32) -> Self {
        let mut log = Self::in_memory(global_threshold, max_failed_before_block);
        log.state_file = Some(path.to_path_buf());

        if !path.exists() {
            return log;
        }

        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_str::<PersistedFailures>(&data).map_err(|e| e.to_string()))
        {
            Ok(persisted) => {
                let count = persisted.failures.len();
                if let Ok(mut entries) = log.entries.write() {
                    *entries = persisted.failures;
                }
                tracing::info!(failures = count, path = %path.display(), "Abuse log restored");
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Abuse log state file unusable, ignoring");
            }
        }
        log
    }

    /// Record a failed upstream authentication for `user_id`.
    pub fn record_failure(&self, user_id: i64) {
        self.record_failure_at(user_id, Utc::now());
    }

    fn record_failure_at(&self, user_id: i64, datetime: DateTime<Utc>) {
        {
            let Ok(mut entries) = self.entries.write() else {
                tracing::error!("Abuse log lock poisoned, dropping failure record");
                return;
            };
            let horizon = datetime - window();
            entries.retain(|entry| entry.datetime >= horizon);
            entries.push(FailureEntry { user_id, datetime });
        }
        tracing::warn!(user_id = user_id, "Recorded failed upstream authentication");
        self.save();
    }

    /// Whether all proxying is currently blocked.
    pub fn globally_blocked(&self) -> bool {
        self.count_since(Utc::now() - window(), None) >= self.global_threshold as usize
    }

    /// Whether `user_id` is currently blocked.
    pub fn user_blocked(&self, user_id: i64) -> bool {
        self.count_since(Utc::now() - window(), Some(user_id))
            > self.max_failed_before_block as usize
    }

    fn count_since(&self, horizon: DateTime<Utc>, user_id: Option<i64>) -> usize {
        let Ok(entries) = self.entries.read() else {
            // Failing open here would unblock a locked-out caller.
            return usize::MAX;
        };
        entries
            .iter()
            .filter(|entry| entry.datetime >= horizon)
            .filter(|entry| user_id.is_none_or(|id| entry.user_id == id))
            .count()
    }

    fn save(&self) {
        let Some(path) = &self.state_file else {
            return;
        };
        let failures = match self.entries.read() {
            Ok(entries) => entries.clone(),
            Err(_) => return,
        };

        let json = match serde_json::to_string_pretty(&PersistedFailures { failures }) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize abuse log");
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
            tracing::warn!(error = %e, path = %tmp.display(), "Failed to write tmp abuse log");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            tracing::warn!(error = %e, "Failed to rename tmp → abuse log");
        }
    }
}
