//! User policy: which microphone should be default and which never should.
//!
//! The policy is loaded once at startup, mutated only by user actions
//! (each followed by a save and a re-evaluation) and read as an immutable
//! snapshot by every evaluation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::device::eq_ignore_case;

/// Block rule restored whenever the name list normalizes to empty.
pub const DEFAULT_BLOCKED_NAME: &str = "OnePlus Buds Pro 3";
pub const DEFAULT_PREFERRED_NAME: &str = "Realtek";
pub const DEFAULT_DEBOUNCE_MS: i64 = 700;
pub const MIN_DEBOUNCE_MS: i64 = 100;
pub const MAX_DEBOUNCE_MS: i64 = 10_000;

/// Declarative enforcement policy.
///
/// Serialized with the key names of the `micguard.json` file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Exact endpoint ID to prefer
    #[serde(rename = "PreferredMicDeviceId")]
    pub preferred_device_id: Option<String>,

    /// Case-insensitive substrings of name or ID that block a device
    #[serde(rename = "BlockedMicNameContains", deserialize_with = "null_as_default")]
    pub blocked_name_contains: Vec<String>,

    /// Endpoint IDs that are never selected and are displaced when default
    #[serde(rename = "BlockedMicDeviceIds", deserialize_with = "null_as_default")]
    pub blocked_device_ids: Vec<String>,

    /// Case-insensitive name fallback when the preferred ID is absent
    #[serde(rename = "PreferredMicNameContains", deserialize_with = "null_as_default")]
    pub preferred_name_contains: String,

    #[serde(rename = "GuardEnabled")]
    pub enabled: bool,

    #[serde(rename = "EventDebounceMs")]
    pub debounce_ms: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            preferred_device_id: None,
            blocked_name_contains: vec![DEFAULT_BLOCKED_NAME.to_string()],
            blocked_device_ids: Vec::new(),
            preferred_name_contains: DEFAULT_PREFERRED_NAME.to_string(),
            enabled: true,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Trim, drop blanks and dedup case-insensitively, keeping the first spelling.
fn clean_list(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_lowercase()))
        .map(str::to_string)
        .collect()
}

impl Policy {
    /// Trim, dedup and clamp every field.
    pub fn normalize(&mut self) {
        self.blocked_name_contains = clean_list(&self.blocked_name_contains);
        if self.blocked_name_contains.is_empty() {
            self.blocked_name_contains = vec![DEFAULT_BLOCKED_NAME.to_string()];
        }

        self.blocked_device_ids = clean_list(&self.blocked_device_ids);

        self.preferred_device_id = self
            .preferred_device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        self.preferred_name_contains = self.preferred_name_contains.trim().to_string();
        self.debounce_ms = self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
    }

    /// Normalized copy.
    pub fn normalized(&self) -> Self {
        let mut policy = self.clone();
        policy.normalize();
        policy
    }

    /// Quiet period before a notification-driven evaluation.
    pub fn debounce(&self) -> Duration {
        let ms = self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Duration::from_millis(ms as u64)
    }

    pub fn is_device_id_blocked(&self, device_id: &str) -> bool {
        self.blocked_device_ids
            .iter()
            .any(|id| eq_ignore_case(id, device_id))
    }

    pub fn is_preferred_id(&self, device_id: &str) -> bool {
        self.preferred_device_id
            .as_deref()
            .is_some_and(|id| eq_ignore_case(id, device_id))
    }

    /// Make a device the preferred one after the user picked it manually.
    ///
    /// The device's name becomes the name fallback and its ID is unblocked.
    pub fn prefer_device(&mut self, device_id: &str, friendly_name: &str) {
        self.preferred_device_id = Some(device_id.to_string());
        self.preferred_name_contains = friendly_name.to_string();
        self.blocked_device_ids
            .retain(|id| !eq_ignore_case(id, device_id));
    }

    /// Add or remove a device ID from the block list.
    ///
    /// Blocking the preferred device clears the preference.
    pub fn set_device_blocked(&mut self, device_id: &str, blocked: bool) {
        if blocked {
            if !self.is_device_id_blocked(device_id) {
                self.blocked_device_ids.push(device_id.to_string());
            }
            if self.is_preferred_id(device_id) {
                self.preferred_device_id = None;
            }
        } else {
            self.blocked_device_ids
                .retain(|id| !eq_ignore_case(id, device_id));
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Process-lifetime policy shared by the guard and the user-facing controls.
///
/// Only user actions call `update`; evaluations take a `snapshot`.
#[derive(Debug, Clone, Default)]
pub struct SharedPolicy(Arc<RwLock<Policy>>);

impl SharedPolicy {
    pub fn new(policy: Policy) -> Self {
        Self(Arc::new(RwLock::new(policy)))
    }

    pub fn snapshot(&self) -> Policy {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Apply a user mutation. The stored policy is normalized afterwards,
    /// so evaluations see exactly what `PolicyStore::save` writes.
    pub fn update<R>(&self, f: impl FnOnce(&mut Policy) -> R) -> R {
        let mut policy = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut policy);
        policy.normalize();
        result
    }

    pub fn debounce(&self) -> Duration {
        self.0.read().unwrap_or_else(PoisonError::into_inner).debounce()
    }
}

/// Policy store error types.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to access policy file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy file: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON file persistence for the policy.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    path: PathBuf,
}

impl PolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the policy, creating or repairing the file with defaults.
    ///
    /// Never fails: a malformed file is replaced with the default policy.
    pub fn load_or_create(&self) -> Policy {
        if !self.path.exists() {
            info!(path = %self.path.display(), "creating default policy file");
            return self.reset_to_default();
        }

        match self.read() {
            Ok(mut policy) => {
                policy.normalize();
                policy
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "policy unreadable, restoring defaults");
                self.reset_to_default()
            }
        }
    }

    /// Normalize and persist the policy.
    pub fn save(&self, policy: &Policy) -> Result<(), PolicyError> {
        let normalized = policy.normalized();

        if let Some(directory) = self.path.parent() {
            if !directory.as_os_str().is_empty() {
                std::fs::create_dir_all(directory).map_err(|source| PolicyError::Io {
                    path: directory.to_path_buf(),
                    source,
                })?;
            }
        }

        let json = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(&self.path, json).map_err(|source| PolicyError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn read(&self) -> Result<Policy, PolicyError> {
        let json = std::fs::read_to_string(&self.path).map_err(|source| PolicyError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn reset_to_default(&self) -> Policy {
        let policy = Policy::default();
        if let Err(e) = self.save(&policy) {
            warn!(error = %e, "failed to persist default policy");
        }
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn messy_policy() -> Policy {
        Policy {
            preferred_device_id: Some("   ".to_string()),
            blocked_name_contains: vec![
                " OnePlus Buds Pro 3 ".to_string(),
                "".to_string(),
                "oneplus buds pro 3".to_string(),
                "Headset".to_string(),
            ],
            blocked_device_ids: vec!["{A}".to_string(), "{a}".to_string(), "  ".to_string()],
            preferred_name_contains: "  Realtek  ".to_string(),
            enabled: true,
            debounce_ms: 5,
        }
    }

    #[test]
    fn test_normalize_trims_dedups_and_clamps() {
        let policy = messy_policy().normalized();

        assert_eq!(policy.preferred_device_id, None);
        assert_eq!(policy.blocked_name_contains, ["OnePlus Buds Pro 3", "Headset"]);
        assert_eq!(policy.blocked_device_ids, ["{A}"]);
        assert_eq!(policy.preferred_name_contains, "Realtek");
        assert_eq!(policy.debounce_ms, MIN_DEBOUNCE_MS);

        let mut slow = Policy {
            debounce_ms: 60_000,
            ..Policy::default()
        };
        slow.normalize();
        assert_eq!(slow.debounce_ms, MAX_DEBOUNCE_MS);
    }

    #[test]
    fn test_normalize_restores_default_block_rule() {
        let mut policy = Policy {
            blocked_name_contains: vec![" ".to_string()],
            ..Policy::default()
        };
        policy.normalize();
        assert_eq!(policy.blocked_name_contains, [DEFAULT_BLOCKED_NAME]);
    }

    #[test]
    fn test_save_and_reload_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::new(dir.path().join("nested").join("micguard.json"));

        store.save(&messy_policy()).unwrap();
        let first = store.load_or_create();
        store.save(&first).unwrap();
        let first_bytes = std::fs::read(store.path()).unwrap();

        let second = store.load_or_create();
        store.save(&second).unwrap();
        let second_bytes = std::fs::read(store.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::new(dir.path().join("micguard.json"));

        let policy = store.load_or_create();
        assert_eq!(policy, Policy::default());
        assert!(store.path().exists());

        let json = std::fs::read_to_string(store.path()).unwrap();
        assert!(json.contains("\"BlockedMicNameContains\""));
        assert!(json.contains("\"EventDebounceMs\": 700"));
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::new(dir.path().join("micguard.json"));
        std::fs::write(store.path(), "{ not json").unwrap();

        let policy = store.load_or_create();
        assert_eq!(policy, Policy::default());

        let repaired = std::fs::read_to_string(store.path()).unwrap();
        assert!(serde_json::from_str::<Policy>(&repaired).is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_keys() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::new(dir.path().join("micguard.json"));
        std::fs::write(
            store.path(),
            r#"{ "PreferredMicDeviceId": "{B}", "BlockedMicNameContains": null, "GuardEnabled": false }"#,
        )
        .unwrap();

        let policy = store.load_or_create();
        assert_eq!(policy.preferred_device_id.as_deref(), Some("{B}"));
        assert_eq!(policy.blocked_name_contains, [DEFAULT_BLOCKED_NAME]);
        assert_eq!(policy.preferred_name_contains, DEFAULT_PREFERRED_NAME);
        assert!(!policy.enabled);
        assert_eq!(policy.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn test_prefer_device_unblocks_it() {
        let mut policy = Policy::default();
        policy.set_device_blocked("{B}", true);
        policy.prefer_device("{b}", "USB Mic");

        assert_eq!(policy.preferred_device_id.as_deref(), Some("{b}"));
        assert_eq!(policy.preferred_name_contains, "USB Mic");
        assert!(!policy.is_device_id_blocked("{B}"));
    }

    #[test]
    fn test_blocking_preferred_device_clears_preference() {
        let mut policy = Policy::default();
        policy.prefer_device("{B}", "USB Mic");
        policy.set_device_blocked("{b}", true);
        policy.set_device_blocked("{B}", true);

        assert_eq!(policy.preferred_device_id, None);
        assert_eq!(policy.blocked_device_ids, ["{b}"]);

        policy.set_device_blocked("{B}", false);
        assert!(policy.blocked_device_ids.is_empty());
    }

    #[test]
    fn test_shared_policy_snapshot_is_detached() {
        let shared = SharedPolicy::new(Policy::default());
        let before = shared.snapshot();
        shared.update(|p| p.set_enabled(false));

        assert!(before.enabled);
        assert!(!shared.snapshot().enabled);
        assert_eq!(shared.debounce(), Duration::from_millis(700));
    }

    #[test]
    fn test_shared_update_matches_what_is_saved() {
        let dir = tempdir().unwrap();
        let store = PolicyStore::new(dir.path().join("micguard.json"));
        let shared = SharedPolicy::new(Policy::default());

        shared.update(|p| {
            p.prefer_device("  {C}  ", " USB Mic ");
            p.set_device_blocked(" {D} ", true);
            p.set_device_blocked("{d}", true);
        });
        let in_memory = shared.snapshot();
        assert_eq!(in_memory.preferred_device_id.as_deref(), Some("{C}"));
        assert_eq!(in_memory.preferred_name_contains, "USB Mic");
        assert_eq!(in_memory.blocked_device_ids, ["{D}"]);

        store.save(&in_memory).unwrap();
        assert_eq!(store.load_or_create(), in_memory);
    }
}
