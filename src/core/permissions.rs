// src/core/permissions.rs

//! Per-session group membership and the flattened permission map derived from it.

use crate::config::ConfigurationAdapter;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct PermissionState {
    groups: HashSet<String>,
    permissions: HashMap<String, bool>,
}

/// Holds a session's groups and permissions behind a single mutex.
///
/// Permissions are flattened into one map as groups come and go. Removing a group
/// writes `false` for each of its permissions and does not recompute from the groups
/// that remain, so a permission shared by two groups is lost when either is removed.
pub struct PermissionStore {
    adapter: Arc<dyn ConfigurationAdapter>,
    state: Mutex<PermissionState>,
}

impl std::fmt::Debug for PermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionStore")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl PermissionStore {
    pub fn new(adapter: Arc<dyn ConfigurationAdapter>) -> Self {
        Self {
            adapter,
            state: Mutex::new(PermissionState::default()),
        }
    }

    /// Adds each group not already held and grants its configured permissions.
    /// Later groups overwrite earlier ones for the same permission string.
    pub fn add_groups<S: AsRef<str>>(&self, groups: &[S]) {
        let mut state = self.state.lock();
        for group in groups {
            let group = group.as_ref();
            if !state.groups.insert(group.to_string()) {
                continue;
            }
            for permission in self.adapter.permissions_for(group) {
                state.permissions.insert(permission, true);
            }
        }
    }

    /// Removes each held group and sets each of its configured permissions to `false`.
    pub fn remove_groups<S: AsRef<str>>(&self, groups: &[S]) {
        let mut state = self.state.lock();
        for group in groups {
            let group = group.as_ref();
            if !state.groups.remove(group) {
                continue;
            }
            for permission in self.adapter.permissions_for(group) {
                state.permissions.insert(permission, false);
            }
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.state
            .lock()
            .permissions
            .get(permission)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_permission(&self, permission: &str, value: bool) {
        self.state
            .lock()
            .permissions
            .insert(permission.to_string(), value);
    }

    /// A snapshot of the current groups.
    pub fn groups(&self) -> HashSet<String> {
        self.state.lock().groups.clone()
    }
}
