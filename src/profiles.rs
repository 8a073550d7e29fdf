//! Connection profile persistence.
//!
//! A profile is a saved name + connection string pair. It lives
//! independently of any live connection: deleting a profile does not touch
//! the registry, and connecting does not require a profile.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    pub connection_string: String,
    pub created_at: DateTime<Utc>,
}

impl ConnectionProfile {
    pub fn new(name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            connection_string: connection_string.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profiles {
    pub profiles: Vec<ConnectionProfile>,
}

impl Profiles {
    /// Add a profile unless one with the same connection string is already
    /// recorded. The dedup key is the connection string, not the name.
    pub fn save_if_absent(&mut self, profile: ConnectionProfile) -> bool {
        if self
            .profiles
            .iter()
            .any(|p| p.connection_string == profile.connection_string)
        {
            return false;
        }
        self.profiles.push(profile);
        true
    }

    /// Delete a profile by id. Returns whether anything was removed.
    pub fn delete_by_id(&mut self, id: &str) -> bool {
        let original_len = self.profiles.len();
        self.profiles.retain(|p| p.id != id);
        self.profiles.len() < original_len
    }
}

/// File-backed profile store under the local data directory.
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<Profiles> {
        if !self.path.exists() {
            return Ok(Profiles::default());
        }

        let content =
            fs::read_to_string(&self.path).context("Failed to read profiles file")?;

        serde_yaml::from_str(&content).context("Failed to parse profiles file")
    }

    fn persist(&self, profiles: &Profiles) -> Result<()> {
        let content =
            serde_yaml::to_string(profiles).context("Failed to serialize profiles")?;

        fs::write(&self.path, content).context("Failed to write profiles file")?;

        Ok(())
    }

    pub fn all(&self) -> Result<Vec<ConnectionProfile>> {
        Ok(self.load()?.profiles)
    }

    /// Persist a profile unless its connection string is already recorded.
    /// Returns whether a new profile was written.
    pub fn save_if_absent(&self, profile: &ConnectionProfile) -> Result<bool> {
        let mut profiles = self.load()?;
        if !profiles.save_if_absent(profile.clone()) {
            return Ok(false);
        }
        self.persist(&profiles)?;
        Ok(true)
    }

    /// Remove a profile by id. Returns whether anything was removed.
    pub fn delete_by_id(&self, id: &str) -> Result<bool> {
        let mut profiles = self.load()?;
        if !profiles.delete_by_id(id) {
            return Ok(false);
        }
        self.persist(&profiles)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_if_absent_dedups_by_connection_string() {
        let mut profiles = Profiles::default();

        assert!(profiles.save_if_absent(ConnectionProfile::new(
            "Local",
            "mongodb://localhost:27017"
        )));
        // Same string under a different name is still a duplicate.
        assert!(!profiles.save_if_absent(ConnectionProfile::new(
            "Local again",
            "mongodb://localhost:27017"
        )));
        assert_eq!(profiles.profiles.len(), 1);
        assert_eq!(profiles.profiles[0].name, "Local");

        // A different string is not.
        assert!(profiles.save_if_absent(ConnectionProfile::new(
            "Other",
            "mongodb://otherhost:27017"
        )));
        assert_eq!(profiles.profiles.len(), 2);
    }

    #[test]
    fn test_delete_by_id() {
        let mut profiles = Profiles::default();
        let profile = ConnectionProfile::new("Local", "mongodb://localhost:27017");
        let id = profile.id.clone();
        profiles.save_if_absent(profile);

        assert!(profiles.delete_by_id(&id));
        assert!(profiles.profiles.is_empty());
        assert!(!profiles.delete_by_id(&id));
    }

    #[test]
    fn test_profile_ids_are_unique() {
        let a = ConnectionProfile::new("A", "mongodb://a");
        let b = ConnectionProfile::new("B", "mongodb://b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_store_round_trip() {
        let path = std::env::temp_dir().join(format!("profiles-{}.yaml", Uuid::new_v4()));
        let store = ProfileStore::new(path.clone());

        let profile = ConnectionProfile::new("Local", "mongodb://localhost:27017");
        assert!(store.save_if_absent(&profile).unwrap());
        assert!(!store.save_if_absent(&profile).unwrap());

        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, profile.id);
        assert_eq!(all[0].connection_string, "mongodb://localhost:27017");

        assert!(store.delete_by_id(&profile.id).unwrap());
        assert!(store.all().unwrap().is_empty());
        assert!(!store.delete_by_id(&profile.id).unwrap());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_store_missing_file_is_empty() {
        let path = std::env::temp_dir().join(format!("profiles-{}.yaml", Uuid::new_v4()));
        let store = ProfileStore::new(path);
        assert!(store.all().unwrap().is_empty());
    }
}
