// In-memory fingerprint store
// DashMap keyed by name: concurrent reads, per-entry serialized writes

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};

use super::FingerprintStore;
use crate::identity::VoiceProfile;

/// In-memory gallery for a single processing run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: DashMap<String, VoiceProfile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl FingerprintStore for MemoryStore {
    fn get_by_name(&self, name: &str) -> Result<Option<VoiceProfile>> {
        Ok(self.profiles.get(name).map(|entry| entry.value().clone()))
    }

    fn upsert(&self, mut profile: VoiceProfile) -> Result<VoiceProfile> {
        debug!(
            "Upserting profile '{}' ({} samples)",
            profile.name, profile.sample_count
        );
        // Re-enrollment keeps the original identity and enrollment order
        let prior = self
            .profiles
            .get(&profile.name)
            .map(|entry| (entry.id.clone(), entry.created_at));
        if let Some((id, created_at)) = prior {
            profile.id = id;
            profile.created_at = created_at;
        }
        self.profiles.insert(profile.name.clone(), profile.clone());
        Ok(profile)
    }

    fn list_all(&self) -> Result<Vec<VoiceProfile>> {
        let mut profiles: Vec<VoiceProfile> = self
            .profiles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        // Enrollment order; name breaks created_at collisions deterministically
        profiles.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(profiles)
    }

    fn increment_usage(&self, name: &str) -> Result<()> {
        if let Some(mut entry) = self.profiles.get_mut(name) {
            let profile = entry.value_mut();
            profile.usage_count += 1;
            profile.last_used = Some(Utc::now());
        }
        Ok(())
    }

    fn delete_where(&self, older_than: DateTime<Utc>, usage_below: u32) -> Result<usize> {
        let before = self.profiles.len();
        self.profiles
            .retain(|_, profile| !(profile.created_at < older_than && profile.usage_count < usage_below));
        let removed = before - self.profiles.len();
        if removed > 0 {
            info!("Removed {} stale profiles from memory store", removed);
        }
        Ok(removed)
    }
}
