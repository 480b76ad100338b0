// Fingerprint store interface
// The enrolled gallery behind verification and identification

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::identity::VoiceProfile;

/// Persistence interface for enrolled voice profiles.
///
/// Implementations must allow concurrent reads during identification and
/// verification while serializing writes (enroll/merge/usage increments).
pub trait FingerprintStore: Send + Sync {
    /// Look up a profile by its unique name.
    fn get_by_name(&self, name: &str) -> Result<Option<VoiceProfile>>;

    /// Insert or replace a profile keyed by name. On a name conflict the
    /// stored `id` and `created_at` are preserved, keeping enrollment order
    /// stable across re-enrollment. Returns the profile as actually stored.
    fn upsert(&self, profile: VoiceProfile) -> Result<VoiceProfile>;

    /// All profiles in enrollment order (created_at, then name).
    fn list_all(&self) -> Result<Vec<VoiceProfile>>;

    /// Record a successful match: bump usage_count, set last_used.
    /// Unknown names are a no-op.
    fn increment_usage(&self, name: &str) -> Result<()>;

    /// Delete profiles that are BOTH older than `older_than` AND used fewer
    /// than `usage_below` times. Returns the number removed.
    fn delete_where(&self, older_than: DateTime<Utc>, usage_below: u32) -> Result<usize>;
}
