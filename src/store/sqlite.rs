// SQLite-backed fingerprint store
// Owns the connection, runs migrations, persists fingerprints as JSON

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

use super::FingerprintStore;
use crate::identity::{Fingerprint, VoiceProfile};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Durable gallery backed by a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store at the given path and migrate the schema.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(&db_path).context("Failed to open database")?;
        run_migrations(&conn).context("Failed to run database migrations")?;

        info!("Fingerprint store initialized at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Execute a function with access to the database connection
    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("Failed to lock database connection: {}", e))?;
        f(&conn)
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, i32>(0).map(|n| n > 0),
        )
        .context("Failed to check schema_version table")?;

    if !table_exists {
        return Ok(0);
    }

    conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .context("Failed to read schema version")
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);

        CREATE TABLE IF NOT EXISTS voice_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            fingerprint TEXT NOT NULL,
            sample_count INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            last_used TEXT,
            usage_count INTEGER NOT NULL DEFAULT 0,
            suggested_threshold REAL
        );

        CREATE INDEX IF NOT EXISTS idx_voice_profiles_created
            ON voice_profiles(created_at);
        "#,
    )
    .context("Failed to create voice_profiles schema")?;

    conn.execute("DELETE FROM schema_version", [])
        .context("Failed to clear schema version")?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )
    .context("Failed to write schema version")?;

    Ok(())
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<(VoiceProfile, String)> {
    let fingerprint_json: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    let last_used: Option<String> = row.get(5)?;

    let profile = VoiceProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        // Placeholder; the JSON column is decoded by the caller so serde
        // failures surface as anyhow errors, not rusqlite ones
        fingerprint: Fingerprint::new(0, 0.0),
        sample_count: row.get(3)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_used: last_used.and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        usage_count: row.get(6)?,
        suggested_threshold: row.get(7)?,
    };

    Ok((profile, fingerprint_json))
}

fn decode_profile(pair: (VoiceProfile, String)) -> Result<VoiceProfile> {
    let (mut profile, fingerprint_json) = pair;
    profile.fingerprint = serde_json::from_str(&fingerprint_json)
        .context("Failed to decode stored fingerprint")?;
    Ok(profile)
}

const PROFILE_COLUMNS: &str =
    "id, name, fingerprint, sample_count, created_at, last_used, usage_count, suggested_threshold";

impl FingerprintStore for SqliteStore {
    fn get_by_name(&self, name: &str) -> Result<Option<VoiceProfile>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM voice_profiles WHERE name = ?1"
                ))
                .context("Failed to prepare profile lookup")?;

            let row = stmt
                .query_row(params![name], row_to_profile)
                .optional()
                .context("Failed to query profile by name")?;

            row.map(decode_profile).transpose()
        })
    }

    fn upsert(&self, profile: VoiceProfile) -> Result<VoiceProfile> {
        self.with_connection(|conn| {
            let fingerprint_json = serde_json::to_string(&profile.fingerprint)
                .context("Failed to encode fingerprint")?;

            conn.execute(
                r#"
                INSERT INTO voice_profiles (
                    id, name, fingerprint, sample_count, created_at,
                    last_used, usage_count, suggested_threshold
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(name) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    sample_count = excluded.sample_count,
                    last_used = excluded.last_used,
                    usage_count = excluded.usage_count,
                    suggested_threshold = excluded.suggested_threshold
                "#,
                params![
                    profile.id,
                    profile.name,
                    fingerprint_json,
                    profile.sample_count,
                    profile.created_at.to_rfc3339(),
                    profile.last_used.map(|dt| dt.to_rfc3339()),
                    profile.usage_count,
                    profile.suggested_threshold,
                ],
            )
            .context("Failed to upsert profile")?;

            // The conflict branch keeps the existing id/created_at; hand the
            // caller the row as it actually landed
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM voice_profiles WHERE name = ?1"
                ))
                .context("Failed to prepare upsert read-back")?;
            let row = stmt
                .query_row(params![profile.name], row_to_profile)
                .context("Failed to read back upserted profile")?;
            decode_profile(row)
        })
    }

    fn list_all(&self) -> Result<Vec<VoiceProfile>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM voice_profiles ORDER BY created_at, name"
                ))
                .context("Failed to prepare profile listing")?;

            let rows = stmt
                .query_map([], row_to_profile)
                .context("Failed to list profiles")?;

            let mut profiles = Vec::new();
            for row in rows {
                profiles.push(decode_profile(row.context("Failed to read profile row")?)?);
            }
            Ok(profiles)
        })
    }

    fn increment_usage(&self, name: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE voice_profiles SET usage_count = usage_count + 1, last_used = ?1 WHERE name = ?2",
                params![Utc::now().to_rfc3339(), name],
            )
            .context("Failed to increment usage")?;
            Ok(())
        })
    }

    fn delete_where(&self, older_than: DateTime<Utc>, usage_below: u32) -> Result<usize> {
        self.with_connection(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM voice_profiles WHERE created_at < ?1 AND usage_count < ?2",
                    params![older_than.to_rfc3339(), usage_below],
                )
                .context("Failed to delete stale profiles")?;
            if removed > 0 {
                info!("Removed {} stale profiles from sqlite store", removed);
            }
            Ok(removed)
        })
    }
}
