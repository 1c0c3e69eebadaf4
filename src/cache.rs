//! SQLite-backed result cache and identity table.
//!
//! Keyed by (user, window, input fingerprint). A fresh cached result is
//! returned verbatim; otherwise the engine recomputes and overwrites in a
//! transaction — SQLite is the "equivalent transactional store", so two
//! concurrent runs for the same key last-writer-win with equivalent
//! outputs. The identity table seeds the resolver on the next run; rows
//! are extended with newly learned identifiers but never contradicted.
//!
//! Every cache failure is recoverable: the engine degrades to an uncached
//! run with a `cache_unavailable` warning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CacheError;
use crate::types::{PersonKey, RankedResult};

/// A persisted identity row, used to seed the resolver.
#[derive(Debug, Clone)]
pub struct IdentitySeed {
    pub upstream_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open (or create) the cache at an explicit path and apply the schema.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(CacheError::CreateDir)?;
            }
        }
        let conn = Connection::open(&path)?;
        // WAL keeps concurrent readers cheap while a run writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory cache, for tests and callers without a durable path.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Execute a closure within a transaction. Commits on Ok, rolls back
    /// on Err.
    fn with_transaction<F, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(&Connection) -> Result<T, CacheError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        match f(&self.conn) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    /// Fetch a cached result, if one matches the key and is younger than
    /// `max_age_hours` at `now`.
    pub fn lookup(
        &self,
        user_id: &str,
        window_days: u32,
        fingerprint: &str,
        max_age_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<RankedResult>, CacheError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT generated_at, result_json FROM ranked_results
                 WHERE user_id = ?1 AND window_days = ?2 AND input_fingerprint = ?3",
                params![user_id, window_days, fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((generated_at, result_json)) = row else {
            return Ok(None);
        };
        let Ok(generated_at) = DateTime::parse_from_rfc3339(&generated_at) else {
            // An unreadable timestamp means a stale or corrupt row; treat
            // as a miss, the overwrite will repair it.
            return Ok(None);
        };
        let age_hours = (now - generated_at.with_timezone(&Utc)).num_hours();
        if age_hours >= max_age_hours {
            return Ok(None);
        }
        let result = serde_json::from_str(&result_json)?;
        Ok(Some(result))
    }

    /// Persist a run's result, superseding any previous row for the key.
    /// Rows under other fingerprints for the same (user, window) describe
    /// inputs that no longer exist and are purged in the same transaction,
    /// so the table holds at most one row per (user, window).
    pub fn store(&self, user_id: &str, result: &RankedResult) -> Result<(), CacheError> {
        let json = serde_json::to_string(result)?;
        self.with_transaction(|conn| {
            conn.execute(
                "DELETE FROM ranked_results
                 WHERE user_id = ?1 AND window_days = ?2 AND input_fingerprint != ?3",
                params![user_id, result.window_days, result.input_fingerprint],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO ranked_results
                    (user_id, window_days, input_fingerprint, generated_at, result_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    result.window_days,
                    result.input_fingerprint,
                    result.generated_at.to_rfc3339(),
                    json,
                ],
            )?;
            Ok(())
        })
    }

    /// Merge a run's canonical identities into the per-user identity
    /// table. Extends existing rows (fills NULLs) and inserts new ones;
    /// never overwrites a known identifier with a different value.
    pub fn store_identities(&self, user_id: &str, keys: &[PersonKey]) -> Result<(), CacheError> {
        self.with_transaction(|conn| {
            for key in keys {
                if key.upstream_id.is_none() && key.email.is_none() {
                    // A name-only identity is too weak to seed future runs.
                    continue;
                }
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM identity_seeds
                         WHERE user_id = ?1
                           AND ((?2 IS NOT NULL AND upstream_id = ?2)
                             OR (?3 IS NOT NULL AND email = ?3))
                         LIMIT 1",
                        params![user_id, key.upstream_id, key.email],
                        |row| row.get(0),
                    )
                    .optional()?;
                match existing {
                    Some(id) => {
                        conn.execute(
                            "UPDATE identity_seeds SET
                                upstream_id = COALESCE(upstream_id, ?2),
                                email = COALESCE(email, ?3),
                                display_name = COALESCE(display_name, ?4),
                                updated_at = datetime('now')
                             WHERE id = ?1",
                            params![id, key.upstream_id, key.email, key.display_name],
                        )?;
                    }
                    None => {
                        conn.execute(
                            "INSERT INTO identity_seeds (user_id, upstream_id, email, display_name)
                             VALUES (?1, ?2, ?3, ?4)",
                            params![user_id, key.upstream_id, key.email, key.display_name],
                        )?;
                    }
                }
            }
            Ok(())
        })
    }

    /// All identity rows for a user, to seed the resolver.
    pub fn identity_seeds(&self, user_id: &str) -> Result<Vec<IdentitySeed>, CacheError> {
        let mut stmt = self.conn.prepare(
            "SELECT upstream_id, email, display_name FROM identity_seeds
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(IdentitySeed {
                upstream_id: row.get(0)?,
                email: row.get(1)?,
                display_name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Default cache location under the user's home directory.
pub fn default_cache_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".collabradar").join("cache.db"))
}

/// Open a cache at `path`, or at the default location when `path` is None.
pub fn open(path: Option<&Path>) -> Result<CacheDb, CacheError> {
    match path {
        Some(path) => CacheDb::open_at(path),
        None => match default_cache_path() {
            Some(path) => CacheDb::open_at(path),
            None => CacheDb::open_in_memory(),
        },
    }
}
