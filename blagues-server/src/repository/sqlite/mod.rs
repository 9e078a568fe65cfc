//! SQLite implementation of `ProposalRepository`.
//!
//! Proposals and votes survive restarts. Every call runs the synchronous
//! rusqlite work on `tokio::task::spawn_blocking`.
//!
//! # Schema Versioning
//!
//! The `schema_version` table tracks the schema version. To change the
//! schema, increment `CURRENT_SCHEMA_VERSION` and add a step to
//! `run_migrations()`. Steps run in order from the stored version.
//!
//! # Concurrency
//!
//! The vote tables carry `UNIQUE (proposal_id, user_id)`, the vote swap runs
//! in one transaction and `finalize` is a single conditional `UPDATE`, so
//! flows racing on the same proposal need no lock of their own.

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::warn;

use blagues_core::proposal::{
    ExternalRef, NewProposal, Outcome, Proposal, ProposalFilter, ProposalId, ProposalKind,
    ProposalStatus, UserId, VoteKind,
};
use blagues_core::repository::{ProposalRepository, RepositoryError, VoteWrite};
use blagues_core::{Category, JokeId, JokePayload};

/// Current schema version. Increment this when changing the schema and add
/// the matching step in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

const PROPOSAL_COLUMNS: &str = "id, kind, target_id, submitter, external_ref, category, \
                                question, answer, joke_id, merged, refused, created_at";

/// SQLite-backed proposal repository.
pub struct SqliteRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to
    /// date.
    ///
    /// The connection runs with `journal_mode = WAL`, `synchronous = FULL`,
    /// `busy_timeout = 5000` and foreign keys enforced.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite silently keeps another journal mode on filesystems without
        // shared memory support.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of 'wal'; the database needs WAL mode",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "database schema version {} is newer than supported version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS proposals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL CHECK (kind IN ('suggestion', 'correction')),
                    target_id INTEGER REFERENCES proposals(id),
                    submitter TEXT NOT NULL,
                    external_ref TEXT NOT NULL UNIQUE,
                    category TEXT NOT NULL,
                    question TEXT NOT NULL,
                    answer TEXT NOT NULL,
                    joke_id INTEGER,
                    merged INTEGER NOT NULL DEFAULT 0,
                    refused INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    CHECK (NOT (merged = 1 AND refused = 1))
                );

                CREATE TABLE IF NOT EXISTS approvals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
                    user_id TEXT NOT NULL,
                    UNIQUE (proposal_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS disapprovals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
                    user_id TEXT NOT NULL,
                    UNIQUE (proposal_id, user_id)
                );

                CREATE INDEX IF NOT EXISTS idx_proposals_target
                    ON proposals(target_id) WHERE target_id IS NOT NULL;
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Version 2: lookup of the root record of a published joke.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_proposals_joke
                    ON proposals(joke_id) WHERE joke_id IS NOT NULL;
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` with the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn, operation)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

fn lock<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

// =============================================================================
// Row conversion helpers
// =============================================================================

fn table(kind: VoteKind) -> &'static str {
    match kind {
        VoteKind::Approval => "approvals",
        VoteKind::Disapproval => "disapprovals",
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed width so that text order is time order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn storage_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            RepositoryError::constraint(format!("{}: {}", operation, e))
        }
        _ => RepositoryError::storage(operation, e.to_string()),
    }
}

/// Raw columns of a proposal row, decoded outside the rusqlite callback so
/// that decoding failures surface as corruption.
struct ProposalRow {
    id: i64,
    kind: String,
    target_id: Option<i64>,
    submitter: String,
    external_ref: String,
    category: String,
    question: String,
    answer: String,
    joke_id: Option<u32>,
    merged: bool,
    refused: bool,
    created_at: String,
}

impl ProposalRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            target_id: row.get(2)?,
            submitter: row.get(3)?,
            external_ref: row.get(4)?,
            category: row.get(5)?,
            question: row.get(6)?,
            answer: row.get(7)?,
            joke_id: row.get(8)?,
            merged: row.get(9)?,
            refused: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_proposal(self) -> Result<Proposal, RepositoryError> {
        let kind = match (self.kind.as_str(), self.target_id) {
            ("suggestion", None) => ProposalKind::Suggestion,
            ("correction", Some(target)) => ProposalKind::Correction {
                target: ProposalId(target),
            },
            (kind, target) => {
                return Err(RepositoryError::corruption(format!(
                    "proposal {} has kind '{}' with target {:?}",
                    self.id, kind, target
                )))
            }
        };
        let category = self.category.parse::<Category>().map_err(|_| {
            RepositoryError::corruption(format!(
                "proposal {} has unknown category '{}'",
                self.id, self.category
            ))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| {
                RepositoryError::corruption(format!("proposal {} created_at", self.id))
            })?
            .with_timezone(&Utc);

        Proposal::from_parts(
            ProposalId(self.id),
            kind,
            UserId(self.submitter),
            ExternalRef(self.external_ref),
            JokePayload {
                category,
                question: self.question,
                answer: self.answer,
            },
            self.joke_id.map(JokeId),
            self.merged,
            self.refused,
            created_at,
        )
        .ok_or_else(|| {
            RepositoryError::corruption(format!("proposal {} is both merged and refused", self.id))
        })
    }
}

fn query_one(
    conn: &Connection,
    operation: &'static str,
    clause: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Option<Proposal>, RepositoryError> {
    let sql = format!("SELECT {} FROM proposals WHERE {}", PROPOSAL_COLUMNS, clause);
    conn.query_row(&sql, &[param], ProposalRow::read)
        .optional()
        .map_err(storage_error(operation))?
        .map(ProposalRow::into_proposal)
        .transpose()
}

fn query_many(
    conn: &Connection,
    operation: &'static str,
    clause: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Vec<Proposal>, RepositoryError> {
    let sql = format!(
        "SELECT {} FROM proposals WHERE {} ORDER BY created_at, id",
        PROPOSAL_COLUMNS, clause
    );
    let mut stmt = conn.prepare(&sql).map_err(storage_error(operation))?;
    let rows = stmt
        .query_map(&[param], ProposalRow::read)
        .map_err(storage_error(operation))?;

    let mut proposals = Vec::new();
    for row in rows {
        let row = row.map_err(storage_error(operation))?;
        proposals.push(row.into_proposal()?);
    }
    Ok(proposals)
}

fn proposal_exists(conn: &Connection, id: ProposalId) -> Result<bool, RepositoryError> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM proposals WHERE id = ?1)",
        params![id.0],
        |row| row.get(0),
    )
    .map_err(storage_error("proposal_exists"))
}

fn has_vote(
    conn: &Connection,
    id: ProposalId,
    user: &UserId,
    kind: VoteKind,
) -> Result<bool, RepositoryError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE proposal_id = ?1 AND user_id = ?2)",
        table(kind)
    );
    conn.query_row(&sql, params![id.0, user.0], |row| row.get(0))
        .map_err(storage_error("has_vote"))
}

fn delete_vote(
    conn: &Connection,
    id: ProposalId,
    user: &UserId,
    kind: VoteKind,
) -> Result<bool, RepositoryError> {
    let sql = format!(
        "DELETE FROM {} WHERE proposal_id = ?1 AND user_id = ?2",
        table(kind)
    );
    let removed = conn
        .execute(&sql, params![id.0, user.0])
        .map_err(storage_error("remove_vote"))?;
    Ok(removed > 0)
}

fn insert_vote(
    conn: &Connection,
    id: ProposalId,
    user: &UserId,
    kind: VoteKind,
) -> Result<(), RepositoryError> {
    let sql = format!(
        "INSERT INTO {} (proposal_id, user_id) VALUES (?1, ?2)",
        table(kind)
    );
    conn.execute(&sql, params![id.0, user.0])
        .map_err(storage_error("add_vote"))?;
    Ok(())
}

fn missing_proposal(id: ProposalId) -> RepositoryError {
    RepositoryError::constraint(format!("vote references missing proposal {}", id))
}

// =============================================================================
// ProposalRepository trait implementation
// =============================================================================

#[async_trait]
impl ProposalRepository for SqliteRepository {
    async fn create_proposal(&self, new: NewProposal) -> Result<Proposal, RepositoryError> {
        // Stored with microsecond precision.
        let created_at = Utc::now().trunc_subsecs(6);
        self.with_conn("create_proposal", move |conn| {
            let tx = conn
                .transaction()
                .map_err(storage_error("create_proposal"))?;

            let (kind, target_id) = match new.kind {
                ProposalKind::Suggestion => ("suggestion", None),
                ProposalKind::Correction { target } => {
                    let target_kind: Option<String> = tx
                        .query_row(
                            "SELECT kind FROM proposals WHERE id = ?1",
                            params![target.0],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(storage_error("create_proposal"))?;
                    if target_kind.as_deref() != Some("suggestion") {
                        return Err(RepositoryError::constraint(format!(
                            "correction target {} is not a suggestion",
                            target
                        )));
                    }
                    ("correction", Some(target.0))
                }
            };

            tx.execute(
                "INSERT INTO proposals (kind, target_id, submitter, external_ref, category,
                                        question, answer, joke_id, merged, refused, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
                params![
                    kind,
                    target_id,
                    new.submitter.0,
                    new.external_ref.0,
                    new.payload.category.key(),
                    new.payload.question,
                    new.payload.answer,
                    new.joke_id.map(|j| j.0),
                    new.merged,
                    timestamp(created_at),
                ],
            )
            .map_err(storage_error("create_proposal"))?;
            let id = ProposalId(tx.last_insert_rowid());
            tx.commit().map_err(storage_error("create_proposal"))?;

            Proposal::from_parts(
                id,
                new.kind,
                new.submitter,
                new.external_ref,
                new.payload,
                new.joke_id,
                new.merged,
                false,
                created_at,
            )
            .ok_or_else(|| RepositoryError::corruption(format!("proposal {}", id)))
        })
        .await
    }

    async fn get(&self, id: ProposalId) -> Result<Option<Proposal>, RepositoryError> {
        self.with_conn("get", move |conn| query_one(conn, "get", "id = ?1", &id.0))
            .await
    }

    async fn find_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Proposal>, RepositoryError> {
        let external_ref = external_ref.0.clone();
        self.with_conn("find_by_external_ref", move |conn| {
            query_one(conn, "find_by_external_ref", "external_ref = ?1", &external_ref)
        })
        .await
    }

    async fn find_published(&self, joke_id: JokeId) -> Result<Option<Proposal>, RepositoryError> {
        self.with_conn("find_published", move |conn| {
            query_one(
                conn,
                "find_published",
                "kind = 'suggestion' AND joke_id = ?1 ORDER BY id LIMIT 1",
                &joke_id.0,
            )
        })
        .await
    }

    async fn finalize(&self, id: ProposalId, outcome: Outcome) -> Result<bool, RepositoryError> {
        let column = match outcome {
            Outcome::Merged => "merged",
            Outcome::Refused => "refused",
        };
        self.with_conn("finalize", move |conn| {
            let sql = format!(
                "UPDATE proposals SET {} = 1 WHERE id = ?1 AND merged = 0 AND refused = 0",
                column
            );
            let updated = conn
                .execute(&sql, params![id.0])
                .map_err(storage_error("finalize"))?;
            if updated == 0 && !proposal_exists(conn, id)? {
                return Err(RepositoryError::storage(
                    "finalize",
                    format!("no proposal {}", id),
                ));
            }
            Ok(updated == 1)
        })
        .await
    }

    async fn release(&self, id: ProposalId, outcome: Outcome) -> Result<bool, RepositoryError> {
        let column = match outcome {
            Outcome::Merged => "merged",
            Outcome::Refused => "refused",
        };
        self.with_conn("release", move |conn| {
            let sql = format!(
                "UPDATE proposals SET {col} = 0 \
                 WHERE id = ?1 AND {col} = 1 AND (kind != 'suggestion' OR joke_id IS NULL)",
                col = column
            );
            let updated = conn
                .execute(&sql, params![id.0])
                .map_err(storage_error("release"))?;
            Ok(updated == 1)
        })
        .await
    }

    async fn set_joke_id(&self, id: ProposalId, joke_id: JokeId) -> Result<(), RepositoryError> {
        self.with_conn("set_joke_id", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE proposals SET joke_id = ?2 WHERE id = ?1",
                    params![id.0, joke_id.0],
                )
                .map_err(storage_error("set_joke_id"))?;
            if updated == 0 {
                return Err(RepositoryError::storage(
                    "set_joke_id",
                    format!("no proposal {}", id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn update_payload(
        &self,
        id: ProposalId,
        payload: JokePayload,
    ) -> Result<(), RepositoryError> {
        self.with_conn("update_payload", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE proposals SET category = ?2, question = ?3, answer = ?4 WHERE id = ?1",
                    params![
                        id.0,
                        payload.category.key(),
                        payload.question,
                        payload.answer
                    ],
                )
                .map_err(storage_error("update_payload"))?;
            if updated == 0 {
                return Err(RepositoryError::storage(
                    "update_payload",
                    format!("no proposal {}", id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn delete_proposal(&self, id: ProposalId) -> Result<(), RepositoryError> {
        self.with_conn("delete_proposal", move |conn| {
            let tx = conn
                .transaction()
                .map_err(storage_error("delete_proposal"))?;
            for kind in [VoteKind::Approval, VoteKind::Disapproval] {
                tx.execute(
                    &format!("DELETE FROM {} WHERE proposal_id = ?1", table(kind)),
                    params![id.0],
                )
                .map_err(storage_error("delete_proposal"))?;
            }
            let removed = tx
                .execute("DELETE FROM proposals WHERE id = ?1", params![id.0])
                .map_err(storage_error("delete_proposal"))?;
            tx.commit().map_err(storage_error("delete_proposal"))?;
            if removed == 0 {
                warn!(proposal = %id, "delete of a proposal that does not exist");
            }
            Ok(())
        })
        .await
    }

    async fn add_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteWrite, RepositoryError> {
        let user = user.clone();
        self.with_conn("add_vote", move |conn| {
            let tx = conn.transaction().map_err(storage_error("add_vote"))?;
            if !proposal_exists(&tx, id)? {
                return Err(missing_proposal(id));
            }
            if has_vote(&tx, id, &user, kind)? {
                return Ok(VoteWrite::AlreadyPresent);
            }
            insert_vote(&tx, id, &user, kind)?;
            tx.commit().map_err(storage_error("add_vote"))?;
            Ok(VoteWrite::Inserted {
                replaced_opposite: false,
            })
        })
        .await
    }

    async fn remove_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<bool, RepositoryError> {
        let user = user.clone();
        self.with_conn("remove_vote", move |conn| delete_vote(conn, id, &user, kind))
            .await
    }

    async fn cast_vote(
        &self,
        id: ProposalId,
        user: &UserId,
        kind: VoteKind,
    ) -> Result<VoteWrite, RepositoryError> {
        let user = user.clone();
        self.with_conn("cast_vote", move |conn| {
            let tx = conn.transaction().map_err(storage_error("cast_vote"))?;
            if !proposal_exists(&tx, id)? {
                return Err(missing_proposal(id));
            }
            if has_vote(&tx, id, &user, kind)? {
                return Ok(VoteWrite::AlreadyPresent);
            }
            let replaced_opposite = delete_vote(&tx, id, &user, kind.opposite())?;
            insert_vote(&tx, id, &user, kind)?;
            tx.commit().map_err(storage_error("cast_vote"))?;
            Ok(VoteWrite::Inserted { replaced_opposite })
        })
        .await
    }

    async fn voters(
        &self,
        id: ProposalId,
        kind: VoteKind,
    ) -> Result<Vec<UserId>, RepositoryError> {
        self.with_conn("voters", move |conn| {
            let sql = format!(
                "SELECT user_id FROM {} WHERE proposal_id = ?1 ORDER BY id",
                table(kind)
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_error("voters"))?;
            let rows = stmt
                .query_map(params![id.0], |row| row.get::<_, String>(0))
                .map_err(storage_error("voters"))?;
            let voters = rows
                .map(|row| row.map(UserId).map_err(storage_error("voters")))
                .collect::<Result<Vec<_>, _>>();
            voters
        })
        .await
    }

    async fn count_votes(&self, id: ProposalId, kind: VoteKind) -> Result<usize, RepositoryError> {
        self.with_conn("count_votes", move |conn| {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE proposal_id = ?1", table(kind));
            let count: i64 = conn
                .query_row(&sql, params![id.0], |row| row.get(0))
                .map_err(storage_error("count_votes"))?;
            usize::try_from(count)
                .map_err(|_| RepositoryError::corruption(format!("vote count {}", count)))
        })
        .await
    }

    async fn list_proposals(
        &self,
        filter: ProposalFilter,
    ) -> Result<Vec<Proposal>, RepositoryError> {
        let kind = filter.suggestions.map(|suggestions| {
            if suggestions {
                "suggestion"
            } else {
                "correction"
            }
        });
        let flags = filter.status.map(|status| match status {
            ProposalStatus::Pending => "merged = 0 AND refused = 0",
            ProposalStatus::Merged => "merged = 1",
            ProposalStatus::Refused => "refused = 1",
        });
        self.with_conn("list_proposals", move |conn| {
            let clause = match flags {
                Some(flags) => format!("(?1 IS NULL OR kind = ?1) AND {}", flags),
                None => "(?1 IS NULL OR kind = ?1)".to_string(),
            };
            query_many(conn, "list_proposals", &clause, &kind)
        })
        .await
    }

    async fn chain_for(&self, suggestion: ProposalId) -> Result<Vec<Proposal>, RepositoryError> {
        self.with_conn("chain_for", move |conn| {
            query_many(
                conn,
                "chain_for",
                "kind = 'correction' AND target_id = ?1",
                &suggestion.0,
            )
        })
        .await
    }
}
