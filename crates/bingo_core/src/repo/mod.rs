//! Repository layer: SQLite-backed card and item stores.
//!
//! # Responsibility
//! - Keep SQL details inside the persistence boundary.
//! - Enforce placement invariants (valid, unique positions) at write time.
//!
//! # Invariants
//! - Repositories never open their own top-level transaction; multi-statement
//!   writes run under a savepoint so they compose with the caller's
//!   transaction and roll back as one unit.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::{latest_version, schema_version, REQUIRED_TABLES};
use crate::db::DbError;
use crate::model::card::{CardId, CardStateError};
use crate::model::grid::{GridError, Position};
use crate::model::item::ItemContentError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod card_repo;
pub mod item_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from card and item persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Storage failure.
    Db(DbError),
    /// Grid configuration or position rejected by topology.
    Grid(GridError),
    /// Lifecycle guard rejected the operation.
    State(CardStateError),
    /// Item text rejected.
    Content(ItemContentError),
    CardNotFound(CardId),
    ItemNotFound {
        card_id: CardId,
        position: Position,
    },
    PositionOccupied {
        card_id: CardId,
        position: Position,
    },
    /// More items requested than empty cells remain.
    CapacityExceeded {
        card_id: CardId,
        capacity: usize,
        requested: usize,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Grid(err) => write!(f, "{err}"),
            Self::State(err) => write!(f, "{err}"),
            Self::Content(err) => write!(f, "{err}"),
            Self::CardNotFound(id) => write!(f, "card not found: {id}"),
            Self::ItemNotFound { card_id, position } => {
                write!(f, "no item at position {position} on card {card_id}")
            }
            Self::PositionOccupied { card_id, position } => {
                write!(f, "position {position} on card {card_id} is already occupied")
            }
            Self::CapacityExceeded {
                card_id,
                capacity,
                requested,
            } => write!(
                f,
                "card {card_id} cannot take {requested} more item(s); capacity is {capacity}"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "card repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "card repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted card data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Grid(err) => Some(err),
            Self::State(err) => Some(err),
            Self::Content(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<GridError> for RepoError {
    fn from(value: GridError) -> Self {
        Self::Grid(value)
    }
}

impl From<CardStateError> for RepoError {
    fn from(value: CardStateError) -> Self {
        Self::State(value)
    }
}

impl From<ItemContentError> for RepoError {
    fn from(value: ItemContentError) -> Self {
        Self::Content(value)
    }
}

/// Verifies the connection is migrated and carries the card tables.
pub fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

/// Runs `body` under a named savepoint, rolling back every statement it
/// issued if it fails.
pub(crate) fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    body: impl FnOnce() -> RepoResult<T>,
) -> RepoResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match body() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
            {
                log::error!(
                    "event=savepoint_rollback module=repo status=error savepoint={name} error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_index(value: i64, column: &str) -> RepoResult<usize> {
    usize::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid index value `{value}` in {column}")))
}

pub(crate) fn position_to_db(position: Position) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}
