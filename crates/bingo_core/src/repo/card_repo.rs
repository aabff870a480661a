//! Card repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist card rows: grid configuration, labels and lifecycle flags.
//! - Keep list ordering deterministic: `year DESC, created_at DESC, id ASC`.
//!
//! # Invariants
//! - Grid columns are only written from a validated `GridConfig`.
//! - `is_finalized` only ever goes from 0 to 1.

use crate::model::card::{Card, CardId, NewCard, UserId};
use crate::model::grid::GridConfig;
use crate::repo::{
    bool_to_int, ensure_connection_ready, int_to_bool, parse_index, parse_uuid, position_to_db,
    RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const CARD_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    year,
    title,
    category,
    grid_size,
    has_free_space,
    free_space_position,
    is_finalized,
    is_archived,
    visible_to_friends,
    created_at,
    updated_at,
    finalized_at
FROM cards";

/// Filters for listing one user's cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardListQuery {
    pub user_id: UserId,
    pub year: Option<i32>,
    pub include_archived: bool,
}

impl CardListQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            year: None,
            include_archived: false,
        }
    }
}

/// Repository interface for card rows.
pub trait CardRepository {
    /// Inserts a draft card and returns the stored record.
    fn create_card(&self, user_id: UserId, input: &NewCard, grid: GridConfig)
        -> RepoResult<Card>;
    fn get_card(&self, id: CardId) -> RepoResult<Option<Card>>;
    fn list_cards(&self, query: &CardListQuery) -> RepoResult<Vec<Card>>;
    fn update_labels(
        &self,
        id: CardId,
        title: Option<&str>,
        category: Option<&str>,
    ) -> RepoResult<()>;
    /// Rewrites the free-space columns. Callers check the draft guard.
    fn update_grid(&self, id: CardId, grid: GridConfig) -> RepoResult<()>;
    fn mark_finalized(&self, id: CardId) -> RepoResult<()>;
    fn set_archived(&self, ids: &[CardId], archived: bool) -> RepoResult<usize>;
    fn set_visible_to_friends(&self, ids: &[CardId], visible: bool) -> RepoResult<usize>;
    /// Deletes cards; their items cascade.
    fn delete_cards(&self, ids: &[CardId]) -> RepoResult<usize>;
    /// Bumps `updated_at` after an item-level change.
    fn touch(&self, id: CardId) -> RepoResult<()>;
}

/// SQLite-backed card repository.
pub struct SqliteCardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCardRepository<'conn> {
    /// Wraps a connection already known to be migrated.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Wraps a connection after verifying its schema.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self::new(conn))
    }

    fn update_flag(&self, column: &str, ids: &[CardId], value: bool) -> RepoResult<usize> {
        let sql = format!(
            "UPDATE cards
             SET {column} = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut changed = 0;
        for id in ids {
            changed += stmt.execute(params![id.to_string(), bool_to_int(value)])?;
        }
        Ok(changed)
    }
}

impl CardRepository for SqliteCardRepository<'_> {
    fn create_card(
        &self,
        user_id: UserId,
        input: &NewCard,
        grid: GridConfig,
    ) -> RepoResult<Card> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO cards (
                id,
                user_id,
                year,
                title,
                category,
                grid_size,
                has_free_space,
                free_space_position,
                is_finalized,
                is_archived,
                visible_to_friends
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, 1);",
            params![
                id.to_string(),
                user_id.to_string(),
                input.year,
                input.title.as_deref(),
                input.category.as_deref(),
                position_to_db(grid.grid_size()),
                bool_to_int(grid.has_free_space()),
                position_to_db(grid.free_space_position()),
            ],
        )?;

        self.get_card(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("created card {id} missing on read-back")))
    }

    fn get_card(&self, id: CardId) -> RepoResult<Option<Card>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CARD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_card_row(row)?));
        }
        Ok(None)
    }

    fn list_cards(&self, query: &CardListQuery) -> RepoResult<Vec<Card>> {
        let mut sql = format!("{CARD_SELECT_SQL} WHERE user_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(query.user_id.to_string())];

        if let Some(year) = query.year {
            sql.push_str(" AND year = ?");
            bind_values.push(Value::Integer(i64::from(year)));
        }
        if !query.include_archived {
            sql.push_str(" AND is_archived = 0");
        }
        sql.push_str(" ORDER BY year DESC, created_at DESC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next()? {
            cards.push(parse_card_row(row)?);
        }
        Ok(cards)
    }

    fn update_labels(
        &self,
        id: CardId,
        title: Option<&str>,
        category: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET title = ?2,
                 category = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), title, category],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(id));
        }
        Ok(())
    }

    fn update_grid(&self, id: CardId, grid: GridConfig) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET grid_size = ?2,
                 has_free_space = ?3,
                 free_space_position = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_finalized = 0;",
            params![
                id.to_string(),
                position_to_db(grid.grid_size()),
                bool_to_int(grid.has_free_space()),
                position_to_db(grid.free_space_position()),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(id));
        }
        Ok(())
    }

    fn mark_finalized(&self, id: CardId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET is_finalized = 1,
                 finalized_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_finalized = 0;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(id));
        }
        Ok(())
    }

    fn set_archived(&self, ids: &[CardId], archived: bool) -> RepoResult<usize> {
        self.update_flag("is_archived", ids, archived)
    }

    fn set_visible_to_friends(&self, ids: &[CardId], visible: bool) -> RepoResult<usize> {
        self.update_flag("visible_to_friends", ids, visible)
    }

    fn delete_cards(&self, ids: &[CardId]) -> RepoResult<usize> {
        let mut stmt = self.conn.prepare("DELETE FROM cards WHERE id = ?1;")?;
        let mut deleted = 0;
        for id in ids {
            deleted += stmt.execute([id.to_string()])?;
        }
        Ok(deleted)
    }

    fn touch(&self, id: CardId) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE cards
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id.to_string()],
        )?;
        Ok(())
    }
}

fn parse_card_row(row: &Row<'_>) -> RepoResult<Card> {
    let id_text: String = row.get("id")?;
    let user_text: String = row.get("user_id")?;
    let grid_size = parse_index(row.get("grid_size")?, "cards.grid_size")?;
    let has_free_space = int_to_bool(row.get("has_free_space")?, "cards.has_free_space")?;
    let free_space_position = parse_index(
        row.get("free_space_position")?,
        "cards.free_space_position",
    )?;
    let grid = GridConfig::new(grid_size, has_free_space, free_space_position).map_err(|err| {
        RepoError::InvalidData(format!("invalid grid configuration on card {id_text}: {err}"))
    })?;

    Ok(Card {
        id: parse_uuid(&id_text, "cards.id")?,
        user_id: parse_uuid(&user_text, "cards.user_id")?,
        year: row.get("year")?,
        title: row.get("title")?,
        category: row.get("category")?,
        grid,
        is_finalized: int_to_bool(row.get("is_finalized")?, "cards.is_finalized")?,
        is_archived: int_to_bool(row.get("is_archived")?, "cards.is_archived")?,
        visible_to_friends: int_to_bool(
            row.get("visible_to_friends")?,
            "cards.visible_to_friends",
        )?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        finalized_at: row.get("finalized_at")?,
    })
}
