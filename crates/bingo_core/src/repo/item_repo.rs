//! Item store: placement, completion and layout rearrangement for one card.
//!
//! # Responsibility
//! - Insert, update, remove, swap and shuffle items inside a card's grid.
//! - Track completion state and notes per item.
//!
//! # Invariants
//! - `(card_id, position)` stays unique at every statement boundary: swap and
//!   shuffle first park the affected rows on distinct negative positions,
//!   then write final positions.
//! - Layout operations (insert, content update, remove, swap, shuffle) are
//!   rejected once the card is finalized; completion and notes are not.
//! - Multi-statement writes run under one savepoint: all or nothing.

use crate::model::card::{Card, CardId};
use crate::model::grid::Position;
use crate::model::item::{normalize_content, normalize_notes, Item};
use crate::repo::{
    bool_to_int, ensure_connection_ready, int_to_bool, parse_index, parse_uuid, position_to_db,
    with_savepoint, RepoError, RepoResult,
};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    card_id,
    position,
    content,
    is_completed,
    completed_at,
    notes,
    created_at,
    updated_at
FROM card_items";

/// Repository interface for the items of one card.
///
/// Every method takes the owning `Card` as loaded inside the caller's
/// transaction so grid and lifecycle rules are checked against locked state.
pub trait ItemRepository {
    /// Items ordered by position.
    fn list_items(&self, card_id: CardId) -> RepoResult<Vec<Item>>;
    fn get_item_at(&self, card_id: CardId, position: Position) -> RepoResult<Option<Item>>;
    fn count_items(&self, card_id: CardId) -> RepoResult<usize>;
    fn completed_positions(&self, card_id: CardId) -> RepoResult<BTreeSet<Position>>;
    /// Inserts at `position`, or at the first empty cell when `None`.
    fn insert_item(
        &self,
        card: &Card,
        position: Option<Position>,
        content: &str,
    ) -> RepoResult<Item>;
    /// Inserts `contents` into empty cells in ascending position order.
    fn fill_empty(&self, card: &Card, contents: &[String]) -> RepoResult<Vec<Item>>;
    fn update_content(&self, card: &Card, position: Position, content: &str) -> RepoResult<Item>;
    fn remove_item(&self, card: &Card, position: Position) -> RepoResult<()>;
    /// Exchanges the occupants of two cells, either of which may be empty.
    fn swap_positions(&self, card: &Card, first: Position, second: Position) -> RepoResult<()>;
    /// Redistributes all items over a random subset of valid cells.
    fn shuffle<R: Rng + ?Sized>(&self, card: &Card, rng: &mut R) -> RepoResult<Vec<Item>>;
    /// Sets completion and, when `notes` is `Some`, replaces the notes.
    fn set_completion(
        &self,
        card: &Card,
        position: Position,
        completed: bool,
        notes: Option<&str>,
    ) -> RepoResult<Item>;
    fn set_notes(&self, card: &Card, position: Position, notes: Option<&str>) -> RepoResult<Item>;
}

/// SQLite-backed item store.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    /// Wraps a connection already known to be migrated.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Wraps a connection after verifying its schema.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self::new(conn))
    }

    fn occupied_positions(&self, card_id: CardId) -> RepoResult<BTreeSet<Position>> {
        let mut stmt = self
            .conn
            .prepare("SELECT position FROM card_items WHERE card_id = ?1;")?;
        let mut rows = stmt.query([card_id.to_string()])?;
        let mut positions = BTreeSet::new();
        while let Some(row) = rows.next()? {
            positions.insert(parse_index(row.get(0)?, "card_items.position")?);
        }
        Ok(positions)
    }

    fn empty_positions(&self, card: &Card) -> RepoResult<Vec<Position>> {
        let occupied = self.occupied_positions(card.id)?;
        Ok(card
            .grid
            .valid_positions()
            .into_iter()
            .filter(|position| !occupied.contains(position))
            .collect())
    }

    fn insert_row(&self, card_id: CardId, position: Position, content: &str) -> RepoResult<Item> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO card_items (id, card_id, position, content, is_completed)
             VALUES (?1, ?2, ?3, ?4, 0);",
            params![
                id.to_string(),
                card_id.to_string(),
                position_to_db(position),
                content
            ],
        )?;
        self.load_required(card_id, position)
    }

    fn load_required(&self, card_id: CardId, position: Position) -> RepoResult<Item> {
        self.get_item_at(card_id, position)?
            .ok_or(RepoError::ItemNotFound { card_id, position })
    }

    fn ensure_occupied(&self, card_id: CardId, position: Position) -> RepoResult<()> {
        if self.get_item_at(card_id, position)?.is_none() {
            return Err(RepoError::ItemNotFound { card_id, position });
        }
        Ok(())
    }

    fn park_rows(&self, card_id: CardId, positions: Option<(Position, Position)>) -> RepoResult<()> {
        match positions {
            Some((first, second)) => self.conn.execute(
                "UPDATE card_items
                 SET position = -1 - position
                 WHERE card_id = ?1
                   AND position IN (?2, ?3);",
                params![
                    card_id.to_string(),
                    position_to_db(first),
                    position_to_db(second)
                ],
            )?,
            None => self.conn.execute(
                "UPDATE card_items
                 SET position = -1 - position
                 WHERE card_id = ?1;",
                [card_id.to_string()],
            )?,
        };
        Ok(())
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn list_items(&self, card_id: CardId) -> RepoResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE card_id = ?1
             ORDER BY position ASC;"
        ))?;
        let mut rows = stmt.query([card_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn get_item_at(&self, card_id: CardId, position: Position) -> RepoResult<Option<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE card_id = ?1
               AND position = ?2;"
        ))?;
        let mut rows = stmt.query(params![card_id.to_string(), position_to_db(position)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn count_items(&self, card_id: CardId) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM card_items WHERE card_id = ?1;",
            [card_id.to_string()],
            |row| row.get(0),
        )?;
        parse_index(count, "COUNT(card_items)")
    }

    fn completed_positions(&self, card_id: CardId) -> RepoResult<BTreeSet<Position>> {
        let mut stmt = self.conn.prepare(
            "SELECT position
             FROM card_items
             WHERE card_id = ?1
               AND is_completed = 1;",
        )?;
        let mut rows = stmt.query([card_id.to_string()])?;
        let mut positions = BTreeSet::new();
        while let Some(row) = rows.next()? {
            positions.insert(parse_index(row.get(0)?, "card_items.position")?);
        }
        Ok(positions)
    }

    fn insert_item(
        &self,
        card: &Card,
        position: Option<Position>,
        content: &str,
    ) -> RepoResult<Item> {
        card.ensure_layout_mutable()?;
        let content = normalize_content(content)?;

        let position = match position {
            Some(position) => {
                card.grid.validate_position(position)?;
                if self.get_item_at(card.id, position)?.is_some() {
                    return Err(RepoError::PositionOccupied {
                        card_id: card.id,
                        position,
                    });
                }
                position
            }
            None => self.empty_positions(card)?.first().copied().ok_or(
                RepoError::CapacityExceeded {
                    card_id: card.id,
                    capacity: card.grid.capacity(),
                    requested: 1,
                },
            )?,
        };

        self.insert_row(card.id, position, &content)
    }

    fn fill_empty(&self, card: &Card, contents: &[String]) -> RepoResult<Vec<Item>> {
        card.ensure_layout_mutable()?;
        let normalized = contents
            .iter()
            .map(|content| normalize_content(content))
            .collect::<Result<Vec<_>, _>>()?;

        let empty = self.empty_positions(card)?;
        if normalized.len() > empty.len() {
            return Err(RepoError::CapacityExceeded {
                card_id: card.id,
                capacity: card.grid.capacity(),
                requested: normalized.len(),
            });
        }

        with_savepoint(self.conn, "item_fill", || {
            empty
                .iter()
                .zip(normalized.iter())
                .map(|(position, content)| self.insert_row(card.id, *position, content))
                .collect()
        })
    }

    fn update_content(&self, card: &Card, position: Position, content: &str) -> RepoResult<Item> {
        card.ensure_layout_mutable()?;
        card.grid.validate_position(position)?;
        let content = normalize_content(content)?;

        let changed = self.conn.execute(
            "UPDATE card_items
             SET content = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_id = ?1
               AND position = ?2;",
            params![card.id.to_string(), position_to_db(position), content],
        )?;
        if changed == 0 {
            return Err(RepoError::ItemNotFound {
                card_id: card.id,
                position,
            });
        }
        self.load_required(card.id, position)
    }

    fn remove_item(&self, card: &Card, position: Position) -> RepoResult<()> {
        card.ensure_layout_mutable()?;
        card.grid.validate_position(position)?;

        let changed = self.conn.execute(
            "DELETE FROM card_items WHERE card_id = ?1 AND position = ?2;",
            params![card.id.to_string(), position_to_db(position)],
        )?;
        if changed == 0 {
            return Err(RepoError::ItemNotFound {
                card_id: card.id,
                position,
            });
        }
        Ok(())
    }

    fn swap_positions(&self, card: &Card, first: Position, second: Position) -> RepoResult<()> {
        card.ensure_layout_mutable()?;
        card.grid.validate_position(first)?;
        card.grid.validate_position(second)?;
        if first == second {
            return Ok(());
        }

        with_savepoint(self.conn, "item_swap", || {
            self.park_rows(card.id, Some((first, second)))?;
            self.conn.execute(
                "UPDATE card_items
                 SET position = CASE WHEN position = -1 - ?2 THEN ?3 ELSE ?2 END,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE card_id = ?1
                   AND position < 0;",
                params![
                    card.id.to_string(),
                    position_to_db(first),
                    position_to_db(second)
                ],
            )?;
            Ok(())
        })
    }

    fn shuffle<R: Rng + ?Sized>(&self, card: &Card, rng: &mut R) -> RepoResult<Vec<Item>> {
        card.ensure_layout_mutable()?;
        let items = self.list_items(card.id)?;
        let mut targets = card.grid.valid_positions();
        if items.len() > targets.len() {
            return Err(RepoError::InvalidData(format!(
                "card {} holds {} items but has only {} cells",
                card.id,
                items.len(),
                targets.len()
            )));
        }
        targets.shuffle(rng);

        with_savepoint(self.conn, "item_shuffle", || {
            self.park_rows(card.id, None)?;
            let mut stmt = self.conn.prepare(
                "UPDATE card_items
                 SET position = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
            )?;
            for (item, target) in items.iter().zip(targets.iter()) {
                stmt.execute(params![item.id.to_string(), position_to_db(*target)])?;
            }
            Ok(())
        })?;

        self.list_items(card.id)
    }

    fn set_completion(
        &self,
        card: &Card,
        position: Position,
        completed: bool,
        notes: Option<&str>,
    ) -> RepoResult<Item> {
        card.grid.validate_position(position)?;
        let existing = self
            .get_item_at(card.id, position)?
            .ok_or(RepoError::ItemNotFound {
                card_id: card.id,
                position,
            })?;
        let notes = match notes {
            Some(value) => normalize_notes(Some(value))?,
            None => existing.notes,
        };

        self.conn.execute(
            "UPDATE card_items
             SET is_completed = ?3,
                 completed_at = CASE
                     WHEN ?3 = 0 THEN NULL
                     WHEN is_completed = 1 THEN completed_at
                     ELSE (strftime('%s', 'now') * 1000)
                 END,
                 notes = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_id = ?1
               AND position = ?2;",
            params![
                card.id.to_string(),
                position_to_db(position),
                bool_to_int(completed),
                notes
            ],
        )?;
        self.load_required(card.id, position)
    }

    fn set_notes(&self, card: &Card, position: Position, notes: Option<&str>) -> RepoResult<Item> {
        card.grid.validate_position(position)?;
        let notes = normalize_notes(notes)?;
        self.ensure_occupied(card.id, position)?;

        self.conn.execute(
            "UPDATE card_items
             SET notes = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_id = ?1
               AND position = ?2;",
            params![card.id.to_string(), position_to_db(position), notes],
        )?;
        self.load_required(card.id, position)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let id_text: String = row.get("id")?;
    let card_text: String = row.get("card_id")?;
    Ok(Item {
        id: parse_uuid(&id_text, "card_items.id")?,
        card_id: parse_uuid(&card_text, "card_items.card_id")?,
        position: parse_index(row.get("position")?, "card_items.position")?,
        content: row.get("content")?,
        is_completed: int_to_bool(row.get("is_completed")?, "card_items.is_completed")?,
        completed_at: row.get("completed_at")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
