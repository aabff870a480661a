//! Card use-case service: the transactional boundary of the grid engine.
//!
//! # Responsibility
//! - Run every multi-step card mutation as one `BEGIN IMMEDIATE` transaction.
//! - Check ownership before delegating to the card and item stores.
//! - Shape read models (`CardView`, `CardProgress`) with bingo counts
//!   recomputed on every read.
//!
//! # Invariants
//! - The service is stateless between calls; all state lives in the rows.
//! - A failed operation commits nothing.
//! - Bulk visibility/archive/delete are all-or-nothing across the target set.

use crate::model::bingo::{completed_lines, count_bingos};
use crate::model::card::{Card, CardId, CardStateError, NewCard, UserId};
use crate::model::grid::{center_position, GridConfig, GridError, LineKind, Position};
use crate::model::item::{Item, ItemContentError};
use crate::repo::card_repo::{CardListQuery, CardRepository, SqliteCardRepository};
use crate::repo::item_repo::{ItemRepository, SqliteItemRepository};
use crate::repo::{ensure_connection_ready, RepoError};
use log::{error, info, warn};
use rand::Rng;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;
use std::time::{Duration, Instant};

/// Caller-facing errors of the card service.
///
/// Everything except `Repo` is a recoverable validation failure carrying
/// enough detail to correct the request.
#[derive(Debug)]
pub enum CardServiceError {
    /// Bad grid size or free-space index.
    InvalidConfiguration(GridError),
    /// Position outside the grid or on the free space.
    PositionInvalid(GridError),
    PositionOccupied {
        card_id: CardId,
        position: Position,
    },
    ItemNotFound {
        card_id: CardId,
        position: Position,
    },
    CapacityExceeded {
        card_id: CardId,
        capacity: usize,
        requested: usize,
    },
    IncompleteGrid {
        card_id: CardId,
        item_count: usize,
        capacity: usize,
    },
    /// Layout mutation attempted after finalize.
    CardFinalized(CardId),
    NotOwner {
        card_id: CardId,
        user_id: UserId,
    },
    CardNotFound(CardId),
    InvalidContent(ItemContentError),
    /// Storage or transaction failure.
    Repo(RepoError),
}

impl CardServiceError {
    /// Stable machine-readable code for logs and API mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::PositionInvalid(_) => "position_invalid",
            Self::PositionOccupied { .. } => "position_occupied",
            Self::ItemNotFound { .. } => "item_not_found",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::IncompleteGrid { .. } => "incomplete_grid",
            Self::CardFinalized(_) => "card_finalized",
            Self::NotOwner { .. } => "not_owner",
            Self::CardNotFound(_) => "card_not_found",
            Self::InvalidContent(_) => "invalid_content",
            Self::Repo(_) => "storage_error",
        }
    }

    /// Whether this is a validation failure rather than an infrastructure one.
    pub fn is_domain_error(&self) -> bool {
        !matches!(self, Self::Repo(_))
    }

    /// Whether the caller may retry the whole operation (lock contention).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repo(RepoError::Db(err)) => err.is_busy(),
            _ => false,
        }
    }
}

impl Display for CardServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration(err) => write!(f, "invalid card configuration: {err}"),
            Self::PositionInvalid(err) => write!(f, "invalid position: {err}"),
            Self::PositionOccupied { card_id, position } => {
                write!(f, "position {position} on card {card_id} is already occupied")
            }
            Self::ItemNotFound { card_id, position } => {
                write!(f, "no item at position {position} on card {card_id}")
            }
            Self::CapacityExceeded {
                card_id,
                capacity,
                requested,
            } => write!(
                f,
                "card {card_id} has no room for {requested} more item(s); capacity is {capacity}"
            ),
            Self::IncompleteGrid {
                card_id,
                item_count,
                capacity,
            } => write!(
                f,
                "card {card_id} has {item_count} of {capacity} items; fill every cell before finalizing"
            ),
            Self::CardFinalized(id) => write!(f, "card is finalized: {id}"),
            Self::NotOwner { card_id, user_id } => {
                write!(f, "user {user_id} does not own card {card_id}")
            }
            Self::CardNotFound(id) => write!(f, "card not found: {id}"),
            Self::InvalidContent(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CardServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfiguration(err) | Self::PositionInvalid(err) => Some(err),
            Self::InvalidContent(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CardServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Grid(err) if err.is_configuration_error() => {
                Self::InvalidConfiguration(err)
            }
            RepoError::Grid(err) => Self::PositionInvalid(err),
            RepoError::State(err) => err.into(),
            RepoError::Content(err) => Self::InvalidContent(err),
            RepoError::CardNotFound(id) => Self::CardNotFound(id),
            RepoError::ItemNotFound { card_id, position } => {
                Self::ItemNotFound { card_id, position }
            }
            RepoError::PositionOccupied { card_id, position } => {
                Self::PositionOccupied { card_id, position }
            }
            RepoError::CapacityExceeded {
                card_id,
                capacity,
                requested,
            } => Self::CapacityExceeded {
                card_id,
                capacity,
                requested,
            },
            other => Self::Repo(other),
        }
    }
}

impl From<CardStateError> for CardServiceError {
    fn from(value: CardStateError) -> Self {
        match value {
            CardStateError::CardFinalized(id) => Self::CardFinalized(id),
            CardStateError::IncompleteGrid {
                card_id,
                item_count,
                capacity,
            } => Self::IncompleteGrid {
                card_id,
                item_count,
                capacity,
            },
        }
    }
}

impl From<rusqlite::Error> for CardServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

pub type CardServiceResult<T> = Result<T, CardServiceError>;

/// Attempts per write transaction when the database stays locked past the
/// busy timeout.
const MAX_WRITE_ATTEMPTS: u32 = 3;
const WRITE_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Completion summary derived from the current rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardProgress {
    pub item_count: usize,
    pub capacity: usize,
    pub completed_count: usize,
    pub bingo_count: usize,
    /// Satisfied lines in pattern order.
    pub completed_lines: Vec<LineKind>,
}

impl CardProgress {
    fn compute(card: &Card, item_count: usize, completed: &BTreeSet<Position>) -> Self {
        Self {
            item_count,
            capacity: card.grid.capacity(),
            completed_count: completed.len(),
            bingo_count: count_bingos(&card.grid, completed),
            completed_lines: completed_lines(&card.grid, completed),
        }
    }
}

/// Card with its items (ordered by position) and progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub card: Card,
    pub items: Vec<Item>,
    pub progress: CardProgress,
}

/// Card service over one SQLite connection.
///
/// Open one connection per worker. SQLite admits one writer per database,
/// so writes to different cards queue behind each other for the length of
/// one short transaction: the busy timeout set at open time waits for the
/// lock, and a write still locked out after it is retried a bounded number
/// of times before surfacing as a retryable `Repo` error.
pub struct CardService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CardService<'conn> {
    /// Creates a service after verifying the connection schema.
    pub fn try_new(conn: &'conn Connection) -> CardServiceResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Creates a draft card with zero items.
    pub fn create_card(&self, user_id: UserId, input: &NewCard) -> CardServiceResult<Card> {
        let grid = build_grid(
            input.grid_size,
            input.has_free_space,
            input.free_space_position,
        )
        .map_err(CardServiceError::InvalidConfiguration)?;

        self.write("card_create", None, |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = cards.create_card(user_id, input, grid)?;
            Ok(card)
        })
    }

    /// Loads one owned card with items and progress.
    pub fn get_card(&self, user_id: UserId, card_id: CardId) -> CardServiceResult<CardView> {
        self.read(|tx| {
            let card = load_owned(&SqliteCardRepository::new(tx), user_id, card_id)?;
            build_view(tx, card)
        })
    }

    /// Lists the caller's cards, newest year first, optionally for one year.
    pub fn list_cards(
        &self,
        user_id: UserId,
        year: Option<i32>,
        include_archived: bool,
    ) -> CardServiceResult<Vec<Card>> {
        self.read(|tx| {
            let query = CardListQuery {
                year,
                include_archived,
                ..CardListQuery::for_user(user_id)
            };
            Ok(SqliteCardRepository::new(tx).list_cards(&query)?)
        })
    }

    /// Cards of `owner_id` the sharing layer may show to friends. Friendship
    /// itself is checked by the caller.
    pub fn list_shared_cards(&self, owner_id: UserId) -> CardServiceResult<Vec<CardView>> {
        self.read(|tx| {
            SqliteCardRepository::new(tx)
                .list_cards(&CardListQuery::for_user(owner_id))?
                .into_iter()
                .filter(Card::is_shared)
                .map(|card| build_view(tx, card))
                .collect()
        })
    }

    /// Progress of one owned card.
    pub fn card_progress(&self, user_id: UserId, card_id: CardId) -> CardServiceResult<CardProgress> {
        self.read(|tx| {
            let card = load_owned(&SqliteCardRepository::new(tx), user_id, card_id)?;
            let items = SqliteItemRepository::new(tx);
            let completed = items.completed_positions(card_id)?;
            Ok(CardProgress::compute(&card, items.count_items(card_id)?, &completed))
        })
    }

    /// Replaces title and category; allowed in any state.
    pub fn update_labels(
        &self,
        user_id: UserId,
        card_id: CardId,
        title: Option<&str>,
        category: Option<&str>,
    ) -> CardServiceResult<Card> {
        let title = normalize_label(title);
        let category = normalize_label(category);
        self.write("card_update_labels", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            load_owned(&cards, user_id, card_id)?;
            cards.update_labels(card_id, title.as_deref(), category.as_deref())?;
            reload(&cards, card_id)
        })
    }

    /// Moves, adds or removes the free space while the card is a draft.
    pub fn set_free_space(
        &self,
        user_id: UserId,
        card_id: CardId,
        has_free_space: bool,
        free_space_position: Option<Position>,
    ) -> CardServiceResult<Card> {
        self.write("card_set_free_space", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let items = SqliteItemRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            card.ensure_layout_mutable()?;

            let grid = build_grid(card.grid.grid_size(), has_free_space, free_space_position)
                .map_err(CardServiceError::InvalidConfiguration)?;
            if let Some(position) = grid.free_space() {
                if items.get_item_at(card_id, position)?.is_some() {
                    return Err(CardServiceError::PositionOccupied { card_id, position });
                }
            }
            cards.update_grid(card_id, grid)?;
            reload(&cards, card_id)
        })
    }

    /// Adds one item at `position`, or at the first empty cell when `None`.
    pub fn add_item(
        &self,
        user_id: UserId,
        card_id: CardId,
        position: Option<Position>,
        content: &str,
    ) -> CardServiceResult<Item> {
        self.write("item_add", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let item = SqliteItemRepository::new(tx).insert_item(&card, position, content)?;
            cards.touch(card_id)?;
            Ok(item)
        })
    }

    /// Bulk fill (import or generated suggestions) into empty cells.
    pub fn fill_items(
        &self,
        user_id: UserId,
        card_id: CardId,
        contents: &[String],
    ) -> CardServiceResult<Vec<Item>> {
        self.write("item_fill", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let created = SqliteItemRepository::new(tx).fill_empty(&card, contents)?;
            cards.touch(card_id)?;
            Ok(created)
        })
    }

    pub fn update_item_content(
        &self,
        user_id: UserId,
        card_id: CardId,
        position: Position,
        content: &str,
    ) -> CardServiceResult<Item> {
        self.write("item_update", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let item = SqliteItemRepository::new(tx).update_content(&card, position, content)?;
            cards.touch(card_id)?;
            Ok(item)
        })
    }

    pub fn remove_item(
        &self,
        user_id: UserId,
        card_id: CardId,
        position: Position,
    ) -> CardServiceResult<()> {
        self.write("item_remove", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            SqliteItemRepository::new(tx).remove_item(&card, position)?;
            cards.touch(card_id)?;
            Ok(())
        })
    }

    /// Exchanges two cells' occupants and returns the resulting items.
    pub fn swap_positions(
        &self,
        user_id: UserId,
        card_id: CardId,
        first: Position,
        second: Position,
    ) -> CardServiceResult<Vec<Item>> {
        self.write("item_swap", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let items = SqliteItemRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            items.swap_positions(&card, first, second)?;
            cards.touch(card_id)?;
            Ok(items.list_items(card_id)?)
        })
    }

    /// Shuffles with the thread-local generator.
    pub fn shuffle(&self, user_id: UserId, card_id: CardId) -> CardServiceResult<Vec<Item>> {
        self.shuffle_with(user_id, card_id, &mut rand::rng())
    }

    /// Shuffles with a caller-provided generator.
    pub fn shuffle_with<R: Rng + ?Sized>(
        &self,
        user_id: UserId,
        card_id: CardId,
        rng: &mut R,
    ) -> CardServiceResult<Vec<Item>> {
        self.write("item_shuffle", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let shuffled = SqliteItemRepository::new(tx).shuffle(&card, &mut *rng)?;
            cards.touch(card_id)?;
            Ok(shuffled)
        })
    }

    /// One-way `Draft -> Finalized` transition.
    pub fn finalize(&self, user_id: UserId, card_id: CardId) -> CardServiceResult<Card> {
        self.write("card_finalize", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let item_count = SqliteItemRepository::new(tx).count_items(card_id)?;
            card.ensure_can_finalize(item_count)?;
            cards.mark_finalized(card_id)?;
            reload(&cards, card_id)
        })
    }

    /// Marks a goal complete or not; allowed in any state.
    pub fn set_completion(
        &self,
        user_id: UserId,
        card_id: CardId,
        position: Position,
        completed: bool,
        notes: Option<&str>,
    ) -> CardServiceResult<Item> {
        self.write("item_completion", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let item = SqliteItemRepository::new(tx)
                .set_completion(&card, position, completed, notes)?;
            cards.touch(card_id)?;
            Ok(item)
        })
    }

    /// Replaces an item's notes; blank clears. Allowed in any state.
    pub fn set_notes(
        &self,
        user_id: UserId,
        card_id: CardId,
        position: Position,
        notes: Option<&str>,
    ) -> CardServiceResult<Item> {
        self.write("item_notes", Some(card_id), |tx| {
            let cards = SqliteCardRepository::new(tx);
            let card = load_owned(&cards, user_id, card_id)?;
            let item = SqliteItemRepository::new(tx).set_notes(&card, position, notes)?;
            cards.touch(card_id)?;
            Ok(item)
        })
    }

    pub fn delete_card(&self, user_id: UserId, card_id: CardId) -> CardServiceResult<()> {
        self.bulk_delete(user_id, &[card_id]).map(|_| ())
    }

    /// Sets `visible_to_friends` on every target card, or on none.
    pub fn bulk_set_visibility(
        &self,
        user_id: UserId,
        card_ids: &[CardId],
        visible: bool,
    ) -> CardServiceResult<usize> {
        self.write_owned_set("card_bulk_visibility", user_id, card_ids, |cards, ids| {
            cards.set_visible_to_friends(ids, visible)
        })
    }

    /// Sets `is_archived` on every target card, or on none.
    pub fn bulk_set_archived(
        &self,
        user_id: UserId,
        card_ids: &[CardId],
        archived: bool,
    ) -> CardServiceResult<usize> {
        self.write_owned_set("card_bulk_archive", user_id, card_ids, |cards, ids| {
            cards.set_archived(ids, archived)
        })
    }

    /// Deletes every target card with its items, or none.
    pub fn bulk_delete(&self, user_id: UserId, card_ids: &[CardId]) -> CardServiceResult<usize> {
        self.write_owned_set("card_bulk_delete", user_id, card_ids, |cards, ids| {
            cards.delete_cards(ids)
        })
    }

    fn write_owned_set(
        &self,
        event: &'static str,
        user_id: UserId,
        card_ids: &[CardId],
        apply: impl Fn(&SqliteCardRepository<'_>, &[CardId]) -> Result<usize, RepoError>,
    ) -> CardServiceResult<usize> {
        let ids: Vec<CardId> = card_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.write(event, None, |tx| {
            let cards = SqliteCardRepository::new(tx);
            for id in &ids {
                load_owned(&cards, user_id, *id)?;
            }
            Ok(apply(&cards, &ids)?)
        })
    }

    fn write<T>(
        &self,
        event: &'static str,
        card_id: Option<CardId>,
        mut body: impl FnMut(&Transaction<'_>) -> CardServiceResult<T>,
    ) -> CardServiceResult<T> {
        let started_at = Instant::now();
        let subject = card_id.map_or_else(|| "none".to_string(), |id| id.to_string());

        let mut attempt = 1;
        let result = loop {
            match self.write_once(&mut body) {
                Err(err) if err.is_retryable() && attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        "event={event} module=card_service status=retry card_id={subject} attempt={attempt} error_code={}",
                        err.code()
                    );
                    thread::sleep(WRITE_RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                outcome => break outcome,
            }
        };

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!(
                "event={event} module=card_service status=ok card_id={subject} duration_ms={duration_ms} attempts={attempt}"
            ),
            Err(err) if err.is_domain_error() => warn!(
                "event={event} module=card_service status=rejected card_id={subject} duration_ms={duration_ms} error_code={}",
                err.code()
            ),
            Err(err) => error!(
                "event={event} module=card_service status=error card_id={subject} duration_ms={duration_ms} attempts={attempt} error_code={} error={err}",
                err.code()
            ),
        }
        result
    }

    fn write_once<T>(
        &self,
        body: &mut impl FnMut(&Transaction<'_>) -> CardServiceResult<T>,
    ) -> CardServiceResult<T> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn read<T>(
        &self,
        body: impl FnOnce(&Transaction<'_>) -> CardServiceResult<T>,
    ) -> CardServiceResult<T> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn build_grid(
    grid_size: usize,
    has_free_space: bool,
    free_space_position: Option<Position>,
) -> Result<GridConfig, GridError> {
    if has_free_space {
        let position = free_space_position.unwrap_or_else(|| center_position(grid_size));
        GridConfig::new(grid_size, true, position)
    } else {
        GridConfig::without_free_space(grid_size)
    }
}

fn load_owned(
    cards: &SqliteCardRepository<'_>,
    user_id: UserId,
    card_id: CardId,
) -> CardServiceResult<Card> {
    let card = cards
        .get_card(card_id)?
        .ok_or(CardServiceError::CardNotFound(card_id))?;
    if !card.is_owned_by(user_id) {
        return Err(CardServiceError::NotOwner { card_id, user_id });
    }
    Ok(card)
}

fn reload(cards: &SqliteCardRepository<'_>, card_id: CardId) -> CardServiceResult<Card> {
    cards
        .get_card(card_id)?
        .ok_or(CardServiceError::CardNotFound(card_id))
}

fn build_view(conn: &Connection, card: Card) -> CardServiceResult<CardView> {
    let items = SqliteItemRepository::new(conn).list_items(card.id)?;
    let completed: BTreeSet<Position> = items
        .iter()
        .filter(|item| item.is_completed)
        .map(|item| item.position)
        .collect();
    let progress = CardProgress::compute(&card, items.len(), &completed);
    Ok(CardView {
        card,
        items,
        progress,
    })
}

fn normalize_label(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
