//! Card domain model and lifecycle state machine.
//!
//! # Responsibility
//! - Define the canonical card record and its grid configuration.
//! - Guard the one-way `Draft -> Finalized` transition.
//!
//! # Invariants
//! - `Finalized` is terminal for layout: no insert/remove/swap/shuffle and
//!   no free-space change once finalized.
//! - Finalize requires `item_count == capacity`.
//! - `is_archived` and `visible_to_friends` are orthogonal to the lifecycle
//!   state and never affect layout rules.

use crate::model::grid::GridConfig;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable card identifier.
pub type CardId = Uuid;

/// Authenticated owner identifier handed in by the caller layer.
pub type UserId = Uuid;

/// Layout lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    /// Layout may still change.
    Draft,
    /// Layout is locked; only completion state changes.
    Finalized,
}

/// Lifecycle guard violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStateError {
    /// Layout mutation attempted on a finalized card.
    CardFinalized(CardId),
    /// Finalize attempted before every non-free cell holds an item.
    IncompleteGrid {
        card_id: CardId,
        item_count: usize,
        capacity: usize,
    },
}

impl Display for CardStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CardFinalized(id) => write!(f, "card is finalized: {id}"),
            Self::IncompleteGrid {
                card_id,
                item_count,
                capacity,
            } => write!(
                f,
                "card {card_id} has {item_count} of {capacity} items; fill every cell before finalizing"
            ),
        }
    }
}

impl Error for CardStateError {}

/// Canonical card record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub id: CardId,
    pub user_id: UserId,
    pub year: i32,
    pub title: Option<String>,
    pub category: Option<String>,
    /// Serialized inline as `grid_size`, `has_free_space`,
    /// `free_space_position`.
    #[serde(flatten)]
    pub grid: GridConfig,
    pub is_finalized: bool,
    pub is_archived: bool,
    pub visible_to_friends: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
    /// Epoch milliseconds; set by the finalize transition.
    pub finalized_at: Option<i64>,
}

impl Card {
    pub fn state(&self) -> CardState {
        if self.is_finalized {
            CardState::Finalized
        } else {
            CardState::Draft
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Fails when the layout is locked.
    pub fn ensure_layout_mutable(&self) -> Result<(), CardStateError> {
        match self.state() {
            CardState::Draft => Ok(()),
            CardState::Finalized => Err(CardStateError::CardFinalized(self.id)),
        }
    }

    /// Checks the `Draft -> Finalized` guard for the current item count.
    pub fn ensure_can_finalize(&self, item_count: usize) -> Result<(), CardStateError> {
        self.ensure_layout_mutable()?;
        let capacity = self.grid.capacity();
        if item_count != capacity {
            return Err(CardStateError::IncompleteGrid {
                card_id: self.id,
                item_count,
                capacity,
            });
        }
        Ok(())
    }

    /// Whether the sharing layer may expose this card to friends.
    pub fn is_shared(&self) -> bool {
        self.is_finalized && self.visible_to_friends && !self.is_archived
    }
}

/// Input for creating a draft card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCard {
    pub year: i32,
    pub title: Option<String>,
    pub category: Option<String>,
    pub grid_size: usize,
    pub has_free_space: bool,
    /// Defaults to the centre cell when `None`.
    pub free_space_position: Option<usize>,
}

impl NewCard {
    /// Classic 5x5 card with a centre free space.
    pub fn classic(year: i32) -> Self {
        Self {
            year,
            title: None,
            category: None,
            grid_size: crate::model::grid::DEFAULT_GRID_SIZE,
            has_free_space: true,
            free_space_position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(grid: GridConfig) -> Card {
        Card {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            year: 2026,
            title: None,
            category: None,
            grid,
            is_finalized: false,
            is_archived: false,
            visible_to_friends: true,
            created_at: 0,
            updated_at: 0,
            finalized_at: None,
        }
    }

    #[test]
    fn finalize_guard_requires_full_capacity() {
        let card = draft(GridConfig::without_free_space(3).unwrap());
        let err = card.ensure_can_finalize(8).unwrap_err();
        assert_eq!(
            err,
            CardStateError::IncompleteGrid {
                card_id: card.id,
                item_count: 8,
                capacity: 9
            }
        );
        assert!(card.ensure_can_finalize(9).is_ok());
    }

    #[test]
    fn finalized_card_rejects_layout_changes_and_refinalize() {
        let mut card = draft(GridConfig::with_center_free_space(5).unwrap());
        card.is_finalized = true;
        assert_eq!(card.state(), CardState::Finalized);
        assert_eq!(
            card.ensure_layout_mutable().unwrap_err(),
            CardStateError::CardFinalized(card.id)
        );
        assert!(card.ensure_can_finalize(24).is_err());
    }

    #[test]
    fn shared_requires_finalized_visible_and_not_archived() {
        let mut card = draft(GridConfig::with_center_free_space(5).unwrap());
        assert!(!card.is_shared());
        card.is_finalized = true;
        assert!(card.is_shared());
        card.is_archived = true;
        assert!(!card.is_shared());
    }
}
