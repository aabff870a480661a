//! Card item (goal) model.
//!
//! # Invariants
//! - `(card_id, position)` is unique and `position` is never the free space.
//! - `completed_at` is set iff `is_completed`.
//! - `content` is trimmed, non-empty and at most `MAX_ITEM_CONTENT_CHARS`.

use crate::model::card::CardId;
use crate::model::grid::Position;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable item identifier.
pub type ItemId = Uuid;

pub const MAX_ITEM_CONTENT_CHARS: usize = 500;
pub const MAX_NOTES_CHARS: usize = 2000;

/// Item text validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemContentError {
    EmptyContent,
    ContentTooLong { chars: usize },
    NotesTooLong { chars: usize },
}

impl Display for ItemContentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => write!(f, "item content must not be blank"),
            Self::ContentTooLong { chars } => write!(
                f,
                "item content has {chars} characters; limit is {MAX_ITEM_CONTENT_CHARS}"
            ),
            Self::NotesTooLong { chars } => write!(
                f,
                "item notes have {chars} characters; limit is {MAX_NOTES_CHARS}"
            ),
        }
    }
}

impl Error for ItemContentError {}

/// One goal occupying a cell of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub id: ItemId,
    pub card_id: CardId,
    pub position: Position,
    pub content: String,
    pub is_completed: bool,
    /// Epoch milliseconds.
    pub completed_at: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Trims and checks goal text.
pub fn normalize_content(content: &str) -> Result<String, ItemContentError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ItemContentError::EmptyContent);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_ITEM_CONTENT_CHARS {
        return Err(ItemContentError::ContentTooLong { chars });
    }
    Ok(trimmed.to_string())
}

/// Trims notes; blank notes clear the field.
pub fn normalize_notes(notes: Option<&str>) -> Result<Option<String>, ItemContentError> {
    let Some(trimmed) = notes.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let chars = trimmed.chars().count();
    if chars > MAX_NOTES_CHARS {
        return Err(ItemContentError::NotesTooLong { chars });
    }
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(normalize_content("  run a 10k ").unwrap(), "run a 10k");
        assert_eq!(
            normalize_content("   ").unwrap_err(),
            ItemContentError::EmptyContent
        );
        let long = "x".repeat(MAX_ITEM_CONTENT_CHARS + 1);
        assert!(matches!(
            normalize_content(&long),
            Err(ItemContentError::ContentTooLong { .. })
        ));
    }

    #[test]
    fn blank_notes_clear_the_field() {
        assert_eq!(normalize_notes(Some("  ")).unwrap(), None);
        assert_eq!(normalize_notes(None).unwrap(), None);
        assert_eq!(
            normalize_notes(Some(" felt great ")).unwrap().as_deref(),
            Some("felt great")
        );
    }
}
