//! Core grid engine for yearly goal bingo cards.
//! This crate is the single source of truth for card and grid invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::bingo::{completed_lines, count_bingos};
pub use model::card::{Card, CardId, CardState, CardStateError, NewCard, UserId};
pub use model::grid::{
    capacity, generate_patterns, position_of_row_col, row_col_of_position, valid_positions,
    GridConfig, GridError, GridPattern, LineKind, Position, DEFAULT_GRID_SIZE, MAX_GRID_SIZE,
    MIN_GRID_SIZE,
};
pub use model::item::{Item, ItemContentError, ItemId, MAX_ITEM_CONTENT_CHARS, MAX_NOTES_CHARS};
pub use repo::card_repo::{CardListQuery, CardRepository, SqliteCardRepository};
pub use repo::item_repo::{ItemRepository, SqliteItemRepository};
pub use repo::{RepoError, RepoResult};
pub use service::card_service::{
    CardProgress, CardService, CardServiceError, CardServiceResult, CardView,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
