use bingo_core::db::open_db_in_memory;
use bingo_core::{
    Card, CardRepository, CardStateError, GridConfig, GridError, ItemContentError,
    ItemRepository, NewCard, RepoError, SqliteCardRepository, SqliteItemRepository,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use std::collections::BTreeSet;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().expect("in-memory db should open")
}

fn create_card(conn: &Connection, grid: GridConfig) -> Card {
    let repo = SqliteCardRepository::try_new(conn).expect("card repository");
    let input = NewCard {
        grid_size: grid.grid_size(),
        has_free_space: grid.has_free_space(),
        free_space_position: grid.free_space(),
        ..NewCard::classic(2026)
    };
    repo.create_card(Uuid::new_v4(), &input, grid)
        .expect("card creation")
}

fn occupancy(items: &SqliteItemRepository<'_>, card: &Card) -> Vec<(usize, String)> {
    items
        .list_items(card.id)
        .unwrap()
        .into_iter()
        .map(|item| (item.position, item.content))
        .collect()
}

#[test]
fn insert_at_explicit_position_and_read_back() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::with_center_free_space(5).unwrap());
    let items = SqliteItemRepository::try_new(&conn).unwrap();

    let item = items.insert_item(&card, Some(7), "  Read 12 books ").unwrap();
    assert_eq!(item.position, 7);
    assert_eq!(item.content, "Read 12 books");
    assert!(!item.is_completed);
    assert_eq!(item.completed_at, None);

    let loaded = items.get_item_at(card.id, 7).unwrap().unwrap();
    assert_eq!(loaded, item);
    assert_eq!(items.count_items(card.id).unwrap(), 1);
}

#[test]
fn insert_rejects_occupied_free_and_out_of_range_positions() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::with_center_free_space(5).unwrap());
    let items = SqliteItemRepository::new(&conn);
    items.insert_item(&card, Some(0), "first").unwrap();

    assert!(matches!(
        items.insert_item(&card, Some(0), "second"),
        Err(RepoError::PositionOccupied { position: 0, .. })
    ));
    assert!(matches!(
        items.insert_item(&card, Some(12), "free"),
        Err(RepoError::Grid(GridError::PositionIsFreeSpace { position: 12 }))
    ));
    assert!(matches!(
        items.insert_item(&card, Some(25), "outside"),
        Err(RepoError::Grid(GridError::PositionOutOfRange { position: 25, .. }))
    ));
    assert!(matches!(
        items.insert_item(&card, Some(1), "   "),
        Err(RepoError::Content(ItemContentError::EmptyContent))
    ));
    assert_eq!(items.count_items(card.id).unwrap(), 1);
}

#[test]
fn insert_without_position_takes_first_empty_cell_and_skips_free_space() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::new(2, true, 0).unwrap());
    let items = SqliteItemRepository::new(&conn);

    let a = items.insert_item(&card, None, "a").unwrap();
    let b = items.insert_item(&card, None, "b").unwrap();
    let c = items.insert_item(&card, None, "c").unwrap();
    assert_eq!((a.position, b.position, c.position), (1, 2, 3));

    assert!(matches!(
        items.insert_item(&card, None, "d"),
        Err(RepoError::CapacityExceeded {
            capacity: 3,
            requested: 1,
            ..
        })
    ));
}

#[test]
fn fill_empty_is_all_or_nothing() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::without_free_space(2).unwrap());
    let items = SqliteItemRepository::new(&conn);
    items.insert_item(&card, Some(1), "existing").unwrap();

    let too_many: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        items.fill_empty(&card, &too_many),
        Err(RepoError::CapacityExceeded { requested: 4, .. })
    ));

    let with_blank: Vec<String> = ["a", " "].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        items.fill_empty(&card, &with_blank),
        Err(RepoError::Content(_))
    ));
    assert_eq!(items.count_items(card.id).unwrap(), 1);

    let goals: Vec<String> = ["x", "y"].iter().map(|s| s.to_string()).collect();
    let created = items.fill_empty(&card, &goals).unwrap();
    let positions: Vec<usize> = created.iter().map(|item| item.position).collect();
    assert_eq!(positions, vec![0, 2]);
    assert_eq!(items.count_items(card.id).unwrap(), 3);
}

#[test]
fn remove_missing_item_returns_item_not_found() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::without_free_space(3).unwrap());
    let items = SqliteItemRepository::new(&conn);
    items.insert_item(&card, Some(4), "walk daily").unwrap();

    items.remove_item(&card, 4).unwrap();
    assert!(matches!(
        items.remove_item(&card, 4),
        Err(RepoError::ItemNotFound { position: 4, .. })
    ));
}

#[test]
fn swap_handles_filled_half_filled_and_empty_pairs() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::with_center_free_space(3).unwrap());
    let items = SqliteItemRepository::new(&conn);
    let first = items.insert_item(&card, Some(0), "alpha").unwrap();
    let second = items.insert_item(&card, Some(1), "beta").unwrap();

    items.swap_positions(&card, 0, 1).unwrap();
    assert_eq!(items.get_item_at(card.id, 0).unwrap().unwrap().id, second.id);
    assert_eq!(items.get_item_at(card.id, 1).unwrap().unwrap().id, first.id);

    items.swap_positions(&card, 1, 8).unwrap();
    assert!(items.get_item_at(card.id, 1).unwrap().is_none());
    assert_eq!(items.get_item_at(card.id, 8).unwrap().unwrap().content, "alpha");

    let before = occupancy(&items, &card);
    items.swap_positions(&card, 2, 3).unwrap();
    items.swap_positions(&card, 5, 5).unwrap();
    assert_eq!(occupancy(&items, &card), before);
}

#[test]
fn swap_twice_restores_original_layout() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::with_center_free_space(5).unwrap());
    let items = SqliteItemRepository::new(&conn);
    for (position, content) in [(0, "a"), (3, "b"), (17, "c")] {
        items.insert_item(&card, Some(position), content).unwrap();
    }
    let before = occupancy(&items, &card);

    for (a, b) in [(0, 3), (3, 20), (1, 2)] {
        items.swap_positions(&card, a, b).unwrap();
        items.swap_positions(&card, a, b).unwrap();
        assert_eq!(occupancy(&items, &card), before);
    }
}

#[test]
fn swap_with_free_space_is_rejected() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::with_center_free_space(5).unwrap());
    let items = SqliteItemRepository::new(&conn);
    items.insert_item(&card, Some(0), "a").unwrap();

    assert!(matches!(
        items.swap_positions(&card, 0, 12),
        Err(RepoError::Grid(GridError::PositionIsFreeSpace { position: 12 }))
    ));
    assert_eq!(items.get_item_at(card.id, 0).unwrap().unwrap().content, "a");
}

#[test]
fn shuffle_preserves_contents_and_completion_and_uses_valid_positions() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::with_center_free_space(5).unwrap());
    let items = SqliteItemRepository::new(&conn);
    let goals: Vec<String> = (0..10).map(|i| format!("goal {i}")).collect();
    items.fill_empty(&card, &goals).unwrap();
    items.set_completion(&card, 3, true, Some("done early")).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let shuffled = items.shuffle(&card, &mut rng).unwrap();

    assert_eq!(shuffled.len(), 10);
    let contents: BTreeSet<String> = shuffled.iter().map(|i| i.content.clone()).collect();
    assert_eq!(contents, goals.iter().cloned().collect::<BTreeSet<_>>());

    let positions: BTreeSet<usize> = shuffled.iter().map(|i| i.position).collect();
    assert_eq!(positions.len(), 10);
    assert!(!positions.contains(&12));
    assert!(positions.iter().all(|p| *p < 25));

    let completed: Vec<_> = shuffled.iter().filter(|i| i.is_completed).collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].content, "goal 3");
    assert_eq!(completed[0].notes.as_deref(), Some("done early"));
}

#[test]
fn set_completion_stamps_and_clears_completed_at() {
    let conn = setup();
    let card = create_card(&conn, GridConfig::without_free_space(2).unwrap());
    let items = SqliteItemRepository::new(&conn);
    items.insert_item(&card, Some(2), "learn piano").unwrap();

    let done = items.set_completion(&card, 2, true, None).unwrap();
    assert!(done.is_completed);
    assert!(done.completed_at.is_some());

    let again = items.set_completion(&card, 2, true, Some("recital")).unwrap();
    assert_eq!(again.completed_at, done.completed_at);
    assert_eq!(again.notes.as_deref(), Some("recital"));

    let undone = items.set_completion(&card, 2, false, None).unwrap();
    assert!(!undone.is_completed);
    assert_eq!(undone.completed_at, None);
    assert_eq!(undone.notes.as_deref(), Some("recital"));

    let cleared = items.set_notes(&card, 2, Some("  ")).unwrap();
    assert_eq!(cleared.notes, None);

    assert!(matches!(
        items.set_completion(&card, 0, true, None),
        Err(RepoError::ItemNotFound { position: 0, .. })
    ));
    assert_eq!(
        items.completed_positions(card.id).unwrap(),
        BTreeSet::new()
    );
}

#[test]
fn finalized_card_locks_layout_but_not_completion() {
    let conn = setup();
    let mut card = create_card(&conn, GridConfig::without_free_space(2).unwrap());
    let items = SqliteItemRepository::new(&conn);
    let goals: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    items.fill_empty(&card, &goals).unwrap();

    SqliteCardRepository::new(&conn).mark_finalized(card.id).unwrap();
    card = SqliteCardRepository::new(&conn)
        .get_card(card.id)
        .unwrap()
        .unwrap();
    assert!(card.is_finalized);
    assert!(card.finalized_at.is_some());

    let locked = CardStateError::CardFinalized(card.id);
    assert!(matches!(items.remove_item(&card, 0), Err(RepoError::State(ref e)) if *e == locked));
    assert!(matches!(items.swap_positions(&card, 0, 1), Err(RepoError::State(_))));
    assert!(matches!(
        items.shuffle(&card, &mut StdRng::seed_from_u64(1)),
        Err(RepoError::State(_))
    ));
    assert!(matches!(
        items.update_content(&card, 0, "changed"),
        Err(RepoError::State(_))
    ));
    assert!(matches!(
        items.insert_item(&card, None, "extra"),
        Err(RepoError::State(_))
    ));

    let item = items.set_completion(&card, 1, true, None).unwrap();
    assert!(item.is_completed);
    assert_eq!(
        items.completed_positions(card.id).unwrap(),
        BTreeSet::from([1])
    );
}
