use bingo_core::db::open_db;
use bingo_core::{CardService, NewCard};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[test]
fn file_database_runs_in_wal_mode() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = open_db(dir.path().join("bingo.db")).expect("open file db");

    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn write_on_one_card_waits_out_a_write_on_another() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bingo.db");
    let setup = open_db(&path).expect("open setup connection");
    let holder = open_db(&path).expect("open holder connection");
    let writer = open_db(&path).expect("open writer connection");

    let user = Uuid::new_v4();
    let (card_a, card_b) = {
        let service = CardService::try_new(&setup).expect("service on setup connection");
        let a = service
            .create_card(user, &NewCard::classic(2026))
            .expect("create card a");
        let b = service
            .create_card(user, &NewCard::classic(2026))
            .expect("create card b");
        (a.id, b.id)
    };

    holder
        .execute_batch(&format!(
            "BEGIN IMMEDIATE;
             UPDATE cards SET title = 'held' WHERE id = '{card_a}';"
        ))
        .expect("hold write lock on card a");
    let release = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        holder.execute_batch("COMMIT;").expect("commit card a");
        holder
    });

    let started_at = Instant::now();
    let service = CardService::try_new(&writer).expect("service on writer connection");
    let item = service
        .add_item(user, card_b, Some(0), "run a half marathon")
        .expect("write on card b should succeed once card a commits");
    assert_eq!(item.position, 0);
    assert!(started_at.elapsed() < Duration::from_secs(5));

    release.join().expect("holder thread");
    let view = service.get_card(user, card_a).expect("read card a");
    assert_eq!(view.card.title.as_deref(), Some("held"));
    assert_eq!(service.get_card(user, card_b).unwrap().items.len(), 1);
}

#[test]
fn reads_of_other_cards_do_not_wait_for_a_writer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bingo.db");
    let holder = open_db(&path).expect("open holder connection");
    let reader = open_db(&path).expect("open reader connection");

    let user = Uuid::new_v4();
    let service = CardService::try_new(&reader).expect("service on reader connection");
    let card_a = service
        .create_card(user, &NewCard::classic(2026))
        .expect("create card a");
    let card_b = service
        .create_card(user, &NewCard::classic(2025))
        .expect("create card b");

    holder
        .execute_batch(&format!(
            "BEGIN IMMEDIATE;
             UPDATE cards SET title = 'pending' WHERE id = '{}';",
            card_a.id
        ))
        .expect("hold write lock on card a");

    let started_at = Instant::now();
    let view = service.get_card(user, card_b.id).expect("read card b");
    assert_eq!(view.card.id, card_b.id);
    let unchanged = service.get_card(user, card_a.id).expect("read card a");
    assert_eq!(unchanged.card.title, None);
    assert!(started_at.elapsed() < Duration::from_secs(1));

    holder.execute_batch("ROLLBACK;").expect("release card a");
}
