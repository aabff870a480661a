//! Command-line driver for `bingo_core`.
//!
//! Opens the configured database and either renders an existing card or
//! walks a demo card through fill, shuffle, finalize and completion.

use bingo_core::db::{open_db, open_db_in_memory};
use bingo_core::{init_logging, CardService, CardView, CoreConfig, NewCard};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::error::Error;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "bingo", version, about = "Goal bingo card engine driver")]
struct Cli {
    /// Database file; overrides BINGO_DB_PATH.
    #[arg(long)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create, fill and finalize a throwaway card, then print it.
    Demo {
        #[arg(long, default_value_t = bingo_core::DEFAULT_GRID_SIZE)]
        grid_size: usize,
        /// Build the card without a free space.
        #[arg(long)]
        no_free_space: bool,
        /// Number of goals to mark complete after finalizing.
        #[arg(long, default_value_t = 5)]
        complete: usize,
    },
    /// Print one stored card.
    Show {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        card: Uuid,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;

    if let Some(log_dir) = config.log_dir.as_ref().and_then(|dir| dir.to_str()) {
        init_logging(config.log_level, log_dir)?;
    }

    let conn = match cli.db.or(config.db_path) {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };

    match cli.command {
        Command::Demo {
            grid_size,
            no_free_space,
            complete,
        } => run_demo(&conn, grid_size, !no_free_space, complete),
        Command::Show { user, card } => {
            let service = CardService::try_new(&conn)?;
            print_card(&service.get_card(user, card)?);
            Ok(())
        }
    }
}

fn run_demo(
    conn: &Connection,
    grid_size: usize,
    has_free_space: bool,
    complete: usize,
) -> Result<(), Box<dyn Error>> {
    let service = CardService::try_new(conn)?;
    let user_id = Uuid::new_v4();

    let card = service.create_card(
        user_id,
        &NewCard {
            title: Some("Demo goals".to_string()),
            grid_size,
            has_free_space,
            ..NewCard::classic(2026)
        },
    )?;
    let goals: Vec<String> = (1..=card.grid.capacity())
        .map(|index| format!("Goal {index}"))
        .collect();
    service.fill_items(user_id, card.id, &goals)?;
    service.shuffle(user_id, card.id)?;
    service.finalize(user_id, card.id)?;

    for position in card.grid.valid_positions().into_iter().take(complete) {
        service.set_completion(user_id, card.id, position, true, None)?;
    }

    log::info!(
        "event=demo_complete module=cli status=ok card_id={} user_id={user_id}",
        card.id
    );
    println!("user={user_id} card={}", card.id);
    print_card(&service.get_card(user_id, card.id)?);
    Ok(())
}

fn print_card(view: &CardView) {
    let grid = &view.card.grid;
    let size = grid.grid_size();
    let mut cells = vec![" .  ".to_string(); grid.cell_count()];
    if let Some(free) = grid.free_space() {
        cells[free] = "FREE".to_string();
    }
    for item in &view.items {
        let Some((row, col)) = grid.row_col(item.position) else {
            continue;
        };
        let mark = if item.is_completed { "[x]" } else { "[ ]" };
        cells[row * size + col] = format!("{mark}{}", item.position % 10);
    }

    println!(
        "{} {} ({:?})",
        view.card.year,
        view.card.title.as_deref().unwrap_or("untitled"),
        view.card.state()
    );
    for row in cells.chunks(size) {
        println!("{}", row.join(" "));
    }
    println!(
        "completed {}/{} bingos {}",
        view.progress.completed_count, view.progress.capacity, view.progress.bingo_count
    );
}
