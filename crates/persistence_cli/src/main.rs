//! CLI smoke and inspection entry point.
//!
//! # Responsibility
//! - Print the linked `persistence_core` version.
//! - Print schema version and per-class object counts of a store file.
//!
//! Usage: `persistence_cli [db-path]`

use persistence_core::db::migrations::current_version;
use persistence_core::SqliteObjectStore;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!(
        "persistence_core version={}",
        persistence_core::core_version()
    );

    let Some(path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    match inspect(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn inspect(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteObjectStore::open(path)?;
    println!("schema_version={}", current_version(store.connection())?);

    let counts = store.class_counts()?;
    if counts.is_empty() {
        println!("objects=0");
    }
    for (class_name, count) in counts {
        println!("class={class_name} objects={count}");
    }
    Ok(())
}
