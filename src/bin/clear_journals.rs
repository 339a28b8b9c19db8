//! Deletes every journal together with its articles, authors and shortcodes.
//! Admin accounts are left alone.

use dotenv::dotenv;
use env_logger::Env;
use log::{error, info, warn};

use journal_platform::{
    config::Config,
    db::{journal_repository::JournalRepository, Database},
    errors::AppError,
};

fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let db = Database::new(config.database_path.clone());
    db.init()?;

    info!("Clearing journal data in {:?}", db.path());
    let mut repo = JournalRepository::new(db.connect()?);
    let counts = repo.clear_all()?;
    info!(
        "Removed {} journal(s), {} article(s), {} author(s), {} shortcode(s)",
        counts.journals, counts.articles, counts.authors, counts.shortcodes
    );
    Ok(())
}

fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if !std::env::args().skip(1).any(|arg| arg == "--yes") {
        warn!("This deletes all journals and articles. Re-run with --yes to confirm.");
        std::process::exit(2);
    }

    if let Err(e) = run() {
        error!("Failed to clear journals: {}", e);
        std::process::exit(1);
    }
}
