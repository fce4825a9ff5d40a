mod config;
mod error;
mod filmaffinity;
mod futbol;
mod pagination;
mod store;
mod tg;
mod watchlist;

use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bot = Bot::from_env();
    let cfg = config::Config::from_env()?;
    tokio::fs::create_dir_all(&cfg.files_dir).await?;

    let films = filmaffinity::FilmClient::new()?;
    let standings = futbol::StandingsClient::new()?;
    let store = store::PageStore::new(cfg.searches_dir.clone()).await?;

    tg::run(bot, cfg, films, standings, store).await;
    Ok(())
}
