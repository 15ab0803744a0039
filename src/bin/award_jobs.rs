use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use pelada_league::awards;
use pelada_league::store;

/// Award maintenance. `--match N` records the weekly craque for one match;
/// `--year Y --month M` records a month's winners; `--year Y` alone closes
/// out the season.
fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let db_path = parse_flag("--db")
        .map(PathBuf::from)
        .or_else(store::default_db_path)
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;

    let match_id = parse_flag("--match").and_then(|raw| raw.parse::<i64>().ok());
    let year = parse_flag("--year").and_then(|raw| raw.parse::<i32>().ok());
    let month = parse_flag("--month").and_then(|raw| raw.parse::<u32>().ok());

    match (match_id, year, month) {
        (Some(match_id), _, _) => {
            match awards::record_weekly_award(&conn, match_id)? {
                Some(player_id) => println!("Weekly craque for match {match_id}: player {player_id}"),
                None => println!("Match {match_id} has no ratable stats yet, nothing recorded"),
            }
        }
        (None, Some(year), Some(month)) => {
            let winners = awards::record_monthly_awards(&conn, year, month)?;
            if winners.is_empty() {
                println!("No eligible players in {year}-{month:02}, nothing recorded");
            } else {
                println!("Monthly awards for {year}-{month:02}: {winners:?}");
            }
        }
        (None, Some(year), None) => {
            match awards::record_season_award(&conn, year)? {
                Some(player_id) => println!("Season craque for {year}: player {player_id}"),
                None => println!("No eligible players in {year}, nothing recorded"),
            }
        }
        _ => {
            return Err(anyhow!(
                "pass --match N, or --year Y [--month M] (db: {})",
                db_path.display()
            ));
        }
    }
    Ok(())
}

fn parse_flag(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
