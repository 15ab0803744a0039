use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use pelada_league::achievements;
use pelada_league::overall::{self, OverallEntry};
use pelada_league::store;

/// Nightly maintenance: refresh cumulative totals, re-evaluate achievements,
/// and append an overall-history snapshot for every player (or a subset via
/// --players).
fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let db_path = parse_db_path_arg()
        .or_else(store::default_db_path)
        .context("unable to resolve sqlite path")?;
    let only_players = parse_players_arg();

    let conn = store::open_db(&db_path)?;
    let seeded = achievements::seed_catalog(&conn)?;

    let players = store::load_players(&conn)?;
    let selected: Vec<_> = players
        .iter()
        .filter(|p| {
            only_players
                .as_ref()
                .is_none_or(|ids| ids.contains(&p.id))
        })
        .collect();

    let mut unlocked_total = 0usize;
    for player in &selected {
        store::refresh_player_totals(&conn, player.id)?;
        let newly = achievements::evaluate_achievements(&conn, player.id)?;
        for unlock in &newly {
            println!("  {} unlocked \"{}\"", player.name, unlock.title);
        }
        unlocked_total += newly.len();
    }

    // Overalls are cohort-relative, so the snapshot pass reloads totals and
    // scores the whole pool together even when --players narrowed the
    // achievement pass.
    let refreshed = store::load_players(&conn)?;
    let entries: Vec<OverallEntry> = refreshed
        .iter()
        .map(|p| OverallEntry {
            player_id: p.id,
            name: p.name.clone(),
            position: p.position,
            goals: p.goals,
            assists: p.assists,
            matches: p.matches,
            rating: p.avg_rating,
        })
        .collect();
    let (scores, maxima) = overall::compute_overall(&entries);
    let mut snapshots = 0usize;
    for score in &scores {
        if only_players
            .as_ref()
            .is_none_or(|ids| ids.contains(&score.entry.player_id))
        {
            overall::append_history(&conn, score, maxima)?;
            snapshots += 1;
        }
    }

    println!("Recompute complete");
    println!("DB: {}", db_path.display());
    println!("Catalog entries seeded: {seeded}");
    println!("Players processed: {}", selected.len());
    println!("Achievements newly unlocked: {unlocked_total}");
    println!("Overall snapshots appended: {snapshots}");
    Ok(())
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}

fn parse_players_arg() -> Option<Vec<i64>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--players=") {
            let ids = parse_ids(raw);
            if !ids.is_empty() {
                return Some(ids);
            }
        }
        if arg == "--players"
            && let Some(next) = args.get(idx + 1)
        {
            let ids = parse_ids(next);
            if !ids.is_empty() {
                return Some(ids);
            }
        }
    }
    None
}

fn parse_ids(raw: &str) -> Vec<i64> {
    raw.split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect()
}
