use rusqlite::Connection;

use crate::cache::TtlCache;
use crate::domain::{MatchId, PlayerId, RankingFilter};
use crate::error::{Error, Result};
use crate::match_rating;
use crate::rankings;
use crate::store;

pub const CATEGORY_CRAQUE: &str = "craque";
pub const CATEGORY_ARTILHEIRO: &str = "artilheiro";
pub const CATEGORY_GARCOM: &str = "garcom";

/// Record the craque of one match as that ISO week's award. Re-running
/// after a stat correction replaces the holder; one record per week per
/// category either way.
pub fn record_weekly_award(conn: &Connection, match_id: MatchId) -> Result<Option<PlayerId>> {
    let Some(record) = store::load_match(conn, match_id)? else {
        return Err(Error::InvalidInput(format!("unknown match {match_id}")));
    };
    let ratings = match match_rating::compute_match_ratings(conn, match_id) {
        Ok(ratings) => ratings,
        Err(Error::NoStats(_)) => return Ok(None),
        Err(err) => return Err(err),
    };
    let Some(craque) = ratings.awards.craque else {
        return Ok(None);
    };
    store::upsert_weekly_award(conn, craque, match_id, record.played_at, CATEGORY_CRAQUE)?;
    tracing::info!(match_id, player_id = craque, "weekly craque recorded");
    Ok(Some(craque))
}

/// Winners of one month: weighted-composite leader, top scorer, top
/// assister. Empty month records nothing.
pub fn record_monthly_awards(conn: &Connection, year: i32, month: u32) -> Result<Vec<PlayerId>> {
    if !(1..=12).contains(&month) {
        return Err(Error::InvalidInput(format!("bad month {month}")));
    }
    let filter = RankingFilter {
        year: Some(year),
        month: Some(month),
        position: None,
    };
    // Fresh cache: award jobs must not read a stale leaderboard.
    let set = rankings::build_rankings(conn, &filter, &TtlCache::default())?;

    let mut winners = Vec::new();
    if let Some(top) = set.weighted.first() {
        store::upsert_monthly_award(conn, year, month, CATEGORY_CRAQUE, top.player_id)?;
        winners.push(top.player_id);
    }
    if let Some(top) = set.goals.first()
        && top.goals > 0
    {
        store::upsert_monthly_award(conn, year, month, CATEGORY_ARTILHEIRO, top.player_id)?;
        winners.push(top.player_id);
    }
    if let Some(top) = set.assists.first()
        && top.assists > 0
    {
        store::upsert_monthly_award(conn, year, month, CATEGORY_GARCOM, top.player_id)?;
        winners.push(top.player_id);
    }
    if !winners.is_empty() {
        tracing::info!(year, month, winners = winners.len(), "monthly awards recorded");
    }
    Ok(winners)
}

/// Season craque: weighted-composite leader over the calendar year.
pub fn record_season_award(conn: &Connection, year: i32) -> Result<Option<PlayerId>> {
    let filter = RankingFilter {
        year: Some(year),
        month: None,
        position: None,
    };
    let set = rankings::build_rankings(conn, &filter, &TtlCache::default())?;
    let Some(top) = set.weighted.first() else {
        return Ok(None);
    };
    store::upsert_season_award(conn, year, CATEGORY_CRAQUE, top.player_id)?;
    tracing::info!(year, player_id = top.player_id, "season craque recorded");
    Ok(Some(top.player_id))
}
