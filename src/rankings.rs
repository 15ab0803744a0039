use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rusqlite::Connection;
use serde::Serialize;

use crate::cache::TtlCache;
use crate::domain::{MatchId, Player, PlayerId, PositionGroup, RankingFilter};
use crate::error::Result;
use crate::match_rating;
use crate::overall::{self, OverallEntry};
use crate::store;

/// Weighted-composite weights (goals / assists / rating, summing to 10).
const WEIGHTED: (f64, f64, f64) = (4.0, 2.0, 4.0);
/// Recent-form weights; form leans harder on the crowd rating.
const RECENT: (f64, f64, f64) = (3.0, 2.0, 5.0);
/// How many of the most recently played matches count as "recent form".
const RECENT_MATCHES: usize = 10;

/// The team colors a pelada is drawn into.
pub static TEAM_COLORS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["laranja", "preto", "branco", "verde"]);

// Winner colors were not recorded during the first season; the tally for
// exactly that year is backfilled from the old spreadsheet. Narrow,
// deliberate exception — do not extend it to other periods.
const LEGACY_COLOR_SEASON: i32 = 2019;
const LEGACY_COLOR_WINS: &[(&str, i64)] = &[
    ("laranja", 11),
    ("preto", 9),
    ("branco", 7),
    ("verde", 5),
];

#[derive(Debug, Clone, Serialize)]
pub struct RankingRow {
    pub player_id: PlayerId,
    pub name: String,
    pub nickname: Option<String>,
    pub position: PositionGroup,
    pub goals: i64,
    pub assists: i64,
    pub matches: i64,
    pub photos: i64,
    /// Average of per-match final ratings inside the window, 0 if none.
    pub rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeRow {
    pub player_id: PlayerId,
    pub name: String,
    pub position: PositionGroup,
    pub goals: i64,
    pub assists: i64,
    pub rating: f64,
    /// Fixed-weight blend of normalized goals/assists and rating, 0–10.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallRow {
    pub player_id: PlayerId,
    pub name: String,
    pub position: PositionGroup,
    pub goals: i64,
    pub assists: i64,
    pub rating: f64,
    pub overall: i64,
    /// True when a manually pinned overall replaced the computed one.
    pub from_override: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardCountRow {
    pub player_id: PlayerId,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColorWinRow {
    pub color: String,
    pub wins: i64,
}

/// All the parallel leaderboards one filter tuple produces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankingSet {
    pub goals: Vec<RankingRow>,
    pub assists: Vec<RankingRow>,
    pub goals_assists: Vec<RankingRow>,
    pub ratings: Vec<RankingRow>,
    pub matches: Vec<RankingRow>,
    pub photos: Vec<RankingRow>,
    pub weighted: Vec<CompositeRow>,
    pub recent: Vec<CompositeRow>,
    pub overall: Vec<OverallRow>,
    pub weekly_awards: Vec<AwardCountRow>,
    pub monthly_awards: Vec<AwardCountRow>,
    pub color_wins: Vec<ColorWinRow>,
}

pub type RankingCache = TtlCache<RankingSet>;

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    goals: i64,
    assists: i64,
    matches: i64,
    photos: i64,
    rating_sum: f64,
    rating_n: i64,
}

impl Totals {
    fn rating(&self) -> f64 {
        if self.rating_n > 0 {
            self.rating_sum / self.rating_n as f64
        } else {
            0.0
        }
    }
}

/// Build every leaderboard for one filter tuple. The heavy part — one
/// match-rating computation per distinct match in the window — runs at most
/// once per request and the whole result is cached for the TTL.
pub fn build_rankings(
    conn: &Connection,
    filter: &RankingFilter,
    cache: &RankingCache,
) -> Result<RankingSet> {
    let key = filter.cache_key();
    if let Some(hit) = cache.get(&key) {
        return Ok(hit);
    }

    let window = filter.window();
    let players: HashMap<PlayerId, Player> = store::load_players(conn)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let pool: HashSet<PlayerId> = players
        .values()
        .filter(|p| filter.position.is_none_or(|pos| p.position == pos))
        .map(|p| p.id)
        .collect();

    let stats = store::present_stats_in_window(conn, &window)?;

    // Final ratings, one engine run per distinct match. A failed run is
    // contained: that match falls back to stored stat ratings and the
    // leaderboard still builds.
    let mut match_ratings: HashMap<MatchId, Option<HashMap<PlayerId, f64>>> = HashMap::new();
    for stat in &stats {
        if match_ratings.contains_key(&stat.match_id) {
            continue;
        }
        let computed = match match_rating::compute_match_ratings(conn, stat.match_id) {
            Ok(ratings) => Some(
                ratings
                    .scores
                    .into_iter()
                    .map(|(id, score)| (id, score.final_rating))
                    .collect(),
            ),
            Err(err) => {
                tracing::warn!(match_id = stat.match_id, %err, "match rating failed, using stored ratings");
                None
            }
        };
        match_ratings.insert(stat.match_id, computed);
    }
    let final_rating = |stat: &store::WindowStat| -> Option<f64> {
        match match_ratings.get(&stat.match_id) {
            Some(Some(ratings)) => ratings.get(&stat.player_id).copied().or(stat.rating),
            _ => stat.rating,
        }
    };

    let mut totals: HashMap<PlayerId, Totals> = HashMap::new();
    for stat in &stats {
        if !pool.contains(&stat.player_id) {
            continue;
        }
        let entry = totals.entry(stat.player_id).or_default();
        entry.goals += stat.goals;
        entry.assists += stat.assists;
        entry.matches += 1;
        entry.photos += i64::from(stat.in_photo);
        if let Some(rating) = final_rating(stat) {
            entry.rating_sum += rating;
            entry.rating_n += 1;
        }
    }

    // Recent form folds over the last N matches by played date. The match
    // set is cut by date alone; the position filter only selects whose rows
    // are aggregated.
    let mut seen = HashSet::new();
    let mut match_order: Vec<MatchId> = Vec::new();
    for stat in &stats {
        if seen.insert(stat.match_id) {
            match_order.push(stat.match_id);
        }
    }
    let recent_ids: HashSet<MatchId> = match_order
        .iter()
        .rev()
        .take(RECENT_MATCHES)
        .copied()
        .collect();
    let mut recent_totals: HashMap<PlayerId, Totals> = HashMap::new();
    for stat in &stats {
        if !recent_ids.contains(&stat.match_id) || !pool.contains(&stat.player_id) {
            continue;
        }
        let entry = recent_totals.entry(stat.player_id).or_default();
        entry.goals += stat.goals;
        entry.assists += stat.assists;
        entry.matches += 1;
        entry.photos += i64::from(stat.in_photo);
        if let Some(rating) = final_rating(stat) {
            entry.rating_sum += rating;
            entry.rating_n += 1;
        }
    }

    let row_for = |id: &PlayerId, t: &Totals| -> Option<RankingRow> {
        let player = players.get(id)?;
        Some(RankingRow {
            player_id: *id,
            name: player.name.clone(),
            nickname: player.nickname.clone(),
            position: player.position,
            goals: t.goals,
            assists: t.assists,
            matches: t.matches,
            photos: t.photos,
            rating: t.rating(),
        })
    };
    let rows: Vec<RankingRow> = totals
        .iter()
        .filter_map(|(id, t)| row_for(id, t))
        .collect();

    let set = RankingSet {
        goals: sorted_rows(&rows, participation, |a, b| {
            b.goals
                .cmp(&a.goals)
                .then_with(|| b.assists.cmp(&a.assists))
                .then_with(|| b.matches.cmp(&a.matches))
        }),
        assists: sorted_rows(&rows, participation, |a, b| {
            b.assists
                .cmp(&a.assists)
                .then_with(|| b.goals.cmp(&a.goals))
                .then_with(|| b.matches.cmp(&a.matches))
        }),
        goals_assists: sorted_rows(&rows, participation, |a, b| {
            (b.goals + b.assists)
                .cmp(&(a.goals + a.assists))
                .then_with(|| b.goals.cmp(&a.goals))
                .then_with(|| b.matches.cmp(&a.matches))
        }),
        ratings: sorted_rows(
            &rows,
            |r| r.matches > 0 && r.rating > 0.0,
            |a, b| {
                b.rating
                    .total_cmp(&a.rating)
                    .then_with(|| b.matches.cmp(&a.matches))
                    .then_with(|| b.goals.cmp(&a.goals))
            },
        ),
        matches: sorted_rows(&rows, participation, |a, b| {
            b.matches
                .cmp(&a.matches)
                .then_with(|| b.goals.cmp(&a.goals))
                .then_with(|| b.assists.cmp(&a.assists))
        }),
        photos: sorted_rows(
            &rows,
            |r| r.photos > 0,
            |a, b| {
                b.photos
                    .cmp(&a.photos)
                    .then_with(|| b.matches.cmp(&a.matches))
            },
        ),
        weighted: composite_rows(&rows, WEIGHTED),
        recent: composite_rows(
            &recent_totals
                .iter()
                .filter_map(|(id, t)| row_for(id, t))
                .collect::<Vec<_>>(),
            RECENT,
        ),
        overall: overall_rows(&rows, &players),
        weekly_awards: award_counts(store::load_weekly_awards(conn)?, &window, &pool, &players),
        monthly_awards: award_counts(store::load_monthly_awards(conn)?, &window, &pool, &players),
        color_wins: color_wins(conn, filter)?,
    };

    cache.put(&key, set.clone());
    Ok(set)
}

/// Default inclusion rule: any participation at all.
fn participation(row: &RankingRow) -> bool {
    row.matches > 0 || row.goals > 0 || row.assists > 0
}

fn sorted_rows(
    rows: &[RankingRow],
    include: impl Fn(&RankingRow) -> bool,
    chain: impl Fn(&RankingRow, &RankingRow) -> std::cmp::Ordering,
) -> Vec<RankingRow> {
    let mut out: Vec<RankingRow> = rows.iter().filter(|r| include(r)).cloned().collect();
    // Every chain terminates in name then id; two identical stat lines
    // always land in the same order.
    out.sort_by(|a, b| {
        chain(a, b)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    out
}

fn composite_rows(rows: &[RankingRow], weights: (f64, f64, f64)) -> Vec<CompositeRow> {
    let (goals_w, assists_w, rating_w) = weights;
    let max_goals = rows.iter().map(|r| r.goals).max().unwrap_or(0);
    let max_assists = rows.iter().map(|r| r.assists).max().unwrap_or(0);
    let mut out: Vec<CompositeRow> = rows
        .iter()
        .filter(|r| participation(r))
        .map(|r| {
            let goals_norm = if max_goals > 0 {
                r.goals as f64 / max_goals as f64 * 10.0
            } else {
                0.0
            };
            let assists_norm = if max_assists > 0 {
                r.assists as f64 / max_assists as f64 * 10.0
            } else {
                0.0
            };
            let score =
                (goals_w * goals_norm + assists_w * assists_norm + rating_w * r.rating) / 10.0;
            CompositeRow {
                player_id: r.player_id,
                name: r.name.clone(),
                position: r.position,
                goals: r.goals,
                assists: r.assists,
                rating: r.rating,
                score,
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.rating.total_cmp(&a.rating))
            .then_with(|| b.goals.cmp(&a.goals))
            .then_with(|| b.assists.cmp(&a.assists))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    out
}

fn overall_rows(rows: &[RankingRow], players: &HashMap<PlayerId, Player>) -> Vec<OverallRow> {
    let entries: Vec<OverallEntry> = rows
        .iter()
        .filter(|r| participation(r))
        .map(|r| OverallEntry {
            player_id: r.player_id,
            name: r.name.clone(),
            position: r.position,
            goals: r.goals,
            assists: r.assists,
            matches: r.matches,
            rating: r.rating,
        })
        .collect();
    let (scores, _) = overall::compute_overall(&entries);
    let mut out: Vec<OverallRow> = scores
        .into_iter()
        .map(|score| {
            let pinned = players
                .get(&score.entry.player_id)
                .and_then(|p| p.overall_override);
            OverallRow {
                player_id: score.entry.player_id,
                name: score.entry.name,
                position: score.entry.position,
                goals: score.entry.goals,
                assists: score.entry.assists,
                rating: score.entry.rating,
                overall: pinned.unwrap_or(score.overall),
                from_override: pinned.is_some(),
            }
        })
        .collect();
    out.sort_by(|a, b| {
        b.overall
            .cmp(&a.overall)
            .then_with(|| b.rating.total_cmp(&a.rating))
            .then_with(|| b.goals.cmp(&a.goals))
            .then_with(|| b.assists.cmp(&a.assists))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    out
}

fn award_counts(
    awards: Vec<store::AwardRow>,
    window: &crate::domain::DateWindow,
    pool: &HashSet<PlayerId>,
    players: &HashMap<PlayerId, Player>,
) -> Vec<AwardCountRow> {
    let mut counts: HashMap<PlayerId, i64> = HashMap::new();
    for award in awards {
        if !window.contains(award.awarded_on) || !pool.contains(&award.player_id) {
            continue;
        }
        *counts.entry(award.player_id).or_default() += 1;
    }
    let mut out: Vec<AwardCountRow> = counts
        .into_iter()
        .filter_map(|(player_id, count)| {
            let player = players.get(&player_id)?;
            Some(AwardCountRow {
                player_id,
                name: player.name.clone(),
                count,
            })
        })
        .collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    out
}

fn color_wins(conn: &Connection, filter: &RankingFilter) -> Result<Vec<ColorWinRow>> {
    let matches = store::matches_in_window(conn, &filter.window())?;
    let mut counts: HashMap<&'static str, i64> = HashMap::new();
    for m in &matches {
        let Some(raw) = m.winner_color.as_deref() else {
            continue;
        };
        let normalized = raw.trim().to_lowercase();
        if let Some(color) = TEAM_COLORS.iter().find(|c| **c == normalized) {
            *counts.entry(*color).or_default() += 1;
        }
    }

    // First-season backfill: that year has matches but no recorded winners.
    if counts.is_empty()
        && filter.year == Some(LEGACY_COLOR_SEASON)
        && filter.month.is_none()
    {
        return Ok(LEGACY_COLOR_WINS
            .iter()
            .map(|(color, wins)| ColorWinRow {
                color: (*color).to_string(),
                wins: *wins,
            })
            .collect());
    }

    let mut out: Vec<ColorWinRow> = TEAM_COLORS
        .iter()
        .map(|color| ColorWinRow {
            color: (*color).to_string(),
            wins: counts.get(color).copied().unwrap_or(0),
        })
        .collect();
    out.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.color.cmp(&b.color)));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: PlayerId, goals: i64, assists: i64, matches: i64, rating: f64) -> RankingRow {
        RankingRow {
            player_id: id,
            name: format!("P{id:02}"),
            nickname: None,
            position: PositionGroup::Other,
            goals,
            assists,
            matches,
            photos: 0,
            rating,
        }
    }

    #[test]
    fn goal_ties_break_by_assists_then_matches() {
        let rows = vec![row(1, 5, 1, 9, 0.0), row(2, 5, 3, 4, 0.0), row(3, 5, 1, 12, 0.0)];
        let sorted = sorted_rows(&rows, participation, |a, b| {
            b.goals
                .cmp(&a.goals)
                .then_with(|| b.assists.cmp(&a.assists))
                .then_with(|| b.matches.cmp(&a.matches))
        });
        let order: Vec<PlayerId> = sorted.iter().map(|r| r.player_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn identical_lines_order_by_name_then_id() {
        let rows = vec![row(7, 2, 2, 2, 5.0), row(3, 2, 2, 2, 5.0)];
        let sorted = sorted_rows(&rows, participation, |a, b| b.goals.cmp(&a.goals));
        let order: Vec<PlayerId> = sorted.iter().map(|r| r.player_id).collect();
        assert_eq!(order, vec![3, 7]);
    }

    #[test]
    fn composite_normalizes_against_pool_maxima() {
        let rows = vec![row(1, 10, 4, 8, 8.0), row(2, 5, 2, 8, 6.0)];
        let scored = composite_rows(&rows, WEIGHTED);
        // Leader: (4*10 + 2*10 + 4*8) / 10 = 9.2
        assert!((scored[0].score - 9.2).abs() < 1e-9);
        assert_eq!(scored[0].player_id, 1);
        // Runner-up: (4*5 + 2*5 + 4*6) / 10 = 5.4
        assert!((scored[1].score - 5.4).abs() < 1e-9);
    }

    #[test]
    fn empty_pool_means_empty_composites() {
        assert!(composite_rows(&[], WEIGHTED).is_empty());
    }
}
