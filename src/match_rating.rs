use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::domain::{MatchId, PlayerId, PlayerStat, PositionGroup};
use crate::error::{Error, Result};
use crate::store;
use crate::voting::{self, BallotPayload};

/// Crowd opinion dominates the blend; stats keep it honest.
const VOTE_WEIGHT: f64 = 0.7;
const STATS_WEIGHT: f64 = 0.3;

/// Shrinkage confidence for rank-derived stars: a player's mean is pulled
/// toward the global mean as if it carried this many extra votes.
const SHRINK_CONFIDENCE: f64 = 3.0;
const DEFAULT_MEAN_STARS: f64 = 2.5;

/// Per-player breakdown of one match's rating computation.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub position: PositionGroup,
    pub goals: i64,
    pub assists: i64,
    pub in_photo: bool,
    /// Crowd component, 0–10.
    pub vote_rating: f64,
    /// Stat component, 0–10.
    pub stats_rating: f64,
    /// `0.7*vote + 0.3*stats`, rounded to 2 decimals.
    pub final_rating: f64,
    /// Raw ballots that mentioned this player; award tie-breaker.
    pub vote_count: usize,
}

/// Best-of-match picks. A slot is None when no present player belongs to
/// that position group.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MatchAwards {
    pub craque: Option<PlayerId>,
    pub goalkeeper: Option<PlayerId>,
    pub defender: Option<PlayerId>,
    pub midfielder: Option<PlayerId>,
    pub forward: Option<PlayerId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRatings {
    pub match_id: MatchId,
    pub scores: HashMap<PlayerId, PlayerScore>,
    pub awards: MatchAwards,
}

/// Blend the match's ballots and stats into a final 0–10 rating per present
/// player, and pick the per-position award winners.
///
/// A match with no present stats returns [`Error::NoStats`] — it is not
/// ratable yet, which callers render as a placeholder, not a failure.
pub fn compute_match_ratings(conn: &Connection, match_id: MatchId) -> Result<MatchRatings> {
    let stats = store::present_stats_for_match(conn, match_id)?;
    if stats.is_empty() {
        return Err(Error::NoStats(match_id));
    }

    let positions: HashMap<PlayerId, PositionGroup> = store::load_players(conn)?
        .into_iter()
        .map(|p| (p.id, p.position))
        .collect();

    let ballots = voting::load_ballots(conn, match_id)?;
    let (crowd, vote_counts) = vote_ratings(&ballots, &stats);

    let max_goals = stats.iter().map(|s| s.goals).max().unwrap_or(0);
    let max_assists = stats.iter().map(|s| s.assists).max().unwrap_or(0);

    let mut scores = HashMap::with_capacity(stats.len());
    for stat in &stats {
        let position = positions
            .get(&stat.player_id)
            .copied()
            .unwrap_or(PositionGroup::Other);
        let stats_rating = stats_rating(
            position,
            stat.goals,
            stat.assists,
            stat.in_photo,
            max_goals,
            max_assists,
        );
        let vote_rating = crowd
            .get(&stat.player_id)
            .copied()
            .unwrap_or(DEFAULT_MEAN_STARS * 2.0);
        let final_rating = round2(VOTE_WEIGHT * vote_rating + STATS_WEIGHT * stats_rating)
            .clamp(0.0, 10.0);
        scores.insert(
            stat.player_id,
            PlayerScore {
                player_id: stat.player_id,
                position,
                goals: stat.goals,
                assists: stat.assists,
                in_photo: stat.in_photo,
                vote_rating,
                stats_rating,
                final_rating,
                vote_count: vote_counts.get(&stat.player_id).copied().unwrap_or(0),
            },
        );
    }

    let awards = pick_awards(&scores);
    Ok(MatchRatings {
        match_id,
        scores,
        awards,
    })
}

/// Crowd component per player, 0–10, plus raw mention counts.
///
/// Explicit star ballots win over rank orderings: the rank fallback only
/// runs when not a single explicit rating exists in the ballot set.
fn vote_ratings(
    ballots: &[voting::Ballot],
    stats: &[PlayerStat],
) -> (HashMap<PlayerId, f64>, HashMap<PlayerId, usize>) {
    let mut explicit: HashMap<PlayerId, Vec<f64>> = HashMap::new();
    let mut ranked: HashMap<PlayerId, Vec<f64>> = HashMap::new();
    let mut counts: HashMap<PlayerId, usize> = HashMap::new();

    for ballot in ballots {
        match &ballot.payload {
            BallotPayload::Stars { votes } => {
                for vote in votes {
                    explicit
                        .entry(vote.player_id)
                        .or_default()
                        .push(f64::from(vote.stars.min(5)));
                    *counts.entry(vote.player_id).or_default() += 1;
                }
            }
            BallotPayload::Ranking { groups } => {
                for group in groups {
                    let n = group.ordered.len();
                    for (rank, player_id) in group.ordered.iter().enumerate() {
                        ranked
                            .entry(*player_id)
                            .or_default()
                            .push(stars_for_rank(rank, n));
                        *counts.entry(*player_id).or_default() += 1;
                    }
                }
            }
            // The single-candidate link carries no rating, but it is still a
            // raw vote for award tie-breaking.
            BallotPayload::VoteLink { best_overall } => {
                if let Some(player_id) = best_overall {
                    *counts.entry(*player_id).or_default() += 1;
                }
            }
        }
    }

    let mut out = HashMap::new();
    if !explicit.is_empty() {
        let all: Vec<f64> = explicit.values().flatten().copied().collect();
        let mean = all.iter().sum::<f64>() / all.len() as f64;
        for stat in stats {
            let rating = match explicit.get(&stat.player_id) {
                Some(stars) => stars.iter().sum::<f64>() / stars.len() as f64,
                // No explicit vote for this player: hold them at the crowd's
                // mean instead of zeroing them out.
                None => mean,
            };
            out.insert(stat.player_id, (rating * 2.0).clamp(0.0, 10.0));
        }
        return (out, counts);
    }

    if !ranked.is_empty() {
        let all: Vec<f64> = ranked.values().flatten().copied().collect();
        let mean = all.iter().sum::<f64>() / all.len() as f64;
        for stat in stats {
            let stars = match ranked.get(&stat.player_id) {
                Some(values) => shrink_toward(values, mean),
                None => mean,
            };
            out.insert(stat.player_id, (stars * 2.0).clamp(0.0, 10.0));
        }
        return (out, counts);
    }

    // No ballots at all: everyone sits at the default mean.
    for stat in stats {
        out.insert(stat.player_id, (DEFAULT_MEAN_STARS * 2.0).clamp(0.0, 10.0));
    }
    (out, counts)
}

/// Linear rank-to-stars map: best gets 5, last gets 1, a lone candidate
/// gets 5 by definition.
fn stars_for_rank(rank: usize, group_size: usize) -> f64 {
    if group_size <= 1 {
        return 5.0;
    }
    let span = (group_size - 1) as f64;
    5.0 - 4.0 * (rank as f64 / span)
}

/// Bayesian shrinkage of a player's mean stars toward the global mean, with
/// [`SHRINK_CONFIDENCE`] pseudo-votes. Few real votes barely move a player
/// off the consensus; many real votes let their own mean dominate.
fn shrink_toward(values: &[f64], global_mean: f64) -> f64 {
    if values.is_empty() {
        return global_mean;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    (sum + SHRINK_CONFIDENCE * global_mean) / (n + SHRINK_CONFIDENCE)
}

/// Stat component, 0–10. Goals and assists are normalized against this
/// match's own maxima, not the cohort's; the photo flag is a flat bonus
/// whose weight grows for positions whose work the scoreline hides.
fn stats_rating(
    position: PositionGroup,
    goals: i64,
    assists: i64,
    in_photo: bool,
    max_goals: i64,
    max_assists: i64,
) -> f64 {
    let (goals_w, assists_w, photo_w) = match position {
        PositionGroup::Goalkeeper => (0.2, 0.3, 0.5),
        PositionGroup::Defender => (0.3, 0.4, 0.3),
        PositionGroup::Midfielder => (0.4, 0.4, 0.2),
        PositionGroup::Forward | PositionGroup::Other => (0.6, 0.3, 0.1),
    };
    let goals_norm = if max_goals > 0 {
        goals as f64 / max_goals as f64
    } else {
        0.0
    };
    let assists_norm = if max_assists > 0 {
        assists as f64 / max_assists as f64
    } else {
        0.0
    };
    let photo = if in_photo { 1.0 } else { 0.0 };
    let raw = (goals_w * goals_norm + assists_w * assists_norm + photo_w * photo).clamp(0.0, 1.0);
    raw * 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pick the best player overall and per position group. Ties break by
/// goals+assists, then raw vote count, then player id so the result never
/// depends on map iteration order.
fn pick_awards(scores: &HashMap<PlayerId, PlayerScore>) -> MatchAwards {
    let mut ordered: Vec<&PlayerScore> = scores.values().collect();
    ordered.sort_by(|a, b| {
        b.final_rating
            .total_cmp(&a.final_rating)
            .then_with(|| (b.goals + b.assists).cmp(&(a.goals + a.assists)))
            .then_with(|| b.vote_count.cmp(&a.vote_count))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    let best_in = |group: PositionGroup| {
        ordered
            .iter()
            .find(|s| s.position == group)
            .map(|s| s.player_id)
    };
    MatchAwards {
        craque: ordered.first().map(|s| s.player_id),
        goalkeeper: best_in(PositionGroup::Goalkeeper),
        defender: best_in(PositionGroup::Defender),
        midfielder: best_in(PositionGroup::Midfielder),
        forward: best_in(PositionGroup::Forward),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_star_interpolation() {
        assert_eq!(stars_for_rank(0, 1), 5.0);
        assert_eq!(stars_for_rank(0, 5), 5.0);
        assert_eq!(stars_for_rank(4, 5), 1.0);
        assert_eq!(stars_for_rank(2, 5), 3.0);
    }

    #[test]
    fn shrinkage_pulls_small_samples_to_consensus() {
        // One 5-star vote against a 2.5 mean lands well under 5.
        let one_vote = shrink_toward(&[5.0], 2.5);
        assert!((one_vote - (5.0 + 3.0 * 2.5) / 4.0).abs() < 1e-9);
        // Many identical votes converge on the player's own mean.
        let many: Vec<f64> = vec![5.0; 100];
        assert!(shrink_toward(&many, 2.5) > 4.8);
        // Zero votes is exactly the global mean.
        assert_eq!(shrink_toward(&[], 2.5), 2.5);
    }

    #[test]
    fn stats_rating_clamps_and_scales() {
        // Forward with the match-best goals and a photo: 0.6 + 0.1, no assists.
        let r = stats_rating(PositionGroup::Forward, 3, 0, true, 3, 2);
        assert!((r - 7.0).abs() < 1e-9);
        // Keeper carried by the photo bonus.
        let gk = stats_rating(PositionGroup::Goalkeeper, 0, 0, true, 3, 2);
        assert!((gk - 5.0).abs() < 1e-9);
        // Zero maxima contribute nothing.
        assert_eq!(stats_rating(PositionGroup::Other, 0, 0, false, 0, 0), 0.0);
    }
}
