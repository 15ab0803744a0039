use rusqlite::Connection;
use serde::Serialize;

use crate::domain::{PlayerId, PositionGroup};
use crate::error::Result;
use crate::store::{self, OverallSnapshot};

/// Overall scores live in a fixed organic band. Even a brand-new player
/// shows up as a plausible FIFA-style card instead of a demoralizing zero.
pub const OVERALL_FLOOR: i64 = 60;
pub const OVERALL_CEIL: i64 = 95;

/// Per-position blend of the four normalized components. Always sums to 1.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OverallWeights {
    pub rating: f64,
    pub goals: f64,
    pub assists: f64,
    pub presence: f64,
}

pub fn weights_for(position: PositionGroup) -> OverallWeights {
    match position {
        // A keeper's scoring output says almost nothing about them; the
        // crowd rating carries most of the signal.
        PositionGroup::Goalkeeper => OverallWeights {
            rating: 0.55,
            goals: 0.05,
            assists: 0.10,
            presence: 0.30,
        },
        PositionGroup::Defender => OverallWeights {
            rating: 0.50,
            goals: 0.10,
            assists: 0.15,
            presence: 0.25,
        },
        PositionGroup::Midfielder => OverallWeights {
            rating: 0.45,
            goals: 0.20,
            assists: 0.20,
            presence: 0.15,
        },
        PositionGroup::Forward => OverallWeights {
            rating: 0.40,
            goals: 0.35,
            assists: 0.15,
            presence: 0.10,
        },
        PositionGroup::Other => OverallWeights {
            rating: 0.45,
            goals: 0.25,
            assists: 0.15,
            presence: 0.15,
        },
    }
}

/// Aggregated input for one player. `rating` is already an average in [0,10].
#[derive(Debug, Clone)]
pub struct OverallEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub position: PositionGroup,
    pub goals: i64,
    pub assists: i64,
    pub matches: i64,
    pub rating: f64,
}

/// Highest value of each stat across the comparison pool; the normalization
/// denominators. Zero when the pool is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CohortMaxima {
    pub goals: i64,
    pub assists: i64,
    pub matches: i64,
}

impl CohortMaxima {
    pub fn of(entries: &[OverallEntry]) -> Self {
        let mut out = Self::default();
        for e in entries {
            out.goals = out.goals.max(e.goals);
            out.assists = out.assists.max(e.assists);
            out.matches = out.matches.max(e.matches);
        }
        out
    }
}

/// The normalized components behind a score, kept for audit and trend charts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OverallBreakdown {
    pub rating_norm: f64,
    pub goals_norm: f64,
    pub assists_norm: f64,
    pub presence_norm: f64,
    /// Weighted sum before band scaling, in [0,1].
    pub raw: f64,
}

#[derive(Debug, Clone)]
pub struct OverallScore {
    pub entry: OverallEntry,
    pub overall: i64,
    pub weights: OverallWeights,
    pub breakdown: OverallBreakdown,
}

/// Compute position-weighted overalls for a pool of players. The score is a
/// snapshot relative to the current pool — cohort maxima move as the data
/// pool grows, so overalls are comparable within one computation, not
/// across seasons.
pub fn compute_overall(entries: &[OverallEntry]) -> (Vec<OverallScore>, CohortMaxima) {
    let maxima = CohortMaxima::of(entries);
    let scores = entries
        .iter()
        .map(|entry| {
            let weights = weights_for(entry.position);
            let breakdown = OverallBreakdown {
                rating_norm: (entry.rating / 10.0).clamp(0.0, 1.0),
                goals_norm: norm(entry.goals, maxima.goals),
                assists_norm: norm(entry.assists, maxima.assists),
                presence_norm: norm(entry.matches, maxima.matches),
                raw: 0.0,
            };
            let raw = weights.rating * breakdown.rating_norm
                + weights.goals * breakdown.goals_norm
                + weights.assists * breakdown.assists_norm
                + weights.presence * breakdown.presence_norm;
            OverallScore {
                entry: entry.clone(),
                overall: band_scale(raw),
                weights,
                breakdown: OverallBreakdown { raw, ..breakdown },
            }
        })
        .collect();
    (scores, maxima)
}

fn norm(value: i64, max: i64) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    (value as f64 / max as f64).clamp(0.0, 1.0)
}

/// Map a raw [0,1] score onto the [60,95] band.
fn band_scale(raw: f64) -> i64 {
    let scaled = OVERALL_FLOOR as f64 + raw.clamp(0.0, 1.0) * (OVERALL_CEIL - OVERALL_FLOOR) as f64;
    (scaled.round() as i64).clamp(OVERALL_FLOOR, OVERALL_CEIL)
}

/// Append one audit snapshot per score; the scorer's only write.
pub fn append_history(conn: &Connection, score: &OverallScore, maxima: CohortMaxima) -> Result<()> {
    store::append_overall_history(
        conn,
        &OverallSnapshot {
            player_id: score.entry.player_id,
            overall: score.overall,
            rating_norm: score.breakdown.rating_norm,
            goals_norm: score.breakdown.goals_norm,
            assists_norm: score.breakdown.assists_norm,
            presence_norm: score.breakdown.presence_norm,
            max_goals: maxima.goals,
            max_assists: maxima.assists,
            max_matches: maxima.matches,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: PlayerId, position: PositionGroup, goals: i64, assists: i64, matches: i64, rating: f64) -> OverallEntry {
        OverallEntry {
            player_id: id,
            name: format!("P{id}"),
            position,
            goals,
            assists,
            matches,
            rating,
        }
    }

    #[test]
    fn zero_entry_scores_exactly_floor() {
        let entries = vec![entry(1, PositionGroup::Other, 0, 0, 0, 0.0)];
        let (scores, maxima) = compute_overall(&entries);
        assert_eq!(scores[0].overall, OVERALL_FLOOR);
        assert_eq!(maxima, CohortMaxima::default());
    }

    #[test]
    fn pool_leader_with_full_rating_hits_ceiling() {
        // Leads every cohort maximum; default-bucket weights sum to 1, so
        // raw = 1.0 and the band tops out.
        let entries = vec![
            entry(1, PositionGroup::Other, 10, 5, 8, 7.0),
            entry(2, PositionGroup::Other, 3, 1, 5, 5.0),
        ];
        let (scores, _) = compute_overall(&entries);
        let leader = &scores[0];
        // rating 7.0/10 * .45 + 1*.25 + 1*.15 + 1*.15 = 0.865
        assert_eq!(leader.overall, band_scale(0.865));
        let full = compute_overall(&[entry(1, PositionGroup::Other, 10, 5, 8, 10.0)]).0;
        assert_eq!(full[0].overall, OVERALL_CEIL);
    }

    #[test]
    fn rating_is_monotonic_all_else_fixed() {
        let base = vec![
            entry(1, PositionGroup::Midfielder, 4, 2, 6, 6.0),
            entry(2, PositionGroup::Midfielder, 8, 3, 6, 6.0),
        ];
        let (low, _) = compute_overall(&base);
        let mut bumped = base.clone();
        bumped[0].rating = 8.5;
        let (high, _) = compute_overall(&bumped);
        assert!(high[0].overall >= low[0].overall);
    }

    #[test]
    fn goalkeeper_leans_on_rating_not_goals() {
        let gk_low = compute_overall(&[entry(1, PositionGroup::Goalkeeper, 5, 0, 10, 4.0)]).0[0].overall;
        let gk_high = compute_overall(&[entry(1, PositionGroup::Goalkeeper, 0, 0, 10, 9.0)]).0[0].overall;
        assert!(gk_high > gk_low);
    }

    #[test]
    fn scores_stay_in_band() {
        let entries: Vec<OverallEntry> = (0..40)
            .map(|i| {
                entry(
                    i,
                    match i % 5 {
                        0 => PositionGroup::Goalkeeper,
                        1 => PositionGroup::Defender,
                        2 => PositionGroup::Midfielder,
                        3 => PositionGroup::Forward,
                        _ => PositionGroup::Other,
                    },
                    i % 11,
                    i % 7,
                    i % 13,
                    (i % 10) as f64,
                )
            })
            .collect();
        let (scores, _) = compute_overall(&entries);
        for s in &scores {
            assert!((OVERALL_FLOOR..=OVERALL_CEIL).contains(&s.overall));
        }
    }
}
