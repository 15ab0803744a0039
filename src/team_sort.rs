use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::domain::{PlayerId, PositionGroup};
use crate::error::{Error, Result};

/// One candidate for the draw. `overall` is the manual override when the
/// admin pinned one, otherwise the computed band score.
#[derive(Debug, Clone, Serialize)]
pub struct DrawPlayer {
    pub player_id: PlayerId,
    pub name: String,
    pub position: PositionGroup,
    pub overall: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamDraw {
    pub teams: Vec<Vec<DrawPlayer>>,
}

impl TeamDraw {
    pub fn team_overall(&self, idx: usize) -> i64 {
        self.teams
            .get(idx)
            .map(|team| team.iter().map(|p| p.overall).sum())
            .unwrap_or(0)
    }
}

/// Draw balanced pickup teams. Goalkeepers are dealt round-robin first so no
/// team ends up with two; everyone else goes through a snake draft ordered
/// by overall, with a pre-shuffle so equal-overall players land differently
/// from draw to draw.
pub fn sort_teams(
    players: &[DrawPlayer],
    team_count: usize,
    rng: &mut impl Rng,
) -> Result<TeamDraw> {
    if team_count < 2 {
        return Err(Error::InvalidInput(
            "a draw needs at least two teams".to_string(),
        ));
    }
    if players.is_empty() {
        return Err(Error::InvalidInput("no players to draw".to_string()));
    }

    let mut keepers: Vec<DrawPlayer> = players
        .iter()
        .filter(|p| p.position == PositionGroup::Goalkeeper)
        .cloned()
        .collect();
    let mut outfield: Vec<DrawPlayer> = players
        .iter()
        .filter(|p| p.position != PositionGroup::Goalkeeper)
        .cloned()
        .collect();

    keepers.shuffle(rng);
    outfield.shuffle(rng);
    // Stable sort after the shuffle: order inside an overall tier stays
    // random, the tiers themselves don't.
    keepers.sort_by(|a, b| b.overall.cmp(&a.overall));
    outfield.sort_by(|a, b| b.overall.cmp(&a.overall));

    let mut teams: Vec<Vec<DrawPlayer>> = vec![Vec::new(); team_count];
    for (idx, keeper) in keepers.into_iter().enumerate() {
        teams[idx % team_count].push(keeper);
    }

    // Snake draft: strongest-first one way, then back, so the first team
    // doesn't skim every tier.
    let mut slot = 0usize;
    let mut forward = true;
    for player in outfield {
        teams[slot].push(player);
        if forward {
            if slot + 1 == team_count {
                forward = false;
            } else {
                slot += 1;
            }
        } else if slot == 0 {
            forward = true;
        } else {
            slot -= 1;
        }
    }

    Ok(TeamDraw { teams })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn player(id: PlayerId, position: PositionGroup, overall: i64) -> DrawPlayer {
        DrawPlayer {
            player_id: id,
            name: format!("P{id}"),
            position,
            overall,
        }
    }

    #[test]
    fn keepers_spread_across_teams() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = vec![
            player(1, PositionGroup::Goalkeeper, 80),
            player(2, PositionGroup::Goalkeeper, 75),
        ];
        for id in 3..=12 {
            pool.push(player(id, PositionGroup::Other, 70));
        }
        let draw = sort_teams(&pool, 2, &mut rng).unwrap();
        for team in &draw.teams {
            let keepers = team
                .iter()
                .filter(|p| p.position == PositionGroup::Goalkeeper)
                .count();
            assert_eq!(keepers, 1);
        }
    }

    #[test]
    fn snake_draft_keeps_totals_close() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool: Vec<DrawPlayer> = (0..12)
            .map(|i| player(i, PositionGroup::Other, 95 - i * 3))
            .collect();
        let draw = sort_teams(&pool, 2, &mut rng).unwrap();
        let diff = (draw.team_overall(0) - draw.team_overall(1)).abs();
        assert!(diff <= 6, "teams too uneven: {diff}");
    }

    #[test]
    fn degenerate_draws_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sort_teams(&[], 2, &mut rng).is_err());
        let pool = vec![player(1, PositionGroup::Other, 70)];
        assert!(sort_teams(&pool, 1, &mut rng).is_err());
    }
}
