use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::domain::{PlayerId, PositionGroup};
use crate::error::{Error, Result};
use crate::store;

/// Unlocks follow current aggregates: a stat correction that drops progress
/// below target locks the achievement again. Flip this off for classic
/// keep-forever unlock semantics.
pub const REVOCABLE_UNLOCKS: bool = true;

/// What an achievement measures. Progress is always re-derived from the
/// fact table, never accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Goals,
    Assists,
    Presence,
    Photos,
    /// Stat total counted only when the player belongs to the group.
    PositionGoals(PositionGroup),
    RatingAverage,
    RatedAbove8,
    RatedAbove9,
    PerfectTen,
    WeeklyAwards,
    MonthlyAwards,
    TotalAwards,
    /// Handed out by the admin; never auto-unlocked here.
    Manual,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Goals => "goals",
            Category::Assists => "assists",
            Category::Presence => "presence",
            Category::Photos => "photos",
            Category::PositionGoals(PositionGroup::Defender) => "defender_goals",
            Category::PositionGoals(PositionGroup::Goalkeeper) => "goalkeeper_goals",
            Category::PositionGoals(_) => "position_goals",
            Category::RatingAverage => "rating_average",
            Category::RatedAbove8 => "rated_above_8",
            Category::RatedAbove9 => "rated_above_9",
            Category::PerfectTen => "perfect_ten",
            Category::WeeklyAwards => "weekly_awards",
            Category::MonthlyAwards => "monthly_awards",
            Category::TotalAwards => "total_awards",
            Category::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "goals" => Category::Goals,
            "assists" => Category::Assists,
            "presence" => Category::Presence,
            "photos" => Category::Photos,
            "defender_goals" => Category::PositionGoals(PositionGroup::Defender),
            "goalkeeper_goals" => Category::PositionGoals(PositionGroup::Goalkeeper),
            "rating_average" => Category::RatingAverage,
            "rated_above_8" => Category::RatedAbove8,
            "rated_above_9" => Category::RatedAbove9,
            "perfect_ten" => Category::PerfectTen,
            "weekly_awards" => Category::WeeklyAwards,
            "monthly_awards" => Category::MonthlyAwards,
            "total_awards" => Category::TotalAwards,
            "manual" => Category::Manual,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AchievementSpec {
    pub code: &'static str,
    pub title: &'static str,
    pub category: Category,
    pub target: f64,
}

/// Static catalog, seeded into the store once. Targets follow the league's
/// pace — roughly a season of weekly peladas per tier.
pub static CATALOG: Lazy<Vec<AchievementSpec>> = Lazy::new(|| {
    vec![
        AchievementSpec { code: "artilheiro_10", title: "Artilheiro de bairro", category: Category::Goals, target: 10.0 },
        AchievementSpec { code: "artilheiro_50", title: "Artilheiro nato", category: Category::Goals, target: 50.0 },
        AchievementSpec { code: "artilheiro_100", title: "Centurião", category: Category::Goals, target: 100.0 },
        AchievementSpec { code: "garcom_10", title: "Garçom", category: Category::Assists, target: 10.0 },
        AchievementSpec { code: "garcom_50", title: "Maître", category: Category::Assists, target: 50.0 },
        AchievementSpec { code: "presenca_10", title: "Figurinha carimbada", category: Category::Presence, target: 10.0 },
        AchievementSpec { code: "presenca_50", title: "Dono do campo", category: Category::Presence, target: 50.0 },
        AchievementSpec { code: "presenca_100", title: "Lenda da pelada", category: Category::Presence, target: 100.0 },
        AchievementSpec { code: "fotogenico_10", title: "Fotogênico", category: Category::Photos, target: 10.0 },
        AchievementSpec { code: "zagueiro_artilheiro_5", title: "Zagueiro artilheiro", category: Category::PositionGoals(PositionGroup::Defender), target: 5.0 },
        AchievementSpec { code: "goleiro_artilheiro_1", title: "Goleiro artilheiro", category: Category::PositionGoals(PositionGroup::Goalkeeper), target: 1.0 },
        AchievementSpec { code: "media_7", title: "Consistente", category: Category::RatingAverage, target: 7.0 },
        AchievementSpec { code: "nota_8_x5", title: "Em alta", category: Category::RatedAbove8, target: 5.0 },
        AchievementSpec { code: "nota_9_x3", title: "Inspirado", category: Category::RatedAbove9, target: 3.0 },
        AchievementSpec { code: "nota_10", title: "Partida perfeita", category: Category::PerfectTen, target: 1.0 },
        AchievementSpec { code: "craque_semana_3", title: "Craque da semana em série", category: Category::WeeklyAwards, target: 3.0 },
        AchievementSpec { code: "craque_mes_1", title: "Craque do mês", category: Category::MonthlyAwards, target: 1.0 },
        AchievementSpec { code: "premiado_10", title: "Estante cheia", category: Category::TotalAwards, target: 10.0 },
        AchievementSpec { code: "homenagem", title: "Homenagem da resenha", category: Category::Manual, target: 0.0 },
    ]
});

/// Insert any catalog entries the store doesn't have yet. Existing rows are
/// left untouched so admin edits to titles/targets survive reseeding.
pub fn seed_catalog(conn: &Connection) -> Result<usize> {
    let mut inserted = 0;
    for spec in CATALOG.iter() {
        let numeric = spec.category != Category::Manual;
        inserted += conn.execute(
            "INSERT OR IGNORE INTO achievements (code, title, category, target, numeric_rule)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![spec.code, spec.title, spec.category.as_str(), spec.target, numeric as i64],
        )?;
    }
    Ok(inserted)
}

#[derive(Debug, Clone, Serialize)]
pub struct Unlocked {
    pub code: String,
    pub title: String,
    pub progress: f64,
    pub target: f64,
}

#[derive(Debug, Clone)]
struct CatalogRow {
    id: i64,
    code: String,
    title: String,
    category: Category,
    target: f64,
    numeric: bool,
}

/// Recompute progress and unlock state for every achievement of one player.
/// Returns the achievements that newly unlocked in this run. Running twice
/// on unchanged data changes nothing and reports nothing.
pub fn evaluate_achievements(conn: &Connection, player_id: PlayerId) -> Result<Vec<Unlocked>> {
    let Some(player) = store::load_player(conn, player_id)? else {
        return Err(Error::InvalidInput(format!("unknown player {player_id}")));
    };
    let aggregates = store::player_aggregates(conn, player_id)?;
    let weekly = store::load_weekly_awards(conn)?
        .iter()
        .filter(|a| a.player_id == player_id)
        .count() as f64;
    let monthly = store::load_monthly_awards(conn)?
        .iter()
        .filter(|a| a.player_id == player_id)
        .count() as f64;

    let catalog = load_catalog(conn)?;
    let existing = load_progress(conn, player_id)?;
    let now = Utc::now().to_rfc3339();

    let mut newly = Vec::new();
    for row in catalog {
        if !row.numeric || row.category == Category::Manual {
            continue;
        }
        let progress = match row.category {
            Category::Goals => aggregates.goals as f64,
            Category::Assists => aggregates.assists as f64,
            Category::Presence => aggregates.matches as f64,
            Category::Photos => aggregates.photos as f64,
            Category::PositionGoals(group) => {
                if player.position == group {
                    aggregates.goals as f64
                } else {
                    0.0
                }
            }
            Category::RatingAverage => aggregates.avg_rating,
            Category::RatedAbove8 => aggregates.rated_above_8 as f64,
            Category::RatedAbove9 => aggregates.rated_above_9 as f64,
            Category::PerfectTen => {
                if aggregates.perfect_ten {
                    1.0
                } else {
                    0.0
                }
            }
            Category::WeeklyAwards => weekly,
            Category::MonthlyAwards => monthly,
            Category::TotalAwards => weekly + monthly,
            Category::Manual => unreachable!(),
        };
        let met = progress >= row.target;
        let was_unlocked_at = existing.get(&row.id).and_then(|(_, at)| at.clone());

        let unlocked_at = match (&was_unlocked_at, met) {
            (None, true) => {
                tracing::info!(player_id, code = row.code.as_str(), "achievement unlocked");
                newly.push(Unlocked {
                    code: row.code.clone(),
                    title: row.title.clone(),
                    progress,
                    target: row.target,
                });
                Some(now.clone())
            }
            (Some(at), true) => Some(at.clone()),
            (Some(_), false) if REVOCABLE_UNLOCKS => {
                tracing::info!(player_id, code = row.code.as_str(), "achievement revoked");
                None
            }
            (Some(at), false) => Some(at.clone()),
            (None, false) => None,
        };

        conn.execute(
            "INSERT INTO player_achievements (player_id, achievement_id, progress, unlocked_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(player_id, achievement_id) DO UPDATE SET
                progress = excluded.progress,
                unlocked_at = excluded.unlocked_at",
            params![player_id, row.id, progress, unlocked_at],
        )?;
    }
    Ok(newly)
}

/// Progress and unlock state for one player, for the profile page.
pub fn player_progress(conn: &Connection, player_id: PlayerId) -> Result<Vec<(String, f64, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT a.code, pa.progress, pa.unlocked_at
         FROM player_achievements pa
         JOIN achievements a ON a.id = pa.achievement_id
         WHERE pa.player_id = ?1
         ORDER BY a.id ASC",
    )?;
    let rows = stmt.query_map(params![player_id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn load_catalog(conn: &Connection) -> Result<Vec<CatalogRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, title, category, target, numeric_rule FROM achievements ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, code, title, raw_category, target, numeric) = row?;
        let Some(category) = Category::parse(&raw_category) else {
            tracing::warn!(
                code = code.as_str(),
                category = raw_category.as_str(),
                "skipping achievement with unknown category"
            );
            continue;
        };
        out.push(CatalogRow {
            id,
            code,
            title,
            category,
            target,
            numeric: numeric != 0,
        });
    }
    Ok(out)
}

fn load_progress(
    conn: &Connection,
    player_id: PlayerId,
) -> Result<HashMap<i64, (f64, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT achievement_id, progress, unlocked_at FROM player_achievements WHERE player_id = ?1",
    )?;
    let rows = stmt.query_map(params![player_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;
    let mut out = HashMap::new();
    for row in rows {
        let (id, progress, unlocked_at) = row?;
        out.insert(id, (progress, unlocked_at));
    }
    Ok(out)
}
