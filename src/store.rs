use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{Connection, params};

use crate::domain::{
    DateWindow, MatchId, MatchRecord, Player, PlayerId, PlayerStat, PositionGroup,
};
use crate::error::{Error, Result};

const DATA_DIR: &str = "pelada_league";
const DB_FILE: &str = "league.sqlite";

// Sentinels for unbounded window queries; dates are ISO text so lexical
// comparison matches chronological order.
const DATE_MIN: &str = "0000-01-01";
const DATE_MAX: &str = "9999-12-31";

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            nickname TEXT NULL,
            position_label TEXT NOT NULL,
            position TEXT NOT NULL,
            goals INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            matches INTEGER NOT NULL DEFAULT 0,
            photos INTEGER NOT NULL DEFAULT 0,
            avg_rating REAL NOT NULL DEFAULT 0,
            overall_override INTEGER NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            played_at TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            winner_color TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_played_at ON matches(played_at);

        CREATE TABLE IF NOT EXISTS player_stats (
            player_id INTEGER NOT NULL REFERENCES players(id),
            match_id INTEGER NOT NULL REFERENCES matches(id),
            present INTEGER NOT NULL DEFAULT 1,
            goals INTEGER NOT NULL DEFAULT 0,
            assists INTEGER NOT NULL DEFAULT 0,
            rating REAL NULL,
            in_photo INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (player_id, match_id)
        );
        CREATE INDEX IF NOT EXISTS idx_stats_match ON player_stats(match_id);

        CREATE TABLE IF NOT EXISTS vote_tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL REFERENCES matches(id),
            token_hash TEXT NOT NULL UNIQUE,
            issued_at TEXT NOT NULL,
            used_at TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS ballots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            token_id INTEGER NOT NULL UNIQUE REFERENCES vote_tokens(id),
            match_id INTEGER NOT NULL REFERENCES matches(id),
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ballots_match ON ballots(match_id);

        CREATE TABLE IF NOT EXISTS weekly_awards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            iso_year INTEGER NOT NULL,
            iso_week INTEGER NOT NULL,
            category TEXT NOT NULL,
            player_id INTEGER NOT NULL REFERENCES players(id),
            match_id INTEGER NOT NULL REFERENCES matches(id),
            awarded_on TEXT NOT NULL,
            UNIQUE (iso_year, iso_week, category)
        );
        CREATE TABLE IF NOT EXISTS monthly_awards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            category TEXT NOT NULL,
            player_id INTEGER NOT NULL REFERENCES players(id),
            UNIQUE (year, month, category)
        );
        CREATE TABLE IF NOT EXISTS season_awards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            category TEXT NOT NULL,
            player_id INTEGER NOT NULL REFERENCES players(id),
            UNIQUE (year, category)
        );

        CREATE TABLE IF NOT EXISTS achievements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            target REAL NOT NULL,
            numeric_rule INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS player_achievements (
            player_id INTEGER NOT NULL REFERENCES players(id),
            achievement_id INTEGER NOT NULL REFERENCES achievements(id),
            progress REAL NOT NULL DEFAULT 0,
            unlocked_at TEXT NULL,
            PRIMARY KEY (player_id, achievement_id)
        );

        CREATE TABLE IF NOT EXISTS overall_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL REFERENCES players(id),
            overall INTEGER NOT NULL,
            rating_norm REAL NOT NULL,
            goals_norm REAL NOT NULL,
            assists_norm REAL NOT NULL,
            presence_norm REAL NOT NULL,
            max_goals INTEGER NOT NULL,
            max_assists INTEGER NOT NULL,
            max_matches INTEGER NOT NULL,
            computed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_overall_history_player ON overall_history(player_id);
        "#,
    )?;
    Ok(())
}

pub fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("bad stored date: {raw}")))
}

fn window_bounds(window: &DateWindow) -> (String, String) {
    let start = window.start.map(date_str).unwrap_or_else(|| DATE_MIN.to_string());
    let end = window.end.map(date_str).unwrap_or_else(|| DATE_MAX.to_string());
    (start, end)
}

// ---------------------------------------------------------------------------
// Players

pub fn insert_player(
    conn: &Connection,
    name: &str,
    nickname: Option<&str>,
    position_label: &str,
) -> Result<PlayerId> {
    let position = PositionGroup::from_label(position_label);
    conn.execute(
        "INSERT INTO players (name, nickname, position_label, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name,
            nickname,
            position_label,
            position.label(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn player_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Player> {
    // `position` holds the canonical bucket label written at ingestion;
    // classification is not repeated against the free-text column.
    let bucket: String = row.get(4)?;
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        nickname: row.get(2)?,
        position_label: row.get(3)?,
        position: PositionGroup::from_label(&bucket),
        goals: row.get(5)?,
        assists: row.get(6)?,
        matches: row.get(7)?,
        photos: row.get(8)?,
        avg_rating: row.get(9)?,
        overall_override: row.get(10)?,
    })
}

const PLAYER_COLS: &str = "id, name, nickname, position_label, position, goals, assists, matches, photos, avg_rating, overall_override";

pub fn load_players(conn: &Connection) -> Result<Vec<Player>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAYER_COLS} FROM players ORDER BY name ASC, id ASC"
    ))?;
    let rows = stmt.query_map([], player_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn load_player(conn: &Connection, player_id: PlayerId) -> Result<Option<Player>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAYER_COLS} FROM players WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![player_id], player_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub fn set_overall_override(
    conn: &Connection,
    player_id: PlayerId,
    overall: Option<i64>,
) -> Result<()> {
    conn.execute(
        "UPDATE players SET overall_override = ?1 WHERE id = ?2",
        params![overall, player_id],
    )?;
    Ok(())
}

/// Recompute a player's cumulative columns from the fact table. Stats are
/// the source of truth; the columns exist so profile pages don't re-aggregate.
pub fn refresh_player_totals(conn: &Connection, player_id: PlayerId) -> Result<()> {
    conn.execute(
        "UPDATE players SET
            goals = (SELECT COALESCE(SUM(goals), 0) FROM player_stats WHERE player_id = ?1 AND present = 1),
            assists = (SELECT COALESCE(SUM(assists), 0) FROM player_stats WHERE player_id = ?1 AND present = 1),
            matches = (SELECT COUNT(*) FROM player_stats WHERE player_id = ?1 AND present = 1),
            photos = (SELECT COALESCE(SUM(in_photo), 0) FROM player_stats WHERE player_id = ?1 AND present = 1),
            avg_rating = (SELECT COALESCE(AVG(rating), 0) FROM player_stats WHERE player_id = ?1 AND present = 1 AND rating IS NOT NULL)
         WHERE id = ?1",
        params![player_id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Matches

pub fn insert_match(
    conn: &Connection,
    played_at: NaiveDate,
    description: &str,
    winner_color: Option<&str>,
) -> Result<MatchId> {
    conn.execute(
        "INSERT INTO matches (played_at, description, winner_color) VALUES (?1, ?2, ?3)",
        params![date_str(played_at), description, winner_color],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn load_match(conn: &Connection, match_id: MatchId) -> Result<Option<MatchRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, played_at, description, winner_color FROM matches WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map(params![match_id], |row| {
        Ok((
            row.get::<_, MatchId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    let Some(row) = rows.next() else {
        return Ok(None);
    };
    let (id, played_at, description, winner_color) = row?;
    Ok(Some(MatchRecord {
        id,
        played_at: parse_date(&played_at)?,
        description,
        winner_color,
    }))
}

pub fn matches_in_window(conn: &Connection, window: &DateWindow) -> Result<Vec<MatchRecord>> {
    let (start, end) = window_bounds(window);
    let mut stmt = conn.prepare(
        "SELECT id, played_at, description, winner_color FROM matches
         WHERE played_at >= ?1 AND played_at < ?2
         ORDER BY played_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok((
            row.get::<_, MatchId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, played_at, description, winner_color) = row?;
        out.push(MatchRecord {
            id,
            played_at: parse_date(&played_at)?,
            description,
            winner_color,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Stats

/// Upsert one (player, match) stat row. Ratings are clamped into [0,10] on
/// the way in so the invariant holds no matter what the admin form sent.
pub fn upsert_stat(conn: &Connection, stat: &PlayerStat) -> Result<()> {
    let rating = stat.rating.map(|r| r.clamp(0.0, 10.0));
    conn.execute(
        "INSERT INTO player_stats (player_id, match_id, present, goals, assists, rating, in_photo, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(player_id, match_id) DO UPDATE SET
            present = excluded.present,
            goals = excluded.goals,
            assists = excluded.assists,
            rating = excluded.rating,
            in_photo = excluded.in_photo,
            updated_at = excluded.updated_at",
        params![
            stat.player_id,
            stat.match_id,
            stat.present as i64,
            stat.goals.max(0),
            stat.assists.max(0),
            rating,
            stat.in_photo as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn present_stats_for_match(conn: &Connection, match_id: MatchId) -> Result<Vec<PlayerStat>> {
    let mut stmt = conn.prepare(
        "SELECT player_id, match_id, present, goals, assists, rating, in_photo
         FROM player_stats
         WHERE match_id = ?1 AND present = 1
         ORDER BY player_id ASC",
    )?;
    let rows = stmt.query_map(params![match_id], stat_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn stat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerStat> {
    Ok(PlayerStat {
        player_id: row.get(0)?,
        match_id: row.get(1)?,
        present: row.get::<_, i64>(2)? != 0,
        goals: row.get(3)?,
        assists: row.get(4)?,
        rating: row.get(5)?,
        in_photo: row.get::<_, i64>(6)? != 0,
    })
}

/// A present-player stat row joined with its match date; the unit every
/// ranking aggregation folds over.
#[derive(Debug, Clone)]
pub struct WindowStat {
    pub player_id: PlayerId,
    pub match_id: MatchId,
    pub goals: i64,
    pub assists: i64,
    pub rating: Option<f64>,
    pub in_photo: bool,
    pub played_at: NaiveDate,
}

pub fn present_stats_in_window(conn: &Connection, window: &DateWindow) -> Result<Vec<WindowStat>> {
    let (start, end) = window_bounds(window);
    let mut stmt = conn.prepare(
        "SELECT s.player_id, s.match_id, s.goals, s.assists, s.rating, s.in_photo, m.played_at
         FROM player_stats s
         JOIN matches m ON m.id = s.match_id
         WHERE s.present = 1 AND m.played_at >= ?1 AND m.played_at < ?2
         ORDER BY m.played_at ASC, s.match_id ASC, s.player_id ASC",
    )?;
    let rows = stmt.query_map(params![start, end], |row| {
        Ok((
            row.get::<_, PlayerId>(0)?,
            row.get::<_, MatchId>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, Option<f64>>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (player_id, match_id, goals, assists, rating, in_photo, played_at) = row?;
        out.push(WindowStat {
            player_id,
            match_id,
            goals,
            assists,
            rating,
            in_photo: in_photo != 0,
            played_at: parse_date(&played_at)?,
        });
    }
    Ok(out)
}

/// Cumulative aggregates for one player across all recorded appearances.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerAggregates {
    pub goals: i64,
    pub assists: i64,
    pub matches: i64,
    pub photos: i64,
    pub avg_rating: f64,
    pub rated_above_8: i64,
    pub rated_above_9: i64,
    pub perfect_ten: bool,
}

pub fn player_aggregates(conn: &Connection, player_id: PlayerId) -> Result<PlayerAggregates> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(SUM(goals), 0),
                COALESCE(SUM(assists), 0),
                COUNT(*),
                COALESCE(SUM(in_photo), 0),
                COALESCE(AVG(rating), 0),
                COALESCE(SUM(CASE WHEN rating >= 8 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN rating >= 9 THEN 1 ELSE 0 END), 0),
                COALESCE(MAX(CASE WHEN rating >= 10 THEN 1 ELSE 0 END), 0)
         FROM player_stats
         WHERE player_id = ?1 AND present = 1",
    )?;
    let row = stmt.query_row(params![player_id], |row| {
        Ok(PlayerAggregates {
            goals: row.get(0)?,
            assists: row.get(1)?,
            matches: row.get(2)?,
            photos: row.get(3)?,
            avg_rating: row.get(4)?,
            rated_above_8: row.get(5)?,
            rated_above_9: row.get(6)?,
            perfect_ten: row.get::<_, i64>(7)? != 0,
        })
    })?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Awards

#[derive(Debug, Clone)]
pub struct AwardRow {
    pub player_id: PlayerId,
    pub category: String,
    pub awarded_on: NaiveDate,
}

pub fn upsert_weekly_award(
    conn: &Connection,
    player_id: PlayerId,
    match_id: MatchId,
    awarded_on: NaiveDate,
    category: &str,
) -> Result<()> {
    let iso = awarded_on.iso_week();
    conn.execute(
        "INSERT INTO weekly_awards (iso_year, iso_week, category, player_id, match_id, awarded_on)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(iso_year, iso_week, category) DO UPDATE SET
            player_id = excluded.player_id,
            match_id = excluded.match_id,
            awarded_on = excluded.awarded_on",
        params![
            iso.year(),
            iso.week() as i64,
            category,
            player_id,
            match_id,
            date_str(awarded_on),
        ],
    )?;
    Ok(())
}

pub fn upsert_monthly_award(
    conn: &Connection,
    year: i32,
    month: u32,
    category: &str,
    player_id: PlayerId,
) -> Result<()> {
    conn.execute(
        "INSERT INTO monthly_awards (year, month, category, player_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(year, month, category) DO UPDATE SET player_id = excluded.player_id",
        params![year, month as i64, category, player_id],
    )?;
    Ok(())
}

pub fn upsert_season_award(
    conn: &Connection,
    year: i32,
    category: &str,
    player_id: PlayerId,
) -> Result<()> {
    conn.execute(
        "INSERT INTO season_awards (year, category, player_id)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(year, category) DO UPDATE SET player_id = excluded.player_id",
        params![year, category, player_id],
    )?;
    Ok(())
}

pub fn load_weekly_awards(conn: &Connection) -> Result<Vec<AwardRow>> {
    let mut stmt = conn.prepare(
        "SELECT player_id, category, awarded_on FROM weekly_awards ORDER BY awarded_on ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, PlayerId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (player_id, category, awarded_on) = row?;
        out.push(AwardRow {
            player_id,
            category,
            awarded_on: parse_date(&awarded_on)?,
        });
    }
    Ok(out)
}

pub fn load_monthly_awards(conn: &Connection) -> Result<Vec<AwardRow>> {
    let mut stmt = conn.prepare(
        "SELECT player_id, category, year, month FROM monthly_awards ORDER BY year ASC, month ASC, id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, PlayerId>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (player_id, category, year, month) = row?;
        // A monthly award counts inside any window containing its month.
        let awarded_on = NaiveDate::from_ymd_opt(year, month as u32, 1)
            .ok_or_else(|| Error::InvalidInput(format!("bad award bucket {year}-{month}")))?;
        out.push(AwardRow {
            player_id,
            category,
            awarded_on,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Overall history

pub struct OverallSnapshot {
    pub player_id: PlayerId,
    pub overall: i64,
    pub rating_norm: f64,
    pub goals_norm: f64,
    pub assists_norm: f64,
    pub presence_norm: f64,
    pub max_goals: i64,
    pub max_assists: i64,
    pub max_matches: i64,
}

pub fn append_overall_history(conn: &Connection, snap: &OverallSnapshot) -> Result<()> {
    conn.execute(
        "INSERT INTO overall_history (player_id, overall, rating_norm, goals_norm, assists_norm,
                                      presence_norm, max_goals, max_assists, max_matches, computed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            snap.player_id,
            snap.overall,
            snap.rating_norm,
            snap.goals_norm,
            snap.assists_norm,
            snap.presence_norm,
            snap.max_goals,
            snap.max_assists,
            snap.max_matches,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_upsert_clamps_rating() {
        let conn = open_in_memory().unwrap();
        let pid = insert_player(&conn, "Zico", None, "meia").unwrap();
        let mid = insert_match(
            &conn,
            NaiveDate::from_ymd_opt(2024, 5, 4).unwrap(),
            "pelada de sábado",
            None,
        )
        .unwrap();
        upsert_stat(
            &conn,
            &PlayerStat {
                player_id: pid,
                match_id: mid,
                present: true,
                goals: 2,
                assists: 1,
                rating: Some(14.5),
                in_photo: false,
            },
        )
        .unwrap();
        let stats = present_stats_for_match(&conn, mid).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].rating, Some(10.0));
    }

    #[test]
    fn totals_refresh_from_fact_table() {
        let conn = open_in_memory().unwrap();
        let pid = insert_player(&conn, "Sócrates", None, "meia").unwrap();
        for (day, goals, rating) in [(1, 2, Some(8.0)), (8, 0, Some(6.0)), (15, 1, None)] {
            let mid = insert_match(
                &conn,
                NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
                "",
                None,
            )
            .unwrap();
            upsert_stat(
                &conn,
                &PlayerStat {
                    player_id: pid,
                    match_id: mid,
                    present: true,
                    goals,
                    assists: 0,
                    rating,
                    in_photo: true,
                },
            )
            .unwrap();
        }
        refresh_player_totals(&conn, pid).unwrap();
        let player = load_player(&conn, pid).unwrap().unwrap();
        assert_eq!(player.goals, 3);
        assert_eq!(player.matches, 3);
        assert_eq!(player.photos, 3);
        assert!((player.avg_rating - 7.0).abs() < 1e-9);
    }
}
