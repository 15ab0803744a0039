use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type PlayerId = i64;
pub type MatchId = i64;

/// Closed set of position buckets. Free-text labels are classified exactly
/// once, at ingestion, via [`PositionGroup::from_label`]; everything
/// downstream works on the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionGroup {
    Goalkeeper,
    Defender,
    Midfielder,
    Forward,
    Other,
}

impl PositionGroup {
    /// Classify a free-text position label. Labels come in as whatever the
    /// admin typed — mostly Portuguese ("goleiro", "zagueiro", "meia",
    /// "atacante"), sometimes English — so we match on substrings.
    pub fn from_label(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        if s.is_empty() {
            return PositionGroup::Other;
        }
        if s.contains("goleiro") || s.contains("goalkeeper") || s.contains("keeper") || s == "gk" || s == "gol" {
            return PositionGroup::Goalkeeper;
        }
        if s.contains("zag") || s.contains("defensor") || s.contains("defender") || s.contains("lateral") || s.contains("back") || s.contains("def") {
            return PositionGroup::Defender;
        }
        if s.contains("meia") || s.contains("meio") || s.contains("volante") || s.contains("mid") {
            return PositionGroup::Midfielder;
        }
        if s.contains("ata") || s.contains("centroavante") || s.contains("forward") || s.contains("striker") || s.contains("wing") {
            return PositionGroup::Forward;
        }
        PositionGroup::Other
    }

    pub fn label(self) -> &'static str {
        match self {
            PositionGroup::Goalkeeper => "goleiro",
            PositionGroup::Defender => "zagueiro",
            PositionGroup::Midfielder => "meia",
            PositionGroup::Forward => "atacante",
            PositionGroup::Other => "linha",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub nickname: Option<String>,
    /// Raw label as entered by the admin, kept for display.
    pub position_label: String,
    pub position: PositionGroup,
    // Cumulative columns, refreshed from player_stats by the recompute job.
    pub goals: i64,
    pub assists: i64,
    pub matches: i64,
    pub photos: i64,
    pub avg_rating: f64,
    /// Manually pinned overall; takes precedence over the computed value.
    pub overall_override: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub played_at: NaiveDate,
    pub description: String,
    pub winner_color: Option<String>,
}

/// One row per (player, match). This is the fact table every aggregation
/// folds over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStat {
    pub player_id: PlayerId,
    pub match_id: MatchId,
    pub present: bool,
    pub goals: i64,
    pub assists: i64,
    /// Stored 0–10 rating, if one was ever recorded for this appearance.
    pub rating: Option<f64>,
    pub in_photo: bool,
}

/// Half-open date window. `None` bounds mean unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn all() -> Self {
        Self::default()
    }

    /// Window for a year/month selector. A missing year disables filtering
    /// entirely; a year without a month spans the whole year. Out-of-range
    /// months fall back to the whole year rather than failing — bad query
    /// params render the unfiltered page, they don't 500.
    pub fn from_selector(year: Option<i32>, month: Option<u32>) -> Self {
        let Some(year) = year else {
            return Self::all();
        };
        match month {
            Some(m) if (1..=12).contains(&m) => {
                let start = NaiveDate::from_ymd_opt(year, m, 1);
                let end = if m == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, m + 1, 1)
                };
                Self { start, end }
            }
            _ => Self {
                start: NaiveDate::from_ymd_opt(year, 1, 1),
                end: NaiveDate::from_ymd_opt(year + 1, 1, 1),
            },
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start
            && date < start
        {
            return false;
        }
        if let Some(end) = self.end
            && date >= end
        {
            return false;
        }
        true
    }
}

/// Filter tuple a ranking request is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankingFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub position: Option<PositionGroup>,
}

impl RankingFilter {
    pub fn window(&self) -> DateWindow {
        DateWindow::from_selector(self.year, self.month)
    }

    /// Stable cache key for the filter tuple.
    pub fn cache_key(&self) -> String {
        let year = self
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "all".to_string());
        let month = self
            .month
            .map(|m| m.to_string())
            .unwrap_or_else(|| "all".to_string());
        let pos = self.position.map(|p| p.label()).unwrap_or("all");
        format!("rankings:{year}:{month}:{pos}")
    }
}
