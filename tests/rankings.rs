use chrono::NaiveDate;

use pelada_league::awards;
use pelada_league::cache::TtlCache;
use pelada_league::domain::{PlayerId, PlayerStat, PositionGroup, RankingFilter};
use pelada_league::rankings::{RankingCache, build_rankings};
use pelada_league::store;
use rusqlite::Connection;

fn league() -> Connection {
    store::open_in_memory().expect("in-memory db")
}

fn add_player(conn: &Connection, name: &str, position: &str) -> PlayerId {
    store::insert_player(conn, name, None, position).expect("insert player")
}

fn add_match(conn: &Connection, date: &str, winner: Option<&str>) -> i64 {
    store::insert_match(
        conn,
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        "pelada",
        winner,
    )
    .expect("insert match")
}

fn add_stat(conn: &Connection, player_id: PlayerId, match_id: i64, goals: i64, assists: i64, in_photo: bool) {
    store::upsert_stat(
        conn,
        &PlayerStat {
            player_id,
            match_id,
            present: true,
            goals,
            assists,
            rating: None,
            in_photo,
        },
    )
    .expect("upsert stat");
}

/// Ana (forward) and Bruno (defender) across two March matches, Carla
/// (keeper) in one. No ballots, so every vote rating sits at 5.0 and the
/// final ratings are fully determined by the stat lines.
fn seed_march(conn: &Connection) -> (PlayerId, PlayerId, PlayerId) {
    let ana = add_player(conn, "Ana", "atacante");
    let bruno = add_player(conn, "Bruno", "zagueiro");
    let carla = add_player(conn, "Carla", "goleiro");

    let m1 = add_match(conn, "2024-03-02", Some("laranja"));
    add_stat(conn, ana, m1, 2, 0, true);
    add_stat(conn, bruno, m1, 0, 1, false);
    add_stat(conn, carla, m1, 0, 0, false);

    let m2 = add_match(conn, "2024-03-09", Some("preto"));
    add_stat(conn, ana, m2, 1, 1, false);
    add_stat(conn, bruno, m2, 0, 0, true);

    (ana, bruno, carla)
}

#[test]
fn empty_pool_builds_empty_rankings() {
    let conn = league();
    let set = build_rankings(&conn, &RankingFilter::default(), &RankingCache::default()).unwrap();
    assert!(set.goals.is_empty());
    assert!(set.ratings.is_empty());
    assert!(set.weighted.is_empty());
    assert!(set.recent.is_empty());
    assert!(set.overall.is_empty());
    assert!(set.weekly_awards.is_empty());
    assert!(set.monthly_awards.is_empty());
}

#[test]
fn leaderboards_aggregate_and_tie_break() {
    let conn = league();
    let (ana, bruno, carla) = seed_march(&conn);
    let filter = RankingFilter {
        year: Some(2024),
        month: Some(3),
        position: None,
    };
    let set = build_rankings(&conn, &filter, &RankingCache::default()).unwrap();

    // Goals: Ana 3, then the 0-goal tie breaks by assists (Bruno 1, Carla 0).
    let goals: Vec<PlayerId> = set.goals.iter().map(|r| r.player_id).collect();
    assert_eq!(goals, vec![ana, bruno, carla]);
    assert_eq!(set.goals[0].goals, 3);

    // Engine finals per match: Ana 5.6 / 6.2, Bruno 4.7 / 4.4, Carla 3.5.
    let ana_row = set.ratings.iter().find(|r| r.player_id == ana).unwrap();
    assert!((ana_row.rating - 5.9).abs() < 1e-9);
    let order: Vec<PlayerId> = set.ratings.iter().map(|r| r.player_id).collect();
    assert_eq!(order, vec![ana, bruno, carla]);

    // Photos: Carla never appeared, the Ana/Bruno tie resolves by name.
    let photos: Vec<PlayerId> = set.photos.iter().map(|r| r.player_id).collect();
    assert_eq!(photos, vec![ana, bruno]);

    // Weighted composite: Ana leads both maxima, so (4*10 + 2*10 + 4*5.9)/10.
    assert_eq!(set.weighted[0].player_id, ana);
    assert!((set.weighted[0].score - 8.36).abs() < 1e-9);

    // Two matches in the window, both inside the recent-form cut.
    assert_eq!(set.recent.len(), 3);
    assert_eq!(set.recent[0].player_id, ana);
}

#[test]
fn position_filter_narrows_the_pool() {
    let conn = league();
    let (_, bruno, _) = seed_march(&conn);
    let filter = RankingFilter {
        year: Some(2024),
        month: Some(3),
        position: Some(PositionGroup::Defender),
    };
    let set = build_rankings(&conn, &filter, &RankingCache::default()).unwrap();
    let ids: Vec<PlayerId> = set.goals.iter().map(|r| r.player_id).collect();
    assert_eq!(ids, vec![bruno]);
    // The window cut for recent form ignores the position filter, the
    // aggregation does not.
    let recent_ids: Vec<PlayerId> = set.recent.iter().map(|r| r.player_id).collect();
    assert_eq!(recent_ids, vec![bruno]);
}

#[test]
fn overall_ranking_prefers_manual_override() {
    let conn = league();
    let (_, _, carla) = seed_march(&conn);
    store::set_overall_override(&conn, carla, Some(94)).unwrap();
    let filter = RankingFilter {
        year: Some(2024),
        month: None,
        position: None,
    };
    let set = build_rankings(&conn, &filter, &RankingCache::default()).unwrap();
    assert_eq!(set.overall[0].player_id, carla);
    assert_eq!(set.overall[0].overall, 94);
    assert!(set.overall[0].from_override);
    assert!(!set.overall[1].from_override);
}

#[test]
fn award_tallies_follow_the_window() {
    let conn = league();
    let (ana, _, _) = seed_march(&conn);
    // Record weekly craques for both matches; Ana wins both.
    awards::record_weekly_award(&conn, 1).unwrap();
    awards::record_weekly_award(&conn, 2).unwrap();
    awards::record_monthly_awards(&conn, 2024, 3).unwrap();

    let march = RankingFilter {
        year: Some(2024),
        month: Some(3),
        position: None,
    };
    let set = build_rankings(&conn, &march, &RankingCache::default()).unwrap();
    assert_eq!(set.weekly_awards[0].player_id, ana);
    assert_eq!(set.weekly_awards[0].count, 2);
    // craque + artilheiro + garçom of the month, all Ana.
    assert_eq!(set.monthly_awards[0].player_id, ana);
    assert_eq!(set.monthly_awards[0].count, 3);

    let april = RankingFilter {
        year: Some(2024),
        month: Some(4),
        position: None,
    };
    let set = build_rankings(&conn, &april, &RankingCache::default()).unwrap();
    assert!(set.weekly_awards.is_empty());
    assert!(set.monthly_awards.is_empty());
}

#[test]
fn color_tally_counts_recorded_winners() {
    let conn = league();
    seed_march(&conn);
    let filter = RankingFilter {
        year: Some(2024),
        month: None,
        position: None,
    };
    let set = build_rankings(&conn, &filter, &RankingCache::default()).unwrap();
    // One win each; the tie orders alphabetically, zero-win colors follow.
    assert_eq!(set.color_wins[0].color, "laranja");
    assert_eq!(set.color_wins[0].wins, 1);
    assert_eq!(set.color_wins[1].color, "preto");
    assert_eq!(set.color_wins.len(), 4);
}

#[test]
fn first_season_color_tally_is_backfilled() {
    let conn = league();
    let filter = RankingFilter {
        year: Some(2019),
        month: None,
        position: None,
    };
    let set = build_rankings(&conn, &filter, &RankingCache::default()).unwrap();
    assert_eq!(set.color_wins[0].color, "laranja");
    assert_eq!(set.color_wins[0].wins, 11);
    // The backfill is pinned to that one season.
    let other = RankingFilter {
        year: Some(2020),
        month: None,
        position: None,
    };
    let set = build_rankings(&conn, &other, &RankingCache::default()).unwrap();
    assert!(set.color_wins.iter().all(|row| row.wins == 0));
}

#[test]
fn cached_results_serve_within_ttl() {
    let conn = league();
    let (ana, _, _) = seed_march(&conn);
    let filter = RankingFilter {
        year: Some(2024),
        month: None,
        position: None,
    };
    let cache: RankingCache = TtlCache::default();
    let first = build_rankings(&conn, &filter, &cache).unwrap();

    // New data lands, but the cached set still serves for this filter.
    let m3 = add_match(&conn, "2024-03-16", None);
    add_stat(&conn, ana, m3, 5, 0, false);
    let cached = build_rankings(&conn, &filter, &cache).unwrap();
    assert_eq!(cached.goals[0].goals, first.goals[0].goals);

    // A cold cache sees the new match immediately.
    let fresh = build_rankings(&conn, &filter, &RankingCache::default()).unwrap();
    assert_eq!(fresh.goals[0].goals, first.goals[0].goals + 5);
}
