use std::hint::black_box;
use std::time::Duration;

use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use rusqlite::Connection;

use pelada_league::cache::TtlCache;
use pelada_league::domain::{PlayerStat, RankingFilter};
use pelada_league::match_rating::compute_match_ratings;
use pelada_league::rankings::build_rankings;
use pelada_league::store;

const PLAYERS: i64 = 40;
const MATCHES: u32 = 30;

fn synthetic_league() -> Connection {
    let conn = store::open_in_memory().expect("in-memory db");
    let positions = ["goleiro", "zagueiro", "meia", "atacante"];
    let mut player_ids = Vec::new();
    for i in 0..PLAYERS {
        let id = store::insert_player(
            &conn,
            &format!("Player {i:02}"),
            None,
            positions[(i % 4) as usize],
        )
        .expect("insert player");
        player_ids.push(id);
    }
    let start = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
    for m in 0..MATCHES {
        let played_at = start + chrono::Days::new(u64::from(m) * 7);
        let match_id = store::insert_match(&conn, played_at, "pelada", Some("laranja"))
            .expect("insert match");
        for (idx, player_id) in player_ids.iter().enumerate() {
            // Roughly half the pool shows up each week.
            if (idx as u32 + m) % 2 == 0 {
                continue;
            }
            store::upsert_stat(
                &conn,
                &PlayerStat {
                    player_id: *player_id,
                    match_id,
                    present: true,
                    goals: ((idx as u32 + m) % 4) as i64,
                    assists: ((idx as u32 + 2 * m) % 3) as i64,
                    rating: Some(f64::from((idx as u32 + m) % 10)),
                    in_photo: idx % 3 == 0,
                },
            )
            .expect("upsert stat");
        }
    }
    conn
}

fn bench_match_rating(c: &mut Criterion) {
    let conn = synthetic_league();
    c.bench_function("match_rating_compute", |b| {
        b.iter(|| {
            let ratings = compute_match_ratings(&conn, black_box(1)).unwrap();
            black_box(ratings.scores.len());
        })
    });
}

fn bench_rankings_cold(c: &mut Criterion) {
    let conn = synthetic_league();
    let filter = RankingFilter {
        year: Some(2024),
        month: None,
        position: None,
    };
    // Zero TTL: every iteration pays the full rebuild.
    let cache = TtlCache::new(Duration::ZERO);
    c.bench_function("rankings_build_cold", |b| {
        b.iter(|| {
            let set = build_rankings(&conn, black_box(&filter), &cache).unwrap();
            black_box(set.goals.len());
        })
    });
}

fn bench_rankings_cached(c: &mut Criterion) {
    let conn = synthetic_league();
    let filter = RankingFilter {
        year: Some(2024),
        month: None,
        position: None,
    };
    let cache = TtlCache::new(Duration::from_secs(3600));
    build_rankings(&conn, &filter, &cache).unwrap();
    c.bench_function("rankings_build_cached", |b| {
        b.iter(|| {
            let set = build_rankings(&conn, black_box(&filter), &cache).unwrap();
            black_box(set.goals.len());
        })
    });
}

criterion_group!(
    perf,
    bench_match_rating,
    bench_rankings_cold,
    bench_rankings_cached
);
criterion_main!(perf);
