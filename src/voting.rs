use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{MatchId, PlayerId, PositionGroup};
use crate::error::{Error, Result};

const TOKEN_BYTES: usize = 24;

/// One voter's submission. The three historical voting flows (star ratings,
/// rank orderings, the single-candidate vote link) are variants of the same
/// capability and share token handling and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BallotPayload {
    Stars { votes: Vec<StarVote> },
    Ranking { groups: Vec<RankGroup> },
    VoteLink { best_overall: Option<PlayerId> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarVote {
    pub player_id: PlayerId,
    /// 0–5 stars; clamped on submit.
    pub stars: u8,
}

/// Candidates of one position group, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankGroup {
    pub position: PositionGroup,
    pub ordered: Vec<PlayerId>,
}

#[derive(Debug, Clone)]
pub struct Ballot {
    pub id: i64,
    pub match_id: MatchId,
    pub payload: BallotPayload,
}

/// What happens when a ballot names a candidate who was not present in the
/// match. The flows disagree on purpose: the admin-facing forms reject hard,
/// the public vote link quietly drops the pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvalidCandidatePolicy {
    Reject,
    NullOut,
}

fn policy_for(payload: &BallotPayload) -> InvalidCandidatePolicy {
    match payload {
        BallotPayload::Stars { .. } | BallotPayload::Ranking { .. } => InvalidCandidatePolicy::Reject,
        BallotPayload::VoteLink { .. } => InvalidCandidatePolicy::NullOut,
    }
}

/// Issue a fresh single-use voting token for a match. The caller gets the
/// raw token for the link; only its SHA-256 digest is stored.
pub fn issue_token(conn: &Connection, match_id: MatchId) -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    conn.execute(
        "INSERT INTO vote_tokens (match_id, token_hash, issued_at) VALUES (?1, ?2, ?3)",
        params![match_id, token_digest(&token), Utc::now().to_rfc3339()],
    )?;
    Ok(token)
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Validate and persist one ballot, consuming its token. The ballot insert
/// and the token's used_at flag land in the same transaction — either the
/// whole submission exists or none of it does.
pub fn submit_ballot(
    conn: &mut Connection,
    token: &str,
    payload: BallotPayload,
) -> Result<()> {
    let digest = token_digest(token);
    let row: Option<(i64, MatchId, Option<String>)> = conn
        .query_row(
            "SELECT id, match_id, used_at FROM vote_tokens WHERE token_hash = ?1",
            params![digest],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((token_id, match_id, used_at)) = row else {
        return Err(Error::VoteRejected("unknown voting token".to_string()));
    };
    if used_at.is_some() {
        return Err(Error::VoteRejected("voting token already used".to_string()));
    }

    let present = present_player_ids(conn, match_id)?;
    let payload = validate_payload(payload, &present)?;
    let json = serde_json::to_string(&payload)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO ballots (token_id, match_id, kind, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            token_id,
            match_id,
            kind_label(&payload),
            json,
            Utc::now().to_rfc3339(),
        ],
    )?;
    tx.execute(
        "UPDATE vote_tokens SET used_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), token_id],
    )?;
    tx.commit()?;
    Ok(())
}

fn kind_label(payload: &BallotPayload) -> &'static str {
    match payload {
        BallotPayload::Stars { .. } => "stars",
        BallotPayload::Ranking { .. } => "ranking",
        BallotPayload::VoteLink { .. } => "vote_link",
    }
}

fn present_player_ids(conn: &Connection, match_id: MatchId) -> Result<HashSet<PlayerId>> {
    let mut stmt = conn.prepare(
        "SELECT player_id FROM player_stats WHERE match_id = ?1 AND present = 1",
    )?;
    let rows = stmt.query_map(params![match_id], |row| row.get::<_, PlayerId>(0))?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row?);
    }
    Ok(out)
}

/// Apply the ballot's invalid-candidate policy to one pick.
fn check_candidate(
    candidate: PlayerId,
    present: &HashSet<PlayerId>,
    policy: InvalidCandidatePolicy,
) -> Result<Option<PlayerId>> {
    if present.contains(&candidate) {
        return Ok(Some(candidate));
    }
    match policy {
        InvalidCandidatePolicy::Reject => Err(Error::VoteRejected(format!(
            "candidate {candidate} was not present in this match"
        ))),
        InvalidCandidatePolicy::NullOut => {
            tracing::debug!(candidate, "ballot named an absent candidate, dropping");
            Ok(None)
        }
    }
}

fn validate_payload(
    payload: BallotPayload,
    present: &HashSet<PlayerId>,
) -> Result<BallotPayload> {
    let policy = policy_for(&payload);
    match payload {
        BallotPayload::Stars { votes } => {
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(votes.len());
            for vote in votes {
                let Some(candidate) = check_candidate(vote.player_id, present, policy)? else {
                    continue;
                };
                if !seen.insert(candidate) {
                    return Err(Error::VoteRejected(format!(
                        "duplicate vote for candidate {candidate}"
                    )));
                }
                out.push(StarVote {
                    player_id: candidate,
                    stars: vote.stars.min(5),
                });
            }
            if out.is_empty() {
                return Err(Error::VoteRejected("empty ballot".to_string()));
            }
            Ok(BallotPayload::Stars { votes: out })
        }
        BallotPayload::Ranking { groups } => {
            let mut seen = HashSet::new();
            for group in &groups {
                for candidate in &group.ordered {
                    check_candidate(*candidate, present, policy)?;
                    if !seen.insert(*candidate) {
                        return Err(Error::VoteRejected(format!(
                            "candidate {candidate} ranked twice"
                        )));
                    }
                }
            }
            if seen.is_empty() {
                return Err(Error::VoteRejected("empty ballot".to_string()));
            }
            Ok(BallotPayload::Ranking { groups })
        }
        BallotPayload::VoteLink { best_overall } => {
            let best_overall = match best_overall {
                Some(candidate) => check_candidate(candidate, present, policy)?,
                None => None,
            };
            Ok(BallotPayload::VoteLink { best_overall })
        }
    }
}

pub fn load_ballots(conn: &Connection, match_id: MatchId) -> Result<Vec<Ballot>> {
    let mut stmt = conn.prepare(
        "SELECT id, match_id, payload FROM ballots WHERE match_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![match_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, MatchId>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, match_id, raw) = row?;
        out.push(Ballot {
            id,
            match_id,
            payload: serde_json::from_str(&raw)?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_are_stable_and_hex() {
        let d = token_digest("abc");
        assert_eq!(d.len(), 64);
        assert_eq!(d, token_digest("abc"));
        assert_ne!(d, token_digest("abd"));
    }

    #[test]
    fn vote_link_nulls_absent_candidate() {
        let present: HashSet<PlayerId> = [1, 2].into_iter().collect();
        let out = validate_payload(BallotPayload::VoteLink { best_overall: Some(99) }, &present)
            .unwrap();
        match out {
            BallotPayload::VoteLink { best_overall } => assert_eq!(best_overall, None),
            _ => unreachable!(),
        }
    }

    #[test]
    fn stars_reject_absent_candidate() {
        let present: HashSet<PlayerId> = [1].into_iter().collect();
        let err = validate_payload(
            BallotPayload::Stars {
                votes: vec![StarVote { player_id: 2, stars: 4 }],
            },
            &present,
        )
        .unwrap_err();
        assert!(matches!(err, Error::VoteRejected(_)));
    }
}
