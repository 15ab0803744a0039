//! Core of a recreational-league (pelada) tracker: per-match crowd/stat
//! ratings, cross-match leaderboards, position-weighted overall scores,
//! threshold achievements, vote ballots, and balanced team draws, all over
//! a small relational store. The web layer sits on top of these functions.

pub mod achievements;
pub mod awards;
pub mod cache;
pub mod domain;
pub mod error;
pub mod match_rating;
pub mod overall;
pub mod rankings;
pub mod store;
pub mod team_sort;
pub mod voting;

pub use error::{Error, Result};
