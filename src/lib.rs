//! Versus - match lifecycle and rating service for 1v1 and 2v2 contests
//!
//! This crate turns an already-decided pairing into persisted game rosters,
//! lets invited players claim their slots, and settles reported scores into
//! Elo rating changes.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod storage;
pub mod types;
pub mod users;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ErrorKind, MatchError, Result};
pub use types::*;

// Re-export key components
pub use lifecycle::{MatchManager, MatchManagerStats};
pub use rating::{EloRatingCalculator, RatingCalculator};
pub use storage::{InMemoryStorage, Storage, WriteBatch};
pub use users::UserRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
