//! User registry
//!
//! Registration, lookup and the rating leaderboard. Ratings are never written
//! here after registration; only settlement changes them.

use crate::error::{MatchError, Result};
use crate::storage::{Precondition, Record, Storage, WriteBatch};
use crate::types::{EntityKind, User, UserId};
use crate::utils::{current_timestamp, generate_id, normalize_email};
use std::sync::Arc;
use tracing::info;

pub struct UserRegistry {
    storage: Arc<dyn Storage>,
    initial_rating: f64,
}

impl UserRegistry {
    pub fn new(storage: Arc<dyn Storage>, initial_rating: f64) -> Self {
        Self {
            storage,
            initial_rating,
        }
    }

    /// Register a new user at the initial rating
    pub fn register(&self, name: &str, email: &str) -> Result<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MatchError::validation("Name cannot be blank"));
        }

        let email = normalize_email(email);
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(MatchError::validation(format!(
                    "Invalid email address: '{}'",
                    email
                )))
            }
        }

        let user = User {
            id: generate_id(),
            name: name.to_string(),
            email: email.clone(),
            rating: self.initial_rating,
            created_at: current_timestamp(),
        };

        self.storage.commit(
            WriteBatch::new()
                .require(Precondition::EmailUnclaimed { email })
                .save(Record::User(user.clone())),
        )?;

        info!(
            "Registered user {} ({}) at rating {:.1}",
            user.id, user.name, user.rating
        );
        Ok(user)
    }

    pub fn get(&self, user_id: UserId) -> Result<User> {
        self.storage
            .find_user(user_id)?
            .ok_or_else(|| MatchError::not_found(EntityKind::User, user_id))
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.storage.find_user_by_email(email)
    }

    /// Users by rating, highest first; earlier registration wins ties
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<User>> {
        let mut users = self.storage.list_users()?;
        users.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        users.truncate(limit);
        Ok(users)
    }

    pub fn initial_rating(&self) -> f64 {
        self.initial_rating
    }
}
