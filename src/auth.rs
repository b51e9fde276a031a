//! Learner identity and bearer-token resolution
//!
//! Session issuance lives elsewhere; this module only maps an already
//! issued bearer token to the learner it belongs to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::LearnerEntry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,
}

/// An authenticated learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learner {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
}

impl Learner {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Known bearer tokens
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, Learner>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[LearnerEntry]) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.insert(&entry.token, Learner::new(entry.id, entry.name.clone()));
        }
        registry
    }

    pub fn insert(&mut self, token: &str, learner: Learner) {
        self.tokens.insert(token.to_string(), learner);
    }

    /// Resolve a token or an `Authorization` header value (`Bearer <token>`)
    pub fn authenticate(&self, credentials: Option<&str>) -> Result<Learner, AuthError> {
        let token = credentials
            .map(|raw| raw.trim_start())
            .map(|raw| raw.strip_prefix("Bearer ").unwrap_or(raw).trim())
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        self.tokens.get(token).cloned().ok_or_else(|| {
            log::warn!("Rejected unknown bearer token");
            AuthError::InvalidToken
        })
    }
}
