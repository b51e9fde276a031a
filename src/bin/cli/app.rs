use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use studyhall_lib::auth::{Learner, TokenRegistry};
use studyhall_lib::config::AppConfig;
use studyhall_lib::flashcards::{ReviewController, SqliteCardStore};

/// Shared application state for CLI commands
pub struct App {
    pub store: Arc<SqliteCardStore>,
    pub controller: ReviewController<SqliteCardStore>,
    learner: Option<Learner>,
    auth_error: Option<String>,
}

impl App {
    /// Open the configured database and resolve the learner's token
    pub fn new(config: AppConfig, token: Option<&str>) -> Result<Self> {
        let db_path = config
            .database_path()
            .context("Failed to determine database path")?;
        let store = Arc::new(
            SqliteCardStore::open(&db_path)
                .with_context(|| format!("Failed to open card store at {}", db_path.display()))?,
        );
        let controller = ReviewController::new(Arc::clone(&store)).with_timeout(config.store_timeout());

        let registry = TokenRegistry::from_entries(&config.learners);
        let (learner, auth_error) = match registry.authenticate(token) {
            Ok(learner) => (Some(learner), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(Self {
            store,
            controller,
            learner,
            auth_error,
        })
    }

    /// The authenticated learner, or an error explaining why there is none
    pub fn learner(&self) -> Result<&Learner> {
        self.learner.as_ref().with_context(|| {
            format!(
                "Not signed in ({}). Pass --token or set STUDYHALL_TOKEN to a token from config.toml",
                self.auth_error.as_deref().unwrap_or("unknown learner")
            )
        })
    }

    /// Fail unless the deck belongs to the current learner
    pub fn ensure_deck_owned(&self, deck_id: Uuid) -> Result<()> {
        let learner = self.learner()?;
        let decks = self.store.list_decks(learner.id).context("Failed to list decks")?;
        if decks.iter().any(|d| d.id == deck_id) {
            Ok(())
        } else {
            anyhow::bail!("No deck {} among your decks", deck_id)
        }
    }
}
