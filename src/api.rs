//! Request/response contract for the review UI
//!
//! Handlers take the raw `Authorization` header and request body and always
//! produce a status plus a JSON body, so any transport can sit in front.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::TokenRegistry;
use crate::flashcards::{CardStore, DueQuery, Flashcard, ReviewController, ReviewError};

/// Body of a review submission: a numeric quality or a coarse label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub quality: Option<i64>,
    /// One of `again`, `hard`, `good`, `easy`
    #[serde(default)]
    pub result: Option<String>,
}

/// Query of the due-card listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueRequest {
    #[serde(default)]
    pub deck_ids: Vec<Uuid>,
    #[serde(default)]
    pub due: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueCardsResponse {
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub flashcard: Flashcard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(e) => {
                log::error!("Failed to serialize response: {}", e);
                Self::message(500, "Internal server error")
            }
        }
    }

    fn message(status: u16, error: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": error }),
        }
    }

    fn error(err: &ReviewError) -> Self {
        Self::message(err.status(), &err.to_string())
    }
}

/// `GET` due cards for the authenticated learner
pub async fn handle_due<S: CardStore + ?Sized + 'static>(
    controller: &ReviewController<S>,
    registry: &TokenRegistry,
    authorization: Option<&str>,
    request: &DueRequest,
) -> ApiResponse {
    let learner = match registry.authenticate(authorization) {
        Ok(learner) => learner,
        Err(e) => return ApiResponse::error(&e.into()),
    };

    let mut query = DueQuery::decks(request.deck_ids.clone());
    query.due_only = request.due;

    match controller.load_due_queue(&learner, &query).await {
        Ok(flashcards) => ApiResponse::ok(&DueCardsResponse { flashcards }),
        Err(e) => {
            log::error!("Failed to fetch flashcards: {}", e);
            ApiResponse::error(&e)
        }
    }
}

/// `POST` a review for one card
pub async fn handle_review<S: CardStore + ?Sized + 'static>(
    controller: &ReviewController<S>,
    registry: &TokenRegistry,
    authorization: Option<&str>,
    card_id: &str,
    body: &str,
) -> ApiResponse {
    let learner = match registry.authenticate(authorization) {
        Ok(learner) => learner,
        Err(e) => return ApiResponse::error(&e.into()),
    };

    let request: ReviewRequest = if body.trim().is_empty() {
        ReviewRequest::default()
    } else {
        match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Malformed review body: {}", e);
                return ApiResponse::error(&ReviewError::InvalidQuality);
            }
        }
    };

    let Ok(card_id) = Uuid::parse_str(card_id.trim()) else {
        return ApiResponse::message(404, "Flashcard not found");
    };

    match controller
        .submit_input(&learner, card_id, request.quality, request.result.as_deref())
        .await
    {
        Ok(flashcard) => ApiResponse::ok(&ReviewResponse { flashcard }),
        Err(e) => ApiResponse::error(&e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::Learner;
    use crate::flashcards::MemoryCardStore;

    struct Fixture {
        controller: ReviewController<MemoryCardStore>,
        registry: TokenRegistry,
        card: Flashcard,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryCardStore::new());
        let learner = Learner::new(Uuid::new_v4(), "ada");
        let deck = store.create_deck(learner.id, "Deck").unwrap();
        let card = store.add_card(deck.id, "Q", "A").unwrap();

        let mut registry = TokenRegistry::new();
        registry.insert("token-ada", learner);
        Fixture {
            controller: ReviewController::new(store),
            registry,
            card,
        }
    }

    #[tokio::test]
    async fn test_review_with_label() {
        let f = fixture();
        let response = handle_review(
            &f.controller,
            &f.registry,
            Some("Bearer token-ada"),
            &f.card.id.to_string(),
            r#"{"result":"easy"}"#,
        )
        .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body["flashcard"]["repetitionCount"], 1);
        assert_eq!(response.body["flashcard"]["intervalDays"], 1);
        assert_eq!(response.body["flashcard"]["ease"], 2.6);
    }

    #[tokio::test]
    async fn test_review_error_statuses() {
        let f = fixture();
        let id = f.card.id.to_string();

        let unauthenticated = handle_review(&f.controller, &f.registry, None, &id, r#"{"quality":4}"#).await;
        assert_eq!(unauthenticated.status, 401);

        let bad_token = handle_review(&f.controller, &f.registry, Some("Bearer x"), &id, "{}").await;
        assert_eq!(bad_token.status, 401);

        let invalid = handle_review(&f.controller, &f.registry, Some("token-ada"), &id, r#"{"quality":6}"#).await;
        assert_eq!(invalid.status, 400);
        assert_eq!(
            invalid.body["error"],
            "Invalid quality (0..5) or result label required"
        );

        let empty = handle_review(&f.controller, &f.registry, Some("token-ada"), &id, "").await;
        assert_eq!(empty.status, 400);

        let missing = handle_review(
            &f.controller,
            &f.registry,
            Some("token-ada"),
            &Uuid::new_v4().to_string(),
            r#"{"quality":4}"#,
        )
        .await;
        assert_eq!(missing.status, 404);

        let garbage_id = handle_review(&f.controller, &f.registry, Some("token-ada"), "abc", r#"{"quality":4}"#).await;
        assert_eq!(garbage_id.status, 404);
    }

    #[tokio::test]
    async fn test_due_listing() {
        let f = fixture();
        let request = DueRequest {
            deck_ids: Vec::new(),
            due: true,
        };

        let response = handle_due(&f.controller, &f.registry, Some("Bearer token-ada"), &request).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["flashcards"].as_array().map(Vec::len), Some(1));

        let anonymous = handle_due(&f.controller, &f.registry, None, &request).await;
        assert_eq!(anonymous.status, 401);
    }
}
