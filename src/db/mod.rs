//! Storage boundary consumed by the recommender
//!
//! The recommender never talks to a concrete database. Feedback, match history and
//! card ratings come in through these traits; `memory` provides in-process
//! implementations used by the binary and the tests.

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        AccountId, ArchetypeCardWeight, CardId, CardRating, DeckArchetype, DeckPerformance,
        FeedbackAction, FeedbackStats, MatchOutcome, RatingsSnapshot, RecommendationFeedback,
    },
};

pub mod memory;

pub use memory::{MemoryFeedbackRepository, MemoryPerformanceRepository, MemoryRatingsRepository};

/// Accumulated accept/reject/outcome records for recommendations
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Stores a new feedback record and returns it with its assigned id
    ///
    /// A record without a recommendation id gets a fresh one.
    async fn create(&self, feedback: RecommendationFeedback) -> AppResult<RecommendationFeedback>;

    async fn get_by_recommendation_id(
        &self,
        recommendation_id: &str,
    ) -> AppResult<Option<RecommendationFeedback>>;

    /// Most recent records first, at most `limit`
    async fn get_for_training(&self, limit: usize) -> AppResult<Vec<RecommendationFeedback>>;

    async fn update_action(
        &self,
        recommendation_id: &str,
        action: FeedbackAction,
        alternate_choice_id: Option<CardId>,
    ) -> AppResult<()>;

    /// Links a recommendation to the match it was played in
    async fn update_outcome(
        &self,
        recommendation_id: &str,
        match_id: &str,
        result: MatchOutcome,
    ) -> AppResult<()>;

    async fn get_stats(
        &self,
        account_id: AccountId,
        recommendation_type: Option<String>,
    ) -> AppResult<FeedbackStats>;
}

/// Deck match history and archetype card-weight tables
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PerformanceRepository: Send + Sync {
    /// Most recent matches of an account first, at most `limit`
    async fn get_history_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> AppResult<Vec<DeckPerformance>>;

    /// Matches played in `[start, end]`, for one account or for everyone
    async fn get_history_by_date_range(
        &self,
        account_id: Option<AccountId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DeckPerformance>>;

    async fn list_archetypes(&self) -> AppResult<Vec<DeckArchetype>>;

    async fn get_card_weights(&self, archetype_id: i64) -> AppResult<Vec<ArchetypeCardWeight>>;

    async fn get_archetype_by_name(
        &self,
        name: &str,
        format: &str,
    ) -> AppResult<Option<DeckArchetype>>;
}

/// Stored external card ratings
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingsRepository: Send + Sync {
    async fn list_snapshots(&self) -> AppResult<Vec<RatingsSnapshot>>;

    async fn get_card_ratings(
        &self,
        set_code: &str,
        draft_format: &str,
    ) -> AppResult<Vec<CardRating>>;
}
