use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{FeedbackRepository, PerformanceRepository, RatingsRepository};
use crate::{
    error::{AppError, AppResult},
    models::{
        AccountId, ArchetypeCardWeight, CardId, CardRating, DeckArchetype, DeckPerformance,
        FeedbackAction, FeedbackStats, MatchOutcome, RatingsSnapshot, RecommendationFeedback,
    },
};

/// In-memory feedback store
#[derive(Default)]
pub struct MemoryFeedbackRepository {
    records: RwLock<Vec<RecommendationFeedback>>,
}

impl MemoryFeedbackRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FeedbackRepository for MemoryFeedbackRepository {
    async fn create(
        &self,
        mut feedback: RecommendationFeedback,
    ) -> AppResult<RecommendationFeedback> {
        let mut records = self.records.write().await;
        feedback.id = records.len() as i64 + 1;
        if feedback.recommendation_id.is_empty() {
            feedback.recommendation_id = Uuid::new_v4().to_string();
        }
        records.push(feedback.clone());
        Ok(feedback)
    }

    async fn get_by_recommendation_id(
        &self,
        recommendation_id: &str,
    ) -> AppResult<Option<RecommendationFeedback>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.recommendation_id == recommendation_id)
            .cloned())
    }

    /// Only records with a reported match outcome are training data
    async fn get_for_training(&self, limit: usize) -> AppResult<Vec<RecommendationFeedback>> {
        let records = self.records.read().await;
        let mut result: Vec<RecommendationFeedback> = records
            .iter()
            .filter(|r| r.outcome_result.is_some())
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn update_action(
        &self,
        recommendation_id: &str,
        action: FeedbackAction,
        alternate_choice_id: Option<CardId>,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.recommendation_id == recommendation_id)
            .ok_or_else(|| {
                AppError::repository(
                    "update feedback action",
                    format!("recommendation {} not found", recommendation_id),
                )
            })?;
        record.action = action;
        record.alternate_choice_id = alternate_choice_id;
        Ok(())
    }

    async fn update_outcome(
        &self,
        recommendation_id: &str,
        match_id: &str,
        result: MatchOutcome,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.recommendation_id == recommendation_id)
            .ok_or_else(|| {
                AppError::repository(
                    "update feedback outcome",
                    format!("recommendation {} not found", recommendation_id),
                )
            })?;
        record.outcome_match_id = Some(match_id.to_string());
        record.outcome_result = Some(result);
        Ok(())
    }

    async fn get_stats(
        &self,
        account_id: AccountId,
        recommendation_type: Option<String>,
    ) -> AppResult<FeedbackStats> {
        let records = self.records.read().await;
        let mut stats = FeedbackStats::default();
        let mut accepted_with_outcome = 0usize;
        let mut accepted_wins = 0usize;

        for record in records.iter().filter(|r| {
            r.account_id == account_id
                && recommendation_type
                    .as_deref()
                    .map_or(true, |t| r.recommendation_type == t)
        }) {
            stats.total_recommendations += 1;
            match record.action {
                FeedbackAction::Accepted => {
                    stats.accepted_count += 1;
                    if let Some(outcome) = record.outcome_result {
                        accepted_with_outcome += 1;
                        if outcome.is_win() {
                            accepted_wins += 1;
                        }
                    }
                }
                FeedbackAction::Rejected => stats.rejected_count += 1,
                FeedbackAction::Ignored => stats.ignored_count += 1,
                FeedbackAction::Alternate => stats.alternate_count += 1,
            }
        }

        if stats.total_recommendations > 0 {
            stats.acceptance_rate =
                stats.accepted_count as f64 / stats.total_recommendations as f64;
        }
        if accepted_with_outcome > 0 {
            stats.win_rate_on_accepted =
                Some(accepted_wins as f64 / accepted_with_outcome as f64);
        }

        Ok(stats)
    }
}

/// In-memory match history and archetype tables
#[derive(Default)]
pub struct MemoryPerformanceRepository {
    history: RwLock<Vec<DeckPerformance>>,
    archetypes: RwLock<Vec<DeckArchetype>>,
    weights: RwLock<HashMap<i64, Vec<ArchetypeCardWeight>>>,
}

impl MemoryPerformanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_match(&self, mut performance: DeckPerformance) -> DeckPerformance {
        let mut history = self.history.write().await;
        performance.id = history.len() as i64 + 1;
        history.push(performance.clone());
        performance
    }

    /// Adds an archetype with its card-weight table, returning its id
    pub async fn add_archetype(
        &self,
        mut archetype: DeckArchetype,
        weights: Vec<ArchetypeCardWeight>,
    ) -> i64 {
        let mut archetypes = self.archetypes.write().await;
        let id = archetypes.len() as i64 + 1;
        archetype.id = id;
        archetypes.push(archetype);

        let weights = weights
            .into_iter()
            .map(|w| ArchetypeCardWeight {
                archetype_id: id,
                ..w
            })
            .collect();
        self.weights.write().await.insert(id, weights);
        id
    }
}

#[async_trait::async_trait]
impl PerformanceRepository for MemoryPerformanceRepository {
    async fn get_history_by_account(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> AppResult<Vec<DeckPerformance>> {
        let history = self.history.read().await;
        let mut result: Vec<DeckPerformance> = history
            .iter()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.match_timestamp.cmp(&a.match_timestamp));
        result.truncate(limit);
        Ok(result)
    }

    async fn get_history_by_date_range(
        &self,
        account_id: Option<AccountId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DeckPerformance>> {
        let history = self.history.read().await;
        Ok(history
            .iter()
            .filter(|p| account_id.map_or(true, |id| p.account_id == id))
            .filter(|p| p.match_timestamp >= start && p.match_timestamp <= end)
            .cloned()
            .collect())
    }

    async fn list_archetypes(&self) -> AppResult<Vec<DeckArchetype>> {
        Ok(self.archetypes.read().await.clone())
    }

    async fn get_card_weights(&self, archetype_id: i64) -> AppResult<Vec<ArchetypeCardWeight>> {
        Ok(self
            .weights
            .read()
            .await
            .get(&archetype_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_archetype_by_name(
        &self,
        name: &str,
        format: &str,
    ) -> AppResult<Option<DeckArchetype>> {
        let archetypes = self.archetypes.read().await;
        Ok(archetypes
            .iter()
            .find(|a| a.name == name && (format.is_empty() || a.format == format))
            .cloned())
    }
}

/// In-memory store of card rating snapshots
#[derive(Default)]
pub struct MemoryRatingsRepository {
    snapshots: RwLock<HashMap<(String, String), (RatingsSnapshot, Vec<CardRating>)>>,
}

impl MemoryRatingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ratings stored for one set and draft format
    pub async fn save_set_ratings(
        &self,
        set_code: &str,
        draft_format: &str,
        ratings: Vec<CardRating>,
    ) {
        let snapshot = RatingsSnapshot {
            expansion: set_code.to_string(),
            draft_format: draft_format.to_string(),
            cached_at: Utc::now(),
        };
        self.snapshots.write().await.insert(
            (set_code.to_string(), draft_format.to_string()),
            (snapshot, ratings),
        );
    }
}

#[async_trait::async_trait]
impl RatingsRepository for MemoryRatingsRepository {
    async fn list_snapshots(&self) -> AppResult<Vec<RatingsSnapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.values().map(|(s, _)| s.clone()).collect())
    }

    async fn get_card_ratings(
        &self,
        set_code: &str,
        draft_format: &str,
    ) -> AppResult<Vec<CardRating>> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&(set_code.to_string(), draft_format.to_string()))
            .map(|(_, ratings)| ratings.clone())
            .ok_or_else(|| {
                AppError::repository(
                    "get card ratings",
                    format!("no ratings for {} {}", set_code, draft_format),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let repo = MemoryFeedbackRepository::new();
        let created = repo
            .create(RecommendationFeedback::for_card(1, 10, FeedbackAction::Accepted))
            .await
            .unwrap();

        assert_eq!(created.id, 1);
        assert!(!created.recommendation_id.is_empty());
        let found = repo
            .get_by_recommendation_id(&created.recommendation_id)
            .await
            .unwrap();
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn test_update_outcome_and_stats() {
        let repo = MemoryFeedbackRepository::new();
        let accepted = repo
            .create(RecommendationFeedback::for_card(1, 10, FeedbackAction::Accepted))
            .await
            .unwrap();
        repo.create(RecommendationFeedback::for_card(1, 11, FeedbackAction::Rejected))
            .await
            .unwrap();
        repo.create(RecommendationFeedback::for_card(2, 12, FeedbackAction::Accepted))
            .await
            .unwrap();

        repo.update_outcome(&accepted.recommendation_id, "match-1", MatchOutcome::Win)
            .await
            .unwrap();

        let stats = repo.get_stats(1, None).await.unwrap();
        assert_eq!(stats.total_recommendations, 2);
        assert_eq!(stats.accepted_count, 1);
        assert_eq!(stats.rejected_count, 1);
        assert!((stats.acceptance_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.win_rate_on_accepted, Some(1.0));
    }

    #[tokio::test]
    async fn test_update_action_unknown_recommendation_fails() {
        let repo = MemoryFeedbackRepository::new();
        let result = repo
            .update_action("missing", FeedbackAction::Rejected, None)
            .await;
        assert!(matches!(result, Err(AppError::Repository { .. })));
    }

    #[tokio::test]
    async fn test_get_for_training_is_newest_first_and_limited() {
        let repo = MemoryFeedbackRepository::new();
        let now = Utc::now();
        for i in 0..5 {
            repo.create(
                RecommendationFeedback::for_card(1, i, FeedbackAction::Accepted)
                    .with_outcome(MatchOutcome::Win)
                    .with_created_at(now - Duration::minutes(i)),
            )
            .await
            .unwrap();
        }

        let records = repo.get_for_training(3).await.unwrap();
        let ids: Vec<CardId> = records
            .iter()
            .filter_map(|r| r.recommended_card_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_get_for_training_skips_records_without_outcome() {
        let repo = MemoryFeedbackRepository::new();
        let pending = repo
            .create(RecommendationFeedback::for_card(1, 1, FeedbackAction::Accepted))
            .await
            .unwrap();
        repo.create(
            RecommendationFeedback::for_card(1, 2, FeedbackAction::Rejected)
                .with_outcome(MatchOutcome::Loss),
        )
        .await
        .unwrap();

        let records = repo.get_for_training(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recommended_card_id, Some(2));

        repo.update_outcome(&pending.recommendation_id, "match-9", MatchOutcome::Win)
            .await
            .unwrap();
        assert_eq!(repo.get_for_training(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_archetype_weights_are_keyed_by_assigned_id() {
        let repo = MemoryPerformanceRepository::new();
        let id = repo
            .add_archetype(
                DeckArchetype {
                    id: 0,
                    name: "UW Flyers".to_string(),
                    set_code: None,
                    format: "Draft".to_string(),
                    color_identity: "WU".to_string(),
                },
                vec![ArchetypeCardWeight {
                    archetype_id: 0,
                    card_id: 5,
                    weight: 8.0,
                    is_signature: true,
                }],
            )
            .await;

        let weights = repo.get_card_weights(id).await.unwrap();
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].archetype_id, id);

        let found = repo.get_archetype_by_name("UW Flyers", "Draft").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(id));
        assert!(repo
            .get_archetype_by_name("UW Flyers", "Constructed")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_set_is_a_repository_error() {
        let repo = MemoryRatingsRepository::new();
        let snapshots = tokio_test::block_on(repo.list_snapshots()).unwrap();
        assert!(snapshots.is_empty());

        let result = tokio_test::block_on(repo.get_card_ratings("XYZ", "PremierDraft"));
        assert!(matches!(result, Err(AppError::Repository { .. })));
    }
}
