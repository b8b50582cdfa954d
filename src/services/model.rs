use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use crate::{
    db::{FeedbackRepository, PerformanceRepository},
    error::{AppError, AppResult},
    models::{
        sort_by_score, AccountId, CardFeatures, CardId, CardScore, DeckContext, DeckEmbedding,
        FeedbackAction, MatchOutcome, ModelInfo, PersonalProfile, RecommendationFeedback,
    },
    services::{content, personal::PersonalLearner},
};

pub const MODEL_VERSION: &str = "1.0.0";

/// Feedback records loaded per training run
const TRAINING_FEEDBACK_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Feedback records required before `train` will run
    pub min_training_samples: usize,
    /// Share of the base score taken by the collaborative signal
    pub collaborative_weight: f64,
    pub personal_weight: f64,
    pub meta_weight: f64,
    /// Reserved for gradient-style updates; counters are exact and do not read it
    pub learning_rate: f64,
    /// Reserved for aging old feedback; not read by scoring or training
    pub decay_factor: f64,
    /// Reserved for similarity-filtered collaborative scores; not read yet
    pub similarity_threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_training_samples: 50,
            collaborative_weight: 0.4,
            personal_weight: 0.3,
            meta_weight: 0.1,
            learning_rate: 0.01,
            decay_factor: 0.95,
            similarity_threshold: 0.5,
        }
    }
}

/// Order-independent co-occurrence key, `lower <= higher`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardPair {
    pub lower: CardId,
    pub higher: CardId,
}

impl CardPair {
    pub fn new(a: CardId, b: CardId) -> Self {
        if a <= b {
            Self {
                lower: a,
                higher: b,
            }
        } else {
            Self {
                lower: b,
                higher: a,
            }
        }
    }
}

/// Per-card feedback counters, only ever incremented
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceStats {
    pub accepted: u64,
    pub rejected: u64,
    pub wins_on_accept: u64,
    pub losses_on_accept: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl AcceptanceStats {
    fn record(&mut self, action: FeedbackAction, outcome: Option<MatchOutcome>) {
        match action {
            FeedbackAction::Accepted => {
                self.accepted += 1;
                match outcome {
                    Some(MatchOutcome::Win) => self.wins_on_accept += 1,
                    Some(MatchOutcome::Loss) => self.losses_on_accept += 1,
                    None => {}
                }
            }
            FeedbackAction::Rejected => self.rejected += 1,
            FeedbackAction::Ignored | FeedbackAction::Alternate => {}
        }
        self.last_updated = Some(Utc::now());
    }

    pub fn sample_count(&self) -> u64 {
        self.accepted + self.rejected
    }
}

#[derive(Debug, Clone)]
struct ModelMetadata {
    version: String,
    last_trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
}

/// Checkpoint document
#[derive(Debug, Serialize)]
struct ModelSnapshot<'a> {
    version: &'a str,
    last_trained_at: Option<DateTime<Utc>>,
    training_samples: usize,
    acceptance_rates: HashMap<CardId, AcceptanceStats>,
    archetype_affinities: HashMap<String, HashMap<CardId, f64>>,
    personal_preferences: HashMap<AccountId, PersonalProfile>,
    applied_feedback_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct ModelSnapshotIn {
    version: Option<String>,
    last_trained_at: Option<DateTime<Utc>>,
    training_samples: Option<usize>,
    acceptance_rates: Option<HashMap<CardId, AcceptanceStats>>,
    archetype_affinities: Option<HashMap<String, HashMap<CardId, f64>>>,
    personal_preferences: Option<HashMap<AccountId, PersonalProfile>>,
    applied_feedback_ids: Option<Vec<i64>>,
}

/// Hybrid card scorer holding everything learned so far
///
/// Each learned table lives in its own sharded map, so scoring, feedback
/// ingestion and training touch only the shards they need. Training runs are
/// serialized by a separate mutex.
pub struct Model {
    config: ModelConfig,
    feedback_repo: Option<Arc<dyn FeedbackRepository>>,
    performance_repo: Option<Arc<dyn PerformanceRepository>>,
    personal_learner: Option<Arc<PersonalLearner>>,

    card_features: DashMap<CardId, CardFeatures>,
    cooccurrence: DashMap<CardPair, f64>,
    acceptance: DashMap<CardId, AcceptanceStats>,
    /// Archetype name -> card -> affinity (0.0-1.0)
    affinities: DashMap<String, HashMap<CardId, f64>>,
    personal_profiles: DashMap<AccountId, PersonalProfile>,
    /// Stored feedback ids already counted into `acceptance`
    applied_feedback: DashSet<i64>,

    metadata: RwLock<ModelMetadata>,
    training: Mutex<()>,
}

impl Model {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            feedback_repo: None,
            performance_repo: None,
            personal_learner: None,
            card_features: DashMap::new(),
            cooccurrence: DashMap::new(),
            acceptance: DashMap::new(),
            affinities: DashMap::new(),
            personal_profiles: DashMap::new(),
            applied_feedback: DashSet::new(),
            metadata: RwLock::new(ModelMetadata {
                version: MODEL_VERSION.to_string(),
                last_trained_at: None,
                training_samples: 0,
            }),
            training: Mutex::new(()),
        }
    }

    pub fn with_feedback_repository(mut self, repo: Arc<dyn FeedbackRepository>) -> Self {
        self.feedback_repo = Some(repo);
        self
    }

    pub fn with_performance_repository(mut self, repo: Arc<dyn PerformanceRepository>) -> Self {
        self.performance_repo = Some(repo);
        self
    }

    /// Personal scores come from this learner's profiles when it has one for the account
    pub fn with_personal_learner(mut self, learner: Arc<PersonalLearner>) -> Self {
        self.personal_learner = Some(learner);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn register_card_features(&self, features: CardFeatures) {
        self.card_features.insert(features.card_id, features);
    }

    pub fn card_features(&self, card_id: CardId) -> Option<CardFeatures> {
        self.card_features.get(&card_id).map(|f| f.value().clone())
    }

    /// Records how strongly two cards succeed together
    pub fn set_cooccurrence(&self, a: CardId, b: CardId, strength: f64) {
        self.cooccurrence
            .insert(CardPair::new(a, b), strength.clamp(0.0, 1.0));
    }

    pub fn set_personal_profile(&self, profile: PersonalProfile) {
        self.personal_profiles.insert(profile.account_id, profile);
    }

    /// Replaces the affinity map of one archetype
    pub fn set_archetype_affinities(
        &self,
        archetype: impl Into<String>,
        weights: HashMap<CardId, f64>,
    ) {
        let clamped = weights
            .into_iter()
            .map(|(card, w)| (card, w.clamp(0.0, 1.0)))
            .collect();
        self.affinities.insert(archetype.into(), clamped);
    }

    pub fn acceptance_stats(&self, card_id: CardId) -> Option<AcceptanceStats> {
        self.acceptance.get(&card_id).map(|s| s.value().clone())
    }

    pub fn archetype_affinities(&self, archetype: &str) -> Option<HashMap<CardId, f64>> {
        self.affinities.get(archetype).map(|a| a.value().clone())
    }

    /// Stamps the sample count and training time
    pub fn set_training_metadata(&self, samples: usize, trained_at: DateTime<Utc>) {
        let mut meta = self.write_metadata();
        meta.training_samples = samples;
        meta.last_trained_at = Some(trained_at);
    }

    /// Scores every candidate against the deck, best first
    ///
    /// Missing signals degrade to 0.5 rather than failing, so every candidate
    /// gets a score.
    pub fn score_cards(
        &self,
        candidates: &[CardId],
        deck: &DeckContext,
        account_id: AccountId,
    ) -> Vec<CardScore> {
        let embedding = DeckEmbedding::from_context(deck);
        let profile = self.personal_profile(account_id);
        let training_samples = self.read_metadata().training_samples;

        let mut scores: Vec<CardScore> = candidates
            .iter()
            .map(|&card_id| {
                self.score_card(card_id, deck, &embedding, profile.as_ref(), training_samples)
            })
            .collect();

        sort_by_score(&mut scores);

        tracing::debug!(
            candidates = candidates.len(),
            account_id = account_id,
            personalized = profile.is_some(),
            "Scored candidate cards"
        );

        scores
    }

    fn score_card(
        &self,
        card_id: CardId,
        deck: &DeckContext,
        embedding: &DeckEmbedding,
        profile: Option<&PersonalProfile>,
        training_samples: usize,
    ) -> CardScore {
        let features = self.card_features(card_id);

        let collaborative_score = self.collaborative_score(card_id, &deck.cards, &embedding.archetype);
        let content_score = features
            .as_ref()
            .map(|f| content::content_score(f, deck))
            .unwrap_or(0.5);
        let personal_score = match (profile, features.as_ref()) {
            (Some(profile), Some(features)) => PersonalLearner::score_profile(profile, features),
            _ => 0.5,
        };
        let meta_score = 0.5;

        let cw = self.config.collaborative_weight;
        let base = collaborative_score * cw + content_score * (1.0 - cw);
        let score = (base
            + (personal_score - 0.5) * self.config.personal_weight
            + (meta_score - 0.5) * self.config.meta_weight)
            .clamp(0.0, 1.0);

        let mut factors = Vec::new();
        if collaborative_score > 0.7 {
            factors.push("frequently picked with similar cards".to_string());
        }
        if content_score > 0.7 {
            factors.push("good fit for deck archetype".to_string());
        }
        if personal_score > 0.7 && profile.is_some() {
            factors.push("matches your play style".to_string());
        }

        CardScore {
            card_id,
            score,
            collaborative_score,
            content_score,
            personal_score,
            meta_score,
            confidence: self.confidence(card_id, &embedding.archetype, training_samples),
            factors,
        }
    }

    fn collaborative_score(&self, card_id: CardId, deck_cards: &[CardId], archetype: &str) -> f64 {
        if self.cooccurrence.is_empty() {
            return 0.5;
        }

        let (total, hits) = deck_cards
            .iter()
            .filter_map(|&other| self.cooccurrence.get(&CardPair::new(card_id, other)).map(|v| *v))
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));

        if hits == 0 {
            return 0.5;
        }

        let affinity = self
            .affinities
            .get(archetype)
            .and_then(|a| a.get(&card_id).copied())
            .unwrap_or(0.0);

        (total / hits as f64) * 0.7 + affinity * 0.3
    }

    fn confidence(&self, card_id: CardId, archetype: &str, training_samples: usize) -> f64 {
        let mut confidence: f64 = 0.3;

        if let Some(stats) = self.acceptance.get(&card_id) {
            let samples = stats.sample_count();
            if samples > 10 {
                confidence += 0.2;
            } else if samples > 5 {
                confidence += 0.1;
            }
        }

        if self.affinities.contains_key(archetype) {
            confidence += 0.2;
        }

        if training_samples > 100 {
            confidence += 0.2;
        } else if training_samples > 50 {
            confidence += 0.1;
        }

        confidence.min(1.0)
    }

    fn personal_profile(&self, account_id: AccountId) -> Option<PersonalProfile> {
        if let Some(profile) = self
            .personal_learner
            .as_ref()
            .and_then(|learner| learner.cached_profile(account_id))
        {
            self.personal_profiles.insert(account_id, profile.clone());
            return Some(profile);
        }

        self.personal_profiles
            .get(&account_id)
            .map(|p| p.value().clone())
    }

    /// Rebuilds acceptance stats and archetype affinities from the repositories
    ///
    /// Refuses to run, leaving every table untouched, when fewer than
    /// `min_training_samples` feedback records are available.
    pub async fn train(&self) -> AppResult<()> {
        let feedback_repo = self
            .feedback_repo
            .as_ref()
            .ok_or_else(|| AppError::NotInitialized("feedback repository".to_string()))?;

        let _guard = self.training.lock().await;
        let started = std::time::Instant::now();

        let feedback = feedback_repo
            .get_for_training(TRAINING_FEEDBACK_LIMIT)
            .await
            .map_err(|e| e.in_stage("loading feedback"))?;

        if feedback.len() < self.config.min_training_samples {
            return Err(AppError::InsufficientData {
                got: feedback.len(),
                need: self.config.min_training_samples,
            });
        }

        self.train_acceptance(&feedback);

        if let Some(repo) = &self.performance_repo {
            self.train_cooccurrence(repo.as_ref()).await?;
            self.train_archetypes(repo.as_ref()).await?;
        } else {
            tracing::debug!("No performance repository, skipping co-occurrence and archetype stages");
        }

        self.set_training_metadata(feedback.len(), Utc::now());

        tracing::info!(
            samples = feedback.len(),
            cards_with_feedback = self.acceptance.len(),
            archetypes = self.affinities.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model trained"
        );

        Ok(())
    }

    /// Adds the batch's records to the live counters, skipping records already counted
    fn train_acceptance(&self, feedback: &[RecommendationFeedback]) {
        let applied = feedback
            .iter()
            .filter(|record| self.update_from_feedback(record))
            .count();
        tracing::debug!(
            batch = feedback.len(),
            applied = applied,
            "Merged feedback into acceptance stats"
        );
    }

    async fn train_cooccurrence(&self, repo: &dyn PerformanceRepository) -> AppResult<()> {
        let end = Utc::now();
        let start = end - ChronoDuration::days(365);
        let history = repo
            .get_history_by_date_range(None, start, end)
            .await
            .map_err(|e| e.in_stage("training co-occurrence"))?;

        // Pair counts need per-deck card lists, which match history does not carry
        let wins = history.iter().filter(|p| p.result.is_win()).count();
        tracing::debug!(
            matches = history.len(),
            wins = wins,
            "Scanned winning decks for co-occurrence"
        );

        Ok(())
    }

    async fn train_archetypes(&self, repo: &dyn PerformanceRepository) -> AppResult<()> {
        let archetypes = repo
            .list_archetypes()
            .await
            .map_err(|e| e.in_stage("training archetypes"))?;

        for archetype in archetypes {
            let weights = match repo.get_card_weights(archetype.id).await {
                Ok(weights) => weights,
                Err(e) => {
                    tracing::warn!(
                        archetype = %archetype.name,
                        error = %e,
                        "Skipping archetype, card weights unavailable"
                    );
                    continue;
                }
            };

            let affinities = weights
                .iter()
                .map(|w| (w.card_id, w.weight / 10.0))
                .collect();
            self.set_archetype_affinities(archetype.name, affinities);
        }

        Ok(())
    }

    /// Applies one feedback record to the card's acceptance counters
    ///
    /// Returns false when the record has no card or its stored id was already
    /// counted. Records without a stored id (id 0) are always counted.
    pub fn update_from_feedback(&self, feedback: &RecommendationFeedback) -> bool {
        let Some(card_id) = feedback.recommended_card_id else {
            return false;
        };
        if feedback.id > 0 && !self.applied_feedback.insert(feedback.id) {
            return false;
        }

        self.acceptance
            .entry(card_id)
            .or_default()
            .record(feedback.action, feedback.outcome_result);
        true
    }

    pub fn get_model_info(&self) -> ModelInfo {
        let meta = self.read_metadata().clone();
        ModelInfo {
            version: meta.version,
            last_trained_at: meta.last_trained_at,
            training_samples: meta.training_samples,
            card_features_count: self.card_features.len(),
            cooccurrence_count: self.cooccurrence.len(),
            archetype_count: self.affinities.len(),
            personal_pref_count: self.personal_profiles.len(),
            is_ready: meta.training_samples >= self.config.min_training_samples,
        }
    }

    /// JSON checkpoint of the learned state
    pub fn serialize(&self) -> AppResult<Vec<u8>> {
        let meta = self.read_metadata().clone();
        let snapshot = ModelSnapshot {
            version: &meta.version,
            last_trained_at: meta.last_trained_at,
            training_samples: meta.training_samples,
            acceptance_rates: self
                .acceptance
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            archetype_affinities: self
                .affinities
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            personal_preferences: self
                .personal_profiles
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            applied_feedback_ids: {
                let mut ids: Vec<i64> = self.applied_feedback.iter().map(|id| *id.key()).collect();
                ids.sort_unstable();
                ids
            },
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Loads a checkpoint; maps absent from the document keep their current contents
    pub fn deserialize(&self, data: &[u8]) -> AppResult<()> {
        let snapshot: ModelSnapshotIn = serde_json::from_slice(data)?;

        {
            let mut meta = self.write_metadata();
            if let Some(version) = snapshot.version {
                meta.version = version;
            }
            if let Some(samples) = snapshot.training_samples {
                meta.training_samples = samples;
            }
            if snapshot.last_trained_at.is_some() {
                meta.last_trained_at = snapshot.last_trained_at;
            }
        }

        if let Some(rates) = snapshot.acceptance_rates {
            self.acceptance.clear();
            for (card_id, stats) in rates {
                self.acceptance.insert(card_id, stats);
            }
        }
        if let Some(affinities) = snapshot.archetype_affinities {
            self.affinities.clear();
            for (archetype, weights) in affinities {
                self.affinities.insert(archetype, weights);
            }
        }
        if let Some(profiles) = snapshot.personal_preferences {
            self.personal_profiles.clear();
            for (account_id, profile) in profiles {
                self.personal_profiles.insert(account_id, profile);
            }
        }
        if let Some(ids) = snapshot.applied_feedback_ids {
            self.applied_feedback.clear();
            for id in ids {
                self.applied_feedback.insert(id);
            }
        }

        Ok(())
    }

    fn read_metadata(&self) -> std::sync::RwLockReadGuard<'_, ModelMetadata> {
        self.metadata
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_metadata(&self) -> std::sync::RwLockWriteGuard<'_, ModelMetadata> {
        self.metadata
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockFeedbackRepository, MockPerformanceRepository};
    use crate::models::{ArchetypeCardWeight, DeckArchetype};

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn red_creature() -> CardFeatures {
        CardFeatures::new(1, "Goblin Raider", 2.0, strings(&["R"]), strings(&["Creature"]))
    }

    fn blue_instant() -> CardFeatures {
        CardFeatures::new(2, "Opt", 1.0, strings(&["U"]), strings(&["Instant"]))
    }

    fn feedback_batch(count: usize) -> Vec<RecommendationFeedback> {
        (0..count)
            .map(|i| {
                let action = if i % 3 == 0 {
                    FeedbackAction::Rejected
                } else {
                    FeedbackAction::Accepted
                };
                let mut record = RecommendationFeedback::for_card(7, (i % 4) as CardId + 1, action)
                    .with_outcome(MatchOutcome::Win);
                record.id = i as i64 + 1;
                record
            })
            .collect()
    }

    #[test]
    fn test_card_pair_is_canonical() {
        assert_eq!(CardPair::new(9, 3), CardPair::new(3, 9));
        let pair = CardPair::new(9, 3);
        assert!(pair.lower <= pair.higher);
    }

    #[test]
    fn test_untrained_scoring_prefers_on_color_creature() {
        let model = Model::new(ModelConfig::default());
        model.register_card_features(red_creature());
        model.register_card_features(blue_instant());

        let deck = DeckContext::new().with_colors(&["R"]).with_archetype("aggro");
        let scores = model.score_cards(&[2, 1], &deck, 1);

        assert_eq!(scores[0].card_id, 1);
        assert!(scores[0].content_score > scores[1].content_score);
        for score in &scores {
            assert_eq!(score.collaborative_score, 0.5);
            assert_eq!(score.personal_score, 0.5);
            assert_eq!(score.meta_score, 0.5);
            assert!((0.0..=1.0).contains(&score.score));
            assert!((0.0..=1.0).contains(&score.confidence));
        }
    }

    #[test]
    fn test_unknown_card_gets_neutral_content_score() {
        let model = Model::new(ModelConfig::default());
        let scores = model.score_cards(&[42], &DeckContext::new(), 1);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].content_score, 0.5);
        assert!((scores[0].score - 0.5).abs() < 1e-9);
        assert!((scores[0].confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_collaborative_score_blends_cooccurrence_and_affinity() {
        let model = Model::new(ModelConfig::default());
        model.set_cooccurrence(10, 1, 0.9);
        model.set_cooccurrence(1, 11, 0.5);
        model.set_archetype_affinities("aggro", HashMap::from([(1, 1.0)]));

        let mut deck = DeckContext::new().with_archetype("aggro");
        deck.cards = vec![10, 11, 12];

        let score = model.score_cards(&[1], &deck, 1).remove(0);
        // avg 0.7 * 0.7 + 1.0 * 0.3
        assert!((score.collaborative_score - 0.79).abs() < 1e-9);
        assert!(score
            .factors
            .contains(&"frequently picked with similar cards".to_string()));

        let unmatched = model.score_cards(&[99], &deck, 1).remove(0);
        assert_eq!(unmatched.collaborative_score, 0.5);
    }

    #[test]
    fn test_cooccurrence_strength_is_clamped() {
        let model = Model::new(ModelConfig::default());
        model.set_cooccurrence(1, 2, 4.0);
        let mut deck = DeckContext::new();
        deck.cards = vec![2];
        let score = model.score_cards(&[1], &deck, 1).remove(0);
        assert!((score.collaborative_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_grows_with_data_and_caps() {
        let model = Model::new(ModelConfig::default());
        model.set_archetype_affinities("aggro", HashMap::from([(1, 0.5)]));
        for _ in 0..11 {
            model.update_from_feedback(&RecommendationFeedback::for_card(
                1,
                1,
                FeedbackAction::Accepted,
            ));
        }
        model.set_training_metadata(500, Utc::now());

        let deck = DeckContext::new().with_archetype("aggro");
        let score = model.score_cards(&[1], &deck, 1).remove(0);
        assert!((score.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_update_from_feedback_counts_outcomes() {
        let model = Model::new(ModelConfig::default());
        model.update_from_feedback(
            &RecommendationFeedback::for_card(1, 5, FeedbackAction::Accepted)
                .with_outcome(MatchOutcome::Win),
        );
        model.update_from_feedback(
            &RecommendationFeedback::for_card(1, 5, FeedbackAction::Accepted)
                .with_outcome(MatchOutcome::Loss),
        );
        model.update_from_feedback(&RecommendationFeedback::for_card(
            1,
            5,
            FeedbackAction::Rejected,
        ));
        model.update_from_feedback(&RecommendationFeedback::for_card(
            1,
            5,
            FeedbackAction::Ignored,
        ));

        let mut no_card = RecommendationFeedback::for_card(1, 6, FeedbackAction::Accepted);
        no_card.recommended_card_id = None;
        model.update_from_feedback(&no_card);

        let stats = model.acceptance_stats(5).unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.wins_on_accept, 1);
        assert_eq!(stats.losses_on_accept, 1);
        assert!(stats.last_updated.is_some());
        assert!(model.acceptance_stats(6).is_none());
    }

    #[test]
    fn test_personal_profile_snapshot_is_used_for_scoring() {
        let model = Model::new(ModelConfig::default());
        model.register_card_features(red_creature());

        let mut profile = PersonalProfile::new(3);
        profile.confidence = 1.0;
        profile.preferred_cmc = 2.0;
        profile.color_preferences.insert("R".to_string(), 1.0);
        profile.type_preferences.insert("Creature".to_string(), 1.0);
        model.set_personal_profile(profile);

        let score = model.score_cards(&[1], &DeckContext::new(), 3).remove(0);
        assert!((score.personal_score - 1.0).abs() < 1e-9);
        assert!(score.factors.contains(&"matches your play style".to_string()));

        let stranger = model.score_cards(&[1], &DeckContext::new(), 4).remove(0);
        assert_eq!(stranger.personal_score, 0.5);
    }

    #[tokio::test]
    async fn test_train_refuses_insufficient_data_without_mutation() {
        let mut repo = MockFeedbackRepository::new();
        repo.expect_get_for_training()
            .returning(|_| Ok(feedback_batch(3)));

        let model = Model::new(ModelConfig::default()).with_feedback_repository(Arc::new(repo));
        let result = model.train().await;

        assert!(matches!(
            result,
            Err(AppError::InsufficientData { got: 3, need: 50 })
        ));
        let info = model.get_model_info();
        assert_eq!(info.training_samples, 0);
        assert!(info.last_trained_at.is_none());
        assert!(model.acceptance_stats(1).is_none());
    }

    #[tokio::test]
    async fn test_train_without_repository_is_not_initialized() {
        let model = Model::new(ModelConfig::default());
        assert!(matches!(
            model.train().await,
            Err(AppError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_train_wraps_repository_failure_with_stage() {
        let mut repo = MockFeedbackRepository::new();
        repo.expect_get_for_training()
            .returning(|_| Err(AppError::repository("query", "timeout")));

        let model = Model::new(ModelConfig::default()).with_feedback_repository(Arc::new(repo));
        let err = model.train().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Repository error during loading feedback: query: timeout"
        );
    }

    #[tokio::test]
    async fn test_train_builds_acceptance_and_affinities() {
        let mut feedback = MockFeedbackRepository::new();
        feedback
            .expect_get_for_training()
            .withf(|limit| *limit == TRAINING_FEEDBACK_LIMIT)
            .returning(|_| Ok(feedback_batch(60)));

        let mut performance = MockPerformanceRepository::new();
        performance
            .expect_get_history_by_date_range()
            .returning(|_, _, _| Ok(vec![]));
        performance.expect_list_archetypes().returning(|| {
            Ok(vec![
                DeckArchetype {
                    id: 1,
                    name: "UW Flyers".to_string(),
                    set_code: None,
                    format: "Draft".to_string(),
                    color_identity: "WU".to_string(),
                },
                DeckArchetype {
                    id: 2,
                    name: "Broken".to_string(),
                    set_code: None,
                    format: "Draft".to_string(),
                    color_identity: "B".to_string(),
                },
            ])
        });
        performance.expect_get_card_weights().returning(|id| {
            if id == 1 {
                Ok(vec![ArchetypeCardWeight {
                    archetype_id: 1,
                    card_id: 3,
                    weight: 8.0,
                    is_signature: true,
                }])
            } else {
                Err(AppError::repository("card weights", "missing"))
            }
        });

        let model = Model::new(ModelConfig::default())
            .with_feedback_repository(Arc::new(feedback))
            .with_performance_repository(Arc::new(performance));

        model.train().await.unwrap();

        let info = model.get_model_info();
        assert_eq!(info.training_samples, 60);
        assert!(info.is_ready);
        assert_eq!(info.archetype_count, 1);
        assert_eq!(
            model.archetype_affinities("UW Flyers").unwrap().get(&3),
            Some(&0.8)
        );

        let total: u64 = (1..=4)
            .filter_map(|id| model.acceptance_stats(id))
            .map(|s| s.accepted + s.rejected)
            .sum();
        assert_eq!(total, 60);

        // Retraining on the same batch does not double count
        model.train().await.unwrap();
        let again: u64 = (1..=4)
            .filter_map(|id| model.acceptance_stats(id))
            .map(|s| s.accepted + s.rejected)
            .sum();
        assert_eq!(again, 60);
    }

    #[tokio::test]
    async fn test_train_adds_to_live_counters() {
        let model = {
            let mut repo = MockFeedbackRepository::new();
            repo.expect_get_for_training().returning(|_| {
                let mut batch = feedback_batch(49);
                let mut record = RecommendationFeedback::for_card(7, 5, FeedbackAction::Accepted)
                    .with_outcome(MatchOutcome::Win);
                record.id = 500;
                batch.push(record);
                Ok(batch)
            });
            Model::new(ModelConfig::default()).with_feedback_repository(Arc::new(repo))
        };

        for _ in 0..20 {
            model.update_from_feedback(&RecommendationFeedback::for_card(
                7,
                5,
                FeedbackAction::Accepted,
            ));
        }
        let before = model.acceptance_stats(5).unwrap().accepted;

        model.train().await.unwrap();
        let after = model.acceptance_stats(5).unwrap();
        assert_eq!(before, 20);
        assert_eq!(after.accepted, 21);
        assert_eq!(after.wins_on_accept, 1);

        model.train().await.unwrap();
        assert_eq!(model.acceptance_stats(5).unwrap().accepted, 21);
    }

    #[test]
    fn test_stored_feedback_is_counted_once() {
        let model = Model::new(ModelConfig::default());
        let mut record = RecommendationFeedback::for_card(1, 9, FeedbackAction::Rejected);
        record.id = 42;

        assert!(model.update_from_feedback(&record));
        assert!(!model.update_from_feedback(&record));
        assert_eq!(model.acceptance_stats(9).unwrap().rejected, 1);

        let restored = Model::new(ModelConfig::default());
        restored.deserialize(&model.serialize().unwrap()).unwrap();
        assert!(!restored.update_from_feedback(&record));
        assert_eq!(restored.acceptance_stats(9).unwrap().rejected, 1);
    }

    #[test]
    fn test_concurrent_scoring_and_feedback() {
        let model = Model::new(ModelConfig::default());
        model.register_card_features(red_creature());
        model.register_card_features(blue_instant());
        model.set_cooccurrence(1, 2, 0.6);
        let deck = DeckContext {
            cards: vec![1, 2],
            ..DeckContext::new().with_colors(&["R"])
        };

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let model = &model;
                scope.spawn(move || {
                    for i in 0..250 {
                        let action = if (writer + i) % 2 == 0 {
                            FeedbackAction::Accepted
                        } else {
                            FeedbackAction::Rejected
                        };
                        model.update_from_feedback(&RecommendationFeedback::for_card(
                            1,
                            1 + (i % 2) as CardId,
                            action,
                        ));
                    }
                });
            }
            for _ in 0..4 {
                let model = &model;
                let deck = &deck;
                scope.spawn(move || {
                    for _ in 0..250 {
                        for score in model.score_cards(&[1, 2, 3], deck, 1) {
                            assert!((0.0..=1.0).contains(&score.score));
                            assert!((0.0..=1.0).contains(&score.confidence));
                        }
                    }
                });
            }
        });

        let total: u64 = (1..=2)
            .filter_map(|id| model.acceptance_stats(id))
            .map(|s| s.sample_count())
            .sum();
        assert_eq!(total, 1000);
        let accepted: u64 = (1..=2)
            .filter_map(|id| model.acceptance_stats(id))
            .map(|s| s.accepted)
            .sum();
        assert_eq!(accepted, 500);
    }

    #[test]
    fn test_serialize_round_trip() {
        let model = Model::new(ModelConfig::default());
        model.update_from_feedback(
            &RecommendationFeedback::for_card(1, 5, FeedbackAction::Accepted)
                .with_outcome(MatchOutcome::Win),
        );
        model.set_archetype_affinities("aggro", HashMap::from([(5, 0.4), (6, 0.9)]));
        model.set_personal_profile(PersonalProfile::new(8));
        model.set_training_metadata(75, Utc::now());

        let data = model.serialize().unwrap();
        let restored = Model::new(ModelConfig::default());
        restored.deserialize(&data).unwrap();

        assert_eq!(restored.acceptance_stats(5), model.acceptance_stats(5));
        assert_eq!(
            restored.archetype_affinities("aggro"),
            model.archetype_affinities("aggro")
        );
        let info = restored.get_model_info();
        assert_eq!(info.training_samples, 75);
        assert_eq!(info.personal_pref_count, 1);
        assert_eq!(info.version, MODEL_VERSION);
    }

    #[test]
    fn test_deserialize_keeps_maps_absent_from_document() {
        let model = Model::new(ModelConfig::default());
        model.set_archetype_affinities("aggro", HashMap::from([(1, 0.5)]));

        model
            .deserialize(br#"{"version":"1.0.0","training_samples":12}"#)
            .unwrap();

        assert!(model.archetype_affinities("aggro").is_some());
        assert_eq!(model.get_model_info().training_samples, 12);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        let model = Model::new(ModelConfig::default());
        assert!(matches!(
            model.deserialize(b"not json"),
            Err(AppError::Serialization(_))
        ));
    }
}
