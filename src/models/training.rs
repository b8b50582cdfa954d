use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::card::CardId;

/// Card record extracted from rating data, local to one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardTrainingData {
    pub arena_id: String,
    pub name: String,
    pub set_code: String,
    pub colors: Vec<String>,
    pub cmc: f64,
    pub rarity: String,
    pub types: Vec<String>,
    pub keywords: Vec<String>,

    pub gihwr: f64,
    pub ohwr: f64,
    pub ata: f64,
    pub alsa: f64,
    pub games_played: u32,

    // Normalized to 0.0-1.0
    pub quality_score: f64,
    pub pick_score: f64,
    pub win_rate_score: f64,

    /// Deck color combination -> relative performance against the ALL bucket
    pub archetype_affinities: HashMap<String, f64>,
}

impl CardTrainingData {
    /// Numeric card id parsed from the Arena ID, 0 when it is not numeric
    pub fn card_id(&self) -> CardId {
        self.arena_id.trim().parse().unwrap_or(0)
    }
}

/// Archetype aggregate built from match history, local to one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchetypeTrainingData {
    pub name: String,
    pub set_code: String,
    pub format: String,
    pub color_identity: String,
    pub win_rate: f64,
    /// Number of recorded matches
    pub popularity: f64,
    pub key_cards: Vec<CardId>,
    pub card_weights: HashMap<CardId, f64>,
}

/// Summary of one completed training run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    pub total_cards: usize,
    pub total_sets: usize,
    pub total_feedback: usize,
    pub total_performance: usize,
    pub skipped_low_games: usize,
    pub skipped_invalid: usize,
    pub processing_time_ms: u64,
    pub data_quality_score: f64,
    pub trained_at: Option<DateTime<Utc>>,
    pub model_version: String,
    pub archetypes_learned: usize,
    pub card_features_learned: usize,
}

/// Snapshot of a running training pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingProgress {
    pub stage: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub percent: f64,
    pub cards_processed: usize,
    pub sets_processed: usize,
    pub error_count: usize,
    pub start_time: DateTime<Utc>,
    pub complete: bool,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrainingProgress {
    pub fn idle() -> Self {
        Self::stage("idle", 0, 0, 0.0)
    }

    pub fn stage(stage: &str, current_step: u32, total_steps: u32, percent: f64) -> Self {
        Self {
            stage: stage.to_string(),
            current_step,
            total_steps,
            percent,
            cards_processed: 0,
            sets_processed: 0,
            error_count: 0,
            start_time: Utc::now(),
            complete: false,
            failed: false,
            error: None,
        }
    }
}

/// Read-only summary of the model's learned state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub version: String,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub training_samples: usize,
    pub card_features_count: usize,
    pub cooccurrence_count: usize,
    pub archetype_count: usize,
    pub personal_pref_count: usize,
    pub is_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_id_parses_arena_id() {
        let card = CardTrainingData {
            arena_id: "87521".to_string(),
            ..Default::default()
        };
        assert_eq!(card.card_id(), 87521);

        let bad = CardTrainingData {
            arena_id: "abc".to_string(),
            ..Default::default()
        };
        assert_eq!(bad.card_id(), 0);
    }

    #[test]
    fn test_idle_progress() {
        let progress = TrainingProgress::idle();
        assert_eq!(progress.stage, "idle");
        assert!(!progress.complete);
        assert!(progress.error.is_none());
    }
}
