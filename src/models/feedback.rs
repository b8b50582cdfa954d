use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use super::card::{AccountId, CardId};
use crate::error::AppError;

/// What the player did with a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackAction {
    Accepted,
    Rejected,
    Ignored,
    /// The player picked a different card instead
    Alternate,
}

impl FeedbackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackAction::Accepted => "accepted",
            FeedbackAction::Rejected => "rejected",
            FeedbackAction::Ignored => "ignored",
            FeedbackAction::Alternate => "alternate",
        }
    }
}

impl Display for FeedbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedbackAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accepted" => Ok(FeedbackAction::Accepted),
            "rejected" => Ok(FeedbackAction::Rejected),
            "ignored" => Ok(FeedbackAction::Ignored),
            "alternate" => Ok(FeedbackAction::Alternate),
            other => Err(AppError::InvalidInput(format!(
                "Unknown feedback action: {}",
                other
            ))),
        }
    }
}

/// Result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Win,
    Loss,
}

impl MatchOutcome {
    pub fn is_win(&self) -> bool {
        matches!(self, MatchOutcome::Win)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::Win => "win",
            MatchOutcome::Loss => "loss",
        }
    }
}

impl FromStr for MatchOutcome {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "win" => Ok(MatchOutcome::Win),
            "loss" => Ok(MatchOutcome::Loss),
            other => Err(AppError::InvalidInput(format!(
                "Unknown match outcome: {}",
                other
            ))),
        }
    }
}

/// A player's response to one recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationFeedback {
    pub id: i64,
    pub account_id: AccountId,
    /// "card_pick", "deck_card", "archetype", "sideboard"
    pub recommendation_type: String,
    pub recommendation_id: String,
    pub recommended_card_id: Option<CardId>,
    pub recommended_archetype: Option<String>,
    pub action: FeedbackAction,
    pub alternate_choice_id: Option<CardId>,
    pub outcome_match_id: Option<String>,
    pub outcome_result: Option<MatchOutcome>,
    pub created_at: DateTime<Utc>,
}

impl RecommendationFeedback {
    /// Creates card-pick feedback for a single recommended card
    pub fn for_card(account_id: AccountId, card_id: CardId, action: FeedbackAction) -> Self {
        Self {
            id: 0,
            account_id,
            recommendation_type: "card_pick".to_string(),
            recommendation_id: String::new(),
            recommended_card_id: Some(card_id),
            recommended_archetype: None,
            action,
            alternate_choice_id: None,
            outcome_match_id: None,
            outcome_result: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_outcome(mut self, outcome: MatchOutcome) -> Self {
        self.outcome_result = Some(outcome);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Aggregate feedback counts for an account
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackStats {
    pub total_recommendations: usize,
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub ignored_count: usize,
    pub alternate_count: usize,
    pub acceptance_rate: f64,
    pub win_rate_on_accepted: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "accepted".parse::<FeedbackAction>().unwrap(),
            FeedbackAction::Accepted
        );
        assert_eq!(
            "ALTERNATE".parse::<FeedbackAction>().unwrap(),
            FeedbackAction::Alternate
        );
        assert!("maybe".parse::<FeedbackAction>().is_err());
    }

    #[test]
    fn test_action_serializes_lowercase() {
        let json = serde_json::to_string(&FeedbackAction::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }

    #[test]
    fn test_outcome_parsing() {
        assert_eq!("win".parse::<MatchOutcome>().unwrap(), MatchOutcome::Win);
        assert!("draw".parse::<MatchOutcome>().is_err());
    }
}
