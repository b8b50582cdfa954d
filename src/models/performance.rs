use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::card::{AccountId, CardId};
use super::feedback::MatchOutcome;

/// One recorded match played with a deck
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeckPerformance {
    pub id: i64,
    pub account_id: AccountId,
    pub deck_id: String,
    pub match_id: String,
    pub archetype: Option<String>,
    /// e.g. "WU", "RG", "WUBRG"
    pub color_identity: String,
    pub card_count: u32,
    pub result: MatchOutcome,
    /// e.g. "Draft", "Constructed"
    pub format: String,
    pub match_timestamp: DateTime<Utc>,
}

impl DeckPerformance {
    /// Splits the color identity string into single-letter colors
    pub fn colors(&self) -> Vec<String> {
        self.color_identity
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_string())
            .collect()
    }
}

/// A named deck strategy stored by the performance repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeckArchetype {
    pub id: i64,
    /// e.g. "UW Flyers"
    pub name: String,
    pub set_code: Option<String>,
    pub format: String,
    pub color_identity: String,
}

/// How strongly a card indicates an archetype
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchetypeCardWeight {
    pub archetype_id: i64,
    pub card_id: CardId,
    /// 0.0-10.0, higher is a stronger indicator
    pub weight: f64,
    pub is_signature: bool,
}
