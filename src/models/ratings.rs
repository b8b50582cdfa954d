use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deck-color bucket holding the whole-format ratings of a card
pub const ALL_DECK_COLORS: &str = "ALL";

/// A downloaded set file: card metadata plus per-deck-color ratings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetFile {
    pub meta: SetMeta,
    /// Keyed by Arena ID as a string
    #[serde(default)]
    pub card_ratings: HashMap<String, CardRatingData>,
    #[serde(default)]
    pub color_ratings: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetMeta {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub set_code: String,
    #[serde(default)]
    pub draft_format: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub total_cards: u32,
    #[serde(default)]
    pub total_games: u64,
}

/// Card metadata with its ratings keyed by deck color combination ("ALL", "W", "UB", ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardRatingData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mana_cost: String,
    #[serde(default)]
    pub cmc: f64,
    /// Type line words, e.g. ["Creature", "Elf", "Warrior"]
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub deck_colors: HashMap<String, DeckColorRatings>,
}

/// Performance metrics of a card within one deck color combination
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeckColorRatings {
    /// Games-in-hand win rate (%)
    #[serde(rename = "GIHWR", default)]
    pub gihwr: f64,
    /// Opening-hand win rate (%)
    #[serde(rename = "OHWR", default)]
    pub ohwr: f64,
    /// Games-in-hand count
    #[serde(rename = "GIH", default)]
    pub gih: u32,
    /// Average taken at (pick number)
    #[serde(rename = "ATA", default)]
    pub ata: f64,
    /// Average last seen at (pick number)
    #[serde(rename = "ALSA", default)]
    pub alsa: f64,
}

/// Flat per-card rating row as stored by the ratings repository
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardRating {
    pub name: String,
    pub color: String,
    pub rarity: String,
    pub mtga_id: i64,
    pub gihwr: f64,
    pub ohwr: f64,
    pub ata: f64,
    pub alsa: f64,
    pub gih: u32,
}

/// A stored ratings snapshot for one expansion and draft format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingsSnapshot {
    pub expansion: String,
    pub draft_format: String,
    pub cached_at: DateTime<Utc>,
}
