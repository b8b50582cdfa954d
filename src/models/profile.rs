use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::card::{AccountId, CardId};
use super::feedback::MatchOutcome;

/// Learned per-account preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalProfile {
    pub account_id: AccountId,

    /// W, U, B, R, G -> 0.0-1.0
    pub color_preferences: HashMap<String, f64>,
    /// Creature, Instant, ... -> 0.0-1.0
    pub type_preferences: HashMap<String, f64>,

    /// Average mana value the player tends to win with
    pub preferred_cmc: f64,
    pub prefer_aggro: bool,
    pub prefer_control: bool,
    pub prefer_midrange: bool,

    pub style: PlayStyleProfile,

    pub archetype_preferences: HashMap<String, f64>,
    pub card_preferences: HashMap<CardId, f64>,

    pub total_matches: u32,
    pub total_wins: u32,
    pub win_rate: f64,
    pub last_match_date: Option<DateTime<Utc>>,
    pub last_update_date: Option<DateTime<Utc>>,

    /// Grows logarithmically with match count
    pub confidence: f64,
}

impl PersonalProfile {
    /// Creates an empty profile
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            color_preferences: HashMap::new(),
            type_preferences: HashMap::new(),
            preferred_cmc: 3.0,
            prefer_aggro: false,
            prefer_control: false,
            prefer_midrange: false,
            style: PlayStyleProfile::default(),
            archetype_preferences: HashMap::new(),
            card_preferences: HashMap::new(),
            total_matches: 0,
            total_wins: 0,
            win_rate: 0.0,
            last_match_date: None,
            last_update_date: None,
            confidence: 0.0,
        }
    }
}

/// Detected play style weights, renormalized to sum to ~1.0
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayStyleProfile {
    pub aggro: f64,
    pub control: f64,
    pub midrange: f64,
    pub tempo: f64,
    pub combo: f64,

    /// More than 60% creatures
    pub prefer_creature_heavy: bool,
    /// Fewer than 40% creatures
    pub prefer_spell_heavy: bool,
}

impl PlayStyleProfile {
    pub fn total(&self) -> f64 {
        self.aggro + self.control + self.midrange + self.tempo + self.combo
    }

    /// Scales the five weights so they sum to 1.0
    pub fn renormalize(&mut self) {
        let total = self.total();
        if total > 0.0 {
            self.aggro /= total;
            self.control /= total;
            self.midrange /= total;
            self.tempo /= total;
            self.combo /= total;
        }
    }

    /// Name of the heaviest style weight, if any weight is set
    pub fn primary(&self) -> Option<&'static str> {
        let weights = [
            ("Aggro", self.aggro),
            ("Control", self.control),
            ("Midrange", self.midrange),
            ("Tempo", self.tempo),
            ("Combo", self.combo),
        ];
        let mut best: Option<(&'static str, f64)> = None;
        for (name, weight) in weights {
            if weight > best.map(|(_, w)| w).unwrap_or(0.0) {
                best = Some((name, weight));
            }
        }
        best.map(|(name, _)| name)
    }
}

/// Summary of a profile for display
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PersonalProfileStats {
    pub account_id: AccountId,
    pub total_matches: u32,
    pub total_wins: u32,
    pub win_rate: f64,
    pub confidence: f64,
    pub last_match_date: Option<DateTime<Utc>>,
    pub is_ready: bool,
    pub preferred_colors: Vec<String>,
    pub preferred_archetypes: Vec<String>,
    pub primary_style: Option<String>,
}

/// Deck composition and result of one match, as fed to the personal learner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchLearningData {
    pub deck_id: String,
    pub deck_colors: Vec<String>,
    pub type_distribution: HashMap<String, u32>,
    pub total_cards: u32,
    pub average_cmc: f64,
    pub archetype: String,
    pub result: MatchOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_defaults() {
        let profile = PersonalProfile::new(7);
        assert_eq!(profile.account_id, 7);
        assert_eq!(profile.preferred_cmc, 3.0);
        assert_eq!(profile.confidence, 0.0);
        assert!(profile.card_preferences.is_empty());
    }

    #[test]
    fn test_renormalize_sums_to_one() {
        let mut style = PlayStyleProfile {
            aggro: 0.2,
            control: 0.1,
            midrange: 0.1,
            ..Default::default()
        };
        style.renormalize();
        assert!((style.total() - 1.0).abs() < 1e-9);
        assert!((style.aggro - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_primary_style() {
        let style = PlayStyleProfile {
            control: 0.6,
            midrange: 0.4,
            ..Default::default()
        };
        assert_eq!(style.primary(), Some("Control"));
        assert_eq!(PlayStyleProfile::default().primary(), None);
    }

    #[test]
    fn test_card_preferences_roundtrip_with_integer_keys() {
        let mut profile = PersonalProfile::new(1);
        profile.card_preferences.insert(42, 0.8);
        let json = serde_json::to_string(&profile).unwrap();
        let back: PersonalProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.card_preferences.get(&42), Some(&0.8));
    }
}
