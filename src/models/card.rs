use serde::{Deserialize, Serialize};

/// Card identifier (Arena ID)
pub type CardId = i64;

/// Player account identifier
pub type AccountId = i64;

/// The five colors in WUBRG order
pub const COLORS: [&str; 5] = ["W", "U", "B", "R", "G"];

/// Main card types tracked in deck profiles, in embedding order
pub const CARD_TYPES: [&str; 7] = [
    "Creature",
    "Instant",
    "Sorcery",
    "Enchantment",
    "Artifact",
    "Land",
    "Planeswalker",
];

/// Static attributes of a card plus derived type flags
///
/// Registered once in the model's feature registry and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CardFeatures {
    pub card_id: CardId,
    pub arena_id: String,
    pub name: String,
    pub cmc: f64,
    pub colors: Vec<String>,
    pub types: Vec<String>,
    pub keywords: Vec<String>,
    pub creature_types: Vec<String>,
    pub rarity: String,
    pub set_code: String,

    // Derived features
    pub color_count: usize,
    pub is_creature: bool,
    pub is_instant: bool,
    pub is_sorcery: bool,
    pub is_enchantment: bool,
    pub is_artifact: bool,
    pub is_land: bool,
    pub is_planeswalker: bool,
}

impl CardFeatures {
    /// Creates card features and derives the type flags from `types`
    pub fn new(
        card_id: CardId,
        name: impl Into<String>,
        cmc: f64,
        colors: Vec<String>,
        types: Vec<String>,
    ) -> Self {
        let mut features = Self {
            card_id,
            arena_id: card_id.to_string(),
            name: name.into(),
            cmc,
            colors,
            types,
            ..Default::default()
        };
        features.derive();
        features
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_creature_types(mut self, creature_types: Vec<String>) -> Self {
        self.creature_types = creature_types;
        self
    }

    pub fn with_rarity(mut self, rarity: impl Into<String>) -> Self {
        self.rarity = rarity.into();
        self
    }

    pub fn with_set_code(mut self, set_code: impl Into<String>) -> Self {
        self.set_code = set_code.into();
        self
    }

    /// Returns true if the card has the given main type
    pub fn has_type(&self, card_type: &str) -> bool {
        self.types.iter().any(|t| t == card_type)
    }

    /// Recomputes the derived flags from colors and types
    pub fn derive(&mut self) {
        self.color_count = self.colors.len();
        self.is_creature = self.has_type("Creature");
        self.is_instant = self.has_type("Instant");
        self.is_sorcery = self.has_type("Sorcery");
        self.is_enchantment = self.has_type("Enchantment");
        self.is_artifact = self.has_type("Artifact");
        self.is_land = self.has_type("Land");
        self.is_planeswalker = self.has_type("Planeswalker");
    }
}

/// Score produced for one candidate card
///
/// Ephemeral: built per scoring call and never persisted.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CardScore {
    pub card_id: CardId,
    /// Blended score clamped to 0.0-1.0
    pub score: f64,
    pub collaborative_score: f64,
    pub content_score: f64,
    pub personal_score: f64,
    pub meta_score: f64,
    /// Self-reported reliability of the score, 0.0-1.0
    pub confidence: f64,
    /// Human-readable contributing factors
    pub factors: Vec<String>,
}

/// Sorts scores by overall score, highest first, keeping input order on ties
pub fn sort_by_score(scores: &mut [CardScore]) {
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_type_flags() {
        let card = CardFeatures::new(
            1,
            "Artifact Creature",
            3.0,
            vec![],
            vec!["Artifact".to_string(), "Creature".to_string()],
        );
        assert!(card.is_creature);
        assert!(card.is_artifact);
        assert!(!card.is_instant);
        assert_eq!(card.color_count, 0);
        assert_eq!(card.arena_id, "1");
    }

    #[test]
    fn test_sort_by_score_is_descending_and_stable() {
        let mut scores = vec![
            CardScore {
                card_id: 1,
                score: 0.4,
                ..Default::default()
            },
            CardScore {
                card_id: 2,
                score: 0.9,
                ..Default::default()
            },
            CardScore {
                card_id: 3,
                score: 0.4,
                ..Default::default()
            },
        ];
        sort_by_score(&mut scores);
        let ids: Vec<CardId> = scores.iter().map(|s| s.card_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
