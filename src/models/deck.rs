use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::card::{CardFeatures, CardId, CARD_TYPES, COLORS};

/// Caller-supplied description of the deck being built
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeckContext {
    pub deck_id: String,
    /// Card IDs already in the deck
    pub cards: Vec<CardId>,
    pub color_identity: Vec<String>,
    /// Card count per (truncated) mana value
    pub cmc_distribution: HashMap<u32, u32>,
    /// Card count per main type
    pub type_distribution: HashMap<String, u32>,
    pub keywords: HashMap<String, u32>,
    pub creature_types: HashMap<String, u32>,
    pub archetype: String,
    pub format: String,
    pub set_code: String,
}

impl DeckContext {
    /// Creates an empty deck context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_colors(mut self, colors: &[&str]) -> Self {
        self.color_identity = colors.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_archetype(mut self, archetype: impl Into<String>) -> Self {
        self.archetype = archetype.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Builds a deck context from the features of the cards already in the deck
    ///
    /// Histograms count one per card; color identity is the union of card colors
    /// in first-seen order.
    pub fn from_features<'a>(cards: impl IntoIterator<Item = &'a CardFeatures>) -> Self {
        let mut ctx = Self::new();
        let mut seen_colors = HashSet::new();

        for card in cards {
            ctx.cards.push(card.card_id);
            *ctx.cmc_distribution.entry(card.cmc.max(0.0) as u32).or_insert(0) += 1;

            for color in &card.colors {
                if seen_colors.insert(color.clone()) {
                    ctx.color_identity.push(color.clone());
                }
            }
            for card_type in card.types.iter().filter(|t| CARD_TYPES.contains(&t.as_str())) {
                *ctx.type_distribution.entry(card_type.clone()).or_insert(0) += 1;
            }
            for keyword in &card.keywords {
                *ctx.keywords.entry(keyword.clone()).or_insert(0) += 1;
            }
            if card.is_creature {
                for tribe in &card.creature_types {
                    *ctx.creature_types.entry(tribe.clone()).or_insert(0) += 1;
                }
            }
        }

        ctx
    }

    /// Total number of cards counted in the type histogram
    pub fn typed_card_count(&self) -> u32 {
        self.type_distribution.values().sum()
    }
}

/// Normalized vector form of a deck, rebuilt on every scoring call
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DeckEmbedding {
    pub deck_id: String,
    /// WUBRG presence
    pub color_profile: [f64; 5],
    /// Mana value 0-7+ distribution
    pub cmc_profile: [f64; 8],
    /// Creature, Instant, Sorcery, Enchantment, Artifact, Land, Planeswalker
    pub type_profile: [f64; 7],
    pub keyword_freq: HashMap<String, f64>,
    pub archetype: String,
    pub win_rate: f64,
    pub match_count: u32,
}

impl DeckEmbedding {
    /// Builds the embedding for a deck context
    pub fn from_context(deck: &DeckContext) -> Self {
        let mut embed = Self {
            deck_id: deck.deck_id.clone(),
            archetype: deck.archetype.clone(),
            ..Default::default()
        };

        for color in &deck.color_identity {
            if let Some(idx) = COLORS.iter().position(|c| c == color) {
                embed.color_profile[idx] = 1.0;
            }
        }

        for (&cmc, &count) in &deck.cmc_distribution {
            let bucket = (cmc as usize).min(7);
            embed.cmc_profile[bucket] += count as f64;
        }
        normalize(&mut embed.cmc_profile);

        for (card_type, &count) in &deck.type_distribution {
            if let Some(idx) = CARD_TYPES.iter().position(|t| t == card_type) {
                embed.type_profile[idx] = count as f64;
            }
        }
        normalize(&mut embed.type_profile);

        embed.keyword_freq = deck
            .keywords
            .iter()
            .map(|(kw, &count)| (kw.clone(), count as f64))
            .collect();

        embed
    }

    /// Concatenated numeric profile (colors, curve, types)
    pub fn as_vector(&self) -> Vec<f64> {
        self.color_profile
            .iter()
            .chain(self.cmc_profile.iter())
            .chain(self.type_profile.iter())
            .copied()
            .collect()
    }
}

fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths, empty input, or a zero vector.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_embedding_profiles_are_normalized() {
        let mut deck = DeckContext::new().with_colors(&["W", "U"]);
        deck.cmc_distribution.insert(2, 3);
        deck.cmc_distribution.insert(3, 1);
        deck.cmc_distribution.insert(9, 1);
        deck.type_distribution.insert("Creature".to_string(), 3);
        deck.type_distribution.insert("Instant".to_string(), 1);

        let embed = DeckEmbedding::from_context(&deck);

        assert_eq!(embed.color_profile, [1.0, 1.0, 0.0, 0.0, 0.0]);
        assert!((embed.cmc_profile[2] - 0.6).abs() < 1e-9);
        assert!((embed.cmc_profile[7] - 0.2).abs() < 1e-9);
        assert!((embed.cmc_profile.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((embed.type_profile[0] - 0.75).abs() < 1e-9);
        assert!((embed.type_profile[1] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_embedding_of_empty_deck_is_zero() {
        let embed = DeckEmbedding::from_context(&DeckContext::new());
        assert!(embed.as_vector().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_from_features_builds_histograms() {
        let bear = CardFeatures::new(
            1,
            "Bear",
            2.0,
            vec!["G".to_string()],
            vec!["Creature".to_string()],
        )
        .with_creature_types(vec!["Bear".to_string()]);
        let bolt = CardFeatures::new(
            2,
            "Bolt",
            1.0,
            vec!["R".to_string()],
            vec!["Instant".to_string()],
        );

        let ctx = DeckContext::from_features([&bear, &bolt]);

        assert_eq!(ctx.cards, vec![1, 2]);
        assert_eq!(ctx.color_identity, vec!["G".to_string(), "R".to_string()]);
        assert_eq!(ctx.cmc_distribution.get(&2), Some(&1));
        assert_eq!(ctx.type_distribution.get("Instant"), Some(&1));
        assert_eq!(ctx.creature_types.get("Bear"), Some(&1));
        assert_eq!(ctx.typed_card_count(), 2);
    }
}
