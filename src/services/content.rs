//! Content-based fit heuristics
//!
//! Each heuristic returns a value in 0.0-1.0 describing how well a card fits the
//! deck on one axis. The content score is their unweighted mean.

use std::collections::HashMap;

use crate::models::{CardFeatures, DeckContext};

/// Ideal Limited curve: mana value -> card count
const IDEAL_CURVE: [(u32, u32); 6] = [(1, 2), (2, 5), (3, 5), (4, 4), (5, 3), (6, 2)];

/// Mean of color, curve, type and synergy fit
pub fn content_score(features: &CardFeatures, deck: &DeckContext) -> f64 {
    let color = color_fit(&features.colors, &deck.color_identity);
    let cmc = cmc_fit(features.cmc, &deck.cmc_distribution);
    let types = type_fit(features, &deck.type_distribution);
    let synergy = synergy_potential(features, &deck.keywords, &deck.creature_types);

    (color + cmc + types + synergy) / 4.0
}

/// Fraction of the card's colors that are in the deck's identity
///
/// Colorless cards always fit.
pub fn color_fit(card_colors: &[String], deck_colors: &[String]) -> f64 {
    if card_colors.is_empty() {
        return 1.0;
    }

    let matches = card_colors
        .iter()
        .filter(|c| deck_colors.contains(c))
        .count();

    matches as f64 / card_colors.len() as f64
}

/// Rewards cards that fill an under-filled slot of the ideal curve
pub fn cmc_fit(card_cmc: f64, cmc_distribution: &HashMap<u32, u32>) -> f64 {
    let cmc = (card_cmc.max(0.0) as u32).min(6);
    let current = cmc_distribution.get(&cmc).copied().unwrap_or(0);
    let target = IDEAL_CURVE
        .iter()
        .find(|(slot, _)| *slot == cmc)
        .map(|(_, count)| *count)
        .unwrap_or(0);

    if current < target {
        let gap = (target - current) as f64 / target as f64;
        return 0.7 + gap * 0.3;
    }

    if current == target {
        return 0.6;
    }

    // Zero-drops have no slot in the curve; any extra one is maximally over target
    if target == 0 {
        return 0.1;
    }

    let excess = (current - target) as f64 / target as f64;
    (0.5 - excess * 0.3).max(0.1)
}

/// Keeps the creature/spell balance near Limited norms
pub fn type_fit(features: &CardFeatures, type_distribution: &HashMap<String, u32>) -> f64 {
    let total: u32 = type_distribution.values().sum();
    if total == 0 {
        return 0.7;
    }

    let creatures = type_distribution.get("Creature").copied().unwrap_or(0);
    let creature_ratio = creatures as f64 / total as f64;

    if features.is_creature {
        if creature_ratio < 0.5 {
            0.8
        } else {
            0.6
        }
    } else if creature_ratio > 0.6 {
        0.7
    } else {
        0.5
    }
}

/// Keyword and tribal overlap with the deck
pub fn synergy_potential(
    features: &CardFeatures,
    deck_keywords: &HashMap<String, u32>,
    deck_tribes: &HashMap<String, u32>,
) -> f64 {
    let mut synergy = 0.0;

    for keyword in &features.keywords {
        if deck_keywords.get(keyword).copied().unwrap_or(0) > 0 {
            synergy += 0.2;
        }
    }

    for tribe in &features.creature_types {
        if deck_tribes.get(tribe).copied().unwrap_or(0) >= 3 {
            synergy += 0.3;
        }
    }

    if synergy == 0.0 {
        return 0.5;
    }

    f64::min(synergy, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    fn creature() -> CardFeatures {
        CardFeatures::new(1, "Bear", 2.0, colors(&["G"]), colors(&["Creature"]))
    }

    fn instant() -> CardFeatures {
        CardFeatures::new(2, "Shock", 1.0, colors(&["R"]), colors(&["Instant"]))
    }

    #[test]
    fn test_color_fit() {
        assert_eq!(color_fit(&[], &colors(&["W"])), 1.0);
        assert_eq!(color_fit(&[], &[]), 1.0);
        assert_eq!(color_fit(&colors(&["W", "U"]), &colors(&["W", "U", "B"])), 1.0);
        assert_eq!(color_fit(&colors(&["R"]), &colors(&["W", "U"])), 0.0);
        assert_eq!(color_fit(&colors(&["W", "R"]), &colors(&["W"])), 0.5);
    }

    #[test]
    fn test_cmc_fit_under_target() {
        let empty = HashMap::new();
        assert!((cmc_fit(2.0, &empty) - 1.0).abs() < 1e-9);

        let mut dist = HashMap::new();
        dist.insert(2, 4);
        // gap 1/5
        assert!((cmc_fit(2.0, &dist) - 0.76).abs() < 1e-9);
    }

    #[test]
    fn test_cmc_fit_at_and_over_target() {
        let mut dist = HashMap::new();
        dist.insert(1, 2);
        assert_eq!(cmc_fit(1.0, &dist), 0.6);

        dist.insert(1, 3);
        // excess 1/2
        assert!((cmc_fit(1.0, &dist) - 0.35).abs() < 1e-9);

        dist.insert(1, 20);
        assert_eq!(cmc_fit(1.0, &dist), 0.1);
    }

    #[test]
    fn test_cmc_fit_caps_at_six() {
        let mut dist = HashMap::new();
        dist.insert(6, 2);
        assert_eq!(cmc_fit(9.0, &dist), 0.6);
    }

    #[test]
    fn test_cmc_fit_zero_drops() {
        let mut dist = HashMap::new();
        assert_eq!(cmc_fit(0.0, &dist), 0.6);
        dist.insert(0, 1);
        assert_eq!(cmc_fit(0.0, &dist), 0.1);
    }

    #[test]
    fn test_type_fit() {
        let mut dist = HashMap::new();
        assert_eq!(type_fit(&creature(), &dist), 0.7);

        dist.insert("Creature".to_string(), 2);
        dist.insert("Instant".to_string(), 3);
        assert_eq!(type_fit(&creature(), &dist), 0.8);
        assert_eq!(type_fit(&instant(), &dist), 0.5);

        dist.insert("Creature".to_string(), 8);
        assert_eq!(type_fit(&creature(), &dist), 0.6);
        assert_eq!(type_fit(&instant(), &dist), 0.7);
    }

    #[test]
    fn test_synergy_potential() {
        let card = creature()
            .with_keywords(colors(&["Flying", "Trample"]))
            .with_creature_types(colors(&["Elf", "Warrior"]));

        let mut keywords = HashMap::new();
        let mut tribes = HashMap::new();
        assert_eq!(synergy_potential(&card, &keywords, &tribes), 0.5);

        keywords.insert("Flying".to_string(), 1);
        tribes.insert("Elf".to_string(), 3);
        tribes.insert("Warrior".to_string(), 2);
        assert!((synergy_potential(&card, &keywords, &tribes) - 0.5).abs() < 1e-9);

        keywords.insert("Trample".to_string(), 2);
        tribes.insert("Warrior".to_string(), 5);
        assert_eq!(synergy_potential(&card, &keywords, &tribes), 1.0);
    }

    #[test]
    fn test_content_score_prefers_on_color_card() {
        let deck = DeckContext::new().with_colors(&["R"]).with_archetype("aggro");
        let red_creature =
            CardFeatures::new(10, "Goblin", 2.0, colors(&["R"]), colors(&["Creature"]));
        let blue_instant =
            CardFeatures::new(11, "Opt", 1.0, colors(&["U"]), colors(&["Instant"]));

        let creature_score = content_score(&red_creature, &deck);
        let instant_score = content_score(&blue_instant, &deck);

        assert!((creature_score - 0.8).abs() < 1e-9);
        assert!((instant_score - 0.55).abs() < 1e-9);
        assert!(creature_score > instant_score);
    }
}
