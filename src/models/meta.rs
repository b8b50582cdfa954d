use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::card::CardId;

/// Direction an archetype's popularity is moving
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Stable,
}

/// Archetype record as delivered by the meta-aggregation service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregatedArchetype {
    pub name: String,
    #[serde(default)]
    pub normalized_name: String,
    #[serde(default)]
    pub colors: Vec<String>,
    /// Percentage of the metagame (0-100)
    #[serde(default)]
    pub meta_share: f64,
    #[serde(default)]
    pub tournament_top8s: u32,
    #[serde(default)]
    pub tournament_wins: u32,
    /// 1-4, 0 when the source did not assign one
    #[serde(default)]
    pub tier: u8,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub trend_direction: TrendDirection,
}

impl AggregatedArchetype {
    /// Fills in derived fields the upstream source may have left empty
    ///
    /// Normalized name, data-availability confidence, and a tier when none was assigned.
    pub fn finalize(&mut self) {
        if self.normalized_name.is_empty() {
            self.normalized_name = self.name.to_lowercase();
        }
        self.confidence_score = data_confidence(self);
        if self.tier == 0 {
            self.tier = calculate_tier(self.meta_share, self.tournament_top8s);
        }
    }
}

/// Competitive tier from meta share, falling back to tournament top-8 counts
pub fn calculate_tier(meta_share: f64, tournament_top8s: u32) -> u8 {
    if meta_share >= 5.0 {
        return 1;
    }
    if meta_share >= 2.0 {
        return 2;
    }
    if meta_share >= 0.5 {
        return 3;
    }

    if tournament_top8s >= 20 {
        return 1;
    }
    if tournament_top8s >= 10 {
        return 2;
    }
    if tournament_top8s >= 5 {
        return 3;
    }

    4
}

/// How much data backs an archetype record
pub fn data_confidence(arch: &AggregatedArchetype) -> f64 {
    let mut confidence: f64 = 0.0;

    if arch.meta_share > 0.0 {
        confidence += 0.4;
    }
    if arch.tournament_top8s > 0 {
        confidence += 0.3;
        if arch.tournament_top8s >= 10 {
            confidence += 0.1;
        }
        if arch.tournament_top8s >= 20 {
            confidence += 0.1;
        }
    }
    if !arch.colors.is_empty() {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

/// Aggregated metagame snapshot for one format
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregatedMeta {
    pub format: String,
    pub archetypes: Vec<AggregatedArchetype>,
    #[serde(default)]
    pub total_archetypes: usize,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AggregatedMeta {
    /// Finalizes every archetype record
    pub fn finalize(&mut self) {
        for arch in &mut self.archetypes {
            arch.finalize();
        }
        self.total_archetypes = self.archetypes.len();
    }
}

/// Meta-derived standing of an archetype
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArchetypeMetaScore {
    pub archetype_name: String,
    pub meta_share: f64,
    pub tournament_score: f64,
    pub tier_score: f64,
    pub trend_score: f64,
    /// Combined score (0.0-1.0)
    pub overall_score: f64,
    pub confidence: f64,
    pub colors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Meta-derived score of a card through its best-fitting archetype
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CardMetaScore {
    pub card_id: CardId,
    /// 0.0-1.0
    pub score: f64,
    pub archetype_matches: Vec<String>,
    pub top_archetype: Option<String>,
    pub confidence: f64,
    pub factors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}
