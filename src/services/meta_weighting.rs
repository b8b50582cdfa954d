use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{AggregatedArchetype, ArchetypeMetaScore, CardId, CardMetaScore, TrendDirection},
    services::providers::MetaSource,
};

#[derive(Debug, Clone, PartialEq)]
pub struct MetaWeightingConfig {
    pub tier1_weight: f64,
    pub tier2_weight: f64,
    pub tier3_weight: f64,
    pub tier4_weight: f64,
    /// Reserved for a card-level bonus on tournament-proven archetypes; not read by scoring
    pub tournament_bonus: f64,
    /// Scales the meta share contribution
    pub meta_share_multiplier: f64,
    pub trend_boost_up: f64,
    pub trend_boost_down: f64,
    pub trend_boost_stable: f64,
    /// How long a format's scores stay valid
    pub cache_ttl: Duration,
}

impl Default for MetaWeightingConfig {
    fn default() -> Self {
        Self {
            tier1_weight: 1.0,
            tier2_weight: 0.75,
            tier3_weight: 0.5,
            tier4_weight: 0.25,
            tournament_bonus: 0.1,
            meta_share_multiplier: 1.0,
            trend_boost_up: 0.1,
            trend_boost_down: -0.05,
            trend_boost_stable: 0.0,
            cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Card scores depend on the deck they are asked for, so the deck is part of the key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CardCacheKey {
    card_id: CardId,
    colors: Vec<String>,
    archetype: String,
}

#[derive(Debug)]
struct FormatCache {
    /// Lower-cased archetype name -> score
    archetypes: HashMap<String, ArchetypeMetaScore>,
    cards: HashMap<CardCacheKey, CardMetaScore>,
    refreshed_at: Instant,
}

/// Turns aggregated metagame data into archetype and card meta scores
///
/// Scores are cached per lower-cased format and replaced wholesale when the TTL
/// expires. Concurrent callers that find a format expired wait on a per-format
/// refresh lock, so only one of them fetches from the source.
pub struct MetaWeighter {
    source: Arc<dyn MetaSource>,
    config: RwLock<MetaWeightingConfig>,
    formats: DashMap<String, FormatCache>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MetaWeighter {
    pub fn new(source: Arc<dyn MetaSource>, config: MetaWeightingConfig) -> Self {
        Self {
            source,
            config: RwLock::new(config),
            formats: DashMap::new(),
            refresh_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> MetaWeightingConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the scoring weights and drops every cached score
    pub fn update_config(&self, config: MetaWeightingConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        self.clear_cache();
    }

    pub fn clear_cache(&self) {
        self.formats.clear();
        tracing::debug!("Meta score cache cleared");
    }

    /// Meta standing of an archetype: exact name match first, then substring
    pub async fn get_archetype_score(
        &self,
        format: &str,
        archetype: &str,
    ) -> AppResult<Option<ArchetypeMetaScore>> {
        let key = self.refresh_format_cache(format).await?;
        Ok(self
            .formats
            .get(&key)
            .and_then(|cache| find_archetype(&cache.archetypes, archetype).cloned()))
    }

    /// Meta score of a card through the best archetype it fits
    pub async fn get_card_meta_score(
        &self,
        format: &str,
        card_id: CardId,
        card_colors: &[String],
        card_archetype: &str,
    ) -> AppResult<CardMetaScore> {
        let key = self.refresh_format_cache(format).await?;
        let card_key = CardCacheKey {
            card_id,
            colors: card_colors.to_vec(),
            archetype: card_archetype.to_lowercase(),
        };

        if let Some(cached) = self
            .formats
            .get(&key)
            .and_then(|cache| cache.cards.get(&card_key).cloned())
        {
            tracing::debug!(format = %key, card_id = card_id, "Card meta score cache hit");
            return Ok(cached);
        }

        let score = match self.formats.get(&key) {
            Some(cache) => {
                calculate_card_meta_score(&cache.archetypes, card_id, card_colors, card_archetype)
            }
            None => no_meta_data(card_id),
        };

        if let Some(mut cache) = self.formats.get_mut(&key) {
            cache.cards.insert(card_key, score.clone());
        }

        Ok(score)
    }

    /// Highest-scoring archetypes; a limit of 0 or beyond the list returns all of them
    pub async fn get_top_archetypes(
        &self,
        format: &str,
        limit: usize,
    ) -> AppResult<Vec<ArchetypeMetaScore>> {
        let key = self.refresh_format_cache(format).await?;

        let mut scores: Vec<ArchetypeMetaScore> = self
            .formats
            .get(&key)
            .map(|cache| cache.archetypes.values().cloned().collect())
            .unwrap_or_default();

        scores.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.archetype_name.cmp(&b.archetype_name))
        });

        if limit > 0 && limit < scores.len() {
            scores.truncate(limit);
        }

        Ok(scores)
    }

    /// Meta score of a whole deck by archetype name, falling back to color fit
    pub async fn get_meta_score_for_deck(
        &self,
        format: &str,
        colors: &[String],
        archetype: &str,
    ) -> AppResult<f64> {
        if !archetype.is_empty() {
            if let Some(score) = self.get_archetype_score(format, archetype).await? {
                return Ok(score.overall_score);
            }
        }

        let key = self.refresh_format_cache(format).await?;
        let best = self
            .formats
            .get(&key)
            .map(|cache| {
                cache
                    .archetypes
                    .values()
                    .filter(|score| colors_match(&score.colors, colors))
                    .map(|score| score.overall_score)
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0);

        if best == 0.0 {
            return Ok(0.5);
        }
        Ok(best)
    }

    /// Makes sure the format's scores are fresh and returns its cache key
    async fn refresh_format_cache(&self, format: &str) -> AppResult<String> {
        let key = format.trim().to_lowercase();
        if key.is_empty() {
            return Err(AppError::InvalidInput("Format cannot be empty".to_string()));
        }

        let ttl = self.config().cache_ttl;
        if self.is_fresh(&key, ttl) {
            return Ok(key);
        }

        let lock = self
            .refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Someone else may have refreshed while we waited
        if self.is_fresh(&key, ttl) {
            return Ok(key);
        }

        let aggregated = self.source.get_aggregated_meta(format).await.map_err(|e| {
            tracing::error!(
                format = %key,
                source = self.source.name(),
                error = %e,
                "Meta refresh failed"
            );
            e
        })?;

        let config = self.config();
        let archetypes: HashMap<String, ArchetypeMetaScore> = aggregated
            .archetypes
            .iter()
            .map(|arch| {
                (
                    arch.name.to_lowercase(),
                    calculate_archetype_score(&config, arch),
                )
            })
            .collect();

        tracing::info!(
            format = %key,
            archetypes = archetypes.len(),
            source = self.source.name(),
            "Meta scores refreshed"
        );

        self.formats.insert(
            key.clone(),
            FormatCache {
                archetypes,
                cards: HashMap::new(),
                refreshed_at: Instant::now(),
            },
        );

        Ok(key)
    }

    fn is_fresh(&self, key: &str, ttl: Duration) -> bool {
        self.formats
            .get(key)
            .is_some_and(|cache| cache.refreshed_at.elapsed() < ttl)
    }
}

/// Combines tier, tournament results, meta share and trend into one score
pub fn calculate_archetype_score(
    config: &MetaWeightingConfig,
    arch: &AggregatedArchetype,
) -> ArchetypeMetaScore {
    let tier_score = match arch.tier {
        1 => config.tier1_weight,
        2 => config.tier2_weight,
        3 => config.tier3_weight,
        _ => config.tier4_weight,
    };

    let mut tournament_score = 0.0;
    if arch.tournament_top8s > 0 {
        tournament_score = f64::min(arch.tournament_top8s as f64 / 20.0, 1.0);
        if arch.tournament_wins > 0 {
            tournament_score =
                f64::min(tournament_score + arch.tournament_wins as f64 * 0.05, 1.0);
        }
    }

    let trend_score = match arch.trend_direction {
        TrendDirection::Up => config.trend_boost_up,
        TrendDirection::Down => config.trend_boost_down,
        TrendDirection::Stable => config.trend_boost_stable,
    };

    let meta_share_normalized = f64::min(arch.meta_share / 20.0, 1.0) * config.meta_share_multiplier;

    let overall = tier_score * 0.4
        + tournament_score * 0.3
        + meta_share_normalized * 0.2
        + (0.5 + trend_score) * 0.1;

    ArchetypeMetaScore {
        archetype_name: arch.name.clone(),
        meta_share: arch.meta_share,
        tournament_score,
        tier_score,
        trend_score,
        overall_score: overall.clamp(0.0, 1.0),
        confidence: arch.confidence_score,
        colors: arch.colors.clone(),
        last_updated: Utc::now(),
    }
}

fn find_archetype<'a>(
    archetypes: &'a HashMap<String, ArchetypeMetaScore>,
    archetype: &str,
) -> Option<&'a ArchetypeMetaScore> {
    let wanted = archetype.to_lowercase();
    if let Some(score) = archetypes.get(&wanted) {
        return Some(score);
    }

    if wanted.is_empty() {
        return None;
    }

    // Stable pick when several names contain the query
    let mut partial: Vec<(&String, &ArchetypeMetaScore)> = archetypes
        .iter()
        .filter(|(name, _)| name.contains(&wanted))
        .collect();
    partial.sort_by(|a, b| a.0.cmp(b.0));
    partial.first().map(|(_, score)| *score)
}

/// Scans the format's archetypes for name or color matches and keeps the best one
pub fn calculate_card_meta_score(
    archetypes: &HashMap<String, ArchetypeMetaScore>,
    card_id: CardId,
    colors: &[String],
    archetype: &str,
) -> CardMetaScore {
    if archetypes.is_empty() {
        return no_meta_data(card_id);
    }

    let wanted = archetype.to_lowercase();
    let mut names: Vec<&str> = archetypes
        .values()
        .map(|s| s.archetype_name.as_str())
        .collect();
    names.sort();

    let mut best: Option<&ArchetypeMetaScore> = None;
    let mut matches = Vec::new();
    let mut seen = HashSet::new();

    for name in names {
        let Some(score) = archetypes.get(&name.to_lowercase()) else {
            continue;
        };
        let name_match =
            !wanted.is_empty() && score.archetype_name.to_lowercase().contains(&wanted);
        if !name_match && !colors_match(&score.colors, colors) {
            continue;
        }

        if seen.insert(score.archetype_name.clone()) {
            matches.push(score.archetype_name.clone());
        }
        if best.map_or(true, |b| score.overall_score > b.overall_score) {
            best = Some(score);
        }
    }

    let mut result = CardMetaScore {
        card_id,
        score: 0.5,
        archetype_matches: matches,
        top_archetype: None,
        confidence: 0.0,
        factors: Vec::new(),
        last_updated: Utc::now(),
    };

    match best {
        Some(best) => {
            result.top_archetype = Some(best.archetype_name.clone());
            result.score = best.overall_score;
            result.confidence = best.confidence;

            if best.tier_score >= 0.75 {
                result.factors.push("Fits tier 1-2 archetype".to_string());
            }
            if best.tournament_score > 0.5 {
                result.factors.push("Tournament proven archetype".to_string());
            }
            if best.trend_score > 0.0 {
                result.factors.push("Archetype is trending up".to_string());
            } else if best.trend_score < 0.0 {
                result.factors.push("Archetype is trending down".to_string());
            }
        }
        None => result.factors.push("No strong archetype match".to_string()),
    }

    result
}

fn no_meta_data(card_id: CardId) -> CardMetaScore {
    CardMetaScore {
        card_id,
        score: 0.5,
        archetype_matches: Vec::new(),
        top_archetype: None,
        confidence: 0.0,
        factors: vec!["No meta data available".to_string()],
        last_updated: Utc::now(),
    }
}

/// True when every card color belongs to the archetype; colorless cards match anything
pub fn colors_match(archetype_colors: &[String], card_colors: &[String]) -> bool {
    card_colors.iter().all(|c| archetype_colors.contains(c))
}
