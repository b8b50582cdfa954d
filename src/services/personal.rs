use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    db::PerformanceRepository,
    error::AppResult,
    models::{
        AccountId, CardFeatures, DeckPerformance, FeedbackAction, MatchLearningData,
        PersonalProfile, PersonalProfileStats, RecommendationFeedback,
    },
};

/// Match count at which confidence reaches 1.0
const FULL_CONFIDENCE_MATCHES: f64 = 200.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PersonalLearnerConfig {
    /// Matches required before personal scores carry any weight
    pub min_matches_for_personalization: u32,
    /// How far a preference moves toward its target per observation
    pub learning_rate: f64,
    /// Reserved for aging old preferences; not read by the update rules
    pub decay_rate: f64,
    /// Matches loaded when backfilling a new profile from history
    pub max_history_size: usize,
    pub style_detection_enabled: bool,
}

impl Default for PersonalLearnerConfig {
    fn default() -> Self {
        Self {
            min_matches_for_personalization: 10,
            learning_rate: 0.1,
            decay_rate: 0.95,
            max_history_size: 500,
            style_detection_enabled: true,
        }
    }
}

/// Learns per-account play preferences from match results and recommendation feedback
///
/// Profiles are created lazily on first access and kept for the lifetime of the
/// learner unless reset. The profile map is sharded, so updates to different
/// accounts do not contend.
pub struct PersonalLearner {
    config: PersonalLearnerConfig,
    performance_repo: Option<Arc<dyn PerformanceRepository>>,
    profiles: DashMap<AccountId, PersonalProfile>,
}

impl PersonalLearner {
    pub fn new(config: PersonalLearnerConfig) -> Self {
        Self {
            config,
            performance_repo: None,
            profiles: DashMap::new(),
        }
    }

    /// Backfills new profiles from this repository's match history
    pub fn with_performance_repository(mut self, repo: Arc<dyn PerformanceRepository>) -> Self {
        self.performance_repo = Some(repo);
        self
    }

    pub fn config(&self) -> &PersonalLearnerConfig {
        &self.config
    }

    /// Returns the account's profile, creating it on first access
    ///
    /// A new profile is backfilled from match history when a repository is
    /// configured. Backfill failures are logged and leave the profile empty.
    pub async fn get_profile(&self, account_id: AccountId) -> PersonalProfile {
        if let Some(profile) = self.profiles.get(&account_id) {
            return profile.value().clone();
        }

        let mut profile = PersonalProfile::new(account_id);
        if let Err(e) = self.load_profile_from_history(&mut profile).await {
            tracing::warn!(
                account_id = account_id,
                error = %e,
                "Failed to backfill personal profile from history"
            );
        }

        tracing::debug!(
            account_id = account_id,
            matches = profile.total_matches,
            "Created personal profile"
        );

        // Another caller may have created the profile while history was loading
        self.profiles
            .entry(account_id)
            .or_insert(profile)
            .value()
            .clone()
    }

    /// Returns the profile only if it has already been created
    pub fn cached_profile(&self, account_id: AccountId) -> Option<PersonalProfile> {
        self.profiles.get(&account_id).map(|p| p.value().clone())
    }

    async fn load_profile_from_history(&self, profile: &mut PersonalProfile) -> AppResult<()> {
        let Some(repo) = &self.performance_repo else {
            return Ok(());
        };

        let history = repo
            .get_history_by_account(profile.account_id, self.config.max_history_size)
            .await
            .map_err(|e| e.in_stage("load personal history"))?;

        if !history.is_empty() {
            self.analyze_history(profile, &history);
        }

        Ok(())
    }

    /// Derives color and archetype preferences and totals from past matches
    fn analyze_history(&self, profile: &mut PersonalProfile, history: &[DeckPerformance]) {
        let mut color_counts: HashMap<String, (u32, u32)> = HashMap::new();
        let mut archetype_counts: HashMap<String, (u32, u32)> = HashMap::new();
        let mut total_wins = 0u32;
        let total_matches = history.len() as u32;

        for record in history {
            let is_win = record.result.is_win();
            if is_win {
                total_wins += 1;
            }

            for color in record.colors() {
                let entry = color_counts.entry(color).or_insert((0, 0));
                entry.0 += 1;
                if is_win {
                    entry.1 += 1;
                }
            }

            if let Some(archetype) = record.archetype.as_ref().filter(|a| !a.is_empty()) {
                let entry = archetype_counts.entry(archetype.clone()).or_insert((0, 0));
                entry.0 += 1;
                if is_win {
                    entry.1 += 1;
                }
            }

            if profile
                .last_match_date
                .map_or(true, |last| record.match_timestamp > last)
            {
                profile.last_match_date = Some(record.match_timestamp);
            }
        }

        for (color, (count, wins)) in color_counts {
            if count >= 5 {
                let win_rate = wins as f64 / count as f64;
                let frequency = count as f64 / total_matches as f64;
                profile
                    .color_preferences
                    .insert(color, win_rate * 0.7 + frequency * 0.3);
            }
        }

        for (archetype, (count, wins)) in archetype_counts {
            if count >= 3 {
                profile
                    .archetype_preferences
                    .insert(archetype, wins as f64 / count as f64);
            }
        }

        profile.total_matches = total_matches;
        profile.total_wins = total_wins;
        if total_matches > 0 {
            profile.win_rate = total_wins as f64 / total_matches as f64;
        }
        profile.confidence = self.calculate_confidence(total_matches);
        profile.last_update_date = Some(Utc::now());
    }

    /// Confidence grows logarithmically with match count, 0 below the minimum
    pub fn calculate_confidence(&self, match_count: u32) -> f64 {
        if match_count < self.config.min_matches_for_personalization || match_count == 0 {
            return 0.0;
        }

        let confidence = (match_count as f64).log10() / FULL_CONFIDENCE_MATCHES.log10();
        confidence.clamp(0.0, 1.0)
    }

    /// Updates preferences from one finished match
    ///
    /// Preferences only move on wins; losses update the counters.
    pub async fn learn_from_match(&self, account_id: AccountId, data: &MatchLearningData) {
        let loaded = self.get_profile(account_id).await;
        let mut profile = self.profiles.entry(account_id).or_insert(loaded);

        let lr = self.config.learning_rate;
        let is_win = data.result.is_win();

        if is_win {
            for color in &data.deck_colors {
                let pref = profile.color_preferences.entry(color.clone()).or_insert(0.0);
                *pref += lr * (1.0 - *pref);
            }

            if data.total_cards > 0 {
                for (card_type, &count) in &data.type_distribution {
                    if count == 0 {
                        continue;
                    }
                    let target = count as f64 / data.total_cards as f64;
                    let pref = profile
                        .type_preferences
                        .entry(card_type.clone())
                        .or_insert(0.0);
                    *pref += lr * (target - *pref);
                }
            }

            if !data.archetype.is_empty() {
                let pref = profile
                    .archetype_preferences
                    .entry(data.archetype.clone())
                    .or_insert(0.0);
                *pref += lr * (1.0 - *pref);
            }

            if data.average_cmc > 0.0 {
                profile.preferred_cmc += lr * (data.average_cmc - profile.preferred_cmc);

                if data.average_cmc < 2.5 {
                    profile.prefer_aggro = true;
                } else if data.average_cmc > 3.5 {
                    profile.prefer_control = true;
                } else {
                    profile.prefer_midrange = true;
                }
            }

            if self.config.style_detection_enabled {
                update_play_style(&mut profile, data, lr);
            }
        }

        let now = Utc::now();
        profile.total_matches += 1;
        if is_win {
            profile.total_wins += 1;
        }
        profile.win_rate = profile.total_wins as f64 / profile.total_matches as f64;
        profile.last_match_date = Some(now);
        profile.last_update_date = Some(now);
        profile.confidence = self.calculate_confidence(profile.total_matches);

        tracing::debug!(
            account_id = account_id,
            result = data.result.as_str(),
            matches = profile.total_matches,
            confidence = profile.confidence,
            "Learned from match"
        );
    }

    /// Nudges the preference for a single recommended card
    pub async fn learn_from_feedback(&self, account_id: AccountId, feedback: &RecommendationFeedback) {
        let Some(card_id) = feedback.recommended_card_id else {
            return;
        };

        let loaded = self.get_profile(account_id).await;
        let mut profile = self.profiles.entry(account_id).or_insert(loaded);

        let lr = self.config.learning_rate;
        let current = profile.card_preferences.get(&card_id).copied().unwrap_or(0.0);

        let updated = match feedback.action {
            FeedbackAction::Accepted => {
                let mut value = current + lr * (1.0 - current);
                if feedback.outcome_result.is_some_and(|o| o.is_win()) {
                    value += lr * 0.2;
                }
                value
            }
            FeedbackAction::Rejected => current - lr * current,
            FeedbackAction::Alternate => current - lr * current * 0.5,
            // Leaves the preference map untouched, including for unseen cards
            FeedbackAction::Ignored => return,
        };

        profile
            .card_preferences
            .insert(card_id, updated.clamp(0.0, 1.0));
        profile.last_update_date = Some(Utc::now());
    }

    /// Personal preference score for a card, 0.5 when the profile is too thin
    pub async fn get_personal_score(&self, account_id: AccountId, card: &CardFeatures) -> f64 {
        let profile = self.get_profile(account_id).await;
        Self::score_profile(&profile, card)
    }

    /// Scores a card against an already-loaded profile
    ///
    /// Averages color, type, direct card (double weight) and mana value signals,
    /// then pulls the result toward 0.5 by the profile's lack of confidence.
    pub fn score_profile(profile: &PersonalProfile, card: &CardFeatures) -> f64 {
        if profile.confidence < 0.1 {
            return 0.5;
        }

        let mut score = 0.0;
        let mut factors = 0u32;

        if !card.colors.is_empty() {
            let color_sum: f64 = card
                .colors
                .iter()
                .filter_map(|c| profile.color_preferences.get(c))
                .sum();
            score += color_sum / card.colors.len() as f64;
            factors += 1;
        }

        for card_type in &card.types {
            if let Some(pref) = profile.type_preferences.get(card_type) {
                score += pref;
                factors += 1;
            }
        }

        if let Some(pref) = profile.card_preferences.get(&card.card_id) {
            score += pref * 2.0;
            factors += 2;
        }

        let cmc_diff = (card.cmc - profile.preferred_cmc).abs();
        score += (1.0 - cmc_diff / 5.0).max(0.0);
        factors += 1;

        let normalized = score / factors as f64;
        (0.5 + (normalized - 0.5) * profile.confidence).clamp(0.0, 1.0)
    }

    /// Forgets everything learned for an account
    pub fn reset_profile(&self, account_id: AccountId) {
        self.profiles.remove(&account_id);
        tracing::info!(account_id = account_id, "Personal profile reset");
    }

    /// Whether the account has enough matches for personalization, and its confidence
    pub async fn is_personalization_ready(&self, account_id: AccountId) -> (bool, f64) {
        let profile = self.get_profile(account_id).await;
        (
            profile.total_matches >= self.config.min_matches_for_personalization,
            profile.confidence,
        )
    }

    pub async fn get_profile_stats(&self, account_id: AccountId) -> PersonalProfileStats {
        let profile = self.get_profile(account_id).await;

        let mut preferred_colors: Vec<String> = profile
            .color_preferences
            .iter()
            .filter(|(_, &pref)| pref > 0.6)
            .map(|(color, _)| color.clone())
            .collect();
        preferred_colors.sort();

        let mut preferred_archetypes: Vec<String> = profile
            .archetype_preferences
            .iter()
            .filter(|(_, &pref)| pref > 0.55)
            .map(|(archetype, _)| archetype.clone())
            .collect();
        preferred_archetypes.sort();

        PersonalProfileStats {
            account_id,
            total_matches: profile.total_matches,
            total_wins: profile.total_wins,
            win_rate: profile.win_rate,
            confidence: profile.confidence,
            last_match_date: profile.last_match_date,
            is_ready: profile.total_matches >= self.config.min_matches_for_personalization,
            preferred_colors,
            preferred_archetypes,
            primary_style: profile.style.primary().map(str::to_string),
        }
    }

    /// JSON map of account id to profile
    pub fn serialize(&self) -> AppResult<Vec<u8>> {
        let profiles: HashMap<AccountId, PersonalProfile> = self
            .profiles
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        Ok(serde_json::to_vec(&profiles)?)
    }

    /// Replaces all profiles with the ones in `data`
    pub fn deserialize(&self, data: &[u8]) -> AppResult<()> {
        let profiles: HashMap<AccountId, PersonalProfile> = serde_json::from_slice(data)?;
        self.profiles.clear();
        for (account_id, profile) in profiles {
            self.profiles.insert(account_id, profile);
        }
        Ok(())
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

/// Moves the style weights toward the style the winning deck was built for
fn update_play_style(profile: &mut PersonalProfile, data: &MatchLearningData, lr: f64) {
    let creature_ratio = if data.total_cards > 0 {
        data.type_distribution.get("Creature").copied().unwrap_or(0) as f64
            / data.total_cards as f64
    } else {
        0.0
    };

    let style = &mut profile.style;
    style.prefer_creature_heavy = creature_ratio > 0.6;
    style.prefer_spell_heavy = creature_ratio < 0.4;

    if data.average_cmc < 2.5 && creature_ratio > 0.5 {
        style.aggro += lr * (1.0 - style.aggro);
    } else if data.average_cmc > 3.5 && creature_ratio < 0.5 {
        style.control += lr * (1.0 - style.control);
    } else if creature_ratio > 0.4 && creature_ratio < 0.6 {
        style.midrange += lr * (1.0 - style.midrange);
    }

    style.renormalize();
}
