use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};

use crate::{
    db::{FeedbackRepository, PerformanceRepository, RatingsRepository},
    error::{AppError, AppResult},
    models::{
        ArchetypeTrainingData, CardFeatures, CardRating, CardTrainingData, DeckPerformance,
        RecommendationFeedback, SetFile, TrainingMetrics, TrainingProgress, ALL_DECK_COLORS,
    },
    services::model::Model,
};

const TOTAL_STEPS: u32 = 5;

/// Draft format whose stored ratings are used for training
const RATINGS_DRAFT_FORMAT: &str = "PremierDraft";

const INCREMENTAL_FEEDBACK_LIMIT: usize = 10_000;

/// Creature types treated as synergy keywords
const TRIBAL_TYPES: [&str; 16] = [
    "Human",
    "Elf",
    "Goblin",
    "Zombie",
    "Vampire",
    "Angel",
    "Dragon",
    "Beast",
    "Wizard",
    "Warrior",
    "Rogue",
    "Cleric",
    "Elemental",
    "Spirit",
    "Merfolk",
    "Soldier",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Minimum games-in-hand for a card rating to be used
    pub min_games_threshold: u32,
    pub feedback_limit: usize,
    /// How far back match history is loaded
    pub history_window_days: i64,
    /// Where checkpoints are written; no directory disables checkpointing
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_games_threshold: 100,
            feedback_limit: 50_000,
            history_window_days: 365,
            checkpoint_dir: None,
        }
    }
}

/// Offline batch job that repopulates the model from ratings, feedback and match history
///
/// Runs are serialized: a second `train` waits for the first to finish.
/// Progress is kept for polling and optionally pushed to a channel without
/// ever blocking the run.
pub struct TrainingPipeline {
    config: PipelineConfig,
    model: Arc<Model>,
    ratings_repo: Option<Arc<dyn RatingsRepository>>,
    feedback_repo: Option<Arc<dyn FeedbackRepository>>,
    performance_repo: Option<Arc<dyn PerformanceRepository>>,
    data_dir: Option<PathBuf>,
    run_lock: Mutex<()>,
    progress: RwLock<TrainingProgress>,
    progress_tx: Option<mpsc::Sender<TrainingProgress>>,
}

struct ExtractedCards {
    cards: Vec<CardTrainingData>,
    sets: usize,
    errors: usize,
}

impl TrainingPipeline {
    pub fn new(model: Arc<Model>, config: PipelineConfig) -> Self {
        Self {
            config,
            model,
            ratings_repo: None,
            feedback_repo: None,
            performance_repo: None,
            data_dir: None,
            run_lock: Mutex::new(()),
            progress: RwLock::new(TrainingProgress::idle()),
            progress_tx: None,
        }
    }

    pub fn with_ratings_repository(mut self, repo: Arc<dyn RatingsRepository>) -> Self {
        self.ratings_repo = Some(repo);
        self
    }

    pub fn with_feedback_repository(mut self, repo: Arc<dyn FeedbackRepository>) -> Self {
        self.feedback_repo = Some(repo);
        self
    }

    pub fn with_performance_repository(mut self, repo: Arc<dyn PerformanceRepository>) -> Self {
        self.performance_repo = Some(repo);
        self
    }

    /// Directory of downloaded set rating files
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_progress_channel(mut self, tx: mpsc::Sender<TrainingProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn progress(&self) -> TrainingProgress {
        self.progress
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Runs all five stages and returns the run's metrics
    ///
    /// A failed stage marks progress as failed and aborts. Earlier stages are not
    /// rolled back, but the model is only touched by the final stage.
    pub async fn train(&self) -> AppResult<TrainingMetrics> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();
        let mut metrics = TrainingMetrics {
            trained_at: Some(Utc::now()),
            ..Default::default()
        };

        tracing::info!("Training run started");

        self.update_progress("extracting_ratings", 1, 0.0);
        let extracted = match self.extract_card_data().await {
            Ok(extracted) => extracted,
            Err(e) => return Err(self.fail("extracting ratings", e)),
        };
        metrics.total_cards = extracted.cards.len();
        metrics.total_sets = extracted.sets;
        self.record_extraction(&extracted);

        self.update_progress("loading_feedback", 2, 20.0);
        let feedback = match self.load_feedback().await {
            Ok(feedback) => feedback,
            Err(e) => return Err(self.fail("loading feedback", e)),
        };
        metrics.total_feedback = feedback.len();

        self.update_progress("loading_performance", 3, 40.0);
        let performance = match self.load_performance().await {
            Ok(performance) => performance,
            Err(e) => return Err(self.fail("loading performance", e)),
        };
        metrics.total_performance = performance.len();

        self.update_progress("transforming", 4, 60.0);
        let (cards, skipped_low_games, skipped_invalid) = self.transform(extracted.cards);
        metrics.skipped_low_games = skipped_low_games;
        metrics.skipped_invalid = skipped_invalid;

        let archetypes = self.extract_archetypes(&performance).await;
        metrics.archetypes_learned = archetypes.len();

        self.update_progress("training", 5, 80.0);
        self.train_model(&cards, &archetypes, &feedback);

        metrics.data_quality_score = calculate_data_quality(&cards, feedback.len());
        metrics.card_features_learned = cards.len();
        metrics.model_version = self.model.get_model_info().version;
        metrics.processing_time_ms = started.elapsed().as_millis() as u64;

        self.complete_progress();

        tracing::info!(
            cards = metrics.card_features_learned,
            sets = metrics.total_sets,
            feedback = metrics.total_feedback,
            performance = metrics.total_performance,
            archetypes = metrics.archetypes_learned,
            skipped_low_games = metrics.skipped_low_games,
            skipped_invalid = metrics.skipped_invalid,
            data_quality = metrics.data_quality_score,
            elapsed_ms = metrics.processing_time_ms,
            "Training run complete"
        );

        Ok(metrics)
    }

    /// Replays feedback created after `since` into the model, returning how many records were applied
    ///
    /// Records the model has already counted are skipped.
    pub async fn train_incremental(&self, since: DateTime<Utc>) -> AppResult<usize> {
        let repo = self
            .feedback_repo
            .as_ref()
            .ok_or_else(|| AppError::NotInitialized("feedback repository".to_string()))?;

        let _guard = self.run_lock.lock().await;

        let feedback = repo
            .get_for_training(INCREMENTAL_FEEDBACK_LIMIT)
            .await
            .map_err(|e| e.in_stage("loading feedback"))?;

        let applied = feedback
            .iter()
            .filter(|f| f.created_at > since)
            .filter(|f| self.model.update_from_feedback(f))
            .count();

        tracing::info!(
            applied = applied,
            since = %since,
            "Incremental training applied"
        );

        Ok(applied)
    }

    /// Writes a timestamped model checkpoint, returning its path
    ///
    /// Does nothing when no checkpoint directory is configured.
    pub async fn save_checkpoint(&self) -> AppResult<Option<PathBuf>> {
        let Some(dir) = &self.config.checkpoint_dir else {
            return Ok(None);
        };

        let data = self.model.serialize()?;
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!(
            "checkpoint_{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        tokio::fs::write(&path, data).await?;

        tracing::info!(path = %path.display(), "Checkpoint saved");
        Ok(Some(path))
    }

    pub async fn load_checkpoint(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        self.model.deserialize(&data)?;

        tracing::info!(path = %path.display(), "Checkpoint loaded");
        Ok(())
    }

    /// Newest checkpoint in the configured directory, if any
    pub async fn latest_checkpoint(&self) -> AppResult<Option<PathBuf>> {
        let Some(dir) = &self.config.checkpoint_dir else {
            return Ok(None);
        };

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Timestamped names sort chronologically
        let mut newest: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_checkpoint = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("checkpoint_") && n.ends_with(".json"));
            if is_checkpoint && newest.as_ref().map_or(true, |n| path > *n) {
                newest = Some(path);
            }
        }

        Ok(newest)
    }

    async fn extract_card_data(&self) -> AppResult<ExtractedCards> {
        let mut extracted = ExtractedCards {
            cards: Vec::new(),
            sets: 0,
            errors: 0,
        };

        if let Some(dir) = &self.data_dir {
            let (files, errors) = load_set_files(dir).await?;
            extracted.errors += errors;
            for file in &files {
                extracted
                    .cards
                    .extend(extract_cards_from_set_file(file, self.config.min_games_threshold));
            }
            extracted.sets += files.len();
        }

        if let Some(repo) = &self.ratings_repo {
            let snapshots = match repo.list_snapshots().await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not list rating snapshots, skipping repository");
                    extracted.errors += 1;
                    Vec::new()
                }
            };

            let set_codes: BTreeSet<String> =
                snapshots.into_iter().map(|s| s.expansion).collect();

            for set_code in set_codes {
                match repo.get_card_ratings(&set_code, RATINGS_DRAFT_FORMAT).await {
                    Ok(ratings) => {
                        extracted.cards.extend(ratings.iter().filter_map(|r| {
                            convert_rating(r, &set_code, self.config.min_games_threshold)
                        }));
                        extracted.sets += 1;
                    }
                    Err(e) => {
                        tracing::warn!(set = %set_code, error = %e, "Skipping set, ratings unavailable");
                        extracted.errors += 1;
                    }
                }
            }
        }

        tracing::info!(
            cards = extracted.cards.len(),
            sets = extracted.sets,
            "Extracted card ratings"
        );

        Ok(extracted)
    }

    async fn load_feedback(&self) -> AppResult<Vec<RecommendationFeedback>> {
        let Some(repo) = &self.feedback_repo else {
            return Ok(Vec::new());
        };
        repo.get_for_training(self.config.feedback_limit).await
    }

    async fn load_performance(&self) -> AppResult<Vec<DeckPerformance>> {
        let Some(repo) = &self.performance_repo else {
            return Ok(Vec::new());
        };
        let end = Utc::now();
        let start = end - ChronoDuration::days(self.config.history_window_days);
        repo.get_history_by_date_range(None, start, end).await
    }

    /// Drops invalid and low-volume cards, returning the rest with skip counts
    fn transform(&self, cards: Vec<CardTrainingData>) -> (Vec<CardTrainingData>, usize, usize) {
        let mut valid = Vec::with_capacity(cards.len());
        let mut skipped_low_games = 0;
        let mut skipped_invalid = 0;

        for mut card in cards {
            if !is_valid_card(&card) {
                skipped_invalid += 1;
                continue;
            }
            if card.games_played < self.config.min_games_threshold {
                skipped_low_games += 1;
                continue;
            }

            card.keywords = tribal_keywords(&card.types);
            valid.push(card);
        }

        (valid, skipped_low_games, skipped_invalid)
    }

    /// Groups match history by archetype label with a running win rate
    ///
    /// Stored card-weight tables are merged in when the archetype is known to the
    /// performance repository. Most played first.
    async fn extract_archetypes(&self, history: &[DeckPerformance]) -> Vec<ArchetypeTrainingData> {
        let mut archetypes: HashMap<String, ArchetypeTrainingData> = HashMap::new();

        for perf in history {
            let Some(name) = perf.archetype.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };

            let data = archetypes
                .entry(name.to_string())
                .or_insert_with(|| ArchetypeTrainingData {
                    name: name.to_string(),
                    format: perf.format.clone(),
                    color_identity: perf.color_identity.clone(),
                    ..Default::default()
                });

            let wins = if perf.result.is_win() { 1.0 } else { 0.0 };
            data.win_rate = (data.win_rate * data.popularity + wins) / (data.popularity + 1.0);
            data.popularity += 1.0;
        }

        let mut result: Vec<ArchetypeTrainingData> = archetypes.into_values().collect();

        if let Some(repo) = &self.performance_repo {
            for arch in &mut result {
                let stored = match repo.get_archetype_by_name(&arch.name, &arch.format).await {
                    Ok(Some(stored)) => stored,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::debug!(archetype = %arch.name, error = %e, "Archetype lookup failed");
                        continue;
                    }
                };

                match repo.get_card_weights(stored.id).await {
                    Ok(weights) => {
                        for w in weights {
                            arch.card_weights.insert(w.card_id, w.weight / 10.0);
                            if w.is_signature {
                                arch.key_cards.push(w.card_id);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(archetype = %arch.name, error = %e, "Card weights unavailable");
                    }
                }
            }
        }

        result.sort_by(|a, b| {
            b.popularity
                .partial_cmp(&a.popularity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });

        result
    }

    fn train_model(
        &self,
        cards: &[CardTrainingData],
        archetypes: &[ArchetypeTrainingData],
        feedback: &[RecommendationFeedback],
    ) {
        for card in cards {
            let mut features = CardFeatures::new(
                card.card_id(),
                card.name.clone(),
                card.cmc,
                card.colors.clone(),
                card.types.clone(),
            )
            .with_keywords(card.keywords.clone())
            .with_rarity(card.rarity.clone())
            .with_set_code(card.set_code.clone());
            features.arena_id = card.arena_id.clone();
            self.model.register_card_features(features);
        }

        for arch in archetypes.iter().filter(|a| !a.card_weights.is_empty()) {
            self.model
                .set_archetype_affinities(arch.name.clone(), arch.card_weights.clone());
        }

        for record in feedback {
            self.model.update_from_feedback(record);
        }

        self.model.set_training_metadata(feedback.len(), Utc::now());
    }

    fn update_progress(&self, stage: &str, step: u32, percent: f64) {
        let snapshot = {
            let mut progress = self.write_progress();
            let mut next = TrainingProgress::stage(stage, step, TOTAL_STEPS, percent);
            if step > 1 {
                next.start_time = progress.start_time;
                next.cards_processed = progress.cards_processed;
                next.sets_processed = progress.sets_processed;
                next.error_count = progress.error_count;
            }
            *progress = next;
            progress.clone()
        };
        tracing::debug!(stage = stage, step = step, percent = percent, "Training progress");
        self.publish(snapshot);
    }

    fn record_extraction(&self, extracted: &ExtractedCards) {
        let mut progress = self.write_progress();
        progress.cards_processed = extracted.cards.len();
        progress.sets_processed = extracted.sets;
        progress.error_count = extracted.errors;
    }

    fn fail(&self, stage: &str, error: AppError) -> AppError {
        let error = error.in_stage(stage);
        tracing::error!(stage = stage, error = %error, "Training run failed");

        let snapshot = {
            let mut progress = self.write_progress();
            progress.failed = true;
            progress.error = Some(error.to_string());
            progress.clone()
        };
        self.publish(snapshot);
        error
    }

    fn complete_progress(&self) {
        let snapshot = {
            let mut progress = self.write_progress();
            progress.complete = true;
            progress.percent = 100.0;
            progress.clone()
        };
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: TrainingProgress) {
        if let Some(tx) = &self.progress_tx {
            if tx.try_send(snapshot).is_err() {
                tracing::debug!("Progress receiver full or closed, update dropped");
            }
        }
    }

    fn write_progress(&self) -> std::sync::RwLockWriteGuard<'_, TrainingProgress> {
        self.progress
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reads every `*.json` set file in the directory, returning the files and how many were skipped
async fn load_set_files(dir: &Path) -> AppResult<(Vec<SetFile>, usize)> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "Set data directory does not exist");
            return Ok((Vec::new(), 0));
        }
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::new();
    let mut skipped = 0;
    for path in paths {
        let parsed = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice::<SetFile>(&data).map_err(AppError::from),
            Err(e) => Err(AppError::from(e)),
        };

        match parsed {
            Ok(file) if !file.meta.set_code.is_empty() => files.push(file),
            Ok(_) => {
                tracing::debug!(path = %path.display(), "Skipping file without a set code");
                skipped += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable set file");
                skipped += 1;
            }
        }
    }

    Ok((files, skipped))
}

/// Training records for every card of a set file with enough games in the ALL bucket
pub fn extract_cards_from_set_file(file: &SetFile, min_games: u32) -> Vec<CardTrainingData> {
    let mut arena_ids: Vec<&String> = file.card_ratings.keys().collect();
    arena_ids.sort();

    let mut cards = Vec::new();
    for arena_id in arena_ids {
        let data = &file.card_ratings[arena_id];
        let Some(all) = data.deck_colors.get(ALL_DECK_COLORS) else {
            continue;
        };
        if all.gih < min_games {
            continue;
        }

        let mut affinities = HashMap::new();
        if all.gihwr > 0.0 {
            for (combo, ratings) in &data.deck_colors {
                if combo == ALL_DECK_COLORS {
                    continue;
                }
                let mut affinity = ratings.gihwr / all.gihwr;
                if affinity > 1.0 {
                    affinity = 1.0 + (affinity - 1.0) * 0.5;
                }
                affinities.insert(combo.clone(), affinity);
            }
        }

        cards.push(CardTrainingData {
            arena_id: arena_id.clone(),
            name: data.name.clone(),
            set_code: file.meta.set_code.clone(),
            colors: data.colors.clone(),
            cmc: data.cmc,
            rarity: data.rarity.clone(),
            types: data.types.clone(),
            keywords: Vec::new(),
            gihwr: all.gihwr,
            ohwr: all.ohwr,
            ata: all.ata,
            alsa: all.alsa,
            games_played: all.gih,
            quality_score: normalize_win_rate(all.gihwr),
            pick_score: normalize_pick_position(all.ata),
            win_rate_score: normalize_win_rate(all.gihwr),
            archetype_affinities: affinities,
        });
    }

    cards
}

fn convert_rating(rating: &CardRating, set_code: &str, min_games: u32) -> Option<CardTrainingData> {
    if rating.gih < min_games {
        return None;
    }

    Some(CardTrainingData {
        arena_id: rating.mtga_id.to_string(),
        name: rating.name.clone(),
        set_code: set_code.to_string(),
        colors: vec![rating.color.clone()],
        rarity: rating.rarity.clone(),
        gihwr: rating.gihwr,
        ohwr: rating.ohwr,
        ata: rating.ata,
        alsa: rating.alsa,
        games_played: rating.gih,
        quality_score: normalize_win_rate(rating.gihwr),
        pick_score: normalize_pick_position(rating.ata),
        win_rate_score: normalize_win_rate(rating.gihwr),
        ..Default::default()
    })
}

fn is_valid_card(card: &CardTrainingData) -> bool {
    !card.name.is_empty()
        && (0.0..=100.0).contains(&card.gihwr)
        && (0.0..=20.0).contains(&card.ata)
}

fn tribal_keywords(types: &[String]) -> Vec<String> {
    types
        .iter()
        .filter(|t| TRIBAL_TYPES.contains(&t.as_str()))
        .cloned()
        .collect()
}

/// Maps a 45-65% win rate onto 0.0-1.0
pub fn normalize_win_rate(win_rate: f64) -> f64 {
    ((win_rate - 45.0) / 20.0).clamp(0.0, 1.0)
}

/// Maps average pick position 1-14 onto 1.0-0.0, earlier picks scoring higher
pub fn normalize_pick_position(ata: f64) -> f64 {
    (1.0 - (ata - 1.0) / 13.0).clamp(0.0, 1.0)
}

/// Mean of card volume, feedback volume and win-rate spread buckets
///
/// The spread term is only counted when there are cards.
pub fn calculate_data_quality(cards: &[CardTrainingData], feedback_count: usize) -> f64 {
    fn volume(count: usize) -> f64 {
        if count > 1000 {
            1.0
        } else if count > 500 {
            0.7
        } else if count > 100 {
            0.4
        } else {
            0.0
        }
    }

    let mut score = volume(cards.len()) + volume(feedback_count);
    let mut factors = 2.0;

    if !cards.is_empty() {
        let n = cards.len() as f64;
        let mean = cards.iter().map(|c| c.gihwr).sum::<f64>() / n;
        let variance = cards.iter().map(|c| (c.gihwr - mean).powi(2)).sum::<f64>() / n;

        score += if variance > 25.0 && variance < 100.0 {
            1.0
        } else if variance > 9.0 {
            0.7
        } else {
            0.3
        };
        factors += 1.0;
    }

    score / factors
}
