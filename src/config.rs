use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::{
    meta_weighting::MetaWeightingConfig, model::ModelConfig, personal::PersonalLearnerConfig,
    pipeline::PipelineConfig,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Directory of downloaded set rating files (`*.json`)
    #[serde(default)]
    pub set_data_dir: Option<PathBuf>,

    /// Directory that model checkpoints are written to and loaded from
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Base URL of the meta-aggregation service
    #[serde(default)]
    pub meta_api_url: Option<String>,

    /// Directory of stored meta snapshots (`{format}.json`), used when no API URL is set
    #[serde(default)]
    pub meta_snapshot_dir: Option<PathBuf>,

    /// Format whose metagame is reported after training
    #[serde(default = "default_meta_format")]
    pub meta_format: String,

    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    #[serde(default = "default_collaborative_weight")]
    pub collaborative_weight: f64,

    #[serde(default = "default_personal_weight")]
    pub personal_weight: f64,

    #[serde(default = "default_meta_weight")]
    pub meta_weight: f64,

    /// Model learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Rate at which personal preferences move per observation
    #[serde(default = "default_personal_learning_rate")]
    pub personal_learning_rate: f64,

    #[serde(default = "default_min_matches_for_personalization")]
    pub min_matches_for_personalization: u32,

    /// Meta cache lifetime in seconds
    #[serde(default = "default_meta_cache_ttl_secs")]
    pub meta_cache_ttl_secs: u64,

    /// Minimum games-in-hand for a card rating to be used
    #[serde(default = "default_min_games_threshold")]
    pub min_games_threshold: u32,
}

fn default_meta_format() -> String {
    "standard".to_string()
}

fn default_min_training_samples() -> usize {
    50
}

fn default_collaborative_weight() -> f64 {
    0.4
}

fn default_personal_weight() -> f64 {
    0.3
}

fn default_meta_weight() -> f64 {
    0.1
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_personal_learning_rate() -> f64 {
    0.1
}

fn default_min_matches_for_personalization() -> u32 {
    10
}

fn default_meta_cache_ttl_secs() -> u64 {
    1800
}

fn default_min_games_threshold() -> u32 {
    100
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            min_training_samples: self.min_training_samples,
            collaborative_weight: self.collaborative_weight,
            personal_weight: self.personal_weight,
            meta_weight: self.meta_weight,
            learning_rate: self.learning_rate,
            ..ModelConfig::default()
        }
    }

    pub fn personal_config(&self) -> PersonalLearnerConfig {
        PersonalLearnerConfig {
            min_matches_for_personalization: self.min_matches_for_personalization,
            learning_rate: self.personal_learning_rate,
            ..PersonalLearnerConfig::default()
        }
    }

    pub fn meta_config(&self) -> MetaWeightingConfig {
        MetaWeightingConfig {
            cache_ttl: Duration::from_secs(self.meta_cache_ttl_secs),
            ..MetaWeightingConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_games_threshold: self.min_games_threshold,
            checkpoint_dir: self.checkpoint_dir.clone(),
            ..PipelineConfig::default()
        }
    }
}
