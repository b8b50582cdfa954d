use std::sync::Arc;

use card_recommender::{
    config::Config,
    db::{MemoryFeedbackRepository, MemoryPerformanceRepository, MemoryRatingsRepository},
    services::{
        providers::{HttpMetaSource, MetaSource, SnapshotMetaSource},
        MetaWeighter, Model, PersonalLearner, TrainingPipeline,
    },
};

const TOP_ARCHETYPES: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "card_recommender=info".into()),
        )
        .init();

    let feedback_repo = Arc::new(MemoryFeedbackRepository::new());
    let performance_repo = Arc::new(MemoryPerformanceRepository::new());
    let ratings_repo = Arc::new(MemoryRatingsRepository::new());

    let learner = Arc::new(
        PersonalLearner::new(config.personal_config())
            .with_performance_repository(performance_repo.clone()),
    );
    let model = Arc::new(
        Model::new(config.model_config())
            .with_feedback_repository(feedback_repo.clone())
            .with_performance_repository(performance_repo.clone())
            .with_personal_learner(learner),
    );

    let mut pipeline = TrainingPipeline::new(model.clone(), config.pipeline_config())
        .with_feedback_repository(feedback_repo)
        .with_performance_repository(performance_repo)
        .with_ratings_repository(ratings_repo);
    if let Some(dir) = &config.set_data_dir {
        pipeline = pipeline.with_data_dir(dir);
    }

    if let Some(path) = pipeline.latest_checkpoint().await? {
        pipeline.load_checkpoint(&path).await?;
    }

    let metrics = pipeline.train().await?;
    tracing::info!(
        cards = metrics.card_features_learned,
        sets = metrics.total_sets,
        feedback = metrics.total_feedback,
        archetypes = metrics.archetypes_learned,
        data_quality = metrics.data_quality_score,
        elapsed_ms = metrics.processing_time_ms,
        "Training finished"
    );

    if let Some(path) = pipeline.save_checkpoint().await? {
        tracing::info!(path = %path.display(), "Model checkpoint written");
    }

    let info = model.get_model_info();
    tracing::info!(
        version = %info.version,
        samples = info.training_samples,
        card_features = info.card_features_count,
        ready = info.is_ready,
        "Model state"
    );

    let source: Option<Arc<dyn MetaSource>> =
        match (&config.meta_api_url, &config.meta_snapshot_dir) {
            (Some(url), _) => Some(Arc::new(HttpMetaSource::new(url.clone())) as Arc<dyn MetaSource>),
            (None, Some(dir)) => Some(Arc::new(SnapshotMetaSource::new(dir)) as Arc<dyn MetaSource>),
            (None, None) => None,
        };

    if let Some(source) = source {
        let weighter = MetaWeighter::new(source, config.meta_config());
        match weighter
            .get_top_archetypes(&config.meta_format, TOP_ARCHETYPES)
            .await
        {
            Ok(top) => {
                for (rank, arch) in top.iter().enumerate() {
                    tracing::info!(
                        rank = rank + 1,
                        archetype = %arch.archetype_name,
                        score = arch.overall_score,
                        meta_share = arch.meta_share,
                        format = %config.meta_format,
                        "Top archetype"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(format = %config.meta_format, error = %e, "Meta report unavailable");
            }
        }
    }

    Ok(())
}
