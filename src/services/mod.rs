pub mod content;
pub mod meta_weighting;
pub mod model;
pub mod personal;
pub mod pipeline;
pub mod providers;
pub mod scorer;

pub use meta_weighting::{MetaWeighter, MetaWeightingConfig};
pub use model::{Model, ModelConfig};
pub use personal::{PersonalLearner, PersonalLearnerConfig};
pub use pipeline::{PipelineConfig, TrainingPipeline};
pub use scorer::MetaWeightedScorer;
