pub mod card;
pub mod deck;
pub mod feedback;
pub mod meta;
pub mod performance;
pub mod profile;
pub mod ratings;
pub mod training;

pub use card::{sort_by_score, AccountId, CardFeatures, CardId, CardScore, CARD_TYPES, COLORS};
pub use deck::{cosine_similarity, DeckContext, DeckEmbedding};
pub use feedback::{FeedbackAction, FeedbackStats, MatchOutcome, RecommendationFeedback};
pub use meta::{
    AggregatedArchetype, AggregatedMeta, ArchetypeMetaScore, CardMetaScore, TrendDirection,
};
pub use performance::{ArchetypeCardWeight, DeckArchetype, DeckPerformance};
pub use profile::{MatchLearningData, PersonalProfile, PersonalProfileStats, PlayStyleProfile};
pub use ratings::{
    CardRating, CardRatingData, DeckColorRatings, RatingsSnapshot, SetFile, SetMeta,
    ALL_DECK_COLORS,
};
pub use training::{
    ArchetypeTrainingData, CardTrainingData, ModelInfo, TrainingMetrics, TrainingProgress,
};
