use std::sync::Arc;

use crate::{
    models::{sort_by_score, AccountId, CardId, CardScore, DeckContext},
    services::{meta_weighting::MetaWeighter, model::Model},
};

/// Final ranking: model scores re-weighted by the competitive metagame
///
/// Without a model it ranks by meta score alone.
pub struct MetaWeightedScorer {
    model: Option<Arc<Model>>,
    meta_weighter: Arc<MetaWeighter>,
}

impl MetaWeightedScorer {
    pub fn new(model: Option<Arc<Model>>, meta_weighter: Arc<MetaWeighter>) -> Self {
        Self {
            model,
            meta_weighter,
        }
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn meta_weighter(&self) -> &Arc<MetaWeighter> {
        &self.meta_weighter
    }

    /// Scores candidates for the deck, folding in each card's meta score
    ///
    /// Cards whose meta score cannot be computed keep their model score.
    pub async fn score_cards_with_meta(
        &self,
        format: &str,
        candidates: &[CardId],
        deck: &DeckContext,
        account_id: AccountId,
    ) -> Vec<CardScore> {
        let Some(model) = &self.model else {
            return self.score_meta_only(format, candidates, deck).await;
        };

        let mut scores = model.score_cards(candidates, deck, account_id);

        for score in &mut scores {
            let meta = match self
                .meta_weighter
                .get_card_meta_score(format, score.card_id, &deck.color_identity, &deck.archetype)
                .await
            {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!(
                        card_id = score.card_id,
                        format = %format,
                        error = %e,
                        "Meta score unavailable, keeping model score"
                    );
                    continue;
                }
            };

            score.meta_score = meta.score;
            score.factors.extend(meta.factors);
            score.score = Self::reweigh(model, score);
            score.confidence = (score.confidence + meta.confidence) / 2.0;
        }

        sort_by_score(&mut scores);
        scores
    }

    async fn score_meta_only(
        &self,
        format: &str,
        candidates: &[CardId],
        deck: &DeckContext,
    ) -> Vec<CardScore> {
        let mut scores = Vec::with_capacity(candidates.len());

        for &card_id in candidates {
            let score = match self
                .meta_weighter
                .get_card_meta_score(format, card_id, &deck.color_identity, &deck.archetype)
                .await
            {
                Ok(meta) => CardScore {
                    card_id,
                    score: meta.score,
                    meta_score: meta.score,
                    confidence: meta.confidence,
                    factors: meta.factors,
                    ..Default::default()
                },
                Err(_) => CardScore {
                    card_id,
                    score: 0.5,
                    meta_score: 0.5,
                    confidence: 0.0,
                    factors: vec!["No meta data available".to_string()],
                    ..Default::default()
                },
            };
            scores.push(score);
        }

        sort_by_score(&mut scores);
        scores
    }

    /// Blend with the meta weight carved out of the collaborative and content shares
    fn reweigh(model: &Model, score: &CardScore) -> f64 {
        let config = model.config();
        let mw = config.meta_weight;
        let cw = config.collaborative_weight;

        let base = score.collaborative_score * cw * (1.0 - mw)
            + score.content_score * (1.0 - cw) * (1.0 - mw)
            + score.meta_score * mw;

        (base + (score.personal_score - 0.5) * config.personal_weight).clamp(0.0, 1.0)
    }
}
