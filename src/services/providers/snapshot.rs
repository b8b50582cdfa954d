//! Meta snapshots stored on disk as `{dir}/{format}.json`

use std::path::PathBuf;

use crate::{
    error::{AppError, AppResult},
    models::AggregatedMeta,
    services::providers::MetaSource,
};

#[derive(Debug, Clone)]
pub struct SnapshotMetaSource {
    dir: PathBuf,
}

impl SnapshotMetaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, format: &str) -> PathBuf {
        self.dir.join(format!("{}.json", format.to_lowercase()))
    }
}

#[async_trait::async_trait]
impl MetaSource for SnapshotMetaSource {
    #[tracing::instrument(skip(self))]
    async fn get_aggregated_meta(&self, format: &str) -> AppResult<AggregatedMeta> {
        if format.trim().is_empty() {
            return Err(AppError::InvalidInput("Format cannot be empty".to_string()));
        }

        let path = self.snapshot_path(format);
        let data = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::ExternalApi(format!("No meta snapshot at {}", path.display()))
            } else {
                AppError::Io(e)
            }
        })?;

        let mut meta: AggregatedMeta = serde_json::from_slice(&data)?;
        if meta.format.is_empty() {
            meta.format = format.to_string();
        }
        meta.finalize();

        tracing::debug!(
            format = %format,
            path = %path.display(),
            archetypes = meta.total_archetypes,
            "Loaded meta snapshot"
        );

        Ok(meta)
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrendDirection;

    #[tokio::test]
    async fn test_loads_and_finalizes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("standard.json"),
            r#"{
                "format": "standard",
                "archetypes": [
                    { "name": "Mono Red Aggro", "colors": ["R"], "meta_share": 7.5, "tournament_top8s": 12 },
                    { "name": "Esper Midrange", "tournament_top8s": 6 }
                ]
            }"#,
        )
        .unwrap();

        let source = SnapshotMetaSource::new(dir.path());
        let meta = source.get_aggregated_meta("Standard").await.unwrap();

        assert_eq!(meta.total_archetypes, 2);
        let red = &meta.archetypes[0];
        assert_eq!(red.tier, 1);
        assert_eq!(red.normalized_name, "mono red aggro");
        assert!((red.confidence_score - 0.9).abs() < 1e-9);
        assert_eq!(red.trend_direction, TrendDirection::Stable);
        assert_eq!(meta.archetypes[1].tier, 3);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_external_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = SnapshotMetaSource::new(dir.path());
        let result = source.get_aggregated_meta("pioneer").await;
        assert!(matches!(result, Err(AppError::ExternalApi(_))));
    }
}
