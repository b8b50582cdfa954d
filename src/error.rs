/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Insufficient training data: {got} samples (need {need})")]
    InsufficientData { got: usize, need: usize },

    #[error("Repository error during {stage}: {message}")]
    Repository { stage: String, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps an upstream failure with the stage that was running when it happened
    pub fn repository(stage: impl Into<String>, message: impl ToString) -> Self {
        AppError::Repository {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Re-labels a repository failure with an outer stage, keeping the inner context
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            AppError::Repository {
                stage: inner,
                message,
            } => AppError::Repository {
                stage: format!("{}: {}", stage, inner),
                message,
            },
            other => other,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message_reports_counts() {
        let err = AppError::InsufficientData { got: 3, need: 50 };
        assert_eq!(
            err.to_string(),
            "Insufficient training data: 3 samples (need 50)"
        );
    }

    #[test]
    fn test_in_stage_prefixes_repository_errors() {
        let err = AppError::repository("load feedback", "connection reset").in_stage("training");
        assert_eq!(
            err.to_string(),
            "Repository error during training: load feedback: connection reset"
        );
    }

    #[test]
    fn test_in_stage_leaves_other_errors_alone() {
        let err = AppError::InvalidInput("bad".to_string()).in_stage("training");
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
