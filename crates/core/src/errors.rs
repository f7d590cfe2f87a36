use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::compose::ComposeError;
use crate::engine::TransitionError;
use crate::scheduler::SchedulerError;
use crate::thread::ThreadCodecError;

/// Error taxonomy shared by every event handler. The propagation policy is
/// strict: classifier and transport failures are surfaced so the caller (or
/// the webhook provider) retries; they are never collapsed into a default
/// "safe" action, and a Communication is only recorded after the side effect
/// it describes has actually succeeded.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("{entity} not found: `{id}`")]
    NotFound { entity: &'static str, id: String },
    #[error("sender does not match the negotiation's expected creator")]
    Mismatch,
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Scheduling(#[from] SchedulerError),
}

impl OrchestrationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Whether redelivering the triggering event could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Classifier(_)
                | Self::Transport(_)
                | Self::Persistence(_)
                | Self::Compose(_)
                | Self::Scheduling(_)
        )
    }
}

impl From<ThreadCodecError> for OrchestrationError {
    fn from(error: ThreadCodecError) -> Self {
        Self::InvalidFormat(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::classifier::ClassifierError;
    use crate::thread::ThreadCodecError;

    use super::OrchestrationError;

    #[test]
    fn codec_failures_map_to_invalid_format() {
        let error = OrchestrationError::from(ThreadCodecError::EmptyAddress);
        assert!(matches!(error, OrchestrationError::InvalidFormat(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn classifier_failures_are_retryable() {
        let error = OrchestrationError::from(ClassifierError::EmptyOutput);
        assert!(error.is_retryable());
    }

    #[test]
    fn lookups_and_mismatches_are_client_errors() {
        assert!(!OrchestrationError::not_found("negotiation", "xyz").is_retryable());
        assert!(!OrchestrationError::Mismatch.is_retryable());
    }
}
