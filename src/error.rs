use std::fmt;

use crate::generator::ServiceError;
use crate::parse::ParseError;

/// Pipeline stage that talks to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Draft,
    Judge,
    Edit,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Draft => "draft",
            Stage::Judge => "judge",
            Stage::Edit => "edit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    /// The reply could not be turned into the record the stage expects.
    #[error("{stage}: malformed service response: {source}")]
    MalformedResponse {
        stage: Stage,
        #[source]
        source: ParseError,
    },

    /// The classifier produced a brief with unusable semantic fields.
    #[error("classification error: `{field}` {reason}")]
    Classification { field: &'static str, reason: String },

    /// The call itself failed ("the call failed", not "the text was bad").
    #[error("{stage}: generation service call failed: {source}")]
    Service {
        stage: Stage,
        #[source]
        source: ServiceError,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),
}

impl StoryError {
    pub(crate) fn service(stage: Stage) -> impl FnOnce(ServiceError) -> Self {
        move |source| StoryError::Service { stage, source }
    }

    pub(crate) fn malformed(stage: Stage) -> impl FnOnce(ParseError) -> Self {
        move |source| StoryError::MalformedResponse { stage, source }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StoryError::MalformedResponse { stage, .. } | StoryError::Service { stage, .. } => {
                Some(*stage)
            }
            StoryError::Classification { .. } => Some(Stage::Classify),
            StoryError::InvalidInput(_) | StoryError::InvalidState(_) => None,
        }
    }
}
