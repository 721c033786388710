use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("Invalid input: {field} {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Custom scenario is missing override for {field}")]
    MissingOverride { field: &'static str },

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PlanError {
    pub fn invalid(field: &str, reason: &str) -> Self {
        PlanError::InvalidInput {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
