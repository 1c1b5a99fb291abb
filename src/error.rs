// 🚨 Error Taxonomy
// Every core operation reports one of these kinds; callers decide what to do with it

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClvError>;

/// Who is responsible for a failure.
///
/// The HTTP layer maps `Client` to 400 and `Internal` to 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Client,
    Internal,
}

#[derive(Debug, Error)]
pub enum ClvError {
    /// Required feature(s) absent from a candidate row or batch
    #[error("Missing required features: {{{}}}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    /// A scalar value could not be coerced to the type its slot requires
    #[error("Invalid value for '{field}': {reason}")]
    Parse { field: String, reason: String },

    /// A batch payload that is not an array of objects with numeric features.
    ///
    /// Unlike `Parse`, this is not the caller's fault: the batch endpoint only
    /// blames clients for missing features.
    #[error("Invalid payload at {location}: {reason}")]
    Payload { location: String, reason: String },

    /// Aggregation impossible (empty log, malformed record, bad horizon)
    #[error("Computation failed: {0}")]
    Computation(String),

    /// The fitted model did not produce a usable output
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Evaluation sequences of unequal length
    #[error("Dimension mismatch: {expected} true values vs {actual} predictions")]
    Dimension { expected: usize, actual: usize },

    #[error("Evaluation requires at least one value")]
    EmptyInput,
}

impl ClvError {
    pub fn parse(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClvError::Parse {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn payload(location: impl Into<String>, reason: impl Into<String>) -> Self {
        ClvError::Payload {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn fault(&self) -> FaultKind {
        match self {
            ClvError::Schema { .. } | ClvError::Parse { .. } => FaultKind::Client,
            _ => FaultKind::Internal,
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.fault() == FaultKind::Client
    }
}
