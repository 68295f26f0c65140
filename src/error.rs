use std::collections::BTreeMap;

use thiserror::Error;

use crate::submission::Phase;

/// Infrastructure faults in the form itself, as opposed to submission
/// failures reported by the server or the transport.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),

    #[error("invalid submission phase transition: {from} -> {to}")]
    InvalidPhaseTransition { from: Phase, to: Phase },
}

pub type FormResult<T> = Result<T, FormError>;

/// Why a submission attempt failed.
///
/// Mirrors the three disjoint error origins: the server answered with a
/// non-2xx status, the request went out but nothing came back, or the
/// request could not be dispatched at all. Cancellation is not an error
/// and resolves as a [`SubmitOutcome`](crate::submission::SubmitOutcome).
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The server responded with a non-2xx status. Carries the normalized
    /// field errors and the server's top-level message, if any.
    #[error("server rejected the submission (status {status})")]
    Validation {
        status: u16,
        message: Option<String>,
        errors: BTreeMap<String, String>,
    },

    /// The request was sent but no response was received.
    #[error("no response received: {message}")]
    Transport { message: String },

    /// The request could not be built or dispatched.
    #[error("request setup failed: {message}")]
    Setup { message: String },

    #[error(transparent)]
    State(#[from] FormError),
}
