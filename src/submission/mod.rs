mod attempt;
mod coordinator;
mod normalize;
mod options;
mod phase;

pub use attempt::{AttemptOutcome, AttemptRecord};
pub use coordinator::{Form, GENERIC_TRANSPORT_MESSAGE, SubmitOutcome};
pub use normalize::normalize_error_bag;
pub use options::{SubmitEnd, SubmitOptions};
pub use phase::Phase;
