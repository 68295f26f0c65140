//! Reactive form-state controller.
//!
//! A [`Form`] owns a data record of editable fields plus the derived status
//! flags a UI observes (dirty, processing, errored, succeeded), and drives a
//! single HTTP submission through an explicit lifecycle: before → in-flight →
//! success, error, or cancelled → finish. Dirtiness is recomputed by deep
//! structural comparison against a defaults snapshot that only advances when
//! a submission succeeds, and heterogeneous server error payloads are
//! normalized into a flat field → message mapping.
//!
//! The HTTP mechanics sit behind the [`Transport`] trait; a reqwest-backed
//! [`HttpTransport`] is provided. Forms can opt into persistence across
//! navigation through a [`RememberStore`].

pub mod config;
pub mod error;
pub mod form;
pub mod submission;
pub mod transport;

pub use config::FormConfig;
pub use error::{FormError, FormResult, SubmitError};
pub use form::{
    FileRememberStore, FormSnapshot, FormState, MemoryRememberStore, RememberStore,
    RememberedState,
};
pub use submission::{
    AttemptOutcome, AttemptRecord, Form, GENERIC_TRANSPORT_MESSAGE, Phase, SubmitEnd,
    SubmitOptions, SubmitOutcome,
};
pub use transport::{
    CancelHandle, CancelSignal, HttpResponse, HttpTransport, Method, ProgressSink, RequestParts,
    TransferProgress, Transport, TransportFailure,
};
