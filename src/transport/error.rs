//! The transport-boundary rejection type.
//!
//! Every way a dispatch can fail is an explicit [`TransportFailure`]
//! variant, classified once at the boundary. The submission coordinator
//! branches on the variant, never on the shape of an opaque error.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Why a transport dispatch did not produce a successful response.
///
/// The variants are disjoint and checked by the coordinator in this
/// priority order:
/// - [`Response`](TransportFailure::Response) — the server answered with a
///   status outside the 2xx range
/// - [`Network`](TransportFailure::Network) — the request went out, nothing
///   came back
/// - [`Setup`](TransportFailure::Setup) — the request was never dispatched
/// - [`Cancelled`](TransportFailure::Cancelled) — aborted via the cancel
///   signal; not an error from the caller's point of view
#[derive(Debug, Clone, Error)]
pub enum TransportFailure {
    #[error("server responded with status {status}")]
    Response {
        status: u16,
        headers: BTreeMap<String, String>,
        body: Value,
    },

    #[error("no response received: {message}")]
    Network { message: String },

    #[error("request setup failed: {message}")]
    Setup { message: String },

    #[error("request cancelled")]
    Cancelled,
}
