//! Wire-level types for the transport seam.
//!
//! A dispatch receives a [`RequestParts`] describing what to send, a
//! [`CancelSignal`] it should watch for an advisory abort, and a
//! [`ProgressSink`] to report transfer progress on. It resolves with an
//! [`HttpResponse`] or a [`TransportFailure`](super::TransportFailure).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// HTTP method of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Everything a transport needs to issue one request.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub url: String,
    /// The transformed payload. Transports may ignore it for bodyless methods.
    pub body: Value,
}

/// A received response: parsed body, status code and response headers.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub data: Value,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

/// Transfer progress as reported by the transport, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes transferred so far.
    pub loaded: u64,
    /// Total expected bytes, when the transport knows it.
    pub total: Option<u64>,
    /// Whole-number completion percentage, when `total` is known and nonzero.
    pub percentage: Option<u8>,
}

impl TransferProgress {
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        let percentage = total
            .filter(|&total| total > 0)
            .map(|total| (loaded.saturating_mul(100) / total).min(100) as u8);
        Self {
            loaded,
            total,
            percentage,
        }
    }
}

/// Channel on which a transport reports [`TransferProgress`] events.
pub type ProgressSink = mpsc::UnboundedSender<TransferProgress>;

/// Caller-side handle to an in-flight request. Cloning shares the same
/// underlying signal; exactly one handle identity exists per attempt.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: Uuid,
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub(crate) fn new(id: Uuid) -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                id,
                tx: Arc::new(tx),
            },
            CancelSignal { rx },
        )
    }

    /// Identity of the attempt this handle belongs to.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the transport to abort. Advisory: a terminal event may still
    /// arrive and is handled by the coordinator's stale-handle guard.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Transport-side view of the cancellation handle.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Resolves once cancellation is requested. Never resolves if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
