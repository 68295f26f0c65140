pub mod error;
pub mod http;
pub mod types;

use std::future::Future;

pub use error::TransportFailure;
pub use http::HttpTransport;
pub use types::{
    CancelHandle, CancelSignal, HttpResponse, Method, ProgressSink, RequestParts,
    TransferProgress,
};

/// Request-execution seam consumed by the submission coordinator.
///
/// Implementations watch `cancel` for an advisory abort and report transfer
/// progress on `progress` in arrival order. The returned future resolves
/// with the received response, or with a [`TransportFailure`] classifying
/// exactly why no successful response was produced.
pub trait Transport: Send + Sync + 'static {
    fn dispatch(
        &self,
        request: RequestParts,
        cancel: CancelSignal,
        progress: ProgressSink,
    ) -> impl Future<Output = Result<HttpResponse, TransportFailure>> + Send;
}
