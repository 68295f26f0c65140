use crate::error::SubmitError;
use crate::transport::{CancelHandle, HttpResponse, RequestParts, TransferProgress};

pub type CancelTokenHook = Box<dyn Fn(CancelHandle) + Send + Sync>;
pub type BeforeHook = Box<dyn Fn(&RequestParts) -> bool + Send + Sync>;
pub type StartHook = Box<dyn Fn(&RequestParts) + Send + Sync>;
pub type ProgressHook = Box<dyn Fn(&TransferProgress) + Send + Sync>;
pub type SuccessHook = Box<dyn Fn(&HttpResponse) + Send + Sync>;
pub type ErrorHook = Box<dyn Fn(&SubmitError) + Send + Sync>;
pub type CancelHook = Box<dyn Fn() + Send + Sync>;
pub type FinishHook = Box<dyn Fn(&SubmitEnd) + Send + Sync>;

/// Terminal summary handed to the finish hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitEnd {
    Completed { status: u16 },
    Failed { message: String },
    Cancelled,
}

/// Per-submission hooks. All optional. For a given attempt they fire in a
/// fixed order — cancel-token, before, start, progress (zero or more), then
/// exactly one of success/error/cancel, then finish — each synchronously
/// with the event that triggers it.
#[derive(Default)]
pub struct SubmitOptions {
    pub(crate) cancel_token: Option<CancelTokenHook>,
    pub(crate) before: Option<BeforeHook>,
    pub(crate) start: Option<StartHook>,
    pub(crate) progress: Option<ProgressHook>,
    pub(crate) success: Option<SuccessHook>,
    pub(crate) error: Option<ErrorHook>,
    pub(crate) cancel: Option<CancelHook>,
    pub(crate) finish: Option<FinishHook>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives a clone of the attempt's cancellation handle.
    pub fn on_cancel_token(mut self, hook: impl Fn(CancelHandle) + Send + Sync + 'static) -> Self {
        self.cancel_token = Some(Box::new(hook));
        self
    }

    /// Fires before dispatch; returning `false` aborts the attempt.
    pub fn on_before(
        mut self,
        hook: impl Fn(&RequestParts) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn on_start(mut self, hook: impl Fn(&RequestParts) + Send + Sync + 'static) -> Self {
        self.start = Some(Box::new(hook));
        self
    }

    pub fn on_progress(
        mut self,
        hook: impl Fn(&TransferProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&SubmitError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(hook));
        self
    }

    pub fn on_cancel(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.cancel = Some(Box::new(hook));
        self
    }

    pub fn on_finish(mut self, hook: impl Fn(&SubmitEnd) + Send + Sync + 'static) -> Self {
        self.finish = Some(Box::new(hook));
        self
    }
}
