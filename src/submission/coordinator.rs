use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::attempt::{Attempt, AttemptOutcome, AttemptRecord};
use super::normalize::normalize_error_bag;
use super::options::{SubmitEnd, SubmitOptions};
use super::phase::Phase;
use crate::error::{FormError, FormResult, SubmitError};
use crate::form::remember::{RememberStore, RememberedState};
use crate::form::state::{FormSnapshot, FormState};
use crate::transport::{
    CancelHandle, HttpResponse, Method, RequestParts, TransferProgress, Transport,
    TransportFailure,
};

/// Message shown when a request went out but no response came back.
pub const GENERIC_TRANSPORT_MESSAGE: &str = "Something went wrong";

/// How long `recently_successful` stays set after a success.
const RECENTLY_SUCCESSFUL_WINDOW: Duration = Duration::from_millis(2000);

type TransformFn = Box<dyn Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync>;

/// Resolution of a submission attempt that did not fail.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The server accepted the submission.
    Completed(HttpResponse),
    /// The attempt was cancelled while in flight, or superseded by a newer
    /// attempt before its terminal event arrived.
    Cancelled,
    /// The before hook rejected the attempt; nothing was dispatched.
    Aborted,
}

/// Per-instance coordinator context: the cancel handle, transform and timer
/// are explicit fields so form instances never share state.
struct SubmissionContext {
    transform: Option<TransformFn>,
    active: Option<CancelHandle>,
    clear_timer: Option<JoinHandle<()>>,
    last_attempt: Option<AttemptRecord>,
}

struct RememberBinding {
    key: String,
    store: Arc<dyn RememberStore>,
}

/// Reactive form controller: the form-state container plus the submission
/// coordinator that drives it through the request lifecycle.
///
/// Cloning is cheap and shares the underlying state, so a clone can be moved
/// into another task to observe progress or call [`cancel`](Form::cancel)
/// while a submission is in flight.
pub struct Form<T: Transport> {
    transport: Arc<T>,
    state: Arc<RwLock<FormState>>,
    context: Arc<Mutex<SubmissionContext>>,
    remember: Option<Arc<RememberBinding>>,
}

impl<T: Transport> Clone for Form<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            context: Arc::clone(&self.context),
            remember: self.remember.clone(),
        }
    }
}

impl<T: Transport> Form<T> {
    /// Create a form over `initial` fields. The key set is fixed from here
    /// on; `initial` is deep-copied into both the live fields and the
    /// defaults snapshot.
    pub fn new(transport: T, initial: Map<String, Value>) -> Self {
        Self {
            transport: Arc::new(transport),
            state: Arc::new(RwLock::new(FormState::new(initial))),
            context: Arc::new(Mutex::new(SubmissionContext {
                transform: None,
                active: None,
                clear_timer: None,
                last_attempt: None,
            })),
            remember: None,
        }
    }

    /// Opt into external persistence under `key`, seeding current fields and
    /// errors from a stored snapshot when the store has one.
    pub fn with_remember(
        mut self,
        key: impl Into<String>,
        store: Arc<dyn RememberStore>,
    ) -> FormResult<Self> {
        let key = key.into();
        let snapshot = store.load(&key);
        {
            let mut state = self.write_state("seeding remembered state")?;
            state.remember_key = Some(key.clone());
            if let Some(snapshot) = snapshot {
                debug!(key, "seeding form from remembered snapshot");
                state.restore(snapshot);
            }
        }
        self.remember = Some(Arc::new(RememberBinding { key, store }));
        Ok(self)
    }

    fn read_state(&self, context: &'static str) -> FormResult<RwLockReadGuard<'_, FormState>> {
        self.state
            .read()
            .map_err(|_| FormError::StatePoisoned(context))
    }

    fn write_state(&self, context: &'static str) -> FormResult<RwLockWriteGuard<'_, FormState>> {
        self.state
            .write()
            .map_err(|_| FormError::StatePoisoned(context))
    }

    fn lock_context(
        &self,
        context: &'static str,
    ) -> FormResult<MutexGuard<'_, SubmissionContext>> {
        self.context
            .lock()
            .map_err(|_| FormError::StatePoisoned(context))
    }

    /// Current editable data: exactly the original field keys.
    pub fn data(&self) -> FormResult<Map<String, Value>> {
        Ok(self.read_state("reading form data")?.data())
    }

    pub fn field(&self, field: &str) -> FormResult<Option<Value>> {
        Ok(self.read_state("reading form field")?.get(field).cloned())
    }

    /// Write one field and recompute dirtiness.
    pub fn set(&self, field: &str, value: Value) -> FormResult<&Self> {
        self.write_state("writing form field")?.set(field, value);
        self.persist();
        Ok(self)
    }

    /// Install the pre-submission payload mapping. Effective for all
    /// subsequent submissions; it does not rewrite anything retroactively.
    pub fn transform(
        &self,
        transform: impl Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
    ) -> FormResult<&Self> {
        self.lock_context("installing transform")?.transform = Some(Box::new(transform));
        Ok(self)
    }

    /// Restore every field from the defaults snapshot. Errors are left
    /// untouched.
    pub fn reset(&self) -> FormResult<&Self> {
        self.write_state("resetting form")?.reset();
        self.persist();
        Ok(self)
    }

    /// Restore only the named fields, leaving the rest as they are.
    pub fn reset_fields(&self, names: &[&str]) -> FormResult<&Self> {
        self.write_state("resetting form fields")?.reset_fields(names);
        self.persist();
        Ok(self)
    }

    /// Clear every field error and the top-level error message.
    pub fn clear_errors(&self) -> FormResult<&Self> {
        self.write_state("clearing form errors")?.clear_errors();
        self.persist();
        Ok(self)
    }

    /// Remove exactly the named fields' errors, keeping the rest.
    pub fn clear_field_errors(&self, names: &[&str]) -> FormResult<&Self> {
        self.write_state("clearing field errors")?
            .clear_field_errors(names);
        self.persist();
        Ok(self)
    }

    /// One consistent view of the observable state.
    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        Ok(self.read_state("creating form snapshot")?.snapshot())
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        Ok(self.read_state("reading dirtiness")?.is_dirty())
    }

    pub fn processing(&self) -> FormResult<bool> {
        Ok(self.read_state("reading processing flag")?.processing())
    }

    pub fn progress(&self) -> FormResult<Option<TransferProgress>> {
        Ok(self.read_state("reading progress")?.progress())
    }

    pub fn was_successful(&self) -> FormResult<bool> {
        Ok(self.read_state("reading success flag")?.was_successful())
    }

    pub fn recently_successful(&self) -> FormResult<bool> {
        Ok(self
            .read_state("reading recent success flag")?
            .recently_successful())
    }

    pub fn has_errors(&self) -> FormResult<bool> {
        Ok(self.read_state("reading error flag")?.has_errors())
    }

    pub fn errors(&self) -> FormResult<std::collections::BTreeMap<String, String>> {
        Ok(self.read_state("reading form errors")?.errors().clone())
    }

    pub fn error_message(&self) -> FormResult<Option<String>> {
        Ok(self
            .read_state("reading error message")?
            .error_message()
            .map(str::to_string))
    }

    /// Audit record of the last finished attempt.
    pub fn last_attempt(&self) -> FormResult<Option<AttemptRecord>> {
        Ok(self.lock_context("reading last attempt")?.last_attempt.clone())
    }

    /// The snapshot an external store persists for this form.
    pub fn remember_snapshot(&self) -> FormResult<RememberedState> {
        let state = self.read_state("capturing remembered snapshot")?;
        Ok(RememberedState {
            data: state.data(),
            errors: state.errors().clone(),
        })
    }

    /// Signal the in-flight request to abort. No-op when nothing is in
    /// flight.
    pub fn cancel(&self) -> FormResult<()> {
        let context = self.lock_context("cancelling submission")?;
        if let Some(active) = &context.active {
            debug!(attempt = %active.id(), "cancelling in-flight submission");
            active.cancel();
        }
        Ok(())
    }

    pub async fn get(
        &self,
        url: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submit(Method::Get, url, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submit(Method::Post, url, options).await
    }

    pub async fn put(
        &self,
        url: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submit(Method::Put, url, options).await
    }

    pub async fn patch(
        &self,
        url: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submit(Method::Patch, url, options).await
    }

    pub async fn delete(
        &self,
        url: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submit(Method::Delete, url, options).await
    }

    /// Drive one submission attempt through the full lifecycle.
    pub async fn submit(
        &self,
        method: Method,
        url: &str,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, SubmitError> {
        let mut attempt = Attempt::new(method, url);
        attempt.advance(Phase::Before)?;
        debug!(attempt = %attempt.id, %method, url, "starting submission attempt");

        {
            let mut state = self.write_state("preparing submission")?;
            state.was_successful = false;
            state.recently_successful = false;
        }
        {
            let mut context = self.lock_context("clearing pending success timer")?;
            if let Some(timer) = context.clear_timer.take() {
                timer.abort();
            }
        }

        // The transform applies exactly once, to the untransformed data.
        let payload = {
            let data = self.data()?;
            let context = self.lock_context("applying transform")?;
            match &context.transform {
                Some(transform) => transform(data),
                None => data,
            }
        };
        let request = RequestParts {
            method,
            url: url.to_string(),
            body: Value::Object(payload),
        };

        if let Some(hook) = &options.before {
            if !hook(&request) {
                attempt.advance(Phase::Idle)?;
                self.lock_context("recording aborted attempt")?.last_attempt =
                    Some(AttemptRecord::from_attempt(&attempt, AttemptOutcome::Aborted));
                debug!(attempt = %attempt.id, "submission aborted by before hook");
                return Ok(SubmitOutcome::Aborted);
            }
        }

        attempt.advance(Phase::InFlight)?;
        let (handle, signal) = CancelHandle::new(attempt.id);
        {
            let mut context = self.lock_context("storing cancellation handle")?;
            if context.active.is_some() {
                warn!(
                    attempt = %attempt.id,
                    "submission started while another is in flight; replacing its handle"
                );
            }
            context.active = Some(handle.clone());
        }
        if let Some(hook) = &options.cancel_token {
            hook(handle);
        }
        self.write_state("marking form as processing")?.processing = true;
        if let Some(hook) = &options.start {
            hook(&request);
        }

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let dispatch = self.transport.dispatch(request, signal, progress_tx);
        tokio::pin!(dispatch);
        let result = loop {
            tokio::select! {
                Some(progress) = progress_rx.recv() => {
                    self.record_progress(progress, &options)?;
                }
                result = &mut dispatch => break result,
            }
        };
        // Deliver progress that raced with the terminal event, in order.
        while let Ok(progress) = progress_rx.try_recv() {
            self.record_progress(progress, &options)?;
        }

        // A terminal event for a handle that is no longer the active one
        // belongs to a superseded attempt; the newer attempt owns the state.
        let still_active = self
            .lock_context("checking handle identity")?
            .active
            .as_ref()
            .is_some_and(|active| active.id() == attempt.id);
        if !still_active {
            warn!(attempt = %attempt.id, "dropping terminal event for a stale cancellation handle");
            return Ok(SubmitOutcome::Cancelled);
        }

        let outcome = match result {
            Ok(response) => {
                attempt.advance(Phase::Success)?;
                self.apply_success()?;
                if let Some(hook) = &options.success {
                    hook(&response);
                }
                Ok(SubmitOutcome::Completed(response))
            }
            Err(TransportFailure::Cancelled) => {
                attempt.advance(Phase::Cancelled)?;
                {
                    let mut state = self.write_state("recording cancellation")?;
                    state.processing = false;
                    state.progress = None;
                }
                if let Some(hook) = &options.cancel {
                    hook();
                }
                Ok(SubmitOutcome::Cancelled)
            }
            Err(failure) => {
                attempt.advance(Phase::Error)?;
                let error = self.apply_failure(failure)?;
                if let Some(hook) = &options.error {
                    hook(&error);
                }
                Err(error)
            }
        };

        self.finish(&mut attempt, &outcome, &options)?;
        outcome
    }

    fn record_progress(
        &self,
        progress: TransferProgress,
        options: &SubmitOptions,
    ) -> FormResult<()> {
        self.write_state("recording transfer progress")?.progress = Some(progress);
        if let Some(hook) = &options.progress {
            hook(&progress);
        }
        Ok(())
    }

    fn apply_success(&self) -> FormResult<()> {
        {
            let mut state = self.write_state("applying submission success")?;
            state.processing = false;
            state.progress = None;
            state.clear_errors();
            state.was_successful = true;
            state.recently_successful = true;
            state.advance_defaults();
        }

        let state = Arc::clone(&self.state);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(RECENTLY_SUCCESSFUL_WINDOW).await;
            if let Ok(mut state) = state.write() {
                state.recently_successful = false;
            }
        });
        let mut context = self.lock_context("scheduling success timer")?;
        // At most one pending auto-clear timer exists at a time.
        if let Some(previous) = context.clear_timer.replace(timer) {
            previous.abort();
        }
        Ok(())
    }

    fn apply_failure(&self, failure: TransportFailure) -> FormResult<SubmitError> {
        let mut state = self.write_state("applying submission failure")?;
        state.processing = false;
        state.progress = None;
        state.has_errors = true;

        Ok(match failure {
            TransportFailure::Response { status, body, .. } => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(message) = &message {
                    state.error_message = Some(message.clone());
                }
                let errors = body
                    .get("errors")
                    .map(normalize_error_bag)
                    .unwrap_or_default();
                // Normalized errors merge into whatever is already present.
                state.errors.extend(errors.clone());
                SubmitError::Validation {
                    status,
                    message,
                    errors,
                }
            }
            TransportFailure::Network { message } => {
                state.error_message = Some(GENERIC_TRANSPORT_MESSAGE.to_string());
                SubmitError::Transport { message }
            }
            TransportFailure::Setup { message } => {
                state.error_message = Some(message.clone());
                SubmitError::Setup { message }
            }
            // Cancellation is matched before apply_failure is reached; keep
            // the conversion total anyway.
            TransportFailure::Cancelled => SubmitError::Transport {
                message: "request cancelled".to_string(),
            },
        })
    }

    fn finish(
        &self,
        attempt: &mut Attempt,
        outcome: &Result<SubmitOutcome, SubmitError>,
        options: &SubmitOptions,
    ) -> FormResult<()> {
        attempt.advance(Phase::Idle)?;
        {
            let mut state = self.write_state("finishing submission")?;
            state.processing = false;
            state.progress = None;
        }

        let (end, recorded) = match outcome {
            Ok(SubmitOutcome::Completed(response)) => (
                SubmitEnd::Completed {
                    status: response.status,
                },
                AttemptOutcome::Succeeded,
            ),
            Ok(SubmitOutcome::Cancelled | SubmitOutcome::Aborted) => {
                (SubmitEnd::Cancelled, AttemptOutcome::Cancelled)
            }
            Err(error) => (
                SubmitEnd::Failed {
                    message: error.to_string(),
                },
                AttemptOutcome::Failed,
            ),
        };
        {
            let mut context = self.lock_context("releasing cancellation handle")?;
            context.active = None;
            context.last_attempt = Some(AttemptRecord::from_attempt(attempt, recorded));
        }
        if let Some(hook) = &options.finish {
            hook(&end);
        }
        self.persist();
        Ok(())
    }

    fn persist(&self) {
        let Some(binding) = &self.remember else {
            return;
        };
        match self.remember_snapshot() {
            Ok(snapshot) => {
                if let Err(error) = binding.store.save(&binding.key, &snapshot) {
                    warn!(key = %binding.key, %error, "failed to persist remembered form state");
                }
            }
            Err(error) => {
                warn!(key = %binding.key, %error, "failed to capture remembered form state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::sync::Semaphore;

    use crate::form::remember::MemoryRememberStore;
    use crate::transport::{CancelSignal, ProgressSink};

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    fn ok_response(data: Value) -> HttpResponse {
        HttpResponse {
            data,
            status: 200,
            headers: BTreeMap::new(),
        }
    }

    fn validation_failure(status: u16, body: Value) -> TransportFailure {
        TransportFailure::Response {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Returns a fixed result for every dispatch, recording what it saw.
    struct MockTransport {
        response: Result<HttpResponse, TransportFailure>,
        calls: AtomicUsize,
        seen: std::sync::Mutex<Option<RequestParts>>,
    }

    impl MockTransport {
        fn ok(data: Value) -> Self {
            Self {
                response: Ok(ok_response(data)),
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(None),
            }
        }

        fn err(failure: TransportFailure) -> Self {
            Self {
                response: Err(failure),
                calls: AtomicUsize::new(0),
                seen: std::sync::Mutex::new(None),
            }
        }
    }

    impl Transport for MockTransport {
        async fn dispatch(
            &self,
            request: RequestParts,
            _cancel: CancelSignal,
            _progress: ProgressSink,
        ) -> Result<HttpResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = Some(request);
            self.response.clone()
        }
    }

    /// Pops one scripted result per dispatch.
    struct SequenceTransport {
        responses: std::sync::Mutex<VecDeque<Result<HttpResponse, TransportFailure>>>,
    }

    impl SequenceTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportFailure>>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
            }
        }
    }

    impl Transport for SequenceTransport {
        async fn dispatch(
            &self,
            _request: RequestParts,
            _cancel: CancelSignal,
            _progress: ProgressSink,
        ) -> Result<HttpResponse, TransportFailure> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra dispatch")
        }
    }

    /// Completes only when cancelled.
    struct HangingTransport;

    impl Transport for HangingTransport {
        async fn dispatch(
            &self,
            _request: RequestParts,
            cancel: CancelSignal,
            _progress: ProgressSink,
        ) -> Result<HttpResponse, TransportFailure> {
            cancel.cancelled().await;
            Err(TransportFailure::Cancelled)
        }
    }

    /// Emits three progress events, then succeeds.
    struct ProgressTransport;

    impl Transport for ProgressTransport {
        async fn dispatch(
            &self,
            _request: RequestParts,
            _cancel: CancelSignal,
            progress: ProgressSink,
        ) -> Result<HttpResponse, TransportFailure> {
            for loaded in [10u64, 20, 30] {
                let _ = progress.send(TransferProgress::new(loaded, Some(30)));
            }
            Ok(ok_response(Value::Null))
        }
    }

    /// Delegating wrapper so a test can keep a handle on the mock it owns.
    struct ArcTransport(Arc<MockTransport>);

    impl Transport for ArcTransport {
        async fn dispatch(
            &self,
            request: RequestParts,
            cancel: CancelSignal,
            progress: ProgressSink,
        ) -> Result<HttpResponse, TransportFailure> {
            self.0.dispatch(request, cancel, progress).await
        }
    }

    /// Requests to `/slow` wait on the gate; everything else succeeds
    /// immediately.
    struct GatedTransport {
        gate: Arc<Semaphore>,
    }

    impl Transport for GatedTransport {
        async fn dispatch(
            &self,
            request: RequestParts,
            _cancel: CancelSignal,
            _progress: ProgressSink,
        ) -> Result<HttpResponse, TransportFailure> {
            if request.url.ends_with("/slow") {
                let _permit = self.gate.acquire().await;
            }
            Ok(ok_response(Value::Null))
        }
    }

    async fn wait_until_processing<T: Transport>(form: &Form<T>) {
        for _ in 0..500 {
            if form.processing().unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("form never entered processing");
    }

    #[tokio::test]
    async fn end_to_end_edit_submit_commit() {
        let form = Form::new(
            MockTransport::ok(json!({"id": 1})),
            fields(&[("name", json!("")), ("email", json!(""))]),
        );

        form.set("name", json!("Ada")).unwrap();
        assert!(form.is_dirty().unwrap());

        let outcome = form
            .post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap();
        match outcome {
            SubmitOutcome::Completed(response) => assert_eq!(response.data, json!({"id": 1})),
            other => panic!("expected completion, got {other:?}"),
        }

        assert!(!form.is_dirty().unwrap());
        assert!(form.was_successful().unwrap());
        assert!(form.recently_successful().unwrap());
        assert!(!form.processing().unwrap());

        // The defaults snapshot advanced to the submitted values.
        form.set("name", json!("Bob")).unwrap();
        form.reset().unwrap();
        assert_eq!(form.field("name").unwrap(), Some(json!("Ada")));
    }

    #[tokio::test]
    async fn success_clears_previous_errors() {
        let invalid = json!({
            "message": "The given data was invalid.",
            "errors": {"email": ["must be valid"]}
        });
        let form = Form::new(
            SequenceTransport::new(vec![
                Err(validation_failure(422, invalid)),
                Ok(ok_response(Value::Null)),
            ]),
            fields(&[("email", json!("nope"))]),
        );

        let err = form
            .post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation { status: 422, .. }));
        assert!(form.has_errors().unwrap());

        form.post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap();
        assert!(!form.has_errors().unwrap());
        assert!(form.errors().unwrap().is_empty());
        assert_eq!(form.error_message().unwrap(), None);
    }

    #[tokio::test]
    async fn validation_error_populates_field_errors() {
        let body = json!({
            "message": "The given data was invalid.",
            "errors": {"email": ["must be valid", "second"]}
        });
        let form = Form::new(
            MockTransport::err(validation_failure(422, body)),
            fields(&[("email", json!("nope"))]),
        );

        let err = form
            .post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap_err();

        match err {
            SubmitError::Validation {
                status,
                message,
                errors,
            } => {
                assert_eq!(status, 422);
                assert_eq!(message.as_deref(), Some("The given data was invalid."));
                assert_eq!(errors.get("email").map(String::as_str), Some("must be valid"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        assert!(form.has_errors().unwrap());
        assert_eq!(
            form.error_message().unwrap().as_deref(),
            Some("The given data was invalid.")
        );
        assert_eq!(
            form.errors().unwrap().get("email").map(String::as_str),
            Some("must be valid")
        );
        assert!(!form.processing().unwrap());
        assert!(!form.was_successful().unwrap());
    }

    #[tokio::test]
    async fn network_error_sets_generic_message() {
        let form = Form::new(
            MockTransport::err(TransportFailure::Network {
                message: "connection reset".into(),
            }),
            fields(&[("name", json!(""))]),
        );

        let err = form
            .post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Transport { .. }));

        assert_eq!(
            form.error_message().unwrap().as_deref(),
            Some(GENERIC_TRANSPORT_MESSAGE)
        );
        assert!(form.errors().unwrap().is_empty());
        assert!(form.has_errors().unwrap());
    }

    #[tokio::test]
    async fn setup_error_uses_its_own_message() {
        let form = Form::new(
            MockTransport::err(TransportFailure::Setup {
                message: "relative URL without a base".into(),
            }),
            fields(&[("name", json!(""))]),
        );

        let err = form
            .post("nonsense", SubmitOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Setup { .. }));
        assert_eq!(
            form.error_message().unwrap().as_deref(),
            Some("relative URL without a base")
        );
    }

    #[tokio::test]
    async fn repeated_failures_merge_field_errors() {
        let form = Form::new(
            SequenceTransport::new(vec![
                Err(validation_failure(422, json!({"errors": {"email": ["bad"]}}))),
                Err(validation_failure(422, json!({"errors": {"name": ["required"]}}))),
            ]),
            fields(&[("name", json!("")), ("email", json!(""))]),
        );

        let _ = form.post("https://example.test/a", SubmitOptions::new()).await;
        let _ = form.post("https://example.test/b", SubmitOptions::new()).await;

        let errors = form.errors().unwrap();
        assert_eq!(errors.get("email").map(String::as_str), Some("bad"));
        assert_eq!(errors.get("name").map(String::as_str), Some("required"));
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_noop() {
        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("a", json!(1))]));

        form.cancel().unwrap();

        let snapshot = form.snapshot().unwrap();
        assert!(!snapshot.processing);
        assert!(!snapshot.has_errors);
        assert!(!snapshot.was_successful);
    }

    #[tokio::test]
    async fn cancel_while_in_flight_resolves_cancelled() {
        let form = Form::new(HangingTransport, fields(&[("name", json!("Ada"))]));
        form.set("name", json!("Grace")).unwrap();

        let cancelled_hook = Arc::new(AtomicUsize::new(0));
        let options = SubmitOptions::new().on_cancel({
            let cancelled_hook = Arc::clone(&cancelled_hook);
            move || {
                cancelled_hook.fetch_add(1, Ordering::SeqCst);
            }
        });

        let task = tokio::spawn({
            let form = form.clone();
            async move { form.post("https://example.test/users", options).await }
        });

        wait_until_processing(&form).await;
        form.cancel().unwrap();

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, SubmitOutcome::Cancelled));
        assert_eq!(cancelled_hook.load(Ordering::SeqCst), 1);

        // Cancellation touches neither errors nor defaults.
        assert!(!form.processing().unwrap());
        assert!(form.errors().unwrap().is_empty());
        assert!(form.is_dirty().unwrap());
        form.reset().unwrap();
        assert_eq!(form.field("name").unwrap(), Some(json!("Ada")));
    }

    #[tokio::test(start_paused = true)]
    async fn recently_successful_clears_after_window() {
        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("a", json!(1))]));

        form.post("https://example.test/a", SubmitOptions::new())
            .await
            .unwrap();
        assert!(form.recently_successful().unwrap());
        assert!(form.was_successful().unwrap());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(!form.recently_successful().unwrap());
        assert!(form.was_successful().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn new_submission_cancels_pending_clear() {
        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("a", json!(1))]));

        form.post("https://example.test/a", SubmitOptions::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        form.post("https://example.test/a", SubmitOptions::new())
            .await
            .unwrap();

        // 3400ms after the first success: its (aborted) timer would already
        // have fired, but the second success is only 1900ms old.
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(form.recently_successful().unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!form.recently_successful().unwrap());
    }

    #[tokio::test]
    async fn transform_shapes_the_payload_not_the_fields() {
        let transport = Arc::new(MockTransport::ok(Value::Null));
        let applied = Arc::new(AtomicUsize::new(0));
        let form = Form::new(
            ArcTransport(Arc::clone(&transport)),
            fields(&[("name", json!("ada"))]),
        );
        form.transform({
            let applied = Arc::clone(&applied);
            move |mut data| {
                applied.fetch_add(1, Ordering::SeqCst);
                let upper = data
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_uppercase)
                    .unwrap_or_default();
                data.insert("name".to_string(), json!(upper));
                data
            }
        })
        .unwrap();

        form.post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap();

        assert_eq!(applied.load(Ordering::SeqCst), 1);
        let sent = transport.seen.lock().unwrap().clone().unwrap();
        assert_eq!(sent.body, json!({"name": "ADA"}));

        // Defaults track the untransformed field values.
        assert_eq!(form.field("name").unwrap(), Some(json!("ada")));
        assert!(!form.is_dirty().unwrap());
    }

    #[tokio::test]
    async fn before_hook_false_aborts_without_dispatch() {
        let transport = Arc::new(MockTransport::ok(Value::Null));
        let form = Form::new(
            ArcTransport(Arc::clone(&transport)),
            fields(&[("a", json!(1))]),
        );

        let outcome = form
            .post(
                "https://example.test/users",
                SubmitOptions::new().on_before(|_| false),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, SubmitOutcome::Aborted));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(!form.processing().unwrap());

        let record = form.last_attempt().unwrap().unwrap();
        assert_eq!(record.outcome, AttemptOutcome::Aborted);
        assert_eq!(
            record.phase_transitions,
            vec![Phase::Idle, Phase::Before, Phase::Idle]
        );
    }

    #[tokio::test]
    async fn hooks_fire_in_lifecycle_order() {
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let push = |events: &Arc<std::sync::Mutex<Vec<&'static str>>>, label: &'static str| {
            let events = Arc::clone(events);
            move || events.lock().unwrap().push(label)
        };

        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("a", json!(1))]));
        let options = SubmitOptions::new()
            .on_before({
                let hook = push(&events, "before");
                move |_| {
                    hook();
                    true
                }
            })
            .on_cancel_token({
                let hook = push(&events, "cancel_token");
                move |_| hook()
            })
            .on_start({
                let hook = push(&events, "start");
                move |_| hook()
            })
            .on_success({
                let hook = push(&events, "success");
                move |_| hook()
            })
            .on_finish({
                let hook = push(&events, "finish");
                move |_| hook()
            });

        form.post("https://example.test/a", options).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["before", "cancel_token", "start", "success", "finish"]
        );
    }

    #[tokio::test]
    async fn progress_events_update_state_and_hook() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let form = Form::new(ProgressTransport, fields(&[("a", json!(1))]));

        let options = SubmitOptions::new().on_progress({
            let seen = Arc::clone(&seen);
            move |progress: &TransferProgress| seen.lock().unwrap().push(*progress)
        });
        form.post("https://example.test/a", options).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].loaded, 10);
        assert_eq!(seen[2].percentage, Some(100));

        // Progress is cleared once the attempt finishes.
        assert_eq!(form.progress().unwrap(), None);
    }

    #[tokio::test]
    async fn stale_terminal_event_is_dropped() {
        let gate = Arc::new(Semaphore::new(0));
        let form = Form::new(
            GatedTransport {
                gate: Arc::clone(&gate),
            },
            fields(&[("a", json!(1))]),
        );

        let slow = tokio::spawn({
            let form = form.clone();
            async move {
                form.post("https://example.test/slow", SubmitOptions::new())
                    .await
            }
        });
        wait_until_processing(&form).await;

        // A second submission replaces the active handle and completes.
        form.post("https://example.test/fast", SubmitOptions::new())
            .await
            .unwrap();
        assert!(form.was_successful().unwrap());

        gate.add_permits(1);
        let outcome = slow.await.unwrap().unwrap();
        assert!(matches!(outcome, SubmitOutcome::Cancelled));

        // The stale attempt neither re-ran Finish nor recorded itself.
        let record = form.last_attempt().unwrap().unwrap();
        assert!(record.url.ends_with("/fast"));
        assert!(form.was_successful().unwrap());
    }

    #[tokio::test]
    async fn remember_seeds_and_persists() {
        let store = Arc::new(MemoryRememberStore::default());
        store
            .save(
                "profile",
                &RememberedState {
                    data: fields(&[("name", json!("Grace"))]),
                    errors: BTreeMap::from([("name".to_string(), "taken".to_string())]),
                },
            )
            .unwrap();

        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("name", json!(""))]))
            .with_remember("profile", Arc::clone(&store) as Arc<dyn RememberStore>)
            .unwrap();

        assert_eq!(form.field("name").unwrap(), Some(json!("Grace")));
        assert!(form.has_errors().unwrap());
        assert!(form.is_dirty().unwrap());

        form.clear_errors().unwrap();
        assert!(store.load("profile").unwrap().errors.is_empty());

        form.set("name", json!("Hopper")).unwrap();
        assert_eq!(
            store.load("profile").unwrap().data.get("name"),
            Some(&json!("Hopper"))
        );
    }

    #[tokio::test]
    async fn submission_finish_persists_remembered_state() {
        let store = Arc::new(MemoryRememberStore::default());
        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("name", json!(""))]))
            .with_remember("draft", Arc::clone(&store) as Arc<dyn RememberStore>)
            .unwrap();

        form.set("name", json!("Ada")).unwrap();
        form.post("https://example.test/users", SubmitOptions::new())
            .await
            .unwrap();

        let remembered = store.load("draft").unwrap();
        assert_eq!(remembered.data.get("name"), Some(&json!("Ada")));
        assert!(remembered.errors.is_empty());
    }

    #[tokio::test]
    async fn full_stack_over_http_transport() {
        use crate::transport::HttpTransport;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(body_json(json!({"name": "", "email": "nope"})))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "The given data was invalid.",
                "errors": {"email": ["must be valid"], "name": ["required"]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users"))
            .and(body_json(json!({"name": "Ada", "email": "ada@example.test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;

        let form = Form::new(
            HttpTransport::new(),
            fields(&[("name", json!("")), ("email", json!("nope"))]),
        );
        let url = format!("{}/users", server.uri());

        let err = form.post(&url, SubmitOptions::new()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation { status: 422, .. }));
        assert_eq!(
            form.errors().unwrap().get("email").map(String::as_str),
            Some("must be valid")
        );

        form.set("name", json!("Ada")).unwrap();
        form.set("email", json!("ada@example.test")).unwrap();
        assert!(form.is_dirty().unwrap());

        form.post(&url, SubmitOptions::new()).await.unwrap();
        assert!(!form.is_dirty().unwrap());
        assert!(!form.has_errors().unwrap());
        assert!(form.was_successful().unwrap());
        form.set("name", json!("x")).unwrap();
        form.reset().unwrap();
        assert_eq!(form.field("name").unwrap(), Some(json!("Ada")));
    }

    #[tokio::test]
    async fn last_attempt_records_lifecycle() {
        let form = Form::new(MockTransport::ok(Value::Null), fields(&[("a", json!(1))]));
        assert!(form.last_attempt().unwrap().is_none());

        form.put("https://example.test/a", SubmitOptions::new())
            .await
            .unwrap();

        let record = form.last_attempt().unwrap().unwrap();
        assert_eq!(record.method, Method::Put);
        assert_eq!(record.outcome, AttemptOutcome::Succeeded);
        assert_eq!(
            record.phase_transitions,
            vec![
                Phase::Idle,
                Phase::Before,
                Phase::InFlight,
                Phase::Success,
                Phase::Idle
            ]
        );
    }
}
