//! The preview engine.
//!
//! [`PreviewEngine`] is created once per session and cheaply cloned into
//! every UI surface. It owns the cache, the in-flight map, and the
//! per-style state machine:
//!
//! ```text
//! idle -> loading -> ready | error
//! error -> loading            (retry)
//! ready -> loading            (force / new orientation)
//! loading -> idle             (abort)
//! ```
//!
//! Mutable session data sits behind one async mutex that is never held
//! across a provider call. Provider calls run on spawned tasks so that a
//! caller going away does not cancel work other callers have joined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use stylecanvas_core::entitlement::{evaluate, EntitlementStatus, GateDecision};
use stylecanvas_core::error::CoreError;
use stylecanvas_core::idempotency::{build_idempotency_key, IdempotencyInput};
use stylecanvas_core::preview::{
    CropConfig, PreviewErrorKind, PreviewFailure, PreviewOutcome, PreviewPayload, PreviewState,
    PreviewStatus,
};
use stylecanvas_core::session::{ImageSource, SessionUser, SourceImage};
use stylecanvas_core::style::{find_style, Orientation, StyleOption, ORIGINAL_IMAGE_STYLE_ID};
use stylecanvas_core::types::{now_millis, EpochMillis};
use stylecanvas_events::{SignalBus, TelemetryBus, TelemetryEvent, TelemetryKind, UiSignal};
use stylecanvas_provider::retry::{retry_with_backoff, RetryConfig};
use stylecanvas_provider::{
    EntitlementSource, PreviewProvider, PreviewRequest, PreviewResult, ProviderError,
};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheEntry, PreviewCache};
use crate::classify::classify;
use crate::config::EngineConfig;
use crate::inflight::{InFlight, InFlightMap};
use crate::projections::EngineSnapshot;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Static engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub catalog: Vec<StyleOption>,
    pub default_orientation: Orientation,
    /// Deadline for one provider call.
    pub request_timeout: Option<Duration>,
    /// Backoff for transient failures on the batch path.
    pub batch_retry: RetryConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            catalog: stylecanvas_core::style::default_catalog(),
            default_orientation: Orientation::Square,
            request_timeout: None,
            batch_retry: RetryConfig::default(),
        }
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_orientation: config.default_orientation,
            request_timeout: config.request_timeout,
            batch_retry: config.batch_retry(),
            ..Default::default()
        }
    }
}

/// Options for [`PreviewEngine::start_preview`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Bypass the cache and regenerate.
    pub force: bool,
    /// Render for this orientation instead of the session's current one.
    pub orientation_override: Option<Orientation>,
}

impl StartOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

/// Options for [`PreviewEngine::generate_previews`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Regenerate styles that are already ready or loading.
    pub force: bool,
    pub orientation_override: Option<Orientation>,
}

/// Per-style result of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub generated: Vec<String>,
    pub cached: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, PreviewFailure)>,
    pub aborted: Vec<String>,
    /// The entitlement gate refused the next style; the rest were not tried.
    pub stopped_by_gate: bool,
    /// The batch was cancelled before finishing.
    pub cancelled: bool,
}

/// Whether a call came from a user action or from batch auto-generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchMode {
    Interactive,
    Batch,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Mutable session data. Guarded by [`EngineInner::session`].
struct Session {
    cache: PreviewCache,
    in_flight: InFlightMap,
    source: Option<SourceImage>,
    user: Option<SessionUser>,
    orientation: Orientation,
    crop: Option<CropConfig>,
    /// Style to replay once the user has signed in.
    pending_auth: Option<StyleOption>,
    /// Cancellation for the running batch, tagged with its id.
    batch: Option<(u64, CancellationToken)>,
    /// Id of the most recently initiated interactive operation.
    latest_op: u64,
    /// Bumped when a hydration starts or the user changes. A hydration
    /// finishing with an older value is discarded.
    hydration: u64,
}

struct EngineInner {
    options: EngineOptions,
    provider: Arc<dyn PreviewProvider>,
    entitlement_source: Arc<dyn EntitlementSource>,
    telemetry: Arc<TelemetryBus>,
    signals: Arc<SignalBus>,
    state: watch::Sender<EngineSnapshot>,
    session: Mutex<Session>,
    next_op_id: AtomicU64,
}

/// Session-scoped preview orchestrator.
#[derive(Clone)]
pub struct PreviewEngine {
    inner: Arc<EngineInner>,
}

impl PreviewEngine {
    pub fn new(
        provider: Arc<dyn PreviewProvider>,
        entitlement_source: Arc<dyn EntitlementSource>,
        options: EngineOptions,
    ) -> Self {
        let snapshot = EngineSnapshot {
            orientation: options.default_orientation,
            ..Default::default()
        };
        let (state, _) = watch::channel(snapshot);
        let session = Session {
            cache: PreviewCache::new(),
            in_flight: InFlightMap::new(),
            source: None,
            user: None,
            orientation: options.default_orientation,
            crop: None,
            pending_auth: None,
            batch: None,
            latest_op: 0,
            hydration: 0,
        };

        Self {
            inner: Arc::new(EngineInner {
                options,
                provider,
                entitlement_source,
                telemetry: Arc::new(TelemetryBus::default()),
                signals: Arc::new(SignalBus::default()),
                state,
                session: Mutex::new(session),
                next_op_id: AtomicU64::new(1),
            }),
        }
    }

    // ---- observation ----

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn preview_state(&self, style_id: &str) -> PreviewState {
        self.inner.state.borrow().preview(style_id).clone()
    }

    pub fn telemetry(&self) -> &Arc<TelemetryBus> {
        &self.inner.telemetry
    }

    pub fn signals(&self) -> &Arc<SignalBus> {
        &self.inner.signals
    }

    pub fn catalog(&self) -> &[StyleOption] {
        &self.inner.options.catalog
    }

    pub fn style(&self, style_id: &str) -> Result<&StyleOption, CoreError> {
        find_style(&self.inner.options.catalog, style_id)
    }

    /// Style waiting for the auth flow to finish, if any.
    pub async fn pending_auth_style(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .await
            .pending_auth
            .as_ref()
            .map(|s| s.id.clone())
    }

    /// Number of generations currently running.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.session.lock().await.in_flight.len()
    }

    /// Number of cached `(style, orientation)` previews.
    pub async fn cached_count(&self) -> usize {
        self.inner.session.lock().await.cache.len()
    }

    // ---- session inputs ----

    /// Sign a user in or out.
    ///
    /// A different user invalidates the loaded entitlements; they are
    /// hydrated again on the next preview request.
    pub async fn set_session_user(&self, user: Option<SessionUser>) {
        let mut session = self.inner.session.lock().await;
        let changed = session.user.as_ref().map(|u| &u.id) != user.as_ref().map(|u| &u.id);
        session.user = user;
        if changed {
            tracing::info!(signed_in = session.user.is_some(), "Session user changed");
            session.hydration += 1;
            self.update(|s| s.entitlements = Default::default());
        }
    }

    /// Make `image` the photo previews are generated from.
    ///
    /// A photo with a new content hash cancels running generations, empties
    /// the cache, and resets every style to idle. Returns whether the photo
    /// changed.
    pub async fn set_source_image(&self, image: SourceImage) -> bool {
        let mut session = self.inner.session.lock().await;

        if session.source.as_ref().map(|s| s.hash.as_str()) == Some(image.hash.as_str()) {
            session.source = Some(image);
            return false;
        }

        let cancelled = session.in_flight.cancel_all();
        if let Some((_, token)) = session.batch.take() {
            token.cancel();
        }
        session.cache.bind_image(&image.hash);
        session.crop = None;
        session.pending_auth = None;
        tracing::info!(
            image_hash = %image.hash,
            cancelled = cancelled.len(),
            "Source image changed, previews reset",
        );
        session.source = Some(image);

        self.update(|s| {
            s.previews.clear();
            s.global_status = PreviewStatus::Idle;
            s.current_style_id = None;
        });
        true
    }

    /// Switch the canvas orientation.
    ///
    /// Generations running for another orientation are cancelled and styles
    /// showing another orientation go back to idle. Cached previews are kept,
    /// so switching back is a cache hit.
    pub async fn set_orientation(&self, orientation: Orientation) {
        let mut session = self.inner.session.lock().await;
        if session.orientation == orientation {
            return;
        }
        session.orientation = orientation;
        let cancelled = session
            .in_flight
            .cancel_where(|_, flight| flight.orientation != orientation);

        tracing::debug!(
            orientation = %orientation,
            cancelled = cancelled.len(),
            "Orientation changed",
        );

        self.update(|s| {
            s.orientation = orientation;
            for state in s.previews.values_mut() {
                if state.orientation().is_some_and(|o| o != orientation) {
                    *state = PreviewState::Idle;
                }
            }
            if !cancelled.is_empty() {
                s.global_status = PreviewStatus::Idle;
            }
        });
    }

    /// Apply a new crop for `orientation`.
    ///
    /// Previews rendered from the old crop are stale: their cache entries
    /// are dropped, running generations are cancelled, and their styles go
    /// back to idle. The original-image style is unaffected.
    pub async fn apply_crop(&self, orientation: Orientation, crop: CropConfig) {
        let mut session = self.inner.session.lock().await;
        if session.orientation == orientation && session.crop == Some(crop) {
            return;
        }
        session.orientation = orientation;
        session.crop = Some(crop);

        let invalidated = session
            .cache
            .invalidate_orientation(orientation, Some(ORIGINAL_IMAGE_STYLE_ID));
        let cancelled = session
            .in_flight
            .cancel_where(|style_id, _| style_id != ORIGINAL_IMAGE_STYLE_ID);

        tracing::debug!(
            orientation = %orientation,
            invalidated,
            cancelled = cancelled.len(),
            "Crop changed",
        );

        self.update(|s| {
            s.orientation = orientation;
            for (style_id, state) in s.previews.iter_mut() {
                if style_id != ORIGINAL_IMAGE_STYLE_ID {
                    *state = PreviewState::Idle;
                }
            }
            if !cancelled.is_empty() {
                s.global_status = PreviewStatus::Idle;
            }
        });
    }

    // ---- entitlements ----

    /// Load the session's entitlements from the entitlement source.
    ///
    /// Failures are recorded on the entitlement record (and returned); the
    /// gate keeps denying until a later hydration succeeds. A result that
    /// arrives after the session user changed is dropped.
    pub async fn hydrate_entitlements(&self) -> Result<(), ProviderError> {
        let (user, generation) = {
            let mut session = self.inner.session.lock().await;
            self.begin_hydration(&mut session)
        };
        self.run_hydration(user, generation).await
    }

    /// Hydrate if nobody has yet, or wait for a hydration already running.
    async fn ensure_entitlements(&self) {
        loop {
            let claimed = {
                let mut session = self.inner.session.lock().await;
                let status = self.inner.state.borrow().entitlements.status;
                match status {
                    EntitlementStatus::Ready | EntitlementStatus::Error => return,
                    EntitlementStatus::Idle => Some(self.begin_hydration(&mut session)),
                    EntitlementStatus::Loading => None,
                }
            };

            match claimed {
                // Failure is recorded on the record; the gate will deny.
                Some((user, generation)) => {
                    let _ = self.run_hydration(user, generation).await;
                }
                None => {
                    let mut rx = self.inner.state.subscribe();
                    let _ = rx
                        .wait_for(|s| s.entitlements.status != EntitlementStatus::Loading)
                        .await;
                }
            }
        }
    }

    /// Mark entitlements as loading and claim a hydration generation.
    fn begin_hydration(&self, session: &mut Session) -> (Option<SessionUser>, u64) {
        session.hydration += 1;
        self.update(|s| s.entitlements.mark_loading());
        (session.user.clone(), session.hydration)
    }

    async fn run_hydration(&self, user: Option<SessionUser>, generation: u64) -> Result<(), ProviderError> {
        let result = self.inner.entitlement_source.hydrate(user.as_ref()).await;

        let session = self.inner.session.lock().await;
        if session.hydration != generation {
            tracing::debug!(generation, current = session.hydration, "Discarding outdated entitlements");
            return result.map(|_| ());
        }

        match result {
            Ok(snapshot) => {
                tracing::info!(
                    tier = ?snapshot.tier,
                    remaining_tokens = ?snapshot.remaining_tokens,
                    "Entitlements ready",
                );
                self.update(|s| s.entitlements.apply_snapshot(snapshot, now_millis()));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Entitlement hydration failed");
                let message = e.to_string();
                self.update(|s| s.entitlements.mark_failed(message));
                Err(e)
            }
        }
    }

    fn gate(&self, style_id: &str) -> GateDecision {
        evaluate(&self.inner.state.borrow().entitlements, style_id)
    }

    // ---- preview operations ----

    /// Request the preview of `style` for the current photo.
    ///
    /// Cache hits resolve immediately. A call for a style whose generation
    /// is already running joins it instead of issuing a second request.
    pub async fn start_preview(&self, style: &StyleOption, options: StartOptions) -> PreviewOutcome {
        self.launch(style, options, LaunchMode::Interactive).await
    }

    /// Generate previews for several styles one after another.
    ///
    /// Styles that are already ready or loading for the target orientation
    /// are skipped unless `options.force` is set. The run stops at the first
    /// gate denial and when [`abort_preview_generation`] is called.
    ///
    /// [`abort_preview_generation`]: PreviewEngine::abort_preview_generation
    pub async fn generate_previews(&self, style_ids: &[String], options: BatchOptions) -> BatchReport {
        let batch_id = self.next_op_id();
        let cancel = CancellationToken::new();
        {
            let mut session = self.inner.session.lock().await;
            if let Some((_, previous)) = session.batch.replace((batch_id, cancel.clone())) {
                previous.cancel();
            }
        }

        tracing::info!(batch_id, styles = style_ids.len(), "Batch preview generation started");
        let mut report = BatchReport::default();

        for style_id in style_ids {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let style = match self.style(style_id) {
                Ok(style) => style.clone(),
                Err(e) => {
                    tracing::warn!(style_id = %style_id, error = %e, "Skipping unknown style");
                    report.skipped.push(style_id.clone());
                    continue;
                }
            };

            let orientation = match options.orientation_override {
                Some(o) => o,
                None => self.inner.session.lock().await.orientation,
            };
            let current = self.preview_state(style_id);
            if !options.force
                && current.is_settled_or_pending()
                && current.orientation() == Some(orientation)
            {
                report.skipped.push(style_id.clone());
                continue;
            }

            if !style.is_original_image() {
                self.ensure_entitlements().await;
                if let GateDecision::Denied(reason) = self.gate(&style.id) {
                    tracing::info!(style_id = %style_id, ?reason, "Batch stopped by entitlement gate");
                    report.stopped_by_gate = true;
                    break;
                }
            }

            let start = StartOptions {
                force: options.force,
                orientation_override: Some(orientation),
            };
            match self.launch(&style, start, LaunchMode::Batch).await {
                PreviewOutcome::Ready { from_cache: true, .. } => report.cached.push(style_id.clone()),
                PreviewOutcome::Ready { .. } => report.generated.push(style_id.clone()),
                PreviewOutcome::Failed(failure) => report.failed.push((style_id.clone(), failure)),
                PreviewOutcome::Aborted => report.aborted.push(style_id.clone()),
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
        }
        {
            let mut session = self.inner.session.lock().await;
            if session.batch.as_ref().is_some_and(|(id, _)| *id == batch_id) {
                session.batch = None;
            }
        }

        tracing::info!(
            batch_id,
            generated = report.generated.len(),
            cached = report.cached.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "Batch preview generation finished",
        );
        report
    }

    /// Remember `style` and ask the UI to run the sign-in flow.
    ///
    /// [`resume_pending_auth_preview`](PreviewEngine::resume_pending_auth_preview)
    /// replays it afterwards.
    pub async fn defer_for_auth(&self, style: &StyleOption) {
        self.inner.session.lock().await.pending_auth = Some(style.clone());
        self.inner.signals.publish(UiSignal::AuthRequired {
            style_id: style.id.clone(),
        });
    }

    /// Replay the style that was waiting for sign-in.
    ///
    /// The pending marker is cleared before replaying, so a second call is
    /// a no-op returning `None`.
    pub async fn resume_pending_auth_preview(&self) -> Option<PreviewOutcome> {
        let pending = self.inner.session.lock().await.pending_auth.take()?;
        tracing::info!(style_id = %pending.id, "Resuming preview after sign-in");
        Some(self.start_preview(&pending, StartOptions::default()).await)
    }

    /// Cancel every running generation and any running batch.
    ///
    /// Affected styles go back to idle without an error.
    pub async fn abort_preview_generation(&self) {
        let mut session = self.inner.session.lock().await;
        if let Some((_, token)) = session.batch.take() {
            token.cancel();
        }
        let cancelled = session.in_flight.cancel_all();
        if cancelled.is_empty() {
            return;
        }

        tracing::info!(styles = ?cancelled, "Preview generation aborted");
        self.update(|s| {
            for style_id in &cancelled {
                s.previews.insert(style_id.clone(), PreviewState::Idle);
            }
            s.global_status = PreviewStatus::Idle;
        });
    }

    // ---- internals ----

    async fn launch(&self, style: &StyleOption, options: StartOptions, mode: LaunchMode) -> PreviewOutcome {
        if !style.is_original_image() {
            self.ensure_entitlements().await;
        }

        let slot = {
            let mut session = self.inner.session.lock().await;
            let orientation = options.orientation_override.unwrap_or(session.orientation);
            let op_id = self.next_op_id();
            if mode == LaunchMode::Interactive {
                session.latest_op = op_id;
            }

            let Some(source) = session.source.clone() else {
                let failure = PreviewFailure::new(
                    PreviewErrorKind::Validation,
                    "Upload a photo before choosing a style",
                );
                self.set_error(&style.id, orientation, failure.clone(), mode);
                return PreviewOutcome::Failed(failure);
            };

            if style.is_original_image() {
                let payload = original_payload(&source, session.crop);
                self.set_ready(&style.id, orientation, payload.clone(), mode);
                return PreviewOutcome::Ready {
                    payload,
                    from_cache: true,
                };
            }

            let superseded = session
                .in_flight
                .cancel_where(|id, flight| id == style.id && flight.orientation != orientation);
            if !superseded.is_empty() {
                tracing::debug!(style_id = %style.id, orientation = %orientation, "Cancelled preview for previous orientation");
            }

            let running = session.in_flight.running_op(&style.id, orientation);
            if running.is_none() && !options.force {
                if let Some(entry) = session.cache.get(&style.id, orientation) {
                    let payload = entry.payload.clone();
                    tracing::debug!(style_id = %style.id, orientation = %orientation, "Preview cache hit");
                    self.set_ready(&style.id, orientation, payload.clone(), mode);
                    self.emit(TelemetryEvent::new(TelemetryKind::CacheHit, &style.id, orientation));
                    return PreviewOutcome::Ready {
                        payload,
                        from_cache: true,
                    };
                }
            }

            if let Some(running_op) = running {
                tracing::debug!(style_id = %style.id, orientation = %orientation, "Joining in-flight preview");
                if mode == LaunchMode::Interactive {
                    session.latest_op = running_op;
                    self.update(|s| {
                        s.current_style_id = Some(style.id.clone());
                        s.global_status = PreviewStatus::Loading;
                    });
                }
            } else {
                self.emit(TelemetryEvent::new(TelemetryKind::Start, &style.id, orientation));

                if let GateDecision::Denied(reason) = self.gate(&style.id) {
                    let failure = PreviewFailure::gate_denied(reason);
                    tracing::info!(style_id = %style.id, ?reason, "Preview denied by entitlement gate");
                    self.set_error(&style.id, orientation, failure.clone(), mode);
                    self.emit(
                        TelemetryEvent::new(TelemetryKind::Error, &style.id, orientation)
                            .with_detail(serde_json::json!({ "kind": failure.kind, "reason": reason })),
                    );
                    if mode == LaunchMode::Interactive {
                        self.inner.signals.publish(UiSignal::QuotaExceeded {
                            style_id: style.id.clone(),
                            kind: failure.kind,
                            message: failure.message.clone(),
                        });
                    }
                    return PreviewOutcome::Failed(failure);
                }

                let started_at = now_millis();
                self.update(|s| {
                    s.previews.insert(
                        style.id.clone(),
                        PreviewState::Loading {
                            orientation,
                            started_at,
                        },
                    );
                    if mode == LaunchMode::Interactive {
                        s.current_style_id = Some(style.id.clone());
                        s.global_status = PreviewStatus::Loading;
                    }
                });
            }

            let idempotency_key = match mode {
                LaunchMode::Interactive => Some(build_idempotency_key(&IdempotencyInput {
                    style_id: &style.id,
                    orientation,
                    image_hash: &source.hash,
                    user_id: session.user.as_ref().map(|u| u.id.as_str()),
                })),
                LaunchMode::Batch => None,
            };
            let request = PreviewRequest {
                style_id: style.id.clone(),
                orientation,
                image: source.source.clone(),
                image_hash: source.hash.clone(),
                idempotency_key,
                force: options.force,
                crop_config: session.crop,
                access_token: session.user.as_ref().map(|u| u.access_token.clone()),
            };

            session.in_flight.join_or_start(&style.id, orientation, || {
                let cancel = CancellationToken::new();
                let task = tokio::spawn(self.clone().run_generation(
                    style.clone(),
                    orientation,
                    op_id,
                    request,
                    cancel.clone(),
                    mode,
                ));
                let style_id = style.id.clone();
                let outcome = async move {
                    task.await.unwrap_or_else(|e| {
                        tracing::error!(style_id = %style_id, error = %e, "Preview task panicked");
                        PreviewOutcome::Failed(PreviewFailure::transient(
                            "Something went wrong while generating your preview. Please try again",
                        ))
                    })
                }
                .boxed()
                .shared();
                InFlight {
                    op_id,
                    orientation,
                    cancel,
                    outcome,
                }
            })
        };

        slot.into_outcome().await
    }

    /// Body of the spawned generation task.
    async fn run_generation(
        self,
        style: StyleOption,
        orientation: Orientation,
        op_id: u64,
        request: PreviewRequest,
        cancel: CancellationToken,
        mode: LaunchMode,
    ) -> PreviewOutcome {
        let started = Instant::now();
        let started_at = now_millis();

        let result = match mode {
            LaunchMode::Interactive => self.fetch_once(request, &cancel).await,
            LaunchMode::Batch => {
                let retry = self.inner.options.batch_retry.clone();
                retry_with_backoff(&retry, &cancel, |_| self.fetch_once(request.clone(), &cancel)).await
            }
        };

        self.complete(style, orientation, op_id, started_at, started.elapsed(), result, mode)
            .await
    }

    /// One provider call under the configured deadline.
    async fn fetch_once(
        &self,
        request: PreviewRequest,
        cancel: &CancellationToken,
    ) -> Result<PreviewResult, ProviderError> {
        let call = self.inner.provider.fetch_preview(request, cancel.clone());
        match self.inner.options.request_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::TimedOut(deadline)),
            },
            None => call.await,
        }
    }

    /// Fold a finished provider call into cache, state, and entitlements.
    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        style: StyleOption,
        orientation: Orientation,
        op_id: u64,
        started_at: EpochMillis,
        elapsed: Duration,
        result: Result<PreviewResult, ProviderError>,
        mode: LaunchMode,
    ) -> PreviewOutcome {
        let mut session = self.inner.session.lock().await;

        if !session.in_flight.finish(&style.id, op_id) {
            tracing::debug!(
                style_id = %style.id,
                orientation = %orientation,
                op_id,
                "Discarding result of cancelled preview",
            );
            return PreviewOutcome::Aborted;
        }
        let is_latest = session.latest_op == op_id;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                let Some(failure) = classify(&e) else {
                    tracing::debug!(style_id = %style.id, "Preview aborted");
                    self.update(|s| {
                        s.previews.insert(style.id.clone(), PreviewState::Idle);
                        if is_latest {
                            s.global_status = PreviewStatus::Idle;
                        }
                    });
                    return PreviewOutcome::Aborted;
                };

                tracing::warn!(
                    style_id = %style.id,
                    orientation = %orientation,
                    kind = ?failure.kind,
                    error = %e,
                    "Preview generation failed",
                );
                self.update(|s| {
                    s.previews.insert(
                        style.id.clone(),
                        PreviewState::Error {
                            orientation,
                            failure: failure.clone(),
                        },
                    );
                    if is_latest {
                        s.global_status = PreviewStatus::Error;
                    }
                });
                self.emit(
                    TelemetryEvent::new(TelemetryKind::Error, &style.id, orientation).with_detail(
                        serde_json::json!({ "kind": failure.kind, "status": e.status() }),
                    ),
                );

                if mode == LaunchMode::Interactive {
                    match failure.kind {
                        PreviewErrorKind::AuthRequired => {
                            session.pending_auth = Some(style.clone());
                            self.inner.signals.publish(UiSignal::AuthRequired {
                                style_id: style.id.clone(),
                            });
                        }
                        PreviewErrorKind::QuotaExceeded => {
                            self.inner.signals.publish(UiSignal::QuotaExceeded {
                                style_id: style.id.clone(),
                                kind: failure.kind,
                                message: failure.message.clone(),
                            });
                        }
                        _ => {}
                    }
                }
                return PreviewOutcome::Failed(failure);
            }
        };

        let completed_at = now_millis();
        let source = session.source.as_ref();
        let payload = PreviewPayload {
            preview_url: result.preview_url.clone(),
            watermark_applied: result.requires_watermark,
            started_at,
            completed_at,
            storage_url: result.storage_url.clone(),
            storage_path: result.storage_path.clone(),
            source_storage_path: result
                .source_storage_path
                .clone()
                .or_else(|| source.and_then(|s| s.storage_path.clone())),
            source_display_url: result
                .source_display_url
                .clone()
                .or_else(|| source.and_then(|s| s.display_url.clone())),
            preview_log_id: result.preview_log_id.clone(),
            crop_config: result.crop_config.or(session.crop),
            soft_remaining: result.soft_remaining,
        };

        session
            .cache
            .set(style.id.clone(), CacheEntry::new(orientation, completed_at, payload.clone()));

        let charge = result.charge();
        self.update(|s| {
            s.previews.insert(
                style.id.clone(),
                PreviewState::Ready {
                    orientation,
                    payload: payload.clone(),
                },
            );
            if is_latest {
                s.global_status = PreviewStatus::Ready;
            }
            s.entitlements.apply_generation(&charge);
            s.generation_count += 1;
        });

        tracing::info!(
            style_id = %style.id,
            orientation = %orientation,
            elapsed_ms = elapsed.as_millis() as u64,
            remaining_tokens = ?self.inner.state.borrow().entitlements.remaining_tokens,
            "Preview ready",
        );
        self.emit(
            TelemetryEvent::new(TelemetryKind::Complete, &style.id, orientation).with_detail(
                serde_json::json!({ "duration_ms": elapsed.as_millis() as u64, "watermark": payload.watermark_applied }),
            ),
        );
        if let Some(remaining) = result.soft_remaining {
            self.inner.signals.publish(UiSignal::TokensLow { remaining });
        }

        PreviewOutcome::Ready {
            payload,
            from_cache: false,
        }
    }

    fn set_ready(&self, style_id: &str, orientation: Orientation, payload: PreviewPayload, mode: LaunchMode) {
        self.update(|s| {
            s.previews
                .insert(style_id.to_string(), PreviewState::Ready { orientation, payload });
            if mode == LaunchMode::Interactive {
                s.current_style_id = Some(style_id.to_string());
                s.global_status = PreviewStatus::Ready;
            }
        });
    }

    fn set_error(&self, style_id: &str, orientation: Orientation, failure: PreviewFailure, mode: LaunchMode) {
        self.update(|s| {
            s.previews
                .insert(style_id.to_string(), PreviewState::Error { orientation, failure });
            if mode == LaunchMode::Interactive {
                s.current_style_id = Some(style_id.to_string());
                s.global_status = PreviewStatus::Error;
            }
        });
    }

    fn update<F: FnOnce(&mut EngineSnapshot)>(&self, f: F) {
        self.inner.state.send_modify(f);
    }

    fn emit(&self, event: TelemetryEvent) {
        self.inner.telemetry.publish(event);
    }

    fn next_op_id(&self) -> u64 {
        self.inner.next_op_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Payload for the original-image pseudo-style: the photo itself.
fn original_payload(source: &SourceImage, crop: Option<CropConfig>) -> PreviewPayload {
    let now = now_millis();
    let preview_url = source.display_url.clone().unwrap_or_else(|| match &source.source {
        ImageSource::Url(url) | ImageSource::DataUrl(url) | ImageSource::StoragePath(url) => url.clone(),
    });
    PreviewPayload {
        preview_url,
        watermark_applied: false,
        started_at: now,
        completed_at: now,
        storage_url: None,
        storage_path: source.storage_path.clone(),
        source_storage_path: source.storage_path.clone(),
        source_display_url: source.display_url.clone(),
        preview_log_id: None,
        crop_config: crop,
        soft_remaining: None,
    }
}
