//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stylecanvas_core::entitlement::{EntitlementSnapshot, Priority, Tier};
use stylecanvas_core::session::{ImageSource, SessionUser, SourceImage};
use stylecanvas_engine::{EngineOptions, PreviewEngine};
use stylecanvas_provider::retry::RetryConfig;
use stylecanvas_provider::{
    EntitlementSource, PreviewProvider, PreviewRequest, PreviewResult, ProviderError,
    StaticEntitlements,
};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

/// Scripted reply for one provider call.
#[derive(Debug, Clone)]
pub enum Reply {
    Ready,
    Status(u16),
}

/// In-memory provider that records requests and replays a script.
///
/// Calls without a scripted reply succeed. When holding, each call waits
/// for [`ScriptedProvider::release`] before replying.
pub struct ScriptedProvider {
    requests: Mutex<Vec<PreviewRequest>>,
    script: Mutex<VecDeque<Reply>>,
    hold: AtomicBool,
    ignore_cancel: AtomicBool,
    permits: Semaphore,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            hold: AtomicBool::new(false),
            ignore_cancel: AtomicBool::new(false),
            permits: Semaphore::new(0),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Keep running after cancellation, like a backend that never sees the
    /// abort.
    pub fn ignore_cancel(&self) {
        self.ignore_cancel.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, calls: usize) {
        self.permits.add_permits(calls);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PreviewRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait until at least `n` calls have reached the provider.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("provider calls did not arrive");
    }

    async fn wait_for_permit(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

pub fn result_for(request: &PreviewRequest) -> PreviewResult {
    PreviewResult {
        preview_url: format!("https://cdn.test/{}-{}.jpg", request.style_id, request.orientation),
        requires_watermark: true,
        storage_url: None,
        storage_path: Some(format!("previews/{}.jpg", request.style_id)),
        source_storage_path: None,
        source_display_url: None,
        preview_log_id: Some("log-1".into()),
        remaining_tokens: None,
        tier: None,
        priority: None,
        soft_remaining: None,
        crop_config: None,
    }
}

#[async_trait]
impl PreviewProvider for ScriptedProvider {
    async fn fetch_preview(
        &self,
        request: PreviewRequest,
        cancel: CancellationToken,
    ) -> Result<PreviewResult, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.script.lock().unwrap().pop_front().unwrap_or(Reply::Ready);

        if self.hold.load(Ordering::SeqCst) {
            if self.ignore_cancel.load(Ordering::SeqCst) {
                self.wait_for_permit().await;
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ProviderError::Aborted),
                    _ = self.wait_for_permit() => {}
                }
            }
        }

        match reply {
            Reply::Ready => Ok(result_for(&request)),
            Reply::Status(status) => Err(ProviderError::Api {
                status,
                body: format!("{{\"error\":\"status {status}\"}}"),
            }),
        }
    }
}

pub fn entitlements(remaining_tokens: Option<u32>) -> Arc<StaticEntitlements> {
    Arc::new(StaticEntitlements(EntitlementSnapshot {
        tier: Tier::Free,
        quota: Some(10),
        remaining_tokens,
        requires_watermark: true,
        priority: Priority::Normal,
        renew_at: None,
    }))
}

/// Entitlement source with per-user allowances.
///
/// `alice` is on an unlimited Pro plan, `bob` has no tokens left, and the
/// anonymous session has five. Hydrations for `alice` wait for
/// [`ScriptedEntitlements::release_alice`]; every hydration takes `delay`.
pub struct ScriptedEntitlements {
    calls: AtomicUsize,
    delay: Duration,
    alice_gate: Notify,
}

impl ScriptedEntitlements {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            alice_gate: Notify::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn release_alice(&self) {
        self.alice_gate.notify_one();
    }
}

#[async_trait]
impl EntitlementSource for ScriptedEntitlements {
    async fn hydrate(&self, user: Option<&SessionUser>) -> Result<EntitlementSnapshot, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let (tier, remaining_tokens) = match user.map(|u| u.id.as_str()) {
            Some("alice") => {
                self.alice_gate.notified().await;
                (Tier::Pro, None)
            }
            Some(_) => (Tier::Free, Some(0)),
            None => (Tier::Free, Some(5)),
        };
        Ok(EntitlementSnapshot {
            tier,
            quota: remaining_tokens.map(|_| 10),
            remaining_tokens,
            requires_watermark: tier == Tier::Free,
            priority: Priority::Normal,
            renew_at: None,
        })
    }
}

pub fn user(id: &str) -> SessionUser {
    SessionUser {
        id: id.into(),
        access_token: format!("token-{id}"),
    }
}

pub fn fast_options() -> EngineOptions {
    EngineOptions {
        batch_retry: RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            max_retries: 2,
        },
        ..Default::default()
    }
}

pub fn photo(hash: &str) -> SourceImage {
    SourceImage::new(hash, ImageSource::Url(format!("https://uploads.test/{hash}.jpg")))
        .with_display_url(format!("https://uploads.test/{hash}-display.jpg"))
}

/// Engine with a photo already uploaded and `remaining_tokens` to spend.
pub async fn engine_with(
    remaining_tokens: Option<u32>,
    options: EngineOptions,
) -> (PreviewEngine, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new();
    let engine = PreviewEngine::new(provider.clone(), entitlements(remaining_tokens), options);
    engine.set_source_image(photo("photo-1")).await;
    (engine, provider)
}

pub async fn engine(remaining_tokens: u32) -> (PreviewEngine, Arc<ScriptedProvider>) {
    engine_with(Some(remaining_tokens), fast_options()).await
}
