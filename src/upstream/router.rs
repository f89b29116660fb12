//! Dual-credential router with failover and lazy failback.
//!
//! The router owns a primary and a backup [`GenerativeClient`]. A failed call on the primary
//! switches the active slot to the backup, puts the primary on probation, and retries the same
//! request once. Failback is evaluated at the top of the next call after the probation window.
//!
//! Shared state lives behind a single mutex that is never held across an `await`. A call that
//! is cancelled while in flight never reaches the failure bookkeeping, so cancellation can not
//! trigger a failover.

use crate::clock::{Clock, SystemClock, format_rfc3339};
use crate::config::Config;
use crate::upstream::classify::classify_client_error;
use crate::upstream::client::{GeminiClient, GenerativeClient};
use crate::upstream::types::{
    ClientError, CredentialState, ErrorKind, GenerateContent, GenerateOptions, Slot,
    UpstreamError, UpstreamResponse,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;

/// Length of the request-counter bookkeeping window.
const COUNTER_WINDOW: time::Duration = time::Duration::minutes(1);

/// Extra attempts a single call may make after failing over.
const MAX_FAILOVER_HOPS: usize = 1;

/// Default probation before the primary credential is retried.
pub const DEFAULT_FAILBACK_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Per-slot request counters for the current one-minute window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounters {
    /// Calls issued against the primary credential.
    pub primary: u64,
    /// Calls issued against the backup credential.
    pub backup: u64,
}

impl RequestCounters {
    fn increment(&mut self, slot: Slot) -> u64 {
        let counter = match slot {
            Slot::Primary => &mut self.primary,
            Slot::Backup => &mut self.backup,
        };
        *counter += 1;
        *counter
    }
}

/// Read-only snapshot of the router for health and monitoring consumers.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    /// Whether a primary credential is configured.
    pub primary_configured: bool,
    /// Whether a backup credential is configured.
    pub backup_configured: bool,
    /// Whether calls currently go to the backup credential.
    pub using_backup: bool,
    /// Currently active slot, if any credential is configured.
    pub active_slot: Option<Slot>,
    /// Availability of the primary credential.
    pub primary_state: CredentialState,
    /// Availability of the backup credential.
    pub backup_state: CredentialState,
    /// Number of failovers since startup.
    pub failover_count: u64,
    /// RFC3339 time of the last failover.
    pub last_failover_at: Option<String>,
    /// RFC3339 time after which the primary will be retried.
    pub primary_retry_at: Option<String>,
    /// Request counters for the current window.
    pub request_counters: RequestCounters,
    /// Whether any credential can serve calls.
    pub healthy: bool,
}

#[derive(Debug)]
struct RouterState {
    active_slot: Option<Slot>,
    primary_state: CredentialState,
    backup_state: CredentialState,
    failover_count: u64,
    last_failover_at: Option<OffsetDateTime>,
    primary_retry_at: Option<OffsetDateTime>,
    request_counters: RequestCounters,
    counters_window_start: OffsetDateTime,
}

/// Routes upstream calls across a primary and a backup credential.
pub struct FailoverRouter {
    primary: Option<Arc<dyn GenerativeClient>>,
    backup: Option<Arc<dyn GenerativeClient>>,
    state: Mutex<RouterState>,
    clock: Arc<dyn Clock>,
    failback_cooldown: Duration,
}

impl FailoverRouter {
    /// Build a router from optional primary and backup clients.
    pub fn new(
        primary: Option<Arc<dyn GenerativeClient>>,
        backup: Option<Arc<dyn GenerativeClient>>,
        clock: Arc<dyn Clock>,
        failback_cooldown: Duration,
    ) -> Self {
        let active_slot = if primary.is_some() {
            Some(Slot::Primary)
        } else if backup.is_some() {
            Some(Slot::Backup)
        } else {
            None
        };
        let configured = |client: &Option<Arc<dyn GenerativeClient>>| {
            if client.is_some() {
                CredentialState::Active
            } else {
                CredentialState::Unconfigured
            }
        };

        match active_slot {
            Some(slot) => tracing::info!(
                active = %slot,
                primary = primary.is_some(),
                backup = backup.is_some(),
                "Failover router initialized"
            ),
            None => tracing::error!(
                "No API credentials configured; set GEMINI_API_KEY_1 and/or GEMINI_API_KEY_2"
            ),
        }

        let state = RouterState {
            active_slot,
            primary_state: configured(&primary),
            backup_state: configured(&backup),
            failover_count: 0,
            last_failover_at: None,
            primary_retry_at: None,
            request_counters: RequestCounters::default(),
            counters_window_start: clock.now(),
        };

        Self {
            primary,
            backup,
            state: Mutex::new(state),
            clock,
            failback_cooldown,
        }
    }

    /// Build a router with Gemini clients for the credentials present in `config`.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let build = |key: &Option<String>| -> Result<Option<Arc<dyn GenerativeClient>>, ClientError> {
            key.as_ref()
                .map(|key| {
                    GeminiClient::new(&config.gemini_base_url, key.clone())
                        .map(|client| Arc::new(client) as Arc<dyn GenerativeClient>)
                })
                .transpose()
        };

        Ok(Self::new(
            build(&config.primary_api_key)?,
            build(&config.backup_api_key)?,
            Arc::new(SystemClock),
            config.failback_cooldown,
        ))
    }

    /// Generate content, failing over to the backup credential at most once.
    pub async fn generate(
        &self,
        model: &str,
        content: &GenerateContent,
        options: &GenerateOptions,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut hops = 0;
        loop {
            let (slot, client) = self.begin_attempt()?;
            tracing::debug!(
                slot = %slot,
                model,
                content_bytes = content.approximate_len(),
                "Calling upstream"
            );

            let error = match client.generate(model, content, options).await {
                Ok(response) => {
                    tracing::debug!(slot = %slot, chars = response.text.len(), "Upstream call succeeded");
                    return Ok(response);
                }
                Err(error) => error,
            };

            let kind = classify_client_error(&error);
            tracing::warn!(slot = %slot, kind = ?kind, error = %error, "Upstream call failed");

            if hops < MAX_FAILOVER_HOPS && self.fail_over(slot, kind) {
                hops += 1;
                continue;
            }

            return Err(match kind {
                ErrorKind::RateLimit => UpstreamError::BothExhaustedRateLimit,
                ErrorKind::Auth => UpstreamError::BothExhaustedAuth,
                ErrorKind::Other => UpstreamError::Upstream(error),
            });
        }
    }

    /// Snapshot of the router state.
    pub fn status(&self) -> RouterStatus {
        let state = self.lock_state();
        RouterStatus {
            primary_configured: self.primary.is_some(),
            backup_configured: self.backup.is_some(),
            using_backup: state.active_slot == Some(Slot::Backup),
            active_slot: state.active_slot,
            primary_state: state.primary_state,
            backup_state: state.backup_state,
            failover_count: state.failover_count,
            last_failover_at: state.last_failover_at.map(format_rfc3339),
            primary_retry_at: state.primary_retry_at.map(format_rfc3339),
            request_counters: state.request_counters,
            healthy: state.active_slot.is_some(),
        }
    }

    /// Reset the counter window if needed, fail back when probation is over, pick the active
    /// client and count the request.
    fn begin_attempt(&self) -> Result<(Slot, Arc<dyn GenerativeClient>), UpstreamError> {
        let now = self.clock.now();
        let mut state = self.lock_state();

        if now - state.counters_window_start > COUNTER_WINDOW {
            state.request_counters = RequestCounters::default();
            state.counters_window_start = now;
        }

        let probation_over = state.primary_retry_at.is_some_and(|retry_at| now > retry_at);
        if state.active_slot == Some(Slot::Backup) && self.primary.is_some() && probation_over {
            state.active_slot = Some(Slot::Primary);
            state.primary_state = CredentialState::Active;
            state.primary_retry_at = None;
            tracing::info!("Switched back to primary credential");
        }

        let slot = state.active_slot.ok_or(UpstreamError::NoCredentials)?;
        let client = self.client_for(slot).ok_or(UpstreamError::NoCredentials)?;
        let count = state.request_counters.increment(slot);
        tracing::trace!(slot = %slot, count, "Request counted");
        Ok((slot, client))
    }

    /// Switch to the backup after a failure on the primary. Returns whether the call should be
    /// retried. Switching when another request already failed over is a no-op.
    fn fail_over(&self, failed: Slot, kind: ErrorKind) -> bool {
        if failed != Slot::Primary || self.backup.is_none() {
            return false;
        }

        let now = self.clock.now();
        let mut state = self.lock_state();
        if state.active_slot == Some(Slot::Backup) {
            tracing::debug!("Backup already active; retrying without a new failover");
            return true;
        }

        state.active_slot = Some(Slot::Backup);
        state.primary_state = CredentialState::Failed;
        state.failover_count += 1;
        state.last_failover_at = Some(now);
        state.primary_retry_at = Some(now + self.failback_cooldown);
        tracing::warn!(
            reason = ?kind,
            failover_count = state.failover_count,
            cooldown_secs = self.failback_cooldown.as_secs(),
            "Switched to backup credential"
        );
        true
    }

    fn client_for(&self, slot: Slot) -> Option<Arc<dyn GenerativeClient>> {
        match slot {
            Slot::Primary => self.primary.clone(),
            Slot::Backup => self.backup.clone(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake credential that replays scripted outcomes, then succeeds.
    struct ScriptedClient {
        name: &'static str,
        script: Mutex<VecDeque<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(name: &'static str, script: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|step| step.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedClient {
        async fn generate(
            &self,
            _model: &str,
            _content: &GenerateContent,
            _options: &GenerateOptions,
        ) -> Result<UpstreamResponse, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Ok(text)) => Ok(UpstreamResponse::from_text(text)),
                Some(Err(message)) => Err(ClientError::Message(message)),
                None => Ok(UpstreamResponse::from_text(format!("ok from {}", self.name))),
            }
        }
    }

    struct PendingClient;

    #[async_trait]
    impl GenerativeClient for PendingClient {
        async fn generate(
            &self,
            _model: &str,
            _content: &GenerateContent,
            _options: &GenerateOptions,
        ) -> Result<UpstreamResponse, ClientError> {
            std::future::pending().await
        }
    }

    fn router(
        primary: Option<Arc<ScriptedClient>>,
        backup: Option<Arc<ScriptedClient>>,
        clock: Arc<ManualClock>,
    ) -> FailoverRouter {
        FailoverRouter::new(
            primary.map(|client| client as Arc<dyn GenerativeClient>),
            backup.map(|client| client as Arc<dyn GenerativeClient>),
            clock,
            DEFAULT_FAILBACK_COOLDOWN,
        )
    }

    async fn call(router: &FailoverRouter) -> Result<UpstreamResponse, UpstreamError> {
        router
            .generate(
                "gemini-2.5-flash",
                &GenerateContent::Text("hello".into()),
                &GenerateOptions::default(),
            )
            .await
    }

    #[tokio::test]
    async fn no_credentials_fails_every_call() {
        let router = router(None, None, Arc::new(ManualClock::default()));
        for _ in 0..3 {
            let error = call(&router).await.expect_err("no credentials");
            assert!(matches!(error, UpstreamError::NoCredentials));
        }
        let status = router.status();
        assert!(status.active_slot.is_none());
        assert!(!status.healthy);
        assert_eq!(status.primary_state, CredentialState::Unconfigured);
        assert_eq!(status.request_counters, RequestCounters::default());
    }

    #[tokio::test]
    async fn backup_only_router_starts_on_backup() {
        let backup = ScriptedClient::new("backup", vec![]);
        let router = router(None, Some(backup.clone()), Arc::new(ManualClock::default()));
        let response = call(&router).await.expect("response");
        assert_eq!(response.text, "ok from backup");
        let status = router.status();
        assert!(status.using_backup);
        assert_eq!(status.request_counters.backup, 1);
        assert!(status.primary_retry_at.is_none());
    }

    #[tokio::test]
    async fn rate_limit_on_primary_fails_over_transparently() {
        let clock = Arc::new(ManualClock::default());
        let primary = ScriptedClient::new("primary", vec![Err("429 Too Many Requests")]);
        let backup = ScriptedClient::new("backup", vec![]);
        let router = router(Some(primary.clone()), Some(backup.clone()), clock.clone());

        let response = call(&router).await.expect("served by backup");
        assert_eq!(response.text, "ok from backup");

        let status = router.status();
        assert!(status.using_backup);
        assert_eq!(status.failover_count, 1);
        assert_eq!(status.primary_state, CredentialState::Failed);
        assert_eq!(
            status.primary_retry_at,
            Some(format_rfc3339(clock.now() + DEFAULT_FAILBACK_COOLDOWN))
        );
        assert_eq!(status.last_failover_at, Some(format_rfc3339(clock.now())));
        assert_eq!(status.request_counters.primary, 1);
        assert_eq!(status.request_counters.backup, 1);
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn other_errors_also_fail_over_once() {
        let primary = ScriptedClient::new("primary", vec![Err("connection reset")]);
        let backup = ScriptedClient::new("backup", vec![]);
        let router = router(Some(primary), Some(backup), Arc::new(ManualClock::default()));

        call(&router).await.expect("served by backup");
        assert_eq!(router.status().failover_count, 1);
    }

    #[tokio::test]
    async fn rate_limit_on_both_is_terminal() {
        let primary = ScriptedClient::new("primary", vec![Err("quota exceeded")]);
        let backup = ScriptedClient::new("backup", vec![Err("429 Too Many Requests")]);
        let router = router(
            Some(primary.clone()),
            Some(backup.clone()),
            Arc::new(ManualClock::default()),
        );

        let error = call(&router).await.expect_err("both exhausted");
        assert!(matches!(error, UpstreamError::BothExhaustedRateLimit));
        assert_eq!(primary.calls(), 1);
        assert_eq!(backup.calls(), 1);
        assert_eq!(router.status().failover_count, 1);
    }

    #[tokio::test]
    async fn auth_failure_on_backup_is_terminal() {
        let primary = ScriptedClient::new("primary", vec![Err("401 Unauthorized")]);
        let backup = ScriptedClient::new("backup", vec![Err("API key not valid")]);
        let router = router(Some(primary), Some(backup), Arc::new(ManualClock::default()));

        let error = call(&router).await.expect_err("both rejected");
        assert!(matches!(error, UpstreamError::BothExhaustedAuth));
    }

    #[tokio::test]
    async fn other_errors_on_backup_propagate_unchanged() {
        let primary = ScriptedClient::new("primary", vec![Err("boom")]);
        let backup = ScriptedClient::new("backup", vec![Err("model overloaded")]);
        let router = router(Some(primary), Some(backup), Arc::new(ManualClock::default()));

        let error = call(&router).await.expect_err("propagated");
        assert!(matches!(&error, UpstreamError::Upstream(_)));
        assert_eq!(error.to_string(), "model overloaded");
    }

    #[tokio::test]
    async fn primary_only_rate_limit_is_terminal_without_retry() {
        let primary = ScriptedClient::new("primary", vec![Err("quota exceeded")]);
        let router = router(Some(primary.clone()), None, Arc::new(ManualClock::default()));

        let error = call(&router).await.expect_err("terminal");
        assert!(matches!(error, UpstreamError::BothExhaustedRateLimit));
        assert_eq!(primary.calls(), 1);
        let status = router.status();
        assert_eq!(status.failover_count, 0);
        assert_eq!(status.active_slot, Some(Slot::Primary));
    }

    #[tokio::test]
    async fn fails_back_after_probation_on_next_call() {
        let clock = Arc::new(ManualClock::default());
        let primary = ScriptedClient::new("primary", vec![Err("quota exceeded")]);
        let backup = ScriptedClient::new("backup", vec![]);
        let router = router(Some(primary.clone()), Some(backup.clone()), clock.clone());

        call(&router).await.expect("failover");

        clock.advance(Duration::from_secs(60));
        let during_probation = call(&router).await.expect("still on backup");
        assert_eq!(during_probation.text, "ok from backup");
        assert!(router.status().using_backup);

        clock.advance(DEFAULT_FAILBACK_COOLDOWN);
        let after_probation = call(&router).await.expect("back on primary");
        assert_eq!(after_probation.text, "ok from primary");

        let status = router.status();
        assert!(!status.using_backup);
        assert_eq!(status.primary_state, CredentialState::Active);
        assert!(status.primary_retry_at.is_none());
        assert_eq!(status.failover_count, 1);
        assert_eq!(primary.calls(), 2);
        assert_eq!(backup.calls(), 2);
    }

    #[tokio::test]
    async fn counters_reset_after_window() {
        let clock = Arc::new(ManualClock::default());
        let primary = ScriptedClient::new("primary", vec![]);
        let router = router(Some(primary), None, clock.clone());

        call(&router).await.expect("first");
        call(&router).await.expect("second");
        assert_eq!(router.status().request_counters.primary, 2);

        clock.advance(Duration::from_secs(61));
        call(&router).await.expect("third");
        assert_eq!(router.status().request_counters.primary, 1);
    }

    #[tokio::test]
    async fn cancelled_call_does_not_fail_over() {
        let backup = ScriptedClient::new("backup", vec![]);
        let router = FailoverRouter::new(
            Some(Arc::new(PendingClient)),
            Some(backup.clone() as Arc<dyn GenerativeClient>),
            Arc::new(ManualClock::default()),
            DEFAULT_FAILBACK_COOLDOWN,
        );

        let outcome = tokio::time::timeout(Duration::from_millis(20), call(&router)).await;
        assert!(outcome.is_err(), "call should time out");

        let status = router.status();
        assert_eq!(status.failover_count, 0);
        assert_eq!(status.active_slot, Some(Slot::Primary));
        assert_eq!(status.primary_state, CredentialState::Active);
        assert_eq!(backup.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_keep_counters_exact() {
        let primary = ScriptedClient::new("primary", vec![]);
        let router = Arc::new(router(
            Some(primary.clone()),
            None,
            Arc::new(ManualClock::default()),
        ));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let router = router.clone();
            handles.push(tokio::spawn(async move { call(&router).await }));
        }
        for handle in handles {
            handle.await.expect("join").expect("call");
        }

        assert_eq!(router.status().request_counters.primary, 64);
        assert_eq!(primary.calls(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_fail_over_once() {
        let script = (0..16).map(|_| Err("quota exceeded")).collect();
        let primary = ScriptedClient::new("primary", script);
        let backup = ScriptedClient::new("backup", vec![]);
        let router = Arc::new(router(
            Some(primary),
            Some(backup),
            Arc::new(ManualClock::default()),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let router = router.clone();
            handles.push(tokio::spawn(async move { call(&router).await }));
        }
        for handle in handles {
            handle.await.expect("join").expect("served");
        }

        let status = router.status();
        assert_eq!(status.failover_count, 1);
        assert!(status.using_backup);
        assert_eq!(status.request_counters.backup, 16);
    }
}
