//! Dispatch-and-failover engine.
//!
//! One call to [`DispatchEngine::dispatch`] drives a dispatch session
//! through `Selecting → Requesting → Succeeded | Failed`, and on failure with
//! failover enabled through `Switching` back to `Selecting`, until a gateway
//! accepts the message or every registered provider has been queued.
//!
//! Attempts are strictly sequential: at most one request is in flight per
//! session.

use std::sync::Arc;

use serde::Serialize;
use sms_core::{
    ExtraFields, MessageIntent, OutboundRequest, SmsError, SmsMessage, Transport,
    TransportResponse,
};
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::notifier::{OutcomeNotifier, SmsFailed, SmsSent, SmsSnapshot, TracingNotifier};
use crate::registry::ProviderRegistry;

/// Knobs that shape failover beyond the per-call on/off switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Fail over on network faults too, not only on gateway rejections.
    pub failover_on_transport_fault: bool,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            failover_on_transport_fault: true,
        }
    }
}

impl From<&DispatchConfig> for FailoverPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            failover_on_transport_fault: config.failover_on_transport_fault,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { status: u16, body: String },
    Failure { error: String, body: Option<String> },
}

/// One request actually sent to a gateway.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchAttempt {
    pub provider: String,
    pub request: OutboundRequest,
    pub outcome: AttemptOutcome,
}

/// What is left of a session once it ends.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    /// Raw body of the accepting gateway, `None` when every attempt failed.
    pub body: Option<String>,
    /// Every provider taken off the candidate list, sent-to or skipped, in order.
    pub queued: Vec<String>,
    pub attempts: Vec<DispatchAttempt>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.body.is_some()
    }

    /// Providers a request was actually sent to, in order.
    pub fn sent_to(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }

    /// Providers that were queued without ever being sent to.
    pub fn skipped(&self) -> Vec<&str> {
        self.queued
            .iter()
            .filter(|id| !self.attempts.iter().any(|a| &a.provider == *id))
            .map(String::as_str)
            .collect()
    }
}

/// Mutable state of one `dispatch` call. Never shared between calls.
#[derive(Debug)]
struct DispatchSession {
    /// Wire form of the intent: substituted and signed exactly once.
    intent: MessageIntent,
    extra: ExtraFields,
    queued: Vec<String>,
    current: Option<String>,
    driver: Option<String>,
    continue_switching: bool,
    failover_enabled: bool,
    attempts: Vec<DispatchAttempt>,
}

impl DispatchSession {
    fn new(intent: &MessageIntent, driver: Option<&str>, failover_enabled: bool) -> Self {
        Self {
            intent: intent.prepared(),
            extra: intent.extra_fields(),
            queued: Vec::new(),
            current: None,
            driver: driver.map(str::to_string),
            continue_switching: true,
            failover_enabled,
            attempts: Vec::new(),
        }
    }

    /// Append `id` unless already present.
    fn queue(&mut self, id: &str) {
        if !self.queued.iter().any(|q| q == id) {
            self.queued.push(id.to_string());
        }
    }

    fn finish(self, body: Option<String>) -> DispatchReport {
        DispatchReport {
            body,
            queued: self.queued,
            attempts: self.attempts,
        }
    }
}

/// First provider in declared order that has not been queued yet.
pub fn next_candidate<'a>(all: &[&'a str], queued: &[String]) -> Option<&'a str> {
    all.iter()
        .copied()
        .find(|id| !queued.iter().any(|q| q == id))
}

/// Sends messages through the registry's providers, failing over on rejection.
#[derive(Clone)]
pub struct DispatchEngine {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn OutcomeNotifier>,
    policy: FailoverPolicy,
}

impl DispatchEngine {
    /// Engine reporting outcomes to the tracing log.
    pub fn new(registry: Arc<ProviderRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            notifier: Arc::new(TracingNotifier),
            policy: FailoverPolicy::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OutcomeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_policy(mut self, policy: FailoverPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Send `message`, returning the accepting gateway's raw body.
    ///
    /// Gateway failures never surface as `Err`: they reach the message's
    /// `error` hook and the notifier, and the call returns `Ok(None)`. The only
    /// error is an invalid intent from `handle()`.
    pub async fn send<M>(&self, message: &M, failover_enabled: bool) -> Result<Option<String>, SmsError>
    where
        M: SmsMessage + ?Sized,
    {
        Ok(self.dispatch(message, failover_enabled).await?.body)
    }

    /// Like [`send`](Self::send) but returns the full session report.
    pub async fn dispatch<M>(
        &self,
        message: &M,
        failover_enabled: bool,
    ) -> Result<DispatchReport, SmsError>
    where
        M: SmsMessage + ?Sized,
    {
        let intent = message.handle()?;
        let mut session = DispatchSession::new(&intent, message.driver(), failover_enabled);
        info!(
            recipients = intent.recipients().len(),
            driver = ?session.driver,
            failover = failover_enabled,
            "dispatching sms"
        );

        while session.continue_switching {
            // Selecting
            let requested = session
                .driver
                .clone()
                .unwrap_or_else(|| self.registry.default_id().to_string());
            let id = self.registry.resolve_id(&requested).to_string();
            session.current = Some(id.clone());

            // Requesting: queue before the network call. `next_eligible` only
            // hands out providers that are not queued yet.
            session.queue(&id);
            let adapter = self.registry.resolve(&id);
            let request = adapter.build_request(&session.intent, &session.extra);
            debug!("sending via {} to {}", id, request.url);

            let (outcome, may_switch) = match self.transport.send(&request).await {
                Ok(response) if response.is_accepted() => {
                    let body = self.succeeded(message, &session, &id, &response);
                    session.attempts.push(DispatchAttempt {
                        provider: id,
                        request,
                        outcome: AttemptOutcome::Success {
                            status: response.status,
                            body: body.clone(),
                        },
                    });
                    session.continue_switching = false;
                    return Ok(session.finish(Some(body)));
                }
                Ok(response) => {
                    let error = SmsError::Rejected {
                        provider: id.clone(),
                        status: response.status,
                    };
                    (self.failed(message, &session, &id, error, Some(response.body)), true)
                }
                Err(error) => (
                    self.failed(message, &session, &id, error, None),
                    self.policy.failover_on_transport_fault,
                ),
            };
            session.attempts.push(DispatchAttempt {
                provider: id,
                request,
                outcome,
            });

            if !session.failover_enabled || !may_switch {
                break;
            }

            // Switching
            match self.next_eligible(&mut session) {
                Some(candidate) => {
                    info!("failing over to {}", candidate);
                    session.driver = Some(candidate);
                }
                None => {
                    warn!(
                        last = ?session.current,
                        queued = ?session.queued,
                        "no provider left to fail over to"
                    );
                    session.continue_switching = false;
                }
            }
        }

        Ok(session.finish(None))
    }

    /// Walk the remaining providers in registry order, queueing ineligible
    /// ones as skipped, until an eligible one turns up or none remain.
    fn next_eligible(&self, session: &mut DispatchSession) -> Option<String> {
        let all = self.registry.list_all();
        while session.queued.len() < all.len() {
            let candidate = next_candidate(&all, &session.queued)?;
            if self.registry.is_eligible_for_failover(candidate) {
                return Some(candidate.to_string());
            }
            debug!("skipping {}: not eligible for failover", candidate);
            session.queue(candidate);
        }
        None
    }

    fn succeeded<M>(
        &self,
        message: &M,
        session: &DispatchSession,
        provider: &str,
        response: &TransportResponse,
    ) -> String
    where
        M: SmsMessage + ?Sized,
    {
        message.success(response, &response.body);
        self.notifier.notify_success(&SmsSent::new(
            provider,
            SmsSnapshot::from(&session.intent),
            response.status,
            response.body.clone(),
        ));
        response.body.clone()
    }

    fn failed<M>(
        &self,
        message: &M,
        session: &DispatchSession,
        provider: &str,
        error: SmsError,
        body: Option<String>,
    ) -> AttemptOutcome
    where
        M: SmsMessage + ?Sized,
    {
        warn!("provider {} failed: {}", provider, error);
        message.error(&error, body.as_deref());
        self.notifier.notify_failure(&SmsFailed::new(
            provider,
            SmsSnapshot::from(&session.intent),
            &error,
            body.clone(),
        ));
        AttemptOutcome::Failure {
            error: error.to_string(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sms_core::ProviderAdapter;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubAdapter {
        name: &'static str,
        eligible: bool,
    }

    impl ProviderAdapter for StubAdapter {
        fn provider(&self) -> &'static str {
            self.name
        }

        fn allows_failover(&self) -> bool {
            self.eligible
        }

        fn build_request(&self, intent: &MessageIntent, extra: &ExtraFields) -> OutboundRequest {
            OutboundRequest::post(format!("https://{}.test/send", self.name))
                .field("to", intent.first_recipient())
                .field("text", intent.body())
                .merge_extra(extra)
        }
    }

    fn host(url: &str) -> &str {
        url.trim_start_matches("https://")
            .split('.')
            .next()
            .unwrap_or_default()
    }

    /// Answers per provider host; unknown hosts get a 500.
    #[derive(Default)]
    struct ScriptedTransport {
        script: HashMap<&'static str, Result<u16, SmsError>>,
        calls: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        fn answer(mut self, provider: &'static str, status: u16) -> Self {
            self.script.insert(provider, Ok(status));
            self
        }

        fn fault(mut self, provider: &'static str) -> Self {
            self.script
                .insert(provider, Err(SmsError::Http("connection reset".into())));
            self
        }

        fn hosts(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| host(&r.url).to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, SmsError> {
            self.calls.lock().unwrap().push(request.clone());
            let host = host(&request.url);
            match self.script.get(host) {
                Some(Ok(status)) => Ok(TransportResponse::new(*status, format!("{host}:{status}"))),
                Some(Err(e)) => Err(e.clone()),
                None => Ok(TransportResponse::new(500, "unscripted")),
            }
        }
    }

    fn registry(providers: &[(&'static str, bool)], default: &str) -> Arc<ProviderRegistry> {
        let mut builder = ProviderRegistry::builder();
        for &(name, eligible) in providers {
            builder = builder.register_adapter(Arc::new(StubAdapter { name, eligible }));
        }
        Arc::new(builder.default_provider(default).build().unwrap())
    }

    fn engine(registry: Arc<ProviderRegistry>, transport: Arc<ScriptedTransport>) -> DispatchEngine {
        DispatchEngine::new(registry, transport)
    }

    fn intent() -> MessageIntent {
        MessageIntent::builder()
            .to(["60123456789"])
            .message("hello")
            .build()
            .unwrap()
    }

    struct Driven {
        intent: MessageIntent,
        driver: &'static str,
        errors: Mutex<Vec<String>>,
    }

    impl SmsMessage for Driven {
        fn handle(&self) -> Result<MessageIntent, SmsError> {
            Ok(self.intent.clone())
        }

        fn driver(&self) -> Option<&str> {
            Some(self.driver)
        }

        fn error(&self, error: &SmsError, _body: Option<&str>) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn driven(driver: &'static str) -> Driven {
        Driven {
            intent: intent(),
            driver,
            errors: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn next_candidate_follows_declared_order() {
        let all = ["a", "b", "c"];
        assert_eq!(next_candidate(&all, &[]), Some("a"));
        assert_eq!(next_candidate(&all, &["a".into(), "c".into()]), Some("b"));
        assert_eq!(
            next_candidate(&all, &["c".into(), "b".into(), "a".into()]),
            None
        );
    }

    #[tokio::test]
    async fn success_stops_even_with_failover() {
        let transport = Arc::new(ScriptedTransport::default().answer("a", 200));
        let engine = engine(registry(&[("a", true), ("b", true)], "a"), transport.clone());

        let report = engine.dispatch(&intent(), true).await.unwrap();
        assert_eq!(report.body.as_deref(), Some("a:200"));
        assert_eq!(report.queued, vec!["a"]);
        assert_eq!(transport.hosts(), vec!["a"]);
    }

    #[tokio::test]
    async fn failover_disabled_attempts_once() {
        let transport = Arc::new(ScriptedTransport::default().answer("a", 400).answer("b", 200));
        let engine = engine(registry(&[("a", true), ("b", true)], "a"), transport.clone());

        let body = engine.send(&intent(), false).await.unwrap();
        assert_eq!(body, None);
        assert_eq!(transport.hosts(), vec!["a"]);
    }

    #[tokio::test]
    async fn fails_over_in_registry_order_from_explicit_driver() {
        let transport = Arc::new(ScriptedTransport::default().answer("c", 201));
        let engine = engine(
            registry(&[("a", true), ("b", true), ("c", true)], "a"),
            transport.clone(),
        );

        let message = driven("b");
        let report = engine.dispatch(&message, true).await.unwrap();
        assert_eq!(report.queued, vec!["b", "a", "c"]);
        assert_eq!(report.sent_to(), vec!["b", "a", "c"]);
        assert_eq!(report.body.as_deref(), Some("c:201"));
        assert_eq!(message.errors.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ineligible_candidates_are_skipped_not_sent() {
        let transport = Arc::new(ScriptedTransport::default().answer("c", 200));
        let engine = engine(
            registry(&[("a", true), ("b", false), ("c", true)], "a"),
            transport.clone(),
        );

        let report = engine.dispatch(&intent(), true).await.unwrap();
        assert_eq!(report.queued, vec!["a", "b", "c"]);
        assert_eq!(report.skipped(), vec!["b"]);
        assert_eq!(transport.hosts(), vec!["a", "c"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn exhaustion_returns_none() {
        let transport = Arc::new(ScriptedTransport::default());
        let engine = engine(
            registry(&[("a", true), ("b", true), ("c", true)], "b"),
            transport.clone(),
        );

        let report = engine.dispatch(&intent(), true).await.unwrap();
        assert_eq!(report.body, None);
        assert_eq!(report.queued, vec!["b", "a", "c"]);
        assert_eq!(report.attempts.len(), 3);
    }

    #[tokio::test]
    async fn transport_fault_policy() {
        let providers = [("a", true), ("b", true)];

        let transport = Arc::new(ScriptedTransport::default().fault("a").answer("b", 200));
        let report = engine(registry(&providers, "a"), transport)
            .dispatch(&intent(), true)
            .await
            .unwrap();
        assert_eq!(report.sent_to(), vec!["a", "b"]);
        assert!(matches!(
            &report.attempts[0].outcome,
            AttemptOutcome::Failure { body: None, .. }
        ));

        let transport = Arc::new(ScriptedTransport::default().fault("a").answer("b", 200));
        let report = engine(registry(&providers, "a"), transport)
            .with_policy(FailoverPolicy {
                failover_on_transport_fault: false,
            })
            .dispatch(&intent(), true)
            .await
            .unwrap();
        assert_eq!(report.sent_to(), vec!["a"]);
        assert_eq!(report.body, None);
    }

    #[tokio::test]
    async fn unknown_driver_uses_default() {
        let transport = Arc::new(ScriptedTransport::default().answer("b", 200));
        let engine = engine(registry(&[("a", true), ("b", true)], "b"), transport.clone());

        let report = engine.dispatch(&driven("nope"), false).await.unwrap();
        assert_eq!(report.queued, vec!["b"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn invalid_intent_is_the_only_error() {
        struct Broken;
        impl SmsMessage for Broken {
            fn handle(&self) -> Result<MessageIntent, SmsError> {
                MessageIntent::builder().message("no recipient").build()
            }
        }

        let transport = Arc::new(ScriptedTransport::default());
        let engine = engine(registry(&[("a", true)], "a"), transport.clone());
        let err = engine.send(&Broken, true).await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));
        assert!(transport.hosts().is_empty());
    }

    #[tokio::test]
    async fn signature_applied_once_across_failover() {
        let transport = Arc::new(ScriptedTransport::default().answer("c", 200));
        let engine = engine(
            registry(&[("a", true), ("b", true), ("c", true)], "a"),
            transport.clone(),
        );
        let intent = MessageIntent::builder()
            .to(["1"])
            .message("hello")
            .signature("[ACME]")
            .build()
            .unwrap();

        engine.dispatch(&intent, true).await.unwrap();
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|r| r.form_value("text") == Some("[ACME] hello")));
    }

    #[test]
    fn policy_from_config() {
        let mut config = DispatchConfig::default();
        assert!(FailoverPolicy::from(&config).failover_on_transport_fault);
        config.failover_on_transport_fault = false;
        assert!(!FailoverPolicy::from(&config).failover_on_transport_fault);
    }
}
