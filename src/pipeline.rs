//! The interception pipeline.
//!
//! Orchestrates one request end to end: bypass check, rule match,
//! network simulation, response synthesis. Owns the rule table and
//! global config as a snapshot that is replaced wholesale on refresh,
//! so in-flight requests always read a consistent table.

use crate::config::{GlobalConfig, MockWireConfig, Rule};
use crate::error::TransportFailure;
use crate::matcher::RuleMatcher;
use crate::rng::{Entropy, ThreadEntropy};
use crate::simulator::{self, Outcome};
use crate::synthesizer::{self, SynthesizedResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A normalized request handed to the engine by the transport.
#[derive(Debug, Clone)]
pub struct InterceptRequest {
    pub path: String,
    pub method: String,
    pub content_type: Option<String>,
    pub origin: Option<String>,
}

impl InterceptRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            content_type: None,
            origin: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// What the engine decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum InterceptOutcome {
    /// The engine declines involvement; let the real call proceed
    PassThrough,
    /// Synthesized reply to emit as the call's result
    Mocked(SynthesizedResponse),
    /// Simulated transport-level failure, distinguishable from a
    /// response body
    Failed(TransportFailure),
    /// The caller cancelled before or during the simulated delay
    Aborted,
}

/// The injection point a concrete transport calls per diverted request.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        request: &InterceptRequest,
        cancel: &CancellationToken,
    ) -> InterceptOutcome;
}

/// Consistent view of the rule table and global config.
struct Snapshot {
    rules: Vec<Rule>,
    global: GlobalConfig,
}

/// The interception-and-synthesis engine.
pub struct InterceptionPipeline {
    snapshot: RwLock<Arc<Snapshot>>,
    matcher: RuleMatcher,
    entropy: Box<dyn Entropy>,
    installed: AtomicBool,
    /// Total requests seen.
    requests_total: AtomicU64,
    /// Requests resolved by a matched rule (mocked or failed).
    requests_matched: AtomicU64,
    /// Requests exempted by a bypass predicate.
    requests_bypassed: AtomicU64,
    /// Requests with no matching rule.
    requests_unmatched: AtomicU64,
    /// Requests that ended in a simulated transport failure.
    requests_failed: AtomicU64,
}

impl InterceptionPipeline {
    /// Create a pipeline from a configuration, using ambient entropy
    /// for unseeded draws.
    pub fn new(config: MockWireConfig) -> Self {
        Self::with_entropy(config, Box::new(ThreadEntropy))
    }

    /// Create a pipeline with an injected entropy strategy.
    pub fn with_entropy(config: MockWireConfig, entropy: Box<dyn Entropy>) -> Self {
        info!(
            rules = config.rules.len(),
            profiles = config.global.profiles.len(),
            "interception pipeline initialized"
        );
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot {
                rules: config.rules,
                global: config.global,
            })),
            matcher: RuleMatcher::new(),
            entropy,
            installed: AtomicBool::new(false),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_bypassed: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
        }
    }

    /// Attach the pipeline to its transport. Idempotent: a second call
    /// while installed is a no-op and returns `false`.
    pub fn install(&self) -> bool {
        self.installed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Detach the pipeline. Idempotent like `install`.
    pub fn uninstall(&self) -> bool {
        self.installed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Replace the rule table and global config wholesale.
    ///
    /// Requests already past matching keep their snapshot; the update
    /// is visible only to requests that have not yet matched.
    pub async fn refresh(&self, rules: Vec<Rule>, global: GlobalConfig) {
        let count = rules.len();
        *self.snapshot.write().await = Arc::new(Snapshot { rules, global });
        info!(rules = count, "rule table refreshed");
    }

    /// Number of rules in the current snapshot.
    pub async fn rule_count(&self) -> usize {
        self.snapshot.read().await.rules.len()
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    pub fn total_bypassed(&self) -> u64 {
        self.requests_bypassed.load(Ordering::Relaxed)
    }

    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    /// Whether any bypass predicate exempts this request.
    fn is_bypassed(&self, request: &InterceptRequest, global: &GlobalConfig) -> bool {
        let bypass = &global.bypass;

        if bypass
            .methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.method))
        {
            return true;
        }

        if let Some(content_type) = &request.content_type {
            if bypass
                .content_types
                .iter()
                .any(|prefix| content_type.starts_with(prefix.as_str()))
            {
                return true;
            }
        }

        if let Some(origin) = &request.origin {
            if bypass.origins.iter().any(|o| o == origin) {
                return true;
            }
        }

        bypass
            .url_patterns
            .iter()
            .any(|pattern| self.matcher.path_matches(pattern, &request.path))
    }

    /// Remove the first matching configured prefix from the path.
    fn strip_prefix<'a>(&self, path: &'a str, global: &GlobalConfig) -> &'a str {
        for prefix in &global.strip_prefixes {
            if let Some(stripped) = path.strip_prefix(prefix.as_str()) {
                if stripped.starts_with('/') {
                    return stripped;
                }
            }
        }
        path
    }
}

#[async_trait]
impl Interceptor for InterceptionPipeline {
    async fn intercept(
        &self,
        request: &InterceptRequest,
        cancel: &CancellationToken,
    ) -> InterceptOutcome {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if !self.is_installed() {
            debug!(path = %request.path, "pipeline not installed, passing through");
            return InterceptOutcome::PassThrough;
        }

        let snapshot = Arc::clone(&*self.snapshot.read().await);

        if self.is_bypassed(request, &snapshot.global) {
            self.requests_bypassed.fetch_add(1, Ordering::Relaxed);
            debug!(
                method = %request.method,
                path = %request.path,
                "request bypassed"
            );
            return InterceptOutcome::PassThrough;
        }

        let path = self.strip_prefix(&request.path, &snapshot.global);

        let Some(matched) = self
            .matcher
            .find_match(&snapshot.rules, path, &request.method)
        else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            if snapshot.global.log_unmatched {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    "no matching rule"
                );
            }
            return InterceptOutcome::PassThrough;
        };
        let rule = matched.rule;

        self.requests_matched.fetch_add(1, Ordering::Relaxed);
        if snapshot.global.log_matches {
            info!(
                rule_id = %rule.id,
                method = %request.method,
                path = %request.path,
                "request matched rule"
            );
        }

        // Cancellation observed before the wait starts: no timer ever
        // scheduled
        if cancel.is_cancelled() {
            debug!(rule_id = %rule.id, "request aborted before delay");
            return InterceptOutcome::Aborted;
        }

        // Entropy handles are not held across the await
        let plan = {
            let mut rng = self.entropy.rng();
            simulator::plan(rule, &snapshot.global, rng.as_mut())
        };

        if simulator::wait(plan.delay_ms, cancel).await.is_err() {
            debug!(rule_id = %rule.id, "request aborted during delay");
            return InterceptOutcome::Aborted;
        }

        let failure = match plan.outcome {
            Outcome::Proceed => {
                let response = synthesizer::synthesize(rule, self.entropy.as_ref());
                debug!(
                    rule_id = %rule.id,
                    status = response.status,
                    delay_ms = plan.delay_ms,
                    "response synthesized"
                );
                return InterceptOutcome::Mocked(response);
            }
            Outcome::Timeout => TransportFailure::Timeout,
            Outcome::Offline => TransportFailure::Offline,
            Outcome::RandomFail => TransportFailure::RandomFail,
        };

        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        debug!(rule_id = %rule.id, failure = %failure, "simulated transport failure");
        InterceptOutcome::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BypassConfig;
    use serde_json::json;

    fn test_config() -> MockWireConfig {
        let yaml = r#"
rules:
  - id: login-ok
    url_pattern: /api/user/login
    method: POST
    network:
      delay_ms: 0
    response:
      status: 200
      err_no: 0
      result:
        token: "t"

  - id: user-by-id
    url_pattern: /api/user/:id
    network:
      delay_ms: 0
    response:
      status: 200
      result:
        id: 1

  - id: broken
    url_pattern: /api/broken
    network:
      delay_ms: 0
      error_mode: offline
      fail_rate: 100
"#;
        MockWireConfig::from_yaml(yaml).unwrap()
    }

    fn installed_pipeline(config: MockWireConfig) -> InterceptionPipeline {
        let pipeline = InterceptionPipeline::new(config);
        pipeline.install();
        pipeline
    }

    #[tokio::test]
    async fn test_end_to_end_mocked_response() {
        let pipeline = installed_pipeline(test_config());
        let request = InterceptRequest::new("POST", "/api/user/login");
        let cancel = CancellationToken::new();

        match pipeline.intercept(&request, &cancel).await {
            InterceptOutcome::Mocked(response) => {
                assert_eq!(response.status, 200);
                assert_eq!(response.body["err_no"], 0);
                assert_eq!(response.body["result"], json!({"token": "t"}));
            }
            other => panic!("expected mocked response, got {:?}", other),
        }
        assert_eq!(pipeline.total_matched(), 1);
    }

    #[tokio::test]
    async fn test_error_mode_yields_failure_not_body() {
        let pipeline = installed_pipeline(test_config());
        let request = InterceptRequest::new("GET", "/api/broken");
        let cancel = CancellationToken::new();

        let outcome = pipeline.intercept(&request, &cancel).await;
        assert_eq!(outcome, InterceptOutcome::Failed(TransportFailure::Offline));
        assert_eq!(pipeline.total_failed(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_passes_through() {
        let pipeline = installed_pipeline(test_config());
        let request = InterceptRequest::new("GET", "/api/nothing/here");
        let cancel = CancellationToken::new();

        let outcome = pipeline.intercept(&request, &cancel).await;
        assert_eq!(outcome, InterceptOutcome::PassThrough);
        assert_eq!(pipeline.total_unmatched(), 1);
    }

    #[tokio::test]
    async fn test_bypass_method() {
        let mut config = test_config();
        config.global.bypass = BypassConfig {
            methods: vec!["post".to_string()],
            ..Default::default()
        };
        let pipeline = installed_pipeline(config);
        let request = InterceptRequest::new("POST", "/api/user/login");
        let cancel = CancellationToken::new();

        let outcome = pipeline.intercept(&request, &cancel).await;
        assert_eq!(outcome, InterceptOutcome::PassThrough);
        assert_eq!(pipeline.total_bypassed(), 1);
        assert_eq!(pipeline.total_matched(), 0);
    }

    #[tokio::test]
    async fn test_bypass_content_type_prefix() {
        let mut config = test_config();
        config.global.bypass.content_types = vec!["multipart/".to_string()];
        let pipeline = installed_pipeline(config);
        let cancel = CancellationToken::new();

        let upload = InterceptRequest::new("POST", "/api/user/login")
            .with_content_type("multipart/form-data; boundary=x");
        assert_eq!(
            pipeline.intercept(&upload, &cancel).await,
            InterceptOutcome::PassThrough
        );

        let json_request =
            InterceptRequest::new("POST", "/api/user/login").with_content_type("application/json");
        assert!(matches!(
            pipeline.intercept(&json_request, &cancel).await,
            InterceptOutcome::Mocked(_)
        ));
    }

    #[tokio::test]
    async fn test_bypass_origin_and_url_pattern() {
        let mut config = test_config();
        config.global.bypass.origins = vec!["https://admin.example.com".to_string()];
        config.global.bypass.url_patterns = vec!["/api/user/:id".to_string()];
        let pipeline = installed_pipeline(config);
        let cancel = CancellationToken::new();

        let admin = InterceptRequest::new("POST", "/api/user/login")
            .with_origin("https://admin.example.com");
        assert_eq!(
            pipeline.intercept(&admin, &cancel).await,
            InterceptOutcome::PassThrough
        );

        let by_id = InterceptRequest::new("GET", "/api/user/9");
        assert_eq!(
            pipeline.intercept(&by_id, &cancel).await,
            InterceptOutcome::PassThrough
        );
    }

    #[tokio::test]
    async fn test_prefix_stripping_before_match() {
        let mut config = test_config();
        config.global.strip_prefixes = vec!["/dev-proxy".to_string()];
        let pipeline = installed_pipeline(config);
        let cancel = CancellationToken::new();

        let request = InterceptRequest::new("POST", "/dev-proxy/api/user/login");
        assert!(matches!(
            pipeline.intercept(&request, &cancel).await,
            InterceptOutcome::Mocked(_)
        ));
    }

    #[tokio::test]
    async fn test_not_installed_passes_through() {
        let pipeline = InterceptionPipeline::new(test_config());
        let request = InterceptRequest::new("POST", "/api/user/login");
        let cancel = CancellationToken::new();

        assert_eq!(
            pipeline.intercept(&request, &cancel).await,
            InterceptOutcome::PassThrough
        );
    }

    #[test]
    fn test_install_is_idempotent() {
        let pipeline = InterceptionPipeline::new(test_config());

        assert!(pipeline.install());
        assert!(!pipeline.install());
        assert!(pipeline.is_installed());

        assert!(pipeline.uninstall());
        assert!(!pipeline.uninstall());
        assert!(!pipeline.is_installed());
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_aborts_before_wait() {
        let pipeline = installed_pipeline(test_config());
        let request = InterceptRequest::new("POST", "/api/user/login");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = pipeline.intercept(&request, &cancel).await;
        assert_eq!(outcome, InterceptOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_cancellation_during_delay_aborts() {
        tokio::time::pause();
        let mut config = test_config();
        config.rules[0].network.delay_ms = Some(60_000);
        let pipeline = Arc::new(installed_pipeline(config));
        let cancel = CancellationToken::new();

        let task = {
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let request = InterceptRequest::new("POST", "/api/user/login");
                pipeline.intercept(&request, &cancel).await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), InterceptOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_refresh_swaps_table_wholesale() {
        let pipeline = installed_pipeline(test_config());
        let cancel = CancellationToken::new();
        let request = InterceptRequest::new("POST", "/api/user/login");

        assert!(matches!(
            pipeline.intercept(&request, &cancel).await,
            InterceptOutcome::Mocked(_)
        ));

        let replacement = MockWireConfig::from_yaml(
            r#"
rules:
  - id: only-broken
    url_pattern: /api/broken
    network:
      delay_ms: 0
      error_mode: timeout
"#,
        )
        .unwrap();
        pipeline
            .refresh(replacement.rules, replacement.global)
            .await;
        assert_eq!(pipeline.rule_count().await, 1);

        // Old rules are gone entirely
        assert_eq!(
            pipeline.intercept(&request, &cancel).await,
            InterceptOutcome::PassThrough
        );
        let broken = InterceptRequest::new("GET", "/api/broken");
        assert_eq!(
            pipeline.intercept(&broken, &cancel).await,
            InterceptOutcome::Failed(TransportFailure::Timeout)
        );
    }

    #[tokio::test]
    async fn test_disabled_error_mode_none_with_zero_fail_rate_proceeds() {
        let yaml = r#"
rules:
  - id: plain
    url_pattern: /api/plain
    network:
      delay_ms: 0
      error_mode: none
      fail_rate: 0
"#;
        let pipeline = installed_pipeline(MockWireConfig::from_yaml(yaml).unwrap());
        let cancel = CancellationToken::new();
        let request = InterceptRequest::new("GET", "/api/plain");
        assert!(matches!(
            pipeline.intercept(&request, &cancel).await,
            InterceptOutcome::Mocked(_)
        ));
    }

    #[tokio::test]
    async fn test_counters_accumulate() {
        let pipeline = installed_pipeline(test_config());
        let cancel = CancellationToken::new();

        pipeline
            .intercept(&InterceptRequest::new("POST", "/api/user/login"), &cancel)
            .await;
        pipeline
            .intercept(&InterceptRequest::new("GET", "/api/broken"), &cancel)
            .await;
        pipeline
            .intercept(&InterceptRequest::new("GET", "/nope"), &cancel)
            .await;

        assert_eq!(pipeline.total_requests(), 3);
        assert_eq!(pipeline.total_matched(), 2);
        assert_eq!(pipeline.total_unmatched(), 1);
        assert_eq!(pipeline.total_failed(), 1);
    }
}
