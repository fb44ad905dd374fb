//! Request filtering ahead of blob and manifest resolution
//!
//! A [`FilterChain`] holds an ordered list of [`AccessPredicate`]s. They are
//! evaluated in order and the first denial ends evaluation; later predicates
//! never see the request. [`filter_requests`] adapts the chain to axum
//! middleware.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::http::uri::Authority;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::MirrorConfig;
use crate::error::MirrorError;

/// Case-insensitive `User-Agent` fragments of registry clients admitted when
/// the client allow-list is enabled.
pub const KNOWN_CLIENTS: &[&str] = &[
    "ollama",
    "docker",
    "containerd",
    "podman",
    "skopeo",
    "oras",
    "crane",
];

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The request was addressed to a different host name.
    HostMismatch,
    /// The client is not a known registry client.
    ClientDisallowed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::HostMismatch => f.write_str("host mismatch"),
            DenyReason::ClientDisallowed => f.write_str("client not allowed"),
        }
    }
}

/// Outcome of running a request through the filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Continue to resolution.
    Allow,
    /// Reject with 403.
    Deny(DenyReason),
}

impl AccessDecision {
    /// True for [`AccessDecision::Allow`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// The denial reason, if any.
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::Deny(reason) => Some(*reason),
        }
    }
}

/// A single check applied to the head of a request.
pub trait AccessPredicate: fmt::Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decide whether `request` may proceed.
    fn evaluate(&self, request: &Parts) -> AccessDecision;
}

/// Require the request's destination host to equal a configured name.
#[derive(Debug, Clone)]
pub struct HostPredicate {
    host: String,
}

impl HostPredicate {
    /// Match against `host`, ignoring case.
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl AccessPredicate for HostPredicate {
    fn name(&self) -> &'static str {
        "host"
    }

    fn evaluate(&self, request: &Parts) -> AccessDecision {
        match request_host(request) {
            Some(host) if host.eq_ignore_ascii_case(unbracket(&self.host)) => {
                AccessDecision::Allow
            }
            _ => AccessDecision::Deny(DenyReason::HostMismatch),
        }
    }
}

/// Host name the request was sent to, without a port or IPv6 brackets.
///
/// HTTP/1.1 carries it in `Host`; HTTP/2 in the `:authority` pseudo-header,
/// which ends up in the request URI.
fn request_host(request: &Parts) -> Option<String> {
    let authority = request
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Authority>().ok())
        .or_else(|| request.uri.authority().cloned())?;
    Some(unbracket(authority.host()).to_string())
}

/// `[::1]` -> `::1`; other hosts are returned unchanged.
fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host)
}

/// Require a `User-Agent` naming one of a fixed set of clients.
#[derive(Debug, Clone)]
pub struct ClientPredicate {
    allowed: &'static [&'static str],
}

impl ClientPredicate {
    /// Admit only [`KNOWN_CLIENTS`].
    pub fn known_clients() -> Self {
        Self {
            allowed: KNOWN_CLIENTS,
        }
    }
}

impl AccessPredicate for ClientPredicate {
    fn name(&self) -> &'static str {
        "client"
    }

    fn evaluate(&self, request: &Parts) -> AccessDecision {
        let agent = request
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase);

        match agent {
            Some(agent) if self.allowed.iter().any(|client| agent.contains(client)) => {
                AccessDecision::Allow
            }
            _ => AccessDecision::Deny(DenyReason::ClientDisallowed),
        }
    }
}

/// Ordered, short-circuiting list of predicates.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    predicates: Vec<Arc<dyn AccessPredicate>>,
}

impl FilterChain {
    /// An empty chain, which allows everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate; it runs after those already added.
    pub fn with<P: AccessPredicate + 'static>(mut self, predicate: P) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Build the chain described by `config`: host first, then client.
    pub fn from_config(config: &MirrorConfig) -> Self {
        let mut chain = Self::new();
        if let Some(host) = &config.required_host {
            chain = chain.with(HostPredicate::new(host.clone()));
        }
        if config.client_allowlist {
            chain = chain.with(ClientPredicate::known_clients());
        }
        chain
    }

    /// Number of predicates in the chain.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// True when nothing is filtered.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Run each predicate in order and stop at the first denial.
    pub fn evaluate(&self, request: &Parts) -> AccessDecision {
        for predicate in &self.predicates {
            let decision = predicate.evaluate(request);
            if !decision.is_allowed() {
                tracing::debug!(predicate = predicate.name(), ?decision, "Access denied");
                return decision;
            }
        }
        AccessDecision::Allow
    }
}

/// Axum middleware running `chain` before the wrapped routes.
pub async fn filter_requests(
    State(chain): State<Arc<FilterChain>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    match chain.evaluate(&parts) {
        AccessDecision::Allow => next.run(Request::from_parts(parts, body)).await,
        AccessDecision::Deny(reason) => MirrorError::AccessDenied(reason).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use axum::http;

    fn parts(host: Option<&str>, agent: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().uri("/v2/library/llama3/manifests/latest");
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        if let Some(agent) = agent {
            builder = builder.header(header::USER_AGENT, agent);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[derive(Debug, Default)]
    struct Spy {
        calls: AtomicUsize,
    }

    impl AccessPredicate for Arc<Spy> {
        fn name(&self) -> &'static str {
            "spy"
        }

        fn evaluate(&self, _request: &Parts) -> AccessDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AccessDecision::Deny(DenyReason::ClientDisallowed)
        }
    }

    #[test]
    fn host_matches_case_insensitively() {
        let host = HostPredicate::new("Mirror.Local");
        assert!(host.evaluate(&parts(Some("mirror.local"), None)).is_allowed());
        assert!(host.evaluate(&parts(Some("MIRROR.LOCAL:8080"), None)).is_allowed());
    }

    #[test]
    fn host_mismatch() {
        let host = HostPredicate::new("mirror.local");
        assert_eq!(
            host.evaluate(&parts(Some("evil.example"), None)),
            AccessDecision::Deny(DenyReason::HostMismatch)
        );
        assert_eq!(
            host.evaluate(&parts(Some("mirror.local.evil.example"), None)),
            AccessDecision::Deny(DenyReason::HostMismatch)
        );
        assert_eq!(
            host.evaluate(&parts(None, None)),
            AccessDecision::Deny(DenyReason::HostMismatch)
        );
    }

    #[test]
    fn host_ipv6_literal() {
        let request = parts(Some("[::1]:8080"), None);
        assert!(HostPredicate::new("::1").evaluate(&request).is_allowed());
        assert!(HostPredicate::new("[::1]").evaluate(&request).is_allowed());
        assert_eq!(
            HostPredicate::new("::2").evaluate(&request),
            AccessDecision::Deny(DenyReason::HostMismatch)
        );
    }

    #[test]
    fn host_from_http2_authority() {
        let (parts, _) = http::Request::builder()
            .uri("https://mirror.local/v2/")
            .body(())
            .unwrap()
            .into_parts();
        assert!(HostPredicate::new("mirror.local").evaluate(&parts).is_allowed());
    }

    #[test]
    fn client_allow_list() {
        let client = ClientPredicate::known_clients();
        assert!(
            client
                .evaluate(&parts(None, Some("ollama/0.5.7 (amd64 linux) Go/go1.23.4")))
                .is_allowed()
        );
        assert!(
            client
                .evaluate(&parts(None, Some("Docker-Client/24.0.7 (linux)")))
                .is_allowed()
        );
        assert_eq!(
            client.evaluate(&parts(None, Some("curl/8.5.0"))),
            AccessDecision::Deny(DenyReason::ClientDisallowed)
        );
        assert_eq!(
            client.evaluate(&parts(None, None)),
            AccessDecision::Deny(DenyReason::ClientDisallowed)
        );
    }

    #[test]
    fn empty_chain_allows() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        assert!(chain.evaluate(&parts(None, None)).is_allowed());
    }

    #[test]
    fn chain_from_config() {
        let mut config = MirrorConfig::new("/models");
        assert!(FilterChain::from_config(&config).is_empty());

        config.required_host = Some("mirror.local".into());
        config.client_allowlist = true;
        let chain = FilterChain::from_config(&config);
        assert_eq!(chain.len(), 2);

        let decision = chain.evaluate(&parts(Some("other.host"), Some("curl/8.5.0")));
        assert_eq!(decision.reason(), Some(DenyReason::HostMismatch));

        let decision = chain.evaluate(&parts(Some("mirror.local"), Some("curl/8.5.0")));
        assert_eq!(decision.reason(), Some(DenyReason::ClientDisallowed));

        let decision = chain.evaluate(&parts(Some("mirror.local"), Some("ollama/0.5.7")));
        assert!(decision.is_allowed());
    }

    #[test]
    fn chain_short_circuits() {
        let spy = Arc::new(Spy::default());
        let chain = FilterChain::new()
            .with(HostPredicate::new("mirror.local"))
            .with(spy.clone());

        let decision = chain.evaluate(&parts(Some("other.host"), Some("curl/8.5.0")));
        assert_eq!(decision, AccessDecision::Deny(DenyReason::HostMismatch));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 0);

        let decision = chain.evaluate(&parts(Some("mirror.local"), Some("curl/8.5.0")));
        assert_eq!(decision, AccessDecision::Deny(DenyReason::ClientDisallowed));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }
}
