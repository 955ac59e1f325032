//! Cloud metadata endpoint shield.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::net::TcpStream;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::enforcement::Enforcer;
use crate::hook::Hook;
use crate::platform::{Callback, ConnectTarget, LookupResult, NetApi, OutboundRequest};
use crate::policy::PolicyDecision;

use super::{Shield, reject_async, reject_callback, reject_sync};

const METADATA_ADDRESSES: &[&str] = &[
    // AWS, GCP and Azure
    "169.254.169.254",
    // ECS task metadata
    "169.254.170.2",
    // AWS over IPv6
    "fd00:ec2::254",
    // Alibaba Cloud
    "100.100.100.200",
];

const METADATA_HOSTNAMES: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "metadata",
    "instance-data",
    "instance-data.ec2.internal",
];

const BLOCKED_PREFIXES: &[&str] = &["169.254.", "::ffff:169.254.", "fe80:"];

/// A rule to add to a [`NetworkRules`] set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkRule {
    /// Block this exact host or address.
    Host(String),
    /// Block every host or address starting with this prefix.
    Prefix(String),
}

/// Hosts and addresses the network shield refuses.
///
/// Comparison is case-insensitive and ignores the brackets around IPv6
/// literals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkRules {
    hosts: BTreeSet<String>,
    prefixes: Vec<String>,
}

impl Default for NetworkRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        for host in METADATA_ADDRESSES.iter().chain(METADATA_HOSTNAMES) {
            rules.add(NetworkRule::Host(host.to_string()));
        }
        for prefix in BLOCKED_PREFIXES {
            rules.add(NetworkRule::Prefix(prefix.to_string()));
        }
        rules
    }
}

impl NetworkRules {
    /// A rule set that blocks nothing.
    pub fn empty() -> Self {
        Self {
            hosts: BTreeSet::new(),
            prefixes: Vec::new(),
        }
    }

    /// Append a rule.
    pub fn add(&mut self, rule: NetworkRule) {
        match rule {
            NetworkRule::Host(host) => {
                self.hosts.insert(normalize(&host));
            }
            NetworkRule::Prefix(prefix) => {
                let prefix = normalize(&prefix);
                if !self.prefixes.contains(&prefix) {
                    self.prefixes.push(prefix);
                }
            }
        }
    }

    /// Whether `candidate` is refused.
    pub fn is_blocked_address(&self, candidate: &str) -> bool {
        let host = normalize(candidate);
        self.hosts.contains(&host) || self.prefixes.iter().any(|p| host.starts_with(p.as_str()))
    }

    fn decide(&self, host: &str) -> PolicyDecision {
        if self.is_blocked_address(host) {
            PolicyDecision::block(format!(
                "Access to '{}' is blocked by the network shield",
                host
            ))
        } else {
            PolicyDecision::allow("Host not covered by the network shield")
        }
    }
}

fn normalize(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.to_ascii_lowercase()
}

/// Hooks the connect, lookup and request entry points of a [`NetApi`].
pub struct NetworkShield {
    rules: Rc<RefCell<NetworkRules>>,
    connect: Hook<ConnectTarget, io::Result<TcpStream>>,
    lookup: Hook<String, LocalBoxFuture<'static, LookupResult>>,
    lookup_cb: Hook<(String, Callback<LookupResult>), ()>,
    request: Hook<OutboundRequest, LocalBoxFuture<'static, io::Result<tokio::net::TcpStream>>>,
}

impl fmt::Debug for NetworkShield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkShield")
            .field("active", &self.is_active())
            .field("rules", &self.rules.borrow())
            .finish_non_exhaustive()
    }
}

impl NetworkShield {
    /// Create an inactive shield over `net` with the default rules.
    pub fn new(net: &NetApi, enforcer: Rc<Enforcer>) -> Self {
        Self::with_rules(net, enforcer, NetworkRules::default())
    }

    /// Create an inactive shield with a custom rule set.
    pub fn with_rules(net: &NetApi, enforcer: Rc<Enforcer>, rules: NetworkRules) -> Self {
        let rules = Rc::new(RefCell::new(rules));
        Self {
            connect: Hook::new(
                Rc::clone(&net.connect),
                {
                    let rules = Rc::clone(&rules);
                    move |target: &ConnectTarget| rules.borrow().decide(target.host())
                },
                reject_sync,
                Rc::clone(&enforcer),
            ),
            lookup: Hook::new(
                Rc::clone(&net.lookup),
                {
                    let rules = Rc::clone(&rules);
                    move |host: &String| rules.borrow().decide(host)
                },
                reject_async,
                Rc::clone(&enforcer),
            ),
            lookup_cb: Hook::new(
                Rc::clone(&net.lookup_cb),
                {
                    let rules = Rc::clone(&rules);
                    move |(host, _): &(String, Callback<LookupResult>)| rules.borrow().decide(host)
                },
                reject_callback,
                Rc::clone(&enforcer),
            ),
            request: Hook::new(
                Rc::clone(&net.request),
                {
                    let rules = Rc::clone(&rules);
                    // An unparsable URL is left for the request itself to reject.
                    move |request: &OutboundRequest| match request.host() {
                        Some(host) => rules.borrow().decide(&host),
                        None => PolicyDecision::allow("No host in request URL"),
                    }
                },
                reject_async,
                enforcer,
            ),
            rules,
        }
    }

    /// Append a rule; takes effect on the next call.
    pub fn add_blocked_rule(&self, rule: NetworkRule) {
        self.rules.borrow_mut().add(rule);
    }

    /// Whether `candidate` would be refused.
    pub fn is_blocked_address(&self, candidate: &str) -> bool {
        self.rules.borrow().is_blocked_address(candidate)
    }

    /// Snapshot of the current rules.
    pub fn rules(&self) -> NetworkRules {
        self.rules.borrow().clone()
    }

    pub(crate) fn reset_rules(&self) {
        *self.rules.borrow_mut() = NetworkRules::default();
    }
}

impl Shield for NetworkShield {
    fn activate(&self) {
        self.connect.install(None);
        self.lookup.install(None);
        self.lookup_cb.install(None);
        self.request.install(None);
        tracing::debug!("network shield activated");
    }

    fn deactivate(&self) {
        self.connect.uninstall();
        self.lookup.uninstall();
        self.lookup_cb.uninstall();
        self.request.uninstall();
        tracing::debug!("network shield deactivated");
    }

    fn is_active(&self) -> bool {
        self.connect.is_installed()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SecurityViolation;
    use crate::config::Mode;
    use crate::logging::{LogLevel, MemorySink};
    use crate::platform::ConnectOptions;

    #[test]
    fn test_default_rules() {
        let rules = NetworkRules::default();
        assert!(rules.is_blocked_address("169.254.169.254"));
        assert!(rules.is_blocked_address("169.254.1.1"));
        assert!(rules.is_blocked_address("::ffff:169.254.169.254"));
        assert!(rules.is_blocked_address("[fe80::1]"));
        assert!(rules.is_blocked_address("[fd00:ec2::254]"));
        assert!(rules.is_blocked_address("Metadata.Google.Internal"));
        assert!(rules.is_blocked_address("100.100.100.200"));

        assert!(!rules.is_blocked_address("example.com"));
        assert!(!rules.is_blocked_address("127.0.0.1"));
        assert!(!rules.is_blocked_address("metadata.example.com"));
        assert!(!rules.is_blocked_address("10.169.254.1"));
    }

    #[test]
    fn test_added_rules() {
        let mut rules = NetworkRules::empty();
        rules.add(NetworkRule::Host("Internal.Corp".to_string()));
        rules.add(NetworkRule::Prefix("10.0.".to_string()));
        assert!(rules.is_blocked_address("internal.corp"));
        assert!(rules.is_blocked_address("10.0.3.4"));
        assert!(!rules.is_blocked_address("10.1.0.1"));
    }

    fn shield() -> (NetApi, NetworkShield) {
        let net = NetApi::native();
        let sink = Rc::new(MemorySink::new());
        let enforcer = Rc::new(Enforcer::new(Mode::Enforce, LogLevel::Info, sink));
        let shield = NetworkShield::new(&net, enforcer);
        (net, shield)
    }

    #[test]
    fn test_connect_blocked_in_both_forms() {
        let (net, shield) = shield();
        shield.activate();

        let err = net
            .connect
            .call(ConnectTarget::HostPort("169.254.169.254".into(), 80))
            .unwrap_err();
        let violation = SecurityViolation::from_io_error(&err).unwrap();
        assert!(violation.reason().contains("169.254.169.254"));

        let err = net
            .connect
            .call(ConnectTarget::Options(ConnectOptions {
                host: Some("metadata.google.internal".into()),
                port: 80,
            }))
            .unwrap_err();
        assert!(SecurityViolation::from_io_error(&err).is_some());
    }

    #[test]
    fn test_connect_allowed_host_reaches_native() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let (net, shield) = shield();
        shield.activate();
        assert!(net
            .connect
            .call(ConnectTarget::HostPort("127.0.0.1".into(), port))
            .is_ok());
    }

    #[tokio::test]
    async fn test_lookup_fails_asynchronously() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (net, shield) = shield();
                shield.activate();

                let pending = net.lookup.call("metadata.google.internal".to_string());
                let err = pending.await.unwrap_err();
                assert!(SecurityViolation::from_io_error(&err).is_some());

                let (tx, rx) = tokio::sync::oneshot::channel();
                let delivered = Rc::new(std::cell::Cell::new(false));
                let flag = Rc::clone(&delivered);
                net.lookup_cb.call((
                    "instance-data".to_string(),
                    Box::new(move |result: LookupResult| {
                        flag.set(true);
                        let _ = tx.send(result);
                    }),
                ));
                assert!(!delivered.get());
                let err = rx.await.unwrap().unwrap_err();
                assert!(SecurityViolation::from_io_error(&err).is_some());
            })
            .await;
    }

    #[tokio::test]
    async fn test_request_host_checked_before_connect() {
        let (net, shield) = shield();
        shield.activate();

        let err = net
            .request
            .call(OutboundRequest::get("http://169.254.169.254/latest/meta-data/"))
            .await
            .unwrap_err();
        assert!(SecurityViolation::from_io_error(&err).is_some());

        let err = net
            .request
            .call(OutboundRequest::get("http://[fd00:ec2::254]/latest/"))
            .await
            .unwrap_err();
        assert!(SecurityViolation::from_io_error(&err).is_some());
    }

    #[test]
    fn test_runtime_rule_applies_to_active_shield() {
        let (net, shield) = shield();
        shield.activate();
        shield.add_blocked_rule(NetworkRule::Host("localhost".to_string()));

        let err = net
            .connect
            .call(ConnectTarget::Options(ConnectOptions {
                host: None,
                port: 1,
            }))
            .unwrap_err();
        assert!(SecurityViolation::from_io_error(&err).is_some());
    }

    #[test]
    fn test_deactivate_restores_handlers() {
        let (net, shield) = shield();
        let native = net.connect.handler();
        shield.activate();
        assert!(!net.connect.is_current(&native));
        shield.deactivate();
        assert!(net.connect.is_current(&native));
        assert!(!shield.is_active());
    }
}
