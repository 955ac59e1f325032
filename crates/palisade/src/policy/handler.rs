//! Policy handler trait and the rule-based engine.

use std::path::PathBuf;

use crate::config::{Mode, PackageRule, PolicyConfiguration, bare_builtin_names};
use crate::error::ConfigurationError;
use crate::logging::LogLevel;

use super::builtins::{BUILTIN_SCHEME, builtin_name};
use super::pattern::{find_rule, is_relative, root_package_name};

/// Context about where a specifier is being resolved from.
#[derive(Clone, Debug, Default)]
pub struct ResolveContext {
    /// File that requested the module, if known.
    pub parent: Option<PathBuf>,
}

impl ResolveContext {
    /// Context for a request made from `parent`.
    pub fn from_parent(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }
}

/// What to do with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Proceed.
    Allow,
    /// Refuse; how depends on the [`Mode`].
    Block,
    /// Proceed with a warning.
    Warn,
    /// No explicit rule; proceed, optionally running deeper inspection.
    Analyze,
}

/// The result of a policy check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyDecision {
    /// The action to take.
    pub action: Action,
    /// Why.
    pub reason: Option<String>,
    /// The rule that produced the decision, if any.
    pub matched_rule: Option<PackageRule>,
}

impl PolicyDecision {
    /// An allow decision.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self::new(Action::Allow, reason, None)
    }

    /// A block decision.
    pub fn block(reason: impl Into<String>) -> Self {
        Self::new(Action::Block, reason, None)
    }

    /// A warn decision.
    pub fn warn(reason: impl Into<String>) -> Self {
        Self::new(Action::Warn, reason, None)
    }

    /// An analyze decision.
    pub fn analyze(reason: impl Into<String>) -> Self {
        Self::new(Action::Analyze, reason, None)
    }

    fn new(action: Action, reason: impl Into<String>, matched_rule: Option<PackageRule>) -> Self {
        Self {
            action,
            reason: Some(reason.into()),
            matched_rule,
        }
    }

    fn with_rule(mut self, rule: &PackageRule) -> Self {
        self.matched_rule = Some(rule.clone());
        self
    }

    /// Returns true unless the decision is a block.
    pub fn is_allowed(&self) -> bool {
        self.action != Action::Block
    }

    /// Returns true for a block.
    pub fn is_blocked(&self) -> bool {
        self.action == Action::Block
    }

    /// The reason, or an empty string.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }
}

/// Trait for anything that can judge a module specifier.
///
/// Implementations must be deterministic and fast; they run on every
/// intercepted module load.
pub trait PolicyHandler {
    /// Decide what to do with `specifier`.
    fn evaluate(&self, specifier: &str, context: &ResolveContext) -> PolicyDecision;
}

impl<T: PolicyHandler + ?Sized> PolicyHandler for std::rc::Rc<T> {
    fn evaluate(&self, specifier: &str, context: &ResolveContext) -> PolicyDecision {
        (**self).evaluate(specifier, context)
    }
}

impl<T: PolicyHandler + ?Sized> PolicyHandler for std::sync::Arc<T> {
    fn evaluate(&self, specifier: &str, context: &ResolveContext) -> PolicyDecision {
        (**self).evaluate(specifier, context)
    }
}

/// A policy that allows everything.
#[derive(Clone, Debug, Default)]
pub struct AllowAllPolicy;

impl PolicyHandler for AllowAllPolicy {
    fn evaluate(&self, _specifier: &str, _context: &ResolveContext) -> PolicyDecision {
        PolicyDecision::allow("all modules allowed")
    }
}

/// A policy that blocks everything.
#[derive(Clone, Debug, Default)]
pub struct DenyAllPolicy;

impl PolicyHandler for DenyAllPolicy {
    fn evaluate(&self, specifier: &str, _context: &ResolveContext) -> PolicyDecision {
        PolicyDecision::block(format!("Module '{}' denied by policy", specifier))
    }
}

/// Rule-based policy engine.
///
/// Evaluation order, first match wins:
///
/// 1. builtin modules (restricted set, global switch, then explicit rules)
/// 2. relative specifiers
/// 3. block rules
/// 4. allow rules
/// 5. warn rules
/// 6. `Analyze`
#[derive(Clone, Debug, Default)]
pub struct PolicyEngine {
    config: PolicyConfiguration,
}

impl PolicyEngine {
    /// Create an engine after validating the configuration.
    pub fn new(mut config: PolicyConfiguration) -> Result<Self, ConfigurationError> {
        config.builtins.restricted = bare_builtin_names(config.builtins.restricted);
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &PolicyConfiguration {
        &self.config
    }

    /// The active mode.
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    fn evaluate_builtin(&self, specifier: &str, name: &str) -> PolicyDecision {
        let builtins = &self.config.builtins;
        if builtins.restricted.contains(name) {
            return PolicyDecision::block(format!(
                "Built-in module '{}' is restricted by policy",
                name
            ));
        }
        if builtins.allow {
            return PolicyDecision::allow(format!("Built-in module '{}' allowed", name));
        }

        // Builtins are off; an explicit rule for this name still counts.
        let root = root_package_name(specifier);
        let candidates = [root, name];
        if let Some(rule) = find_rule(&self.config.packages.block, &candidates) {
            return PolicyDecision::block(block_reason(rule, root)).with_rule(rule);
        }
        if let Some(rule) = find_rule(&self.config.packages.allow, &candidates) {
            return PolicyDecision::allow(format!(
                "Built-in module '{}' explicitly allowed",
                name
            ))
            .with_rule(rule);
        }
        PolicyDecision::block(format!(
            "Built-in module '{}' blocked: builtins disabled by policy",
            name
        ))
    }
}

fn block_reason(rule: &PackageRule, root: &str) -> String {
    rule.reason
        .clone()
        .unwrap_or_else(|| format!("Package '{}' is blocked by policy", root))
}

impl PolicyHandler for PolicyEngine {
    fn evaluate(&self, specifier: &str, context: &ResolveContext) -> PolicyDecision {
        let decision = if let Some(name) = builtin_name(specifier) {
            self.evaluate_builtin(specifier, name)
        } else if is_relative(specifier) {
            if self.config.relative_imports.analyze {
                PolicyDecision::analyze("Relative import, analysis enabled")
            } else {
                PolicyDecision::allow("Relative import, analysis disabled")
            }
        } else {
            let root = root_package_name(specifier);
            let packages = &self.config.packages;
            if let Some(rule) = find_rule(&packages.block, &[root]) {
                PolicyDecision::block(block_reason(rule, root)).with_rule(rule)
            } else if let Some(rule) = find_rule(&packages.allow, &[root]) {
                PolicyDecision::allow(format!("Package '{}' is allowed by policy", root))
                    .with_rule(rule)
            } else if let Some(rule) = find_rule(&packages.warn, &[root]) {
                let reason = rule
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("Package '{}' is on the warn list", root));
                PolicyDecision::warn(reason).with_rule(rule)
            } else {
                PolicyDecision::analyze("no explicit rule")
            }
        };

        tracing::debug!(
            specifier = %specifier,
            parent = ?context.parent,
            action = ?decision.action,
            reason = %decision.reason(),
            "policy evaluated"
        );
        decision
    }
}

/// Builder for policy configurations with a fluent API.
///
/// # Example
///
/// ```rust
/// use palisade::policy::{PolicyBuilder, PolicyHandler, ResolveContext};
///
/// let engine = PolicyBuilder::new()
///     .block("event-stream", "compromised release")
///     .allow("@types/*")
///     .build()
///     .unwrap();
///
/// let decision = engine.evaluate("event-stream", &ResolveContext::default());
/// assert!(decision.is_blocked());
/// ```
#[derive(Clone, Debug, Default)]
pub struct PolicyBuilder {
    config: PolicyConfiguration,
}

impl PolicyBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: PolicyConfiguration) -> Self {
        Self { config }
    }

    /// Set the response mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Block a package name or pattern.
    pub fn block(mut self, name: &str, reason: &str) -> Self {
        self.config
            .packages
            .block
            .push(PackageRule::new(name).with_reason(reason));
        self
    }

    /// Allow a package name or pattern.
    pub fn allow(mut self, name: &str) -> Self {
        self.config.packages.allow.push(PackageRule::new(name));
        self
    }

    /// Warn on a package name or pattern.
    pub fn warn(mut self, name: &str) -> Self {
        self.config.packages.warn.push(PackageRule::new(name));
        self
    }

    /// Add a fully specified rule to the block list.
    pub fn block_rule(mut self, rule: PackageRule) -> Self {
        self.config.packages.block.push(rule);
        self
    }

    /// Turn builtin modules on or off.
    pub fn builtins(mut self, allow: bool) -> Self {
        self.config.builtins.allow = allow;
        self
    }

    /// Always block a builtin module. Accepts `node:` specifiers too.
    pub fn restrict_builtin(mut self, name: &str) -> Self {
        let name = name.strip_prefix(BUILTIN_SCHEME).unwrap_or(name);
        self.config.builtins.restricted.insert(name.to_string());
        self
    }

    /// Analyze relative imports instead of allowing them outright.
    pub fn analyze_relative(mut self, analyze: bool) -> Self {
        self.config.relative_imports.analyze = analyze;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// The configuration built so far, unvalidated.
    pub fn into_config(self) -> PolicyConfiguration {
        self.config
    }

    /// Validate and build the engine.
    pub fn build(self) -> Result<PolicyEngine, ConfigurationError> {
        PolicyEngine::new(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext {
        ResolveContext::default()
    }

    #[test]
    fn test_allow_all_policy() {
        assert!(AllowAllPolicy.evaluate("anything", &ctx()).is_allowed());
    }

    #[test]
    fn test_deny_all_policy() {
        let decision = DenyAllPolicy.evaluate("anything", &ctx());
        assert!(decision.is_blocked());
        assert!(decision.reason().contains("anything"));
    }

    #[test]
    fn test_blocklist_with_reason() {
        let engine = PolicyBuilder::new()
            .builtins(false)
            .block("path", "Blocked for testing")
            .build()
            .unwrap();

        let decision = engine.evaluate("path", &ctx());
        assert_eq!(decision.action, Action::Block);
        assert!(decision.reason().contains("Blocked for testing"));
        assert_eq!(decision.matched_rule.unwrap().name, "path");
    }

    #[test]
    fn test_builtin_allowlisted_while_disabled() {
        let engine = PolicyBuilder::new()
            .builtins(false)
            .allow("events")
            .build()
            .unwrap();

        assert_eq!(engine.evaluate("events", &ctx()).action, Action::Allow);
        // No rule for fs, builtins disabled
        let decision = engine.evaluate("fs", &ctx());
        assert_eq!(decision.action, Action::Block);
        assert!(decision.reason().contains("builtins disabled"));
    }

    #[test]
    fn test_scheme_wildcard_blocks_builtins() {
        let engine = PolicyBuilder::new()
            .builtins(false)
            .block("node:*", "no node: imports")
            .build()
            .unwrap();

        assert_eq!(engine.evaluate("node:fs", &ctx()).action, Action::Block);
        assert_eq!(engine.evaluate("node:path", &ctx()).action, Action::Block);
    }

    #[test]
    fn test_bare_rule_covers_scheme_form() {
        let engine = PolicyBuilder::new()
            .builtins(false)
            .allow("crypto")
            .build()
            .unwrap();
        assert_eq!(engine.evaluate("node:crypto", &ctx()).action, Action::Allow);
    }

    #[test]
    fn test_builtins_allowed_by_default() {
        let engine = PolicyEngine::default();
        assert_eq!(engine.evaluate("fs", &ctx()).action, Action::Allow);
        assert_eq!(engine.evaluate("node:os", &ctx()).action, Action::Allow);
    }

    #[test]
    fn test_restricted_builtin() {
        let engine = PolicyBuilder::new()
            .restrict_builtin("node:child_process")
            .build()
            .unwrap();

        let decision = engine.evaluate("child_process", &ctx());
        assert_eq!(decision.action, Action::Block);
        assert!(decision.reason().contains("restricted by policy"));
        assert_eq!(
            engine.evaluate("node:child_process", &ctx()).action,
            Action::Block
        );
    }

    #[test]
    fn test_restricted_scheme_form_from_document() {
        let config = PolicyConfiguration::from_json(
            r#"{"builtins": {"restricted": ["node:child_process"]}}"#,
        )
        .unwrap();
        let engine = PolicyEngine::new(config).unwrap();

        for specifier in ["node:child_process", "child_process"] {
            let decision = engine.evaluate(specifier, &ctx());
            assert_eq!(decision.action, Action::Block, "{specifier}");
            assert!(decision.reason().contains("restricted by policy"));
        }
    }

    #[test]
    fn test_restricted_scheme_form_in_struct() {
        let mut config = PolicyConfiguration::default();
        config.builtins.restricted.insert("node:vm".to_string());
        let engine = PolicyEngine::new(config).unwrap();

        assert_eq!(engine.evaluate("vm", &ctx()).action, Action::Block);
        assert!(engine.config().builtins.restricted.contains("vm"));
    }

    #[test]
    fn test_restricted_outranks_allowlisted_builtin() {
        let engine = PolicyBuilder::new()
            .builtins(false)
            .restrict_builtin("vm")
            .allow("vm")
            .build()
            .unwrap();

        let decision = engine.evaluate("vm", &ctx());
        assert_eq!(decision.action, Action::Block);
        assert!(decision.reason().contains("restricted"));
    }

    #[test]
    fn test_relative_import_disabled() {
        let engine = PolicyEngine::default();
        let decision = engine.evaluate("./some-local-module", &ctx());
        assert_eq!(decision.action, Action::Allow);
        assert!(decision.reason().contains("Relative import"));
    }

    #[test]
    fn test_relative_import_analyzed() {
        let engine = PolicyBuilder::new().analyze_relative(true).build().unwrap();
        assert_eq!(
            engine.evaluate("../lib/util", &ctx()).action,
            Action::Analyze
        );
    }

    #[test]
    fn test_block_outranks_allow_regardless_of_order() {
        let allow_first = PolicyBuilder::new()
            .allow("lodash")
            .block("lodash", "nope")
            .build()
            .unwrap();
        let block_first = PolicyBuilder::new()
            .block("lodash", "nope")
            .allow("lodash")
            .build()
            .unwrap();

        for engine in [allow_first, block_first] {
            assert_eq!(engine.evaluate("lodash", &ctx()).action, Action::Block);
        }
    }

    #[test]
    fn test_subpath_uses_root_name() {
        let engine = PolicyBuilder::new()
            .block("lodash", "nope")
            .block("@evil/*", "bad scope")
            .build()
            .unwrap();

        assert!(engine.evaluate("lodash/fp", &ctx()).is_blocked());
        let decision = engine.evaluate("@evil/pkg/dist/index.js", &ctx());
        assert_eq!(decision.reason(), "bad scope");
        assert!(!engine.evaluate("@evilcorp/pkg", &ctx()).is_blocked());
    }

    #[test]
    fn test_default_block_reason() {
        let engine = PolicyEngine::new(PolicyConfiguration {
            packages: crate::config::PackageRules {
                block: vec![PackageRule::new("left-pad")],
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();

        let decision = engine.evaluate("left-pad", &ctx());
        assert_eq!(decision.reason(), "Package 'left-pad' is blocked by policy");
    }

    #[test]
    fn test_warnlist() {
        let engine = PolicyBuilder::new().warn("request").build().unwrap();
        let decision = engine.evaluate("request", &ctx());
        assert_eq!(decision.action, Action::Warn);
        assert!(decision.reason().contains("warn list"));
    }

    #[test]
    fn test_allow_outranks_warn() {
        let engine = PolicyBuilder::new()
            .warn("request")
            .allow("request")
            .build()
            .unwrap();
        assert_eq!(engine.evaluate("request", &ctx()).action, Action::Allow);
    }

    #[test]
    fn test_unknown_package_is_analyzed() {
        let engine = PolicyEngine::default();
        let decision = engine.evaluate("some-unknown-package", &ctx());
        assert_eq!(decision.action, Action::Analyze);
        assert!(decision.matched_rule.is_none());
    }

    #[test]
    fn test_builder_rejects_bad_wildcard() {
        let result = PolicyBuilder::new().allow("a*b").build();
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidWildcard { .. })
        ));
    }
}
