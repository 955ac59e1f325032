//! Policy configuration.
//!
//! Two document shapes are accepted: the nested [`PolicyConfiguration`] shape
//! and the older [`FlatConfig`] shape. Both parse through [`ConfigInput`] and
//! end up as a nested configuration merged over the defaults.

use std::collections::BTreeSet;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::logging::LogLevel;
use crate::policy::BUILTIN_SCHEME;

/// How a block decision is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Raise a security violation and abort the operation.
    #[default]
    Enforce,
    /// Log at error level, then let the operation proceed.
    Warn,
    /// Log at info level and always let the operation proceed.
    Audit,
}

/// A rule naming a package, exactly or by trailing-wildcard prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RuleRepr")]
pub struct PackageRule {
    /// Exact name or prefix ending in `*` (`lodash*`, `@scope/*`, `node:*`).
    pub name: String,
    /// Version constraint; carried but not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human-readable reason surfaced in decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PackageRule {
    /// A rule with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            reason: None,
        }
    }

    /// Attach a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a version constraint.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl From<&str> for PackageRule {
    fn from(name: &str) -> Self {
        PackageRule::new(name)
    }
}

/// Rules may be written as a bare string or as a full object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl From<RuleRepr> for PackageRule {
    fn from(repr: RuleRepr) -> Self {
        match repr {
            RuleRepr::Name(name) => PackageRule::new(name),
            RuleRepr::Full {
                name,
                version,
                reason,
            } => PackageRule {
                name,
                version,
                reason,
            },
        }
    }
}

/// Ordered package rule lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRules {
    /// Explicitly allowed packages.
    pub allow: Vec<PackageRule>,
    /// Explicitly blocked packages; outranks `allow`.
    pub block: Vec<PackageRule>,
    /// Packages that are allowed with a warning.
    pub warn: Vec<PackageRule>,
}

/// Settings for platform-provided (builtin) modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinSettings {
    /// Whether builtins are allowed unless restricted.
    pub allow: bool,
    /// Builtins that are always blocked.
    pub restricted: BTreeSet<String>,
}

impl Default for BuiltinSettings {
    fn default() -> Self {
        Self {
            allow: true,
            restricted: BTreeSet::new(),
        }
    }
}

/// Settings for relative (`./`, `../`) specifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeImports {
    /// When false, relative imports are allowed without inspection.
    pub analyze: bool,
}

/// Settings for policy log messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Most verbose level passed to the sink.
    pub level: LogLevel,
}

/// The full policy configuration.
///
/// Immutable while an evaluation runs; reconfiguration replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyConfiguration {
    /// Response to block decisions.
    pub mode: Mode,
    /// Package rule lists.
    pub packages: PackageRules,
    /// Builtin module settings.
    pub builtins: BuiltinSettings,
    /// Relative import settings.
    pub relative_imports: RelativeImports,
    /// Log settings.
    pub logging: LoggingSettings,
}

impl PolicyConfiguration {
    /// A locked-down preset: builtins that spawn processes or evaluate code
    /// are restricted and relative imports are analyzed.
    pub fn strict() -> Self {
        Self {
            builtins: BuiltinSettings {
                allow: true,
                restricted: ["child_process", "cluster", "inspector", "vm", "worker_threads"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
            relative_imports: RelativeImports { analyze: true },
            ..Self::default()
        }
    }

    /// Parse a configuration document in either shape and merge it over the
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let input: ConfigInput = serde_json::from_str(json)?;
        input.into_configuration()
    }

    /// Apply every field present in `partial` over `self`.
    ///
    /// Rule lists are replaced, not concatenated.
    pub fn merged(mut self, partial: PartialPolicyConfiguration) -> Self {
        if let Some(mode) = partial.mode {
            self.mode = mode;
        }
        if let Some(packages) = partial.packages {
            if let Some(allow) = packages.allow {
                self.packages.allow = allow;
            }
            if let Some(block) = packages.block {
                self.packages.block = block;
            }
            if let Some(warn) = packages.warn {
                self.packages.warn = warn;
            }
        }
        if let Some(builtins) = partial.builtins {
            if let Some(allow) = builtins.allow {
                self.builtins.allow = allow;
            }
            if let Some(restricted) = builtins.restricted {
                self.builtins.restricted = bare_builtin_names(restricted);
            }
        }
        if let Some(relative) = partial.relative_imports
            && let Some(analyze) = relative.analyze
        {
            self.relative_imports.analyze = analyze;
        }
        if let Some(logging) = partial.logging
            && let Some(level) = logging.level
        {
            self.logging.level = level;
        }
        self
    }

    /// Reject rule input the engine cannot evaluate faithfully.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_rules("allow", &self.packages.allow)?;
        validate_rules("block", &self.packages.block)?;
        validate_rules("warn", &self.packages.warn)?;
        if self.builtins.restricted.iter().any(|name| name.is_empty()) {
            return Err(ConfigurationError::EmptyRestrictedBuiltin);
        }
        Ok(())
    }
}

/// Restricted builtins are matched by bare name, so `node:fs` and `fs` name
/// the same entry.
pub(crate) fn bare_builtin_names(names: BTreeSet<String>) -> BTreeSet<String> {
    names
        .into_iter()
        .map(|name| match name.strip_prefix(BUILTIN_SCHEME) {
            Some(bare) => bare.to_string(),
            None => name,
        })
        .collect()
}

fn validate_rules(list: &'static str, rules: &[PackageRule]) -> Result<(), ConfigurationError> {
    for rule in rules {
        if rule.name.is_empty() {
            return Err(ConfigurationError::EmptyRuleName { list });
        }
        let stars = rule.name.matches('*').count();
        if stars > 1 || (stars == 1 && !rule.name.ends_with('*')) {
            return Err(ConfigurationError::InvalidWildcard {
                name: rule.name.clone(),
            });
        }
    }
    Ok(())
}

/// Load and validate a configuration document from a file.
pub fn load_config(path: impl AsRef<Path>) -> Result<PolicyConfiguration, ConfigurationError> {
    let json = std::fs::read_to_string(path)?;
    PolicyConfiguration::from_json(&json)
}

/// Nested configuration with every field optional, for merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PartialPolicyConfiguration {
    /// Response mode.
    pub mode: Option<Mode>,
    /// Package rule lists.
    pub packages: Option<PartialPackageRules>,
    /// Builtin settings.
    pub builtins: Option<PartialBuiltins>,
    /// Relative import settings.
    pub relative_imports: Option<PartialRelativeImports>,
    /// Log settings.
    pub logging: Option<PartialLogging>,
}

/// Optional package rule lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialPackageRules {
    /// Allowed packages.
    pub allow: Option<Vec<PackageRule>>,
    /// Blocked packages.
    pub block: Option<Vec<PackageRule>>,
    /// Warned packages.
    pub warn: Option<Vec<PackageRule>>,
}

/// Optional builtin settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialBuiltins {
    /// Whether builtins are allowed.
    pub allow: Option<bool>,
    /// Restricted builtins.
    pub restricted: Option<BTreeSet<String>>,
}

/// Optional relative import settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialRelativeImports {
    /// Whether relative imports are analyzed.
    pub analyze: Option<bool>,
}

/// Optional log settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialLogging {
    /// Log level.
    pub level: Option<LogLevel>,
}

/// The flat configuration shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FlatConfig {
    /// Response mode.
    pub mode: Option<Mode>,
    /// Whether builtin modules are allowed. Absent means disallowed.
    pub allow_dangerous_builtins: Option<bool>,
    /// Blocked package names or patterns.
    pub blocklist: Vec<PackageRule>,
    /// Allowed package names or patterns.
    pub allowlist: Vec<PackageRule>,
    /// Log level.
    pub log_level: Option<LogLevel>,
}

impl From<FlatConfig> for PartialPolicyConfiguration {
    fn from(flat: FlatConfig) -> Self {
        Self {
            mode: flat.mode,
            packages: Some(PartialPackageRules {
                allow: Some(flat.allowlist),
                block: Some(flat.blocklist),
                warn: None,
            }),
            builtins: Some(PartialBuiltins {
                allow: Some(flat.allow_dangerous_builtins.unwrap_or(false)),
                restricted: None,
            }),
            relative_imports: None,
            logging: flat.log_level.map(|level| PartialLogging { level: Some(level) }),
        }
    }
}

/// Either configuration shape.
///
/// A document is read as flat when it carries any key only the flat shape
/// has, and as nested otherwise. Unknown fields are reported against the
/// detected shape.
#[derive(Debug, Clone)]
pub enum ConfigInput {
    /// The nested shape.
    Nested(PartialPolicyConfiguration),
    /// The flat shape.
    Flat(FlatConfig),
}

const FLAT_KEYS: [&str; 4] = ["allowDangerousBuiltins", "blocklist", "allowlist", "logLevel"];

impl<'de> Deserialize<'de> for ConfigInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let flat = value
            .as_object()
            .is_some_and(|map| FLAT_KEYS.iter().any(|key| map.contains_key(*key)));
        let input = if flat {
            serde_json::from_value(value).map(ConfigInput::Flat)
        } else {
            serde_json::from_value(value).map(ConfigInput::Nested)
        };
        input.map_err(de::Error::custom)
    }
}

impl ConfigInput {
    /// Merge over the defaults and validate.
    pub fn into_configuration(self) -> Result<PolicyConfiguration, ConfigurationError> {
        let partial = match self {
            ConfigInput::Nested(partial) => partial,
            ConfigInput::Flat(flat) => flat.into(),
        };
        let config = PolicyConfiguration::default().merged(partial);
        config.validate()?;
        Ok(config)
    }
}

impl From<PolicyConfiguration> for ConfigInput {
    fn from(config: PolicyConfiguration) -> Self {
        ConfigInput::Nested(PartialPolicyConfiguration {
            mode: Some(config.mode),
            packages: Some(PartialPackageRules {
                allow: Some(config.packages.allow),
                block: Some(config.packages.block),
                warn: Some(config.packages.warn),
            }),
            builtins: Some(PartialBuiltins {
                allow: Some(config.builtins.allow),
                restricted: Some(config.builtins.restricted),
            }),
            relative_imports: Some(PartialRelativeImports {
                analyze: Some(config.relative_imports.analyze),
            }),
            logging: Some(PartialLogging {
                level: Some(config.logging.level),
            }),
        })
    }
}

impl From<FlatConfig> for ConfigInput {
    fn from(flat: FlatConfig) -> Self {
        ConfigInput::Flat(flat)
    }
}
