//! The Palisade context: one policy, one enforcer, every hook.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::{ConfigInput, Mode, PolicyConfiguration};
use crate::enforcement::Enforcer;
use crate::error::ConfigurationError;
use crate::hook::{Analyzer, Hook, analyzer};
use crate::lockdown::CodeExecutionLockdown;
use crate::logging::{LogLevel, LogSink, TracingSink};
use crate::platform::{LoadError, LoadedModule, ModuleRequest, Platform};
use crate::policy::{
    Action, PolicyDecision, PolicyEngine, PolicyHandler, ResolveContext, builtin_name, is_relative,
    root_package_name,
};
use crate::shield::{FileShield, NetworkShield, Shield};
use crate::similarity::check_typosquat;

type ModuleHook = Hook<ModuleRequest, Result<LoadedModule, LoadError>>;

/// Owner of the active policy and of every hook over one [`Platform`].
///
/// Components never look policy up from global state; they hold clones of
/// the context's engine and enforcer, so [`configure`](Palisade::configure)
/// takes effect everywhere on the next call.
///
/// Dropping the context restores every entry point it hooked.
pub struct Palisade {
    platform: Rc<Platform>,
    engine: Rc<RefCell<PolicyEngine>>,
    enforcer: Rc<Enforcer>,
    module_hook: ModuleHook,
    file_shield: FileShield,
    network_shield: NetworkShield,
    lockdown: CodeExecutionLockdown,
}

impl fmt::Debug for Palisade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Palisade")
            .field("mode", &self.mode())
            .field("module_hook", &self.module_hook)
            .field("file_shield", &self.file_shield)
            .field("network_shield", &self.network_shield)
            .field("lockdown", &self.lockdown)
            .finish_non_exhaustive()
    }
}

impl Palisade {
    /// A context over `platform` with the default policy, logging through
    /// `tracing`. Nothing is hooked yet.
    pub fn new(platform: Rc<Platform>) -> Self {
        Self::with_sink(platform, Rc::new(TracingSink))
    }

    /// A context with the default policy and a custom log sink.
    pub fn with_sink(platform: Rc<Platform>, sink: Rc<dyn LogSink>) -> Self {
        let config = PolicyConfiguration::default();
        let enforcer = Rc::new(Enforcer::new(config.mode, config.logging.level, sink));
        let engine = Rc::new(RefCell::new(PolicyEngine::default()));

        let module_hook = Hook::new(
            Rc::clone(&platform.modules.load),
            {
                let engine = Rc::clone(&engine);
                move |request: &ModuleRequest| {
                    engine.borrow().evaluate(&request.specifier, &request.context())
                }
            },
            |_, violation| Err(LoadError::Violation(violation)),
            Rc::clone(&enforcer),
        );

        Self {
            file_shield: FileShield::new(&platform.fs, Rc::clone(&enforcer)),
            network_shield: NetworkShield::new(&platform.net, Rc::clone(&enforcer)),
            lockdown: CodeExecutionLockdown::new(&platform.code),
            module_hook,
            platform,
            engine,
            enforcer,
        }
    }

    /// Create a context and apply `config`.
    pub fn init(
        platform: Rc<Platform>,
        config: impl Into<ConfigInput>,
    ) -> Result<Self, ConfigurationError> {
        let palisade = Self::new(platform);
        palisade.configure(config)?;
        Ok(palisade)
    }

    /// Replace the active policy.
    ///
    /// The input is merged over the defaults, not over the current policy.
    /// On error the current policy stays in place.
    pub fn configure(&self, config: impl Into<ConfigInput>) -> Result<(), ConfigurationError> {
        let config = config.into().into_configuration()?;
        self.apply(config)
    }

    fn apply(&self, config: PolicyConfiguration) -> Result<(), ConfigurationError> {
        let (mode, level) = (config.mode, config.logging.level);
        *self.engine.borrow_mut() = PolicyEngine::new(config)?;
        self.enforcer.set_mode(mode);
        self.enforcer.set_level(level);
        tracing::info!(mode = ?mode, "policy configured");
        Ok(())
    }

    /// Uninstall every hook and return to the default policy and rules.
    pub fn reset(&self) {
        self.uninstall_module_hook();
        self.file_shield.deactivate();
        self.network_shield.deactivate();
        self.lockdown.restore();
        self.file_shield.reset_rules();
        self.network_shield.reset_rules();

        let config = PolicyConfiguration::default();
        self.enforcer.set_mode(config.mode);
        self.enforcer.set_level(config.logging.level);
        *self.engine.borrow_mut() = PolicyEngine::default();
        tracing::info!("palisade reset");
    }

    /// Evaluate `specifier` against the active policy.
    pub fn evaluate(&self, specifier: &str, context: &ResolveContext) -> PolicyDecision {
        self.engine.borrow().evaluate(specifier, context)
    }

    /// Snapshot of the active policy.
    pub fn config(&self) -> PolicyConfiguration {
        self.engine.borrow().config().clone()
    }

    /// The active mode.
    pub fn mode(&self) -> Mode {
        self.enforcer.mode()
    }

    /// The hooked platform.
    pub fn platform(&self) -> &Rc<Platform> {
        &self.platform
    }

    /// Hook module loading with the typosquat analyzer.
    pub fn install_module_hook(&self) {
        self.install_module_hook_with(Some(self.typosquat_analyzer()));
    }

    /// Hook module loading with a custom analyzer, or none.
    pub fn install_module_hook_with(&self, analyzer: Option<Analyzer<ModuleRequest>>) {
        self.module_hook.install(analyzer);
    }

    /// Restore the original module loader.
    pub fn uninstall_module_hook(&self) {
        self.module_hook.uninstall();
    }

    /// Whether module loading is hooked.
    pub fn is_module_hook_installed(&self) -> bool {
        self.module_hook.is_installed()
    }

    /// The file shield.
    pub fn file_shield(&self) -> &FileShield {
        &self.file_shield
    }

    /// The network shield.
    pub fn network_shield(&self) -> &NetworkShield {
        &self.network_shield
    }

    /// The code execution lockdown.
    pub fn lockdown(&self) -> &CodeExecutionLockdown {
        &self.lockdown
    }

    /// Hook everything: module loading, both shields and the lockdown.
    pub fn protect(&self) {
        self.install_module_hook();
        self.file_shield.activate();
        self.network_shield.activate();
        self.lockdown.install();
    }

    // Packages without an explicit rule get a typosquat check; a close
    // match is reported but does not block the load.
    fn typosquat_analyzer(&self) -> Analyzer<ModuleRequest> {
        let engine = Rc::clone(&self.engine);
        let enforcer = Rc::clone(&self.enforcer);
        analyzer(move |request: &ModuleRequest| {
            let specifier = request.specifier.as_str();
            if builtin_name(specifier).is_some() || is_relative(specifier) {
                return Ok(());
            }
            if engine.borrow().evaluate(specifier, &request.context()).action != Action::Analyze {
                return Ok(());
            }
            let result = check_typosquat(root_package_name(specifier));
            if let Some(warning) = result.warning {
                enforcer.log(LogLevel::Warn, &format!("[palisade] {}", warning));
            }
            Ok(())
        })
    }
}
