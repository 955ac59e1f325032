//! Module loading.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::error::SecurityViolation;
use crate::hook::EntryPoint;
use crate::policy::{ResolveContext, builtin_name, is_relative};

/// A request to load a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRequest {
    /// The specifier as written by the importer.
    pub specifier: String,
    /// File doing the import, if known.
    pub parent: Option<PathBuf>,
}

impl ModuleRequest {
    /// A request with no known parent.
    pub fn new(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            parent: None,
        }
    }

    /// A request made from `parent`.
    pub fn from_parent(specifier: impl Into<String>, parent: impl Into<PathBuf>) -> Self {
        Self {
            specifier: specifier.into(),
            parent: Some(parent.into()),
        }
    }

    /// Resolution context for policy evaluation.
    pub fn context(&self) -> ResolveContext {
        ResolveContext {
            parent: self.parent.clone(),
        }
    }
}

/// A loaded module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedModule {
    /// Specifier the module was requested with.
    pub specifier: String,
    /// Resolved file, absent for built-in modules.
    pub path: Option<PathBuf>,
    /// Module source, absent for built-in modules.
    pub source: Option<String>,
}

/// Error returned by a module load.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The load was blocked by policy.
    #[error(transparent)]
    Violation(#[from] SecurityViolation),
    /// Nothing resolved for the specifier.
    #[error("cannot find module '{0}'")]
    NotFound(String),
    /// Reading the resolved file failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LoadError {
    /// The policy violation, if this error is one.
    pub fn violation(&self) -> Option<&SecurityViolation> {
        match self {
            LoadError::Violation(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Module loading entry points.
pub struct ModuleApi {
    /// Resolve and load a module.
    pub load: Rc<EntryPoint<ModuleRequest, Result<LoadedModule, LoadError>>>,
}

impl fmt::Debug for ModuleApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleApi")
            .field("load", &self.load)
            .finish()
    }
}

impl ModuleApi {
    /// A loader that serves built-ins and relative files from disk.
    ///
    /// Package lookup is left to the host; bare names that are not built-ins
    /// fail with [`LoadError::NotFound`].
    pub fn native() -> Self {
        Self::new(load_native)
    }

    /// A loader backed by the host's own resolver.
    pub fn new(load: impl Fn(ModuleRequest) -> Result<LoadedModule, LoadError> + 'static) -> Self {
        Self {
            load: Rc::new(EntryPoint::new("Module._load", load)),
        }
    }
}

fn load_native(request: ModuleRequest) -> Result<LoadedModule, LoadError> {
    if builtin_name(&request.specifier).is_some() {
        return Ok(LoadedModule {
            specifier: request.specifier,
            path: None,
            source: None,
        });
    }
    if !is_relative(&request.specifier) {
        return Err(LoadError::NotFound(request.specifier));
    }

    let base = match request.parent.as_deref().and_then(Path::parent) {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let joined = base.join(&request.specifier);
    let candidates = [joined.clone(), joined.with_extension("js")];
    let Some(path) = candidates.into_iter().find(|p| p.is_file()) else {
        return Err(LoadError::NotFound(request.specifier));
    };

    let source = std::fs::read_to_string(&path)?;
    Ok(LoadedModule {
        specifier: request.specifier,
        path: Some(path),
        source: Some(source),
    })
}
