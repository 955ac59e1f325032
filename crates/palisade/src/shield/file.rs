//! Credential file shield.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::enforcement::Enforcer;
use crate::hook::Hook;
use crate::platform::{Callback, FileTarget, FsApi, ListResult, ReadResult};
use crate::policy::PolicyDecision;

use super::{Shield, reject_async, reject_callback, reject_sync};

const BLOCKED_FILENAMES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.production",
    ".env.development",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    ".netrc",
    ".npmrc",
    ".pgpass",
];

const BLOCKED_PATTERNS: &[&str] = &[
    "/.ssh/",
    "/.aws/",
    "/.gnupg/",
    "/.kube/config",
    "/.docker/config.json",
    "/.config/gcloud",
    "/etc/shadow",
];

const BLOCKED_SUFFIXES: &[&str] = &[".pem", ".key", ".p12", ".pfx"];

/// A rule to add to a [`FileRules`] set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileRule {
    /// Block paths whose final component is exactly this name.
    Filename(String),
    /// Block paths containing this substring. The path is compared with a
    /// separator at each end, so `/.ssh/` also covers `.ssh` itself.
    Pattern(String),
    /// Block paths ending with this suffix.
    Suffix(String),
}

/// Paths the file shield refuses.
///
/// Everything is compared after normalizing separators to `/` and folding
/// case, both for the rules and for the candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRules {
    filenames: BTreeSet<String>,
    patterns: Vec<String>,
    suffixes: Vec<String>,
}

impl Default for FileRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        for name in BLOCKED_FILENAMES {
            rules.add(FileRule::Filename(name.to_string()));
        }
        for pattern in BLOCKED_PATTERNS {
            rules.add(FileRule::Pattern(pattern.to_string()));
        }
        for suffix in BLOCKED_SUFFIXES {
            rules.add(FileRule::Suffix(suffix.to_string()));
        }
        rules
    }
}

impl FileRules {
    /// A rule set that blocks nothing.
    pub fn empty() -> Self {
        Self {
            filenames: BTreeSet::new(),
            patterns: Vec::new(),
            suffixes: Vec::new(),
        }
    }

    /// Append a rule.
    pub fn add(&mut self, rule: FileRule) {
        match rule {
            FileRule::Filename(name) => {
                self.filenames.insert(normalize(&name));
            }
            FileRule::Pattern(pattern) => push_unique(&mut self.patterns, normalize(&pattern)),
            FileRule::Suffix(suffix) => push_unique(&mut self.suffixes, normalize(&suffix)),
        }
    }

    /// Whether `candidate` is refused.
    ///
    /// Patterns match whole components whether the path is relative or
    /// absolute, and whether or not it names a directory with a trailing
    /// separator: `.ssh`, `~/.ssh/` and `.ssh/config` all hit `/.ssh/`.
    pub fn is_blocked_path(&self, candidate: impl AsRef<Path>) -> bool {
        let normalized = normalize(&candidate.as_ref().to_string_lossy());
        let path = normalized.trim_matches('/');
        let anchored = format!("/{}/", path);
        let file_name = path.rsplit('/').next().unwrap_or(path);

        self.filenames.contains(file_name)
            || self.patterns.iter().any(|p| anchored.contains(p.as_str()))
            || self.suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }

    fn decide(&self, path: &Path) -> PolicyDecision {
        if self.is_blocked_path(path) {
            PolicyDecision::block(format!(
                "Access to '{}' is blocked by the file shield",
                path.display()
            ))
        } else {
            PolicyDecision::allow("Path not covered by the file shield")
        }
    }
}

fn normalize(s: &str) -> String {
    s.replace('\\', "/").to_lowercase()
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn target_check(rules: &Rc<RefCell<FileRules>>) -> impl Fn(&FileTarget) -> PolicyDecision + 'static {
    let rules = Rc::clone(rules);
    move |target| match target.path() {
        Some(path) => rules.borrow().decide(path),
        None => PolicyDecision::allow("Already-open handle"),
    }
}

fn path_check(rules: &Rc<RefCell<FileRules>>) -> impl Fn(&PathBuf) -> PolicyDecision + 'static {
    let rules = Rc::clone(rules);
    move |path| rules.borrow().decide(path)
}

/// Hooks every file read, open and listing entry point of an [`FsApi`].
pub struct FileShield {
    rules: Rc<RefCell<FileRules>>,
    read_file_sync: Hook<FileTarget, ReadResult>,
    read_file: Hook<FileTarget, LocalBoxFuture<'static, ReadResult>>,
    read_file_cb: Hook<(FileTarget, Callback<ReadResult>), ()>,
    open_sync: Hook<PathBuf, io::Result<File>>,
    open: Hook<PathBuf, LocalBoxFuture<'static, io::Result<tokio::fs::File>>>,
    read_dir_sync: Hook<PathBuf, ListResult>,
    read_dir: Hook<PathBuf, LocalBoxFuture<'static, ListResult>>,
    read_dir_cb: Hook<(PathBuf, Callback<ListResult>), ()>,
}

impl fmt::Debug for FileShield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileShield")
            .field("active", &self.is_active())
            .field("rules", &self.rules.borrow())
            .finish_non_exhaustive()
    }
}

impl FileShield {
    /// Create an inactive shield over `fs` with the default rules.
    pub fn new(fs: &FsApi, enforcer: Rc<Enforcer>) -> Self {
        Self::with_rules(fs, enforcer, FileRules::default())
    }

    /// Create an inactive shield with a custom rule set.
    pub fn with_rules(fs: &FsApi, enforcer: Rc<Enforcer>, rules: FileRules) -> Self {
        let rules = Rc::new(RefCell::new(rules));
        Self {
            read_file_sync: Hook::new(
                Rc::clone(&fs.read_file_sync),
                target_check(&rules),
                reject_sync,
                Rc::clone(&enforcer),
            ),
            read_file: Hook::new(
                Rc::clone(&fs.read_file),
                target_check(&rules),
                reject_async,
                Rc::clone(&enforcer),
            ),
            read_file_cb: Hook::new(
                Rc::clone(&fs.read_file_cb),
                {
                    let check = target_check(&rules);
                    move |(target, _): &(FileTarget, Callback<ReadResult>)| check(target)
                },
                reject_callback,
                Rc::clone(&enforcer),
            ),
            open_sync: Hook::new(
                Rc::clone(&fs.open_sync),
                path_check(&rules),
                reject_sync,
                Rc::clone(&enforcer),
            ),
            open: Hook::new(
                Rc::clone(&fs.open),
                path_check(&rules),
                reject_async,
                Rc::clone(&enforcer),
            ),
            read_dir_sync: Hook::new(
                Rc::clone(&fs.read_dir_sync),
                path_check(&rules),
                reject_sync,
                Rc::clone(&enforcer),
            ),
            read_dir: Hook::new(
                Rc::clone(&fs.read_dir),
                path_check(&rules),
                reject_async,
                Rc::clone(&enforcer),
            ),
            read_dir_cb: Hook::new(
                Rc::clone(&fs.read_dir_cb),
                {
                    let check = path_check(&rules);
                    move |(path, _): &(PathBuf, Callback<ListResult>)| check(path)
                },
                reject_callback,
                enforcer,
            ),
            rules,
        }
    }

    /// Append a rule; takes effect on the next call.
    pub fn add_blocked_rule(&self, rule: FileRule) {
        self.rules.borrow_mut().add(rule);
    }

    /// Whether `candidate` would be refused.
    pub fn is_blocked_path(&self, candidate: impl AsRef<Path>) -> bool {
        self.rules.borrow().is_blocked_path(candidate)
    }

    /// Snapshot of the current rules.
    pub fn rules(&self) -> FileRules {
        self.rules.borrow().clone()
    }

    pub(crate) fn reset_rules(&self) {
        *self.rules.borrow_mut() = FileRules::default();
    }
}

impl Shield for FileShield {
    fn activate(&self) {
        self.read_file_sync.install(None);
        self.read_file.install(None);
        self.read_file_cb.install(None);
        self.open_sync.install(None);
        self.open.install(None);
        self.read_dir_sync.install(None);
        self.read_dir.install(None);
        self.read_dir_cb.install(None);
        tracing::debug!("file shield activated");
    }

    fn deactivate(&self) {
        self.read_file_sync.uninstall();
        self.read_file.uninstall();
        self.read_file_cb.uninstall();
        self.open_sync.uninstall();
        self.open.uninstall();
        self.read_dir_sync.uninstall();
        self.read_dir.uninstall();
        self.read_dir_cb.uninstall();
        tracing::debug!("file shield deactivated");
    }

    fn is_active(&self) -> bool {
        self.read_file_sync.is_installed()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SecurityViolation;
    use crate::config::Mode;
    use crate::logging::{LogLevel, MemorySink};

    #[test]
    fn test_default_rules() {
        let rules = FileRules::default();
        assert!(rules.is_blocked_path("/app/.env"));
        assert!(rules.is_blocked_path("/home/u/.ssh/known_hosts"));
        assert!(rules.is_blocked_path("/home/u/.aws/credentials"));
        assert!(rules.is_blocked_path("/etc/shadow"));
        assert!(rules.is_blocked_path("/srv/tls/server.pem"));
        assert!(rules.is_blocked_path("/home/u/id_ed25519"));
        assert!(rules.is_blocked_path("/home/u/.kube/config"));

        assert!(!rules.is_blocked_path("/app/src/index.js"));
        assert!(!rules.is_blocked_path("/app/.environment"));
        assert!(!rules.is_blocked_path("/app/keys.json"));
    }

    #[test]
    fn test_relative_and_directory_paths() {
        let rules = FileRules::default();
        assert!(rules.is_blocked_path(".aws/credentials"));
        assert!(rules.is_blocked_path(".ssh/known_hosts"));
        assert!(rules.is_blocked_path(".kube/config"));
        assert!(rules.is_blocked_path("./.gnupg/pubring.kbx"));
        assert!(rules.is_blocked_path("/home/u/.ssh"));
        assert!(rules.is_blocked_path("/home/u/.aws"));
        assert!(rules.is_blocked_path("/home/u/.gnupg/"));
        assert!(rules.is_blocked_path(".ssh"));

        assert!(!rules.is_blocked_path("/home/u/.sshrc"));
        assert!(!rules.is_blocked_path("docs/aws/setup.md"));
        assert!(!rules.is_blocked_path("/"));
    }

    #[test]
    fn test_normalizes_case_and_separators() {
        let rules = FileRules::default();
        assert!(rules.is_blocked_path(r"C:\Users\u\.SSH\id_rsa"));
        assert!(rules.is_blocked_path("/app/.ENV"));
        assert!(rules.is_blocked_path("/srv/Server.KEY"));
    }

    #[test]
    fn test_added_rules_are_normalized() {
        let mut rules = FileRules::empty();
        assert!(!rules.is_blocked_path("/srv/secrets/db.txt"));

        rules.add(FileRule::Pattern(r"\Secrets\".to_string()));
        rules.add(FileRule::Suffix(".SQLITE".to_string()));
        rules.add(FileRule::Filename("Credentials".to_string()));

        assert!(rules.is_blocked_path("/srv/secrets/db.txt"));
        assert!(rules.is_blocked_path("/var/app.sqlite"));
        assert!(rules.is_blocked_path("/home/u/credentials"));
    }

    fn shield(mode: Mode) -> (FsApi, FileShield, Rc<MemorySink>) {
        let fs = FsApi::native();
        let sink = Rc::new(MemorySink::new());
        let enforcer = Rc::new(Enforcer::new(mode, LogLevel::Info, sink.clone()));
        let shield = FileShield::new(&fs, enforcer);
        (fs, shield, sink)
    }

    #[test]
    fn test_sync_read_blocked_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env");
        std::fs::write(&env, "TOKEN=1").unwrap();
        let plain = dir.path().join("readme.txt");
        std::fs::write(&plain, "hi").unwrap();

        let (fs, shield, _) = shield(Mode::Enforce);
        shield.activate();

        let err = fs.read_file_sync.call(env.clone().into()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let violation = SecurityViolation::from_io_error(&err).unwrap();
        assert!(violation.reason().contains(".env"));

        assert_eq!(fs.read_file_sync.call(plain.into()).unwrap(), b"hi");

        let err = fs.open_sync.call(env.clone()).unwrap_err();
        assert!(SecurityViolation::from_io_error(&err).is_some());

        shield.deactivate();
        assert_eq!(fs.read_file_sync.call(env.into()).unwrap(), b"TOKEN=1");
    }

    #[test]
    fn test_open_handles_are_not_checked() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env");
        std::fs::write(&env, "TOKEN=1").unwrap();
        let handle = File::open(&env).unwrap();

        let (fs, shield, _) = shield(Mode::Enforce);
        shield.activate();
        assert_eq!(fs.read_file_sync.call(handle.into()).unwrap(), b"TOKEN=1");
    }

    #[test]
    fn test_listing_credential_directory_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let ssh = dir.path().join(".ssh");
        std::fs::create_dir(&ssh).unwrap();
        std::fs::write(ssh.join("config"), "").unwrap();

        let (fs, shield, _) = shield(Mode::Enforce);
        shield.activate();

        assert!(fs.read_dir_sync.call(ssh.clone()).is_err());
        assert!(fs.read_dir_sync.call(ssh.join("")).is_err());
        assert!(fs.read_dir_sync.call(dir.path().to_path_buf()).is_ok());
    }

    #[test]
    fn test_warn_mode_logs_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("server.key");
        std::fs::write(&key, "k").unwrap();

        let (fs, shield, sink) = shield(Mode::Warn);
        shield.activate();

        assert_eq!(fs.read_file_sync.call(key.into()).unwrap(), b"k");
        let errors = sink.at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("server.key"));
    }

    #[tokio::test]
    async fn test_async_and_callback_reads_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env.production");
        std::fs::write(&env, "TOKEN=1").unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let (fs, shield, _) = shield(Mode::Enforce);
                shield.activate();

                let err = fs.read_file.call(env.clone().into()).await.unwrap_err();
                assert!(SecurityViolation::from_io_error(&err).is_some());

                let err = fs.open.call(env.clone()).await.unwrap_err();
                assert_eq!(err.kind(), io::ErrorKind::NotFound);

                let (tx, rx) = tokio::sync::oneshot::channel();
                let delivered = Rc::new(std::cell::Cell::new(false));
                let flag = Rc::clone(&delivered);
                fs.read_file_cb.call((
                    env.into(),
                    Box::new(move |result: ReadResult| {
                        flag.set(true);
                        let _ = tx.send(result);
                    }),
                ));
                // Delivered on a later turn, never during the call.
                assert!(!delivered.get());

                let err = rx.await.unwrap().unwrap_err();
                assert!(SecurityViolation::from_io_error(&err).is_some());
            })
            .await;
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (fs, shield, _) = shield(Mode::Enforce);
        let native = fs.read_file_sync.handler();

        shield.activate();
        let wrapper = fs.read_file_sync.handler();
        shield.activate();
        assert!(fs.read_file_sync.is_current(&wrapper));
        assert!(shield.is_active());

        shield.deactivate();
        shield.deactivate();
        assert!(fs.read_file_sync.is_current(&native));
        assert!(!shield.is_active());
    }
}
