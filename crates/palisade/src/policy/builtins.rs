//! Platform-provided module names.

use super::pattern::root_package_name;

/// Scheme prefix that marks a specifier as platform-provided.
pub const BUILTIN_SCHEME: &str = "node:";

const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Bare builtin name for a specifier, or `None` if it is not a builtin.
///
/// `node:fs/promises` and `fs/promises` both yield `fs`.
pub fn builtin_name(specifier: &str) -> Option<&str> {
    match specifier.strip_prefix(BUILTIN_SCHEME) {
        Some(rest) => Some(root_package_name(rest)),
        None => {
            let root = root_package_name(specifier);
            BUILTIN_MODULES.binary_search(&root).ok().map(|_| root)
        }
    }
}
