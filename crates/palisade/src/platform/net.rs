//! Network entry points.

use std::fmt;
use std::io;
use std::net::{IpAddr, TcpStream};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::io::AsyncWriteExt;

use crate::hook::EntryPoint;

use super::Callback;

/// Options form of a connect call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Host to connect to; `localhost` when absent.
    pub host: Option<String>,
    /// Port to connect to.
    pub port: u16,
}

/// Where a stream connection is aimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Positional `(host, port)` form.
    HostPort(String, u16),
    /// Options-object form.
    Options(ConnectOptions),
}

impl ConnectTarget {
    /// Host portion of the target.
    pub fn host(&self) -> &str {
        match self {
            ConnectTarget::HostPort(host, _) => host,
            ConnectTarget::Options(opts) => opts.host.as_deref().unwrap_or("localhost"),
        }
    }

    /// Port portion of the target.
    pub fn port(&self) -> u16 {
        match self {
            ConnectTarget::HostPort(_, port) => *port,
            ConnectTarget::Options(opts) => opts.port,
        }
    }
}

/// An outbound request to a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
}

impl OutboundRequest {
    /// A GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }

    /// Hostname of the URL, if it parses.
    pub fn host(&self) -> Option<String> {
        ParsedUrl::parse(&self.url).map(|parsed| parsed.host)
    }
}

/// The parts of an absolute URL needed to reach its host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Scheme, lower-cased.
    pub scheme: String,
    /// Host without IPv6 brackets.
    pub host: String,
    /// Explicit port, if any.
    pub port: Option<u16>,
    /// Path and query, `/` when empty.
    pub path: String,
}

impl ParsedUrl {
    /// Parse `scheme://[user@]host[:port][/path]`.
    pub fn parse(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        if scheme.is_empty() {
            return None;
        }
        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(authority_end);
        let authority = match authority.rfind('@') {
            Some(at) => &authority[at + 1..],
            None => authority,
        };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed.split_once(']')?;
            let port = match after.strip_prefix(':') {
                Some(p) => Some(p.parse().ok()?),
                None if after.is_empty() => None,
                None => return None,
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, p)) => (host, Some(p.parse().ok()?)),
                None => (authority, None),
            }
        };
        if host.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            port,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        })
    }

    /// Explicit port, or the scheme's default.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(match self.scheme.as_str() {
            "https" | "wss" => 443,
            _ => 80,
        })
    }
}

/// Result of resolving a hostname.
pub type LookupResult = io::Result<Vec<IpAddr>>;

/// Network entry points.
pub struct NetApi {
    /// Open a TCP stream.
    pub connect: Rc<EntryPoint<ConnectTarget, io::Result<TcpStream>>>,
    /// Resolve a hostname.
    pub lookup: Rc<EntryPoint<String, LocalBoxFuture<'static, LookupResult>>>,
    /// Resolve a hostname, delivering the result to a callback.
    pub lookup_cb: Rc<EntryPoint<(String, Callback<LookupResult>), ()>>,
    /// Issue a request; resolves to the stream once the request head is sent.
    pub request:
        Rc<EntryPoint<OutboundRequest, LocalBoxFuture<'static, io::Result<tokio::net::TcpStream>>>>,
}

impl fmt::Debug for NetApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetApi").finish_non_exhaustive()
    }
}

impl NetApi {
    /// Entry points backed by `std::net` and `tokio::net`.
    pub fn native() -> Self {
        Self {
            connect: Rc::new(EntryPoint::new("net.connect", |target: ConnectTarget| {
                TcpStream::connect((target.host(), target.port()))
            })),
            lookup: Rc::new(EntryPoint::new("dns.promises.lookup", |host: String| {
                lookup(host).boxed_local()
            })),
            lookup_cb: Rc::new(EntryPoint::new(
                "dns.lookup",
                |(host, callback): (String, Callback<LookupResult>)| {
                    tokio::task::spawn_local(async move { callback(lookup(host).await) });
                },
            )),
            request: Rc::new(EntryPoint::new("http.request", |request: OutboundRequest| {
                send_request(request).boxed_local()
            })),
        }
    }
}

async fn lookup(host: String) -> LookupResult {
    let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
    Ok(addrs.map(|addr| addr.ip()).collect())
}

async fn send_request(request: OutboundRequest) -> io::Result<tokio::net::TcpStream> {
    let url = ParsedUrl::parse(&request.url).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid URL: {}", request.url))
    })?;
    let mut stream = tokio::net::TcpStream::connect((url.host.as_str(), url.port_or_default())).await?;
    let head = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        request.method, url.path, url.host
    );
    stream.write_all(head.as_bytes()).await?;
    Ok(stream)
}
