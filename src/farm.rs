#![allow(clippy::module_name_repetitions)]
/*!
Compile-farm host directive helpers (diagnostics only).

The launcher passes the directive through untouched; this module exists so the
`doctor` command can explain a directive and probe its endpoints.

Grammar (whitespace separated):
- `--randomize` and other `--option[=value]` words
- `localhost[/LIMIT]`
- `HOST[:PORT][/LIMIT][,lzo][,cpp][,auth]`
- `[USER]@HOST[/LIMIT][,lzo]` (ssh transport)
*/
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

/// distccd's well-known port.
pub const DEFAULT_PORT: u16 = 3632;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Transport {
    Tcp,
    Ssh,
    Local,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FarmHost {
    pub host: String,
    pub port: Option<u16>,
    pub limit: Option<u32>,
    pub transport: Transport,
    pub lzo: bool,
    /// Remaining comma options such as `cpp` or `auth`.
    pub flags: Vec<String>,
}

impl FarmHost {
    /// TCP endpoint to probe, when the transport has one.
    pub fn endpoint(&self) -> Option<(String, u16)> {
        match self.transport {
            Transport::Tcp => Some((self.host.clone(), self.port.unwrap_or(DEFAULT_PORT))),
            Transport::Ssh | Transport::Local => None,
        }
    }
}

impl fmt::Display for FarmHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            Transport::Ssh if !self.host.contains('@') => write!(f, "@{}", self.host)?,
            _ if self.host.contains(':') => write!(f, "[{}]", self.host)?,
            _ => f.write_str(&self.host)?,
        }
        if let Some(p) = self.port {
            write!(f, ":{p}")?;
        }
        if let Some(l) = self.limit {
            write!(f, "/{l}")?;
        }
        if self.lzo {
            f.write_str(",lzo")?;
        }
        for flag in &self.flags {
            write!(f, ",{flag}")?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct HostDirective {
    pub randomize: bool,
    /// Other `--option` words, kept verbatim.
    pub options: Vec<String>,
    pub hosts: Vec<FarmHost>,
}

impl HostDirective {
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut d = HostDirective::default();
        for word in s.split_whitespace() {
            if word == "--randomize" {
                d.randomize = true;
            } else if word.starts_with("--") {
                d.options.push(word.to_string());
            } else {
                d.hosts.push(parse_host(word)?);
            }
        }
        if d.hosts.is_empty() {
            return Err("no hosts in directive".to_string());
        }
        Ok(d)
    }

    pub fn endpoints(&self) -> Vec<(String, u16)> {
        self.hosts.iter().filter_map(FarmHost::endpoint).collect()
    }

    pub fn compression(&self) -> bool {
        self.hosts.iter().any(|h| h.lzo)
    }
}

impl fmt::Display for HostDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut words: Vec<String> = Vec::new();
        if self.randomize {
            words.push("--randomize".to_string());
        }
        words.extend(self.options.iter().cloned());
        words.extend(self.hosts.iter().map(ToString::to_string));
        f.write_str(&words.join(" "))
    }
}

fn parse_host(word: &str) -> Result<FarmHost, String> {
    let mut parts = word.split(',');
    let head = parts.next().unwrap_or_default();
    let mut lzo = false;
    let mut flags = Vec::new();
    for opt in parts {
        match opt {
            "lzo" => lzo = true,
            "" => return Err(format!("empty option in host spec {word:?}")),
            other => flags.push(other.to_string()),
        }
    }

    let (addr, limit) = match head.rsplit_once('/') {
        Some((a, l)) => {
            let n = l
                .parse::<u32>()
                .map_err(|_| format!("invalid job limit {l:?} in host spec {word:?}"))?;
            (a, Some(n))
        }
        None => (head, None),
    };

    if addr == "localhost" {
        return Ok(FarmHost {
            host: addr.to_string(),
            port: None,
            limit,
            transport: Transport::Local,
            lzo,
            flags,
        });
    }

    if let Some(rest) = addr.strip_prefix('@') {
        return ssh_host(rest, word, limit, lzo, flags);
    }
    if addr.contains('@') {
        return ssh_host(addr, word, limit, lzo, flags);
    }

    let (host, port) = split_host_port(addr).map_err(|e| format!("{e} in host spec {word:?}"))?;
    if host.is_empty() {
        return Err(format!("empty host in host spec {word:?}"));
    }
    Ok(FarmHost {
        host,
        port,
        limit,
        transport: Transport::Tcp,
        lzo,
        flags,
    })
}

fn ssh_host(
    host: &str,
    word: &str,
    limit: Option<u32>,
    lzo: bool,
    flags: Vec<String>,
) -> Result<FarmHost, String> {
    if host.is_empty() || host.ends_with('@') {
        return Err(format!("empty ssh host in host spec {word:?}"));
    }
    Ok(FarmHost {
        host: host.to_string(),
        port: None,
        limit,
        transport: Transport::Ssh,
        lzo,
        flags,
    })
}

fn split_host_port(addr: &str) -> Result<(String, Option<u16>), String> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| "unterminated '['".to_string())?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None if tail.is_empty() => None,
            None => return Err(format!("unexpected {tail:?} after address")),
        };
        return Ok((host.to_string(), port));
    }
    match addr.split_once(':') {
        Some((h, p)) => Ok((h.to_string(), Some(parse_port(p)?))),
        None => Ok((addr.to_string(), None)),
    }
}

fn parse_port(p: &str) -> Result<u16, String> {
    match p.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port {p:?}")),
        Ok(n) => Ok(n),
    }
}

/// Best-effort TCP reachability check.
pub fn is_host_port_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        debug!(host, port, "farm host does not resolve");
        return false;
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProbeResult {
    pub host: String,
    pub port: u16,
    pub reachable: bool,
}

/// Probe every TCP endpoint of `directive`.
pub fn probe_endpoints(directive: &HostDirective, timeout: Duration) -> Vec<ProbeResult> {
    directive
        .endpoints()
        .into_iter()
        .map(|(host, port)| {
            let reachable = is_host_port_reachable(&host, port, timeout);
            ProbeResult {
                host,
                port,
                reachable,
            }
        })
        .collect()
}
