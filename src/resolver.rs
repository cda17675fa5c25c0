use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV6};

use serde::{Deserialize, Serialize};
use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{Result, ScanError};

/// Which resolved addresses get scanned.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    #[default]
    Any,
}

impl AddressFamily {
    /// Family of a concrete address. Never returns `Any`.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn admits(self, ip: &IpAddr) -> bool {
        self == AddressFamily::Any || self == AddressFamily::of(ip)
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressFamily::Ipv4 => "IPv4",
            AddressFamily::Ipv6 => "IPv6",
            AddressFamily::Any => "any",
        })
    }
}

/// One address the target resolved to, tagged by family.
///
/// `scope_id` is the IPv6 zone (interface index) for link-local addresses and
/// 0 otherwise.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    pub ip: IpAddr,
    pub family: AddressFamily,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub scope_id: u32,
}

impl ResolvedAddress {
    /// Socket address for `port`, carrying the IPv6 scope.
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        match self.ip {
            IpAddr::V6(v6) => SocketAddr::V6(SocketAddrV6::new(v6, port, 0, self.scope_id)),
            IpAddr::V4(_) => SocketAddr::new(self.ip, port),
        }
    }
}

impl From<IpAddr> for ResolvedAddress {
    fn from(ip: IpAddr) -> Self {
        Self {
            ip,
            family: AddressFamily::of(&ip),
            scope_id: 0,
        }
    }
}

impl From<SocketAddr> for ResolvedAddress {
    fn from(sa: SocketAddr) -> Self {
        let scope_id = match sa {
            SocketAddr::V6(v6) => v6.scope_id(),
            SocketAddr::V4(_) => 0,
        };
        Self {
            scope_id,
            ..Self::from(sa.ip())
        }
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope_id != 0 {
            write!(f, "{}%{} ({})", self.ip, self.scope_id, self.family)
        } else {
            write!(f, "{} ({})", self.ip, self.family)
        }
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Resolve `target` to the addresses that will be scanned.
///
/// IP literals (including bracketed IPv6 such as `[::1]` and numeric zones
/// such as `fe80::1%2`) skip the lookup. Hostnames and literals with a named
/// zone (`fe80::1%eth0`) go through a single system resolver call. Resolver order is kept,
/// repeated addresses are dropped, and addresses outside `family` are filtered
/// out. An empty result is an error.
pub async fn resolve(target: &str, family: AddressFamily) -> Result<Vec<ResolvedAddress>> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(resolution_error(target, "empty target"));
    }

    let candidates: Vec<ResolvedAddress> = match parse_ip_literal(trimmed) {
        Some(addr) => vec![addr],
        None => lookup_host((unbracket(trimmed), 0))
            .await
            .map_err(|e| resolution_error(target, e))?
            .map(ResolvedAddress::from)
            .collect(),
    };

    let addrs = select_addresses(candidates, family);
    if addrs.is_empty() {
        let reason = match family {
            AddressFamily::Any => "no addresses found".to_string(),
            other => format!("no {other} addresses found"),
        };
        return Err(resolution_error(target, reason));
    }

    debug!(host = target, %family, count = addrs.len(), "resolved target");
    Ok(addrs)
}

/// Keep resolver order, drop duplicates, filter by family.
pub fn select_addresses<I>(candidates: I, family: AddressFamily) -> Vec<ResolvedAddress>
where
    I: IntoIterator,
    I::Item: Into<ResolvedAddress>,
{
    let mut out: Vec<ResolvedAddress> = Vec::new();
    for addr in candidates.into_iter().map(Into::into) {
        if family.admits(&addr.ip) && !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

fn unbracket(s: &str) -> &str {
    s.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(s)
}

fn parse_ip_literal(s: &str) -> Option<ResolvedAddress> {
    let inner = unbracket(s);
    if let Some((ip, zone)) = inner.split_once('%') {
        let ip: Ipv6Addr = ip.parse().ok()?;
        let scope_id: u32 = zone.parse().ok()?;
        let sa = SocketAddrV6::new(ip, 0, 0, scope_id);
        return Some(ResolvedAddress::from(SocketAddr::V6(sa)));
    }
    inner.parse::<IpAddr>().ok().map(ResolvedAddress::from)
}

fn resolution_error(target: &str, reason: impl ToString) -> ScanError {
    ScanError::Resolution {
        target: target.to_string(),
        reason: reason.to_string(),
    }
}
