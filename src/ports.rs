use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, ScanError};

/// Ports scanned when no specification is given.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 1..=1024;

/// Curated set of commonly used service ports for `--well-known` scans.
pub const WELL_KNOWN_PORTS: &[u16] = &[
    20, 21, 22, 23, 25, 53, 67, 68, 69, 80, 88, 110, 123, 135, 139, 143, 161, 162, 389, 443, 445,
    465, 514, 587, 631, 636, 993, 995, 1080, 1194, 1433, 1521, 1723, 2049, 3306, 3389, 5900, 6379,
    8000, 8080, 8443,
];

/// A deduplicated set of TCP ports in 1..=65535, iterated in ascending order.
///
/// The `Display` form is canonical spec text (`22,80,8000-8002`) and parses
/// back to the same set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortSet(BTreeSet<u16>);

impl PortSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.contains(&port)
    }

    /// Ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.iter().collect()
    }

    fn non_empty(self) -> Result<Self> {
        if self.is_empty() {
            return Err(ScanError::EmptyPortSet);
        }
        Ok(self)
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut ports = self.iter().peekable();
        while let Some(low) = ports.next() {
            let mut high = low;
            while high < u16::MAX && ports.peek() == Some(&(high + 1)) {
                high = ports.next().unwrap_or(high);
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if low == high {
                write!(f, "{low}")?;
            } else {
                write!(f, "{low}-{high}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for PortSet {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let mut set = PortSet::default();
        parse_spec_into(&mut set, s)?;
        set.non_empty()
    }
}

/// Parse a port specification into a [`PortSet`].
///
/// Grammar: comma-separated tokens, each a port (`80`) or an inclusive range
/// (`8000-8010`). Whitespace around tokens is ignored and empty tokens are
/// skipped. `None` selects `default`.
pub fn parse_port_spec(spec: Option<&str>, default: RangeInclusive<u16>) -> Result<PortSet> {
    match spec {
        Some(s) => s.parse(),
        None => {
            let (low, high) = (*default.start(), *default.end());
            if low == 0 {
                return Err(ScanError::PortOutOfRange(0));
            }
            if low > high {
                return Err(ScanError::InvalidRange(low, high));
            }
            PortSet(default.collect()).non_empty()
        }
    }
}

/// The fixed well-known preset. Never consults a textual spec.
pub fn well_known_ports() -> PortSet {
    PortSet(WELL_KNOWN_PORTS.iter().copied().collect())
}

/// Parse ports file content into a [`PortSet`].
///
/// Each line holds a spec fragment (`22`, `8000-8010`, `80,443`). Everything
/// after `#` is a comment; blank lines are ignored. `path` only labels errors.
pub fn parse_ports_file_str(content: &str, path: &Path) -> Result<PortSet> {
    let mut set = PortSet::default();
    for (idx, raw_line) in content.lines().enumerate() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        parse_spec_into(&mut set, line).map_err(|e| ScanError::PortsFile {
            path: path.to_path_buf(),
            reason: format!("line {}: {e}", idx + 1),
        })?;
    }
    set.non_empty()
}

/// Load a ports list from a file path.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<PortSet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ScanError::PortsFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_ports_file_str(&content, path)
}

fn parse_spec_into(set: &mut PortSet, spec: &str) -> Result<()> {
    for raw in spec.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }

        if let Some((a, b)) = token.split_once('-') {
            let low = parse_port_number(token, a.trim())?;
            let high = parse_port_number(token, b.trim())?;
            if low > high {
                return Err(ScanError::InvalidRange(low, high));
            }
            set.0.extend(low..=high);
            continue;
        }

        set.0.insert(parse_port_number(token, token)?);
    }
    Ok(())
}

fn parse_port_number(token: &str, s: &str) -> Result<u16> {
    let invalid = || ScanError::InvalidPortSpec(token.to_string());
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    // All digits, so a failed parse can only be overflow.
    let val: u32 = s.parse().unwrap_or(u32::MAX);
    if val == 0 || val > u32::from(u16::MAX) {
        return Err(ScanError::PortOutOfRange(val));
    }
    Ok(val as u16)
}
