//! Connection endpoints.
//!
//! An [`Endpoint`] is parsed once, when it is supplied, and is immutable afterwards.
//! Parsing only checks structure:
//!
//! ```text
//! scheme://[user[:password]@]host[:port][,host[:port]...][/path][?options]
//! ```
//!
//! Whether the scheme is usable is decided by the connector that receives it.
//! Nothing here performs I/O, so a malformed endpoint is always rejected before
//! any network attempt.

use std::{fmt, str::FromStr};

use crate::error::ConnectionError;

const REDACTED: &str = "****";

/// One `host[:port]` entry of an endpoint's host list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub name: String,
    pub port: Option<u16>,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) if self.name.contains(':') => write!(f, "[{}]:{}", self.name, port),
            Some(port) => write!(f, "{}:{}", self.name, port),
            None if self.name.contains(':') => write!(f, "[{}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A validated connection string identifying a database instance.
///
/// `Display` and `Debug` hide the password. Use [`Endpoint::as_str`] only when
/// handing the endpoint to a driver.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    raw: String,
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    hosts: Vec<Host>,
    path: Option<String>,
    options: Option<String>,
}

impl Endpoint {
    /// Parses and validates a connection string.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidEndpoint`] if the string is empty,
    /// contains whitespace, lacks a scheme or host, or has a malformed port.
    pub fn parse(raw: &str) -> Result<Self, ConnectionError> {
        let invalid = |reason: &str| ConnectionError::InvalidEndpoint {
            endpoint: redact_raw(raw),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("endpoint is empty"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(invalid("endpoint must not contain whitespace"));
        }

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| invalid("missing '://' after the scheme"))?;

        if !is_valid_scheme(scheme) {
            return Err(invalid("scheme must start with a letter and contain only letters, digits, '+', '-' or '.'"));
        }

        let (rest, options) = match rest.split_once('?') {
            Some((rest, options)) => (rest, Some(options)),
            None => (rest, None),
        };
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (rest, None),
        };
        let (userinfo, host_list) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            Some(userinfo) => {
                let (user, password) = match userinfo.split_once(':') {
                    Some((user, password)) => (user, Some(password.to_string())),
                    None => (userinfo, None),
                };
                if user.is_empty() {
                    return Err(invalid("credentials are present but the username is empty"));
                }
                (Some(user.to_string()), password)
            }
            None => (None, None),
        };

        if host_list.is_empty() {
            return Err(invalid("missing host"));
        }

        let hosts = host_list
            .split(',')
            .map(|entry| parse_host(entry).map_err(|reason| invalid(&reason)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_ascii_lowercase(),
            username,
            password,
            hosts,
            path: path.filter(|p| !p.is_empty()).map(str::to_string),
            options: options.filter(|o| !o.is_empty()).map(str::to_string),
        })
    }

    /// The connection string exactly as supplied, credentials included.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The lowercased scheme, e.g. `mongodb`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The host list. Never empty.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// The first host in the list.
    pub fn primary_host(&self) -> &Host {
        &self.hosts[0]
    }

    /// The path segment after the host list, without the leading `/`.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The raw option string after `?`.
    pub fn options(&self) -> Option<&str> {
        self.options.as_deref()
    }

    /// The connection string with the password replaced.
    pub fn redacted(&self) -> String {
        redact_raw(&self.raw)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Endpoint").field(&self.redacted()).finish()
    }
}

impl FromStr for Endpoint {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl TryFrom<&str> for Endpoint {
    type Error = ConnectionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Endpoint::parse(value)
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

fn parse_host(entry: &str) -> Result<Host, String> {
    if entry.is_empty() {
        return Err("empty entry in host list".to_string());
    }

    // IPv6 literal: [addr] or [addr]:port
    if let Some(bracketed) = entry.strip_prefix('[') {
        let (address, after) = bracketed
            .split_once(']')
            .ok_or_else(|| format!("unterminated IPv6 literal in '{entry}'"))?;
        if address.is_empty() {
            return Err("empty IPv6 literal".to_string());
        }
        let port = match after {
            "" => None,
            _ => Some(parse_port(
                after
                    .strip_prefix(':')
                    .ok_or_else(|| format!("unexpected characters after IPv6 literal in '{entry}'"))?,
            )?),
        };
        return Ok(Host { name: address.to_string(), port });
    }

    let (name, port) = match entry.rsplit_once(':') {
        Some((name, port)) => (name, Some(parse_port(port)?)),
        None => (entry, None),
    };

    if name.is_empty() {
        return Err(format!("missing host name in '{entry}'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '%'))
    {
        return Err(format!("invalid character in host name '{name}'"));
    }

    Ok(Host { name: name.to_string(), port })
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{port}'")),
        Ok(port) => Ok(port),
    }
}

/// Best-effort password redaction that also works on strings that failed to parse.
pub(crate) fn redact_raw(raw: &str) -> String {
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = raw[authority_start..]
        .find(['/', '?'])
        .map(|i| authority_start + i)
        .unwrap_or(raw.len());
    let authority = &raw[authority_start..authority_end];

    let Some(at) = authority.rfind('@') else {
        return raw.to_string();
    };
    let userinfo = &authority[..at];

    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:{}{}",
            &raw[..authority_start],
            &userinfo[..colon],
            REDACTED,
            &raw[authority_start + at..],
        ),
        None => raw.to_string(),
    }
}
