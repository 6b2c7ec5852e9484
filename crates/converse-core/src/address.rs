//! SIP address parsing and dial-target normalization
//!
//! Dialed numbers arrive in whatever shape the telephony subsystem hands us:
//! `tel:` URIs, bare numbers, `user@host` pairs or full `sip:` URIs. Everything
//! is normalized into a [`SipAddress`] before any connection is requested, so an
//! unusable target fails before the call becomes visible.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::CallSetupError;

/// URI scheme of a SIP address
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

/// A parsed `sip:`/`sips:` address
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SipAddress {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl SipAddress {
    /// Parse a full SIP URI. URI parameters and headers are dropped.
    ///
    /// Name-addr identities (`"Bob" <sip:bob@example.com>`) are accepted; the
    /// display name is discarded, see [`caller_name`] to keep it.
    pub fn parse(raw: &str) -> Result<Self, CallSetupError> {
        let trimmed = strip_name_addr(raw)?;
        let (scheme, rest) = if let Some(rest) = strip_prefix_ci(trimmed, "sips:") {
            (Scheme::Sips, rest)
        } else if let Some(rest) = strip_prefix_ci(trimmed, "sip:") {
            (Scheme::Sip, rest)
        } else {
            return Err(CallSetupError::invalid_address(raw, "missing sip: scheme"));
        };

        let rest = rest.split(['?', ';']).next().unwrap_or_default();

        let (user, host_port) = match rest.rsplit_once('@') {
            Some((user, host_port)) => {
                if user.is_empty() {
                    return Err(CallSetupError::invalid_address(raw, "empty user part"));
                }
                if !user.chars().all(is_user_char) {
                    return Err(CallSetupError::invalid_address(raw, "invalid character in user part"));
                }
                (Some(user.to_string()), host_port)
            }
            None => (None, rest),
        };

        // Bracketed IPv6 hosts carry colons of their own
        let split_at = match host_port.rfind(']') {
            Some(close) => host_port[close..].find(':').map(|i| close + i),
            None => host_port.rfind(':'),
        };
        let (host, port) = match split_at {
            Some(idx) => {
                let port = host_port[idx + 1..]
                    .parse::<u16>()
                    .map_err(|_| CallSetupError::invalid_address(raw, "invalid port"))?;
                (&host_port[..idx], Some(port))
            }
            None => (host_port, None),
        };

        if host.is_empty() {
            return Err(CallSetupError::invalid_address(raw, "empty host"));
        }
        if !host.chars().all(is_host_char) {
            return Err(CallSetupError::invalid_address(raw, "invalid character in host"));
        }

        Ok(Self {
            scheme,
            user,
            host: host.to_string(),
            port,
        })
    }

    /// Display form shown to the user: the address without its scheme
    pub fn display_name(&self) -> String {
        let rendered = self.to_string();
        match self.scheme {
            Scheme::Sip => rendered.trim_start_matches("sip:").to_string(),
            Scheme::Sips => rendered.trim_start_matches("sips:").to_string(),
        }
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Sip => write!(f, "sip:")?,
            Scheme::Sips => write!(f, "sips:")?,
        }
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// Turn a dialed target into a routable SIP address.
///
/// - `tel:` URIs and bare numbers become `sip:<number>@<dial_domain>`,
///   with visual separators removed
/// - `user@host` gets a `sip:` scheme
/// - `sip:`/`sips:` URIs are parsed as-is
pub fn normalize_dial_target(raw: &str, dial_domain: &str) -> Result<SipAddress, CallSetupError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CallSetupError::invalid_address(raw, "empty target"));
    }

    if strip_prefix_ci(trimmed, "sip:").is_some() || strip_prefix_ci(trimmed, "sips:").is_some() {
        return SipAddress::parse(trimmed);
    }

    let number = strip_prefix_ci(trimmed, "tel:").unwrap_or(trimmed);
    if number.contains('@') {
        return SipAddress::parse(&format!("sip:{}", number));
    }

    let user: String = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    if user.is_empty() {
        return Err(CallSetupError::invalid_address(raw, "empty number"));
    }
    if !user.chars().all(is_user_char) {
        return Err(CallSetupError::invalid_address(raw, "invalid character in number"));
    }

    SipAddress::parse(&format!("sip:{}@{}", user, dial_domain))
}

/// Display name of a name-addr identity, without quotes
pub fn caller_name(raw: &str) -> Option<String> {
    let (name, _) = raw.trim().split_once('<')?;
    let name = name.trim().trim_matches('"').trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// The URI inside `<...>`, or the whole input when unbracketed
fn strip_name_addr(raw: &str) -> Result<&str, CallSetupError> {
    let trimmed = raw.trim();
    match (trimmed.find('<'), trimmed.rfind('>')) {
        (None, None) => Ok(trimmed),
        (Some(open), Some(close)) if open < close => Ok(trimmed[open + 1..close].trim()),
        _ => Err(CallSetupError::invalid_address(raw, "unbalanced angle brackets")),
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s.is_char_boundary(prefix.len()) && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn is_user_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()&=+$,;?/#%".contains(c)
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.[]:".contains(c)
}
