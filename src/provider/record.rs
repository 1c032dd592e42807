use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;

use crate::provider::error::Error;

lazy_static! {
    // RFC-1123 hostname: lowercase alphanumeric labels, optionally hyphenated
    // inside, separated by dots.
    static ref HOSTNAME: Regex =
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
            .unwrap();
}

/// A single hostname -> IP mapping held by the dns backend.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HostRecord {
    pub hostname: String,
    pub ip: IpAddr,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Action {
    Add,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Delete => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "add" => Ok(Action::Add),
            "delete" => Ok(Action::Delete),
            _ => Err(Error::InvalidAction(action.to_string())),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, single intended mutation of one [`HostRecord`]. Immutable
/// once constructed, never partially valid.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChangeSet {
    pub record: HostRecord,
    pub action: Action,
}

impl ChangeSet {
    pub fn create(ip: &str, hostname: &str, action: &str) -> Result<Self, Error> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| Error::InvalidAddress(ip.to_string()))?;

        if !is_valid_hostname(hostname) {
            return Err(Error::InvalidHostname(hostname.to_string()));
        }

        let action: Action = action.parse()?;

        info!(%ip, hostname, %action, "create change set");

        Ok(Self {
            record: HostRecord {
                hostname: hostname.to_string(),
                ip,
            },
            action,
        })
    }
}

pub fn is_valid_hostname(hostname: &str) -> bool {
    // dotted IPv4 literals satisfy the label grammar, a record keyed by
    // one would shadow a real address lookup
    if hostname.parse::<IpAddr>().is_ok() {
        return false;
    }

    HOSTNAME.is_match(hostname)
}
