use std::env;
use std::fmt::{self, Debug, Formatter};
use std::net::IpAddr;

use anyhow::{Context, Result};

/// Process configuration, read once from the environment at startup.
#[derive(Clone)]
pub struct Config {
    /// Talk to the dns backend over plain http instead of tls.
    pub insecure: bool,

    /// Backend address, `host[:port]`.
    pub address: String,

    /// Backend api token.
    pub token: String,

    /// Manage every ingress object, not only annotated ones.
    pub manage_all_ingress: bool,

    /// Static external address for ingress hosts, bypasses status polling.
    pub ingress_external_ip: Option<IpAddr>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let address = env::var("HOLEDNS_HOST").context("HOLEDNS_HOST is not set")?;
        let token = env::var("HOLEDNS_TOKEN").context("HOLEDNS_TOKEN is not set")?;

        let ingress_external_ip = match env::var("HOLEDNS_INGRESS_EXTERNAL_IP") {
            Ok(value) => Some(
                value
                    .parse()
                    .context("HOLEDNS_INGRESS_EXTERNAL_IP is not a valid IP")?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            insecure: flag("HOLEDNS_INSECURE"),
            address,
            token,
            manage_all_ingress: flag("HOLEDNS_INGRESS_AUTO"),
            ingress_external_ip,
        })
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("insecure", &self.insecure)
            .field("address", &self.address)
            .field("token", &"<redacted>")
            .field("manage_all_ingress", &self.manage_all_ingress)
            .field("ingress_external_ip", &self.ingress_external_ip)
            .finish()
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|value| value == "true" || value == "1")
        .unwrap_or(false)
}
