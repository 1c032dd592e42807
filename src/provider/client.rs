use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use crate::provider::error::Error;
use crate::provider::record::{is_valid_hostname, ChangeSet, HostRecord};
use crate::provider::DnsBackend;

const API_PATH: &str = "/admin/api.php";
const PROBE_ATTEMPTS: u32 = 8;

/// Client for the pi-hole custom dns HTTP api.
///
/// The api is non-atomic and encodes failure ambiguously: every call answers
/// 200, success has to be read from the decoded body, and each body carries a
/// trailing diagnostic JSON object which must be ignored.
#[derive(Debug, Clone)]
pub struct PiholeClient {
    http: reqwest::Client,
    insecure: bool,
    address: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    data: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    success: bool,
    #[serde(default)]
    message: String,
}

impl PiholeClient {
    pub fn new(insecure: bool, address: &str, token: &str) -> Result<Self, Error> {
        if !is_valid_backend_address(address) {
            return Err(Error::InvalidHostname(address.to_string()));
        }

        info!(insecure, address, "create dns backend client");

        Ok(Self {
            http: reqwest::Client::new(),
            insecure,
            address: address.to_string(),
            token: token.to_string(),
        })
    }

    fn base_url(&self) -> String {
        let protocol = if self.insecure { "http" } else { "https" };

        // a bare IPv6 literal needs brackets inside a url authority
        if self.address.parse::<Ipv6Addr>().is_ok() {
            return format!("{}://[{}]{}", protocol, self.address, API_PATH);
        }

        format!("{}://{}{}", protocol, self.address, API_PATH)
    }

    #[instrument(err, skip(self))]
    pub async fn list_records(&self) -> Result<Vec<HostRecord>, Error> {
        let request = self
            .http
            .get(self.base_url())
            .query(&[
                ("customdns", ""),
                ("auth", self.token.as_str()),
                ("action", "get"),
            ])
            .build()?;

        // scary secrets
        debug!(url = %request.url(), "send list request");

        let body = self.http.execute(request).await?.text().await?;

        let response: RecordsResponse = decode_first(&body)?;

        let records = response
            .data
            .into_iter()
            .map(|(hostname, ip)| {
                let ip = ip
                    .parse()
                    .map_err(|_| Error::InvalidAddress(ip.to_string()))?;

                Ok(HostRecord { hostname, ip })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        debug!(?records, "list records done");

        Ok(records)
    }

    #[instrument(err, skip(self))]
    pub async fn apply_change(&self, change_set: &ChangeSet) -> Result<(), Error> {
        let ip = change_set.record.ip.to_string();

        let request = self
            .http
            .post(self.base_url())
            .query(&[
                ("customdns", ""),
                ("auth", self.token.as_str()),
                ("action", change_set.action.as_str()),
                ("ip", ip.as_str()),
                ("domain", change_set.record.hostname.as_str()),
            ])
            .build()?;

        debug!(url = %request.url(), "send change request");

        let body = self.http.execute(request).await?.text().await?;

        // the backend answers 200 even on logical failure, only the body
        // flag is trustworthy
        let response: StatusResponse = decode_first(&body)?;

        if !response.success {
            return Err(Error::Rejected(response.message));
        }

        info!(
            hostname = %change_set.record.hostname,
            ip = %change_set.record.ip,
            action = %change_set.action,
            "change applied"
        );

        Ok(())
    }

    /// Probe the backend with a lightweight read until it answers, riding out
    /// service startup races. Blocks the caller for the whole budget.
    #[instrument(err, skip(self))]
    pub async fn wait_until_reachable(&self) -> Result<(), Error> {
        for attempt in 1..=PROBE_ATTEMPTS {
            info!(attempt, "attempting to reach dns backend");

            match self.list_records().await {
                Ok(_) => {
                    info!("dns backend is reachable");

                    return Ok(());
                }

                Err(err) => {
                    warn!(attempt, %err, "dns backend probe failed");
                }
            }

            if attempt < PROBE_ATTEMPTS {
                time::sleep(Duration::from_secs(1 << attempt)).await;
            }
        }

        Err(Error::Unreachable)
    }
}

#[async_trait]
impl DnsBackend for PiholeClient {
    async fn list_records(&self) -> Result<Vec<HostRecord>, Error> {
        PiholeClient::list_records(self).await
    }

    async fn apply_change(&self, change_set: &ChangeSet) -> Result<(), Error> {
        PiholeClient::apply_change(self, change_set).await
    }
}

/// Accepts `host`, `host:port`, socket addresses and bare or bracketed IP
/// literals, IPv6 included.
fn is_valid_backend_address(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() || address.parse::<IpAddr>().is_ok() {
        return true;
    }

    if let Some(inner) = address.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        return inner.parse::<IpAddr>().is_ok();
    }

    let host = address.split(':').next().unwrap_or(address);

    is_valid_hostname(host) || host.parse::<IpAddr>().is_ok()
}

/// Decode only the first JSON value from a body of concatenated values,
/// discarding the trailing diagnostic object without error.
fn decode_first<'de, T: Deserialize<'de>>(body: &'de str) -> Result<T, Error> {
    let mut stream = serde_json::Deserializer::from_str(body).into_iter::<T>();

    match stream.next() {
        Some(value) => Ok(value?),
        None => Err(Error::Decode(<serde_json::Error as serde::de::Error>::custom(
            "empty response body",
        ))),
    }
}
