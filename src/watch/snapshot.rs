use std::net::IpAddr;

use k8s_openapi::api::core::v1::{LoadBalancerStatus, Service};
use k8s_openapi::api::networking::v1::Ingress;

use crate::watch::error::Error;

/// Opt-in marker for ingress resources, the value must be the literal "true".
pub const INGRESS_ANNOTATION: &str = "holedns.io/ingress";

/// Opt-in marker for load balancer services, the value is the hostname to
/// publish.
pub const DOMAIN_ANNOTATION: &str = "holedns.io/domain";

const LOAD_BALANCER_TYPE: &str = "LoadBalancer";

/// Point-in-time view of an Ingress or Service, reduced to the fields the
/// reconciliation core depends on. Built fresh on every event, never mutated;
/// an update is a pair of snapshots.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    pub name: String,
    pub namespace: String,
    pub hostnames: Vec<String>,
    pub managed: bool,
    pub lb_addresses: Vec<String>,
}

impl ResourceSnapshot {
    pub fn from_ingress(ingress: &Ingress, manage_all: bool) -> Self {
        let managed = manage_all
            || ingress
                .metadata
                .annotations
                .as_ref()
                .and_then(|annotations| annotations.get(INGRESS_ANNOTATION))
                .map(|value| value == "true")
                .unwrap_or(false);

        let hostnames = ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.rules.as_ref())
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|rule| rule.host.clone())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: ingress.metadata.name.clone().unwrap_or_default(),
            namespace: ingress.metadata.namespace.clone().unwrap_or_default(),
            hostnames,
            managed,
            lb_addresses: lb_addresses(
                ingress
                    .status
                    .as_ref()
                    .and_then(|status| status.load_balancer.as_ref()),
            ),
        }
    }

    pub fn from_service(service: &Service) -> Self {
        let is_load_balancer = service
            .spec
            .as_ref()
            .and_then(|spec| spec.type_.as_ref())
            .map(|type_| type_ == LOAD_BALANCER_TYPE)
            .unwrap_or(false);

        let domain = service
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(DOMAIN_ANNOTATION))
            .cloned();

        let managed = is_load_balancer && domain.is_some();

        Self {
            name: service.metadata.name.clone().unwrap_or_default(),
            namespace: service.metadata.namespace.clone().unwrap_or_default(),
            hostnames: domain.into_iter().collect(),
            managed,
            lb_addresses: lb_addresses(
                service
                    .status
                    .as_ref()
                    .and_then(|status| status.load_balancer.as_ref()),
            ),
        }
    }

    pub fn has_lb_address(&self) -> bool {
        !self.lb_addresses.is_empty()
    }

    /// The externally reachable address, requiring exactly one.
    pub fn single_lb_ip(&self) -> Result<IpAddr, Error> {
        match self.lb_addresses.as_slice() {
            [] => Err(Error::NoLoadBalancerIp),
            [addr] => Ok(addr.parse()?),
            _ => Err(Error::MultipleLoadBalancerIps),
        }
    }
}

fn lb_addresses(load_balancer: Option<&LoadBalancerStatus>) -> Vec<String> {
    load_balancer
        .and_then(|lb| lb.ingress.as_ref())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.ip.clone())
                .collect()
        })
        .unwrap_or_default()
}
