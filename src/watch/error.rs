use thiserror::Error;

use crate::provider;

#[derive(Error, Debug)]
pub enum Error {
    #[error("resource was not assigned a load balancer address in time")]
    NoLoadBalancerIp,

    #[error("only single load balancer address resources are supported")]
    MultipleLoadBalancerIps,

    #[error("parse load balancer address failed: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Provider(#[from] provider::Error),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}
