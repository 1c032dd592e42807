use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not parse IP [{0}]")]
    InvalidAddress(String),

    #[error("could not parse hostname [{0}]")]
    InvalidHostname(String),

    #[error("change set action must be add or delete, got [{0}]")]
    InvalidAction(String),

    #[error("send request to dns backend failed: {0}")]
    Connectivity(#[from] reqwest::Error),

    #[error("decode dns backend response failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("dns backend rejected change: {0}")]
    Rejected(String),

    #[error("record not found for hostname [{0}]")]
    RecordNotFound(String),

    #[error("dns backend is unreachable")]
    Unreachable,
}
