use std::fmt;

use thiserror::Error;

use crate::settings::DefaultRole;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Detecting physical interfaces: {0:#}")]
    Discovery(anyhow::Error),

    #[error("Creating interface configurations: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Writing network configuration: {0:#}")]
    Persistence(anyhow::Error),

    #[error("Validating {0} configuration: {1}")]
    Validation(ValidationTarget, String),

    #[error("Broadcasting interface addresses: {0:#}")]
    Broadcast(anyhow::Error),
}

/// What a post-write check looked at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationTarget {
    StaticNetwork,
    Dns,
}

impl fmt::Display for ValidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationTarget::StaticNetwork => write!(f, "static network"),
            ValidationTarget::Dns => write!(f, "dns"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("invalid {field} '{value}' for network '{network}'")]
    InvalidLiteral {
        network: String,
        field: &'static str,
        value: String,
    },

    #[error("missing {field} for static network '{network}'")]
    MissingLiteral {
        network: String,
        field: &'static str,
    },

    #[error("networks '{first}' and '{second}' both claim default {role}")]
    ConflictingDefault {
        role: DefaultRole,
        first: String,
        second: String,
    },

    #[error("cannot choose an interface for networks without a MAC address: {networks:?}")]
    AmbiguousBinding { networks: Vec<String> },

    #[error("cannot bind network '{network}' without a MAC address to {candidates} unclaimed interfaces")]
    NoInterfaceAvailable { network: String, candidates: usize },

    #[error("interface {interface} is claimed by networks '{first}' and '{second}'")]
    InterfaceClaimedTwice {
        interface: String,
        first: String,
        second: String,
    },
}
