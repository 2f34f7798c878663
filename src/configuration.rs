pub use clap::{Parser, ValueEnum};
use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use thiserror::Error;

use crate::{ber::MAX_ENCODABLE_INTEGER, exchange::RetryPolicy, oid::Oid};

/// Errors found while validating the configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid OID: {0}")]
    InvalidOid(String),
    #[error("At least one attempt timeout is required")]
    NoTimeouts,
    #[error("Attempt timeouts must be greater than zero")]
    ZeroTimeout,
    #[error("Integer value '{0}' is not in 0..={MAX_ENCODABLE_INTEGER}")]
    InvalidInteger(String),
}

/// How the `--set` value is encoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ValueType {
    /// INTEGER.
    Integer,
    /// OCTET STRING, or IpAddress for a dotted quad.
    String,
}

/// Operation requested on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Get,
    SetInteger(i64),
    SetString(String),
}

/// Command-line configuration.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Configuration {
    /// Agent address
    #[arg(short, long, default_value = "127.0.0.1")]
    pub agent_addr: IpAddr,
    /// Agent UDP port
    #[arg(short = 'p', long, default_value_t = 161)]
    pub agent_port: u16,
    /// Local address to bind for
    #[arg(short, long, default_value = "0.0.0.0")]
    pub local_addr: IpAddr,
    /// Local UDP port (0 picks an ephemeral port)
    #[arg(short = 'o', long, default_value_t = 0)]
    pub local_port: u16,
    /// Community string
    #[arg(short, long, default_value = "public")]
    pub community: String,
    /// Object identifier, e.g. 1.3.6.1.2.1.1.5.0
    pub oid: String,
    /// Send a SetRequest with this value instead of a GetRequest
    #[arg(short, long)]
    pub set: Option<String>,
    /// Type of the --set value
    #[arg(short = 't', long, value_enum, default_value_t = ValueType::String)]
    pub value_type: ValueType,
    /// Wait per attempt in milliseconds, one entry per send
    #[arg(long, value_delimiter = ',', default_value = "3000,3000,500")]
    pub timeouts: Vec<u64>,
}

impl Configuration {
    /// Checks the configuration before anything is sent.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let oid = Oid::parse(&self.oid)
            .map_err(|e| ConfigurationError::InvalidOid(e.to_string()))?;
        oid.to_ber()
            .map_err(|e| ConfigurationError::InvalidOid(e.to_string()))?;

        if self.timeouts.is_empty() {
            return Err(ConfigurationError::NoTimeouts);
        }
        if self.timeouts.contains(&0) {
            return Err(ConfigurationError::ZeroTimeout);
        }

        self.operation()?;
        Ok(())
    }

    /// Returns the operation selected by `--set` and `--value-type`.
    pub fn operation(&self) -> Result<Operation, ConfigurationError> {
        match (&self.set, self.value_type) {
            (None, _) => Ok(Operation::Get),
            (Some(value), ValueType::Integer) => {
                Ok(Operation::SetInteger(self.integer_value(value)?))
            }
            (Some(value), ValueType::String) => Ok(Operation::SetString(value.clone())),
        }
    }

    /// Parses an integer `--set` value.
    pub fn integer_value(&self, value: &str) -> Result<i64, ConfigurationError> {
        value
            .parse::<i64>()
            .ok()
            .filter(|v| (0..=MAX_ENCODABLE_INTEGER).contains(v))
            .ok_or_else(|| ConfigurationError::InvalidInteger(value.to_string()))
    }

    /// Returns the retry policy built from `--timeouts`.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigurationError> {
        RetryPolicy::new(
            self.timeouts
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
        )
        .ok_or(ConfigurationError::NoTimeouts)
    }

    /// Returns the local socket address.
    pub fn local_socket(&self) -> SocketAddr {
        (self.local_addr, self.local_port).into()
    }

    /// Returns the agent socket address.
    pub fn agent_socket(&self) -> SocketAddr {
        (self.agent_addr, self.agent_port).into()
    }
}
