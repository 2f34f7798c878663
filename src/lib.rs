//! SNMP Session - minimal SNMPv1 manager.
//!
//! This crate builds GetRequest and SetRequest messages for a single object
//! identifier, encodes them with the Basic Encoding Rules, sends them over UDP and
//! decodes the agent's GetResponse. Requests are retried on timeout with fixed
//! per-attempt waits (3000, 3000 and 500 ms by default).
//!
//! # Usage
//!
//! Read a value:
//! ```bash
//! snmp-session --agent-addr 192.168.1.1 1.3.6.1.2.1.1.5.0
//! ```
//!
//! Write a value:
//! ```bash
//! snmp-session -a 192.168.1.1 -c private --set 42 --value-type integer 1.3.6.1.2.1.1.7.0
//! ```

/// BER value codec and TLV decoding.
pub mod ber;
/// Command-line configuration and validation.
pub mod configuration;
/// Request/response exchange and retry policy.
pub mod exchange;
/// Object identifier encoding.
pub mod oid;
/// SNMPv1 message and PDU structures.
pub mod pdu;
/// Get/set session against one agent.
pub mod session;
/// Datagram transport abstraction and UDP implementation.
pub mod transport;

pub use exchange::{RetryPolicy, SnmpError};
pub use session::Session;
