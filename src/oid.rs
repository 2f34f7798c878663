//! Object identifiers and their BER sub-identifier encoding.
//!
//! The first two arcs are folded into a single sub-identifier (`40 * arc0 + arc1`),
//! every following arc is written in base-128 with the continuation bit (0x80)
//! set on all bytes but the last.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors that can occur while parsing or encoding an object identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OidError {
    /// Fewer than two arcs were given.
    #[error("OID needs at least two arcs, got {0}")]
    TooShort(usize),

    /// An arc is not a non-negative integer that fits in 32 bits.
    #[error("Invalid OID arc '{0}'")]
    InvalidArc(String),

    /// The leading arc pair cannot be folded into one sub-identifier.
    #[error("Invalid leading arcs {0}.{1}")]
    InvalidLeadingArcs(u32, u32),

    /// BER content ended in the middle of a sub-identifier.
    #[error("Truncated sub-identifier at offset {0}")]
    Truncated(usize),

    /// A sub-identifier does not fit in 32 bits.
    #[error("Sub-identifier overflows 32 bits at offset {0}")]
    Overflow(usize),
}

/// An SNMP object identifier, e.g. `1.3.6.1.2.1.1.5.0`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    /// Creates an OID from its arcs.
    ///
    /// # Errors
    /// Returns `OidError::TooShort` when fewer than two arcs are given.
    pub fn from_arcs(arcs: &[u32]) -> Result<Self, OidError> {
        if arcs.len() < 2 {
            return Err(OidError::TooShort(arcs.len()));
        }
        Ok(Oid(arcs.to_vec()))
    }

    /// Parses a dotted-decimal OID. A single leading dot is accepted.
    pub fn parse(s: &str) -> Result<Self, OidError> {
        let body = s.strip_prefix('.').unwrap_or(s);
        let arcs = body
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| OidError::InvalidArc(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_arcs(&arcs)
    }

    /// Returns the arcs of this OID.
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Encodes the OID into BER sub-identifier bytes.
    ///
    /// Only the content octets are produced; the caller adds the 0x06 tag and length.
    ///
    /// # Errors
    /// Returns `OidError::InvalidLeadingArcs` when `arc0 > 2`, or when `arc0 < 2`
    /// and `arc1 >= 40`, since the folded value would be ambiguous.
    pub fn to_ber(&self) -> Result<Vec<u8>, OidError> {
        let (arc0, arc1) = (self.0[0], self.0[1]);
        if arc0 > 2 || (arc0 < 2 && arc1 >= 40) {
            return Err(OidError::InvalidLeadingArcs(arc0, arc1));
        }
        let first = arc0
            .checked_mul(40)
            .and_then(|v| v.checked_add(arc1))
            .ok_or(OidError::InvalidLeadingArcs(arc0, arc1))?;

        let mut buf = Vec::with_capacity(self.0.len() + 2);
        encode_subidentifier(&mut buf, first);
        for &arc in &self.0[2..] {
            encode_subidentifier(&mut buf, arc);
        }
        Ok(buf)
    }

    /// Decodes BER sub-identifier bytes back into an OID.
    ///
    /// The folded first sub-identifier is split back into two arcs.
    pub fn from_ber(data: &[u8]) -> Result<Self, OidError> {
        let mut pos = 0;
        let mut arcs = Vec::new();

        while pos < data.len() {
            let (value, used) = decode_subidentifier(&data[pos..], pos)?;
            if arcs.is_empty() {
                let arc0 = (value / 40).min(2);
                arcs.push(arc0);
                arcs.push(value - arc0 * 40);
            } else {
                arcs.push(value);
            }
            pos += used;
        }

        Self::from_arcs(&arcs)
    }
}

/// Appends one sub-identifier in base-128, most significant group first.
pub fn encode_subidentifier(buf: &mut Vec<u8>, value: u32) {
    if value <= 0x7F {
        buf.push(value as u8);
        return;
    }

    let mut groups = [0u8; 5];
    let mut count = 0;
    let mut rest = value;
    while rest > 0 {
        groups[count] = (rest & 0x7F) as u8;
        rest >>= 7;
        count += 1;
    }

    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0x00 };
        buf.push(groups[i] | continuation);
    }
}

/// Reads one base-128 sub-identifier, returning its value and the bytes consumed.
fn decode_subidentifier(data: &[u8], offset: usize) -> Result<(u32, usize), OidError> {
    let mut value: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if value > (u32::MAX >> 7) {
            return Err(OidError::Overflow(offset + i));
        }
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(OidError::Truncated(offset + data.len()))
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for Oid {
    type Err = OidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oid::parse(s)
    }
}
