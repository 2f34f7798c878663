//! SNMPv1 messages and PDUs.
//!
//! Messages are encoded bottom-up: every nested field is built first so each
//! enclosing SEQUENCE can be prefixed with the exact length of its content.
//! Decoding walks the structure instead of relying on fixed record positions.

use std::fmt;

use rand::Rng;

use crate::{
    ber::{
        decode_scalar, encode_integer, encode_octet_string, encode_tlv, latin1_bytes, BerError,
        ScalarValue, TlvRecord, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING, TAG_SEQUENCE,
    },
    oid::Oid,
};

/// SNMP version field value for v1.
pub const SNMP_VERSION_1: i64 = 0;

/// Range request ids are drawn from.
pub const REQUEST_ID_RANGE: std::ops::RangeInclusive<i64> = 1..=100;

/// PDU type, carried in the context-specific constructed tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetResponse,
    SetRequest,
}

impl PduKind {
    /// Returns the tag byte for this PDU type.
    pub fn to_byte(self) -> u8 {
        match self {
            PduKind::GetRequest => 0xA0,
            PduKind::GetResponse => 0xA2,
            PduKind::SetRequest => 0xA3,
        }
    }

    /// Parses a PDU tag byte.
    pub fn from_byte(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(PduKind::GetRequest),
            0xA2 => Some(PduKind::GetResponse),
            0xA3 => Some(PduKind::SetRequest),
            _ => None,
        }
    }
}

/// Error status reported by an agent in a GetResponse.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
}

impl ErrorStatus {
    /// Maps the wire value (0-5) to a status.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ErrorStatus::NoError),
            1 => Some(ErrorStatus::TooBig),
            2 => Some(ErrorStatus::NoSuchName),
            3 => Some(ErrorStatus::BadValue),
            4 => Some(ErrorStatus::ReadOnly),
            5 => Some(ErrorStatus::GenErr),
            _ => None,
        }
    }

    /// Returns the wire value of this status.
    pub fn code(self) -> u8 {
        match self {
            ErrorStatus::NoError => 0,
            ErrorStatus::TooBig => 1,
            ErrorStatus::NoSuchName => 2,
            ErrorStatus::BadValue => 3,
            ErrorStatus::ReadOnly => 4,
            ErrorStatus::GenErr => 5,
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorStatus::NoError => write!(f, "noError"),
            ErrorStatus::TooBig => write!(f, "tooBig"),
            ErrorStatus::NoSuchName => write!(f, "noSuchName"),
            ErrorStatus::BadValue => write!(f, "badValue"),
            ErrorStatus::ReadOnly => write!(f, "readOnly"),
            ErrorStatus::GenErr => write!(f, "genErr"),
        }
    }
}

/// A variable binding (OID + value).
///
/// The value is kept as its raw record; `scalar` decodes it on demand so a
/// response can be inspected before its value type is known to be supported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: TlvRecord,
}

impl VarBind {
    /// Creates a binding carrying an encoded scalar.
    pub fn new(oid: Oid, value: &ScalarValue) -> Result<Self, BerError> {
        Ok(VarBind {
            oid,
            value: value.to_record()?,
        })
    }

    /// Decodes the bound value.
    pub fn scalar(&self) -> Result<ScalarValue, BerError> {
        decode_scalar(&self.value)
    }

    /// Encodes `SEQUENCE { OBJECT IDENTIFIER, value }`.
    pub fn encode(&self) -> Result<Vec<u8>, BerError> {
        let oid_bytes = self.oid.to_ber()?;
        let mut content = encode_tlv(TAG_OBJECT_IDENTIFIER, &oid_bytes);
        content.extend_from_slice(&encode_tlv(self.value.tag, &self.value.payload));
        Ok(encode_tlv(TAG_SEQUENCE, &content))
    }

    fn decode(record: TlvRecord) -> Result<Self, BerError> {
        let fields = record.expect_tag(TAG_SEQUENCE)?.children()?;
        let mut fields = fields.into_iter();

        let oid_record = fields
            .next()
            .ok_or(BerError::MissingField("varbind name"))?
            .expect_tag(TAG_OBJECT_IDENTIFIER)?;
        let oid = Oid::from_ber(&oid_record.payload)?;

        let value = fields
            .next()
            .ok_or(BerError::MissingField("varbind value"))?;

        Ok(VarBind { oid, value })
    }
}

/// The operation-specific body of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i64,
    pub error_status: u64,
    pub error_index: u64,
    pub varbinds: Vec<VarBind>,
}

/// A complete SNMPv1 message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnmpMessage {
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl SnmpMessage {
    /// Builds a v1 request carrying a single variable binding.
    pub fn request(
        kind: PduKind,
        community: &str,
        request_id: i64,
        oid: Oid,
        value: ScalarValue,
    ) -> Result<Self, BerError> {
        Ok(SnmpMessage {
            version: SNMP_VERSION_1,
            community: latin1_bytes(community)?,
            pdu: Pdu {
                kind,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: vec![VarBind::new(oid, &value)?],
            },
        })
    }

    /// Builds a GetRequest; the value of the binding is NULL.
    pub fn get_request(community: &str, request_id: i64, oid: Oid) -> Result<Self, BerError> {
        Self::request(
            PduKind::GetRequest,
            community,
            request_id,
            oid,
            ScalarValue::Null,
        )
    }

    /// Builds a SetRequest with an INTEGER value.
    pub fn set_integer_request(
        community: &str,
        request_id: i64,
        oid: Oid,
        value: i64,
    ) -> Result<Self, BerError> {
        Self::request(
            PduKind::SetRequest,
            community,
            request_id,
            oid,
            ScalarValue::Integer(value),
        )
    }

    /// Builds a SetRequest from text, sent as IpAddress or OCTET STRING.
    pub fn set_string_request(
        community: &str,
        request_id: i64,
        oid: Oid,
        value: &str,
    ) -> Result<Self, BerError> {
        Self::request(
            PduKind::SetRequest,
            community,
            request_id,
            oid,
            ScalarValue::from_text(value)?,
        )
    }

    /// Serializes the message into the datagram to transmit.
    pub fn encode(&self) -> Result<Vec<u8>, BerError> {
        let mut varbind_list = Vec::new();
        for varbind in &self.pdu.varbinds {
            varbind_list.extend_from_slice(&varbind.encode()?);
        }

        let mut pdu = encode_integer(self.pdu.request_id)?;
        pdu.extend_from_slice(&encode_integer(self.pdu.error_status as i64)?);
        pdu.extend_from_slice(&encode_integer(self.pdu.error_index as i64)?);
        pdu.extend_from_slice(&encode_tlv(TAG_SEQUENCE, &varbind_list));

        let mut message = encode_integer(self.version)?;
        message.extend_from_slice(&encode_octet_string(&self.community));
        message.extend_from_slice(&encode_tlv(self.pdu.kind.to_byte(), &pdu));

        Ok(encode_tlv(TAG_SEQUENCE, &message))
    }

    /// Parses a datagram into a message by walking its nested structure.
    ///
    /// Bytes trailing the outer SEQUENCE are ignored.
    pub fn decode(datagram: &[u8]) -> Result<Self, BerError> {
        let (outer, used) = TlvRecord::parse(datagram, 0)?;
        if used < datagram.len() {
            log::trace!("Ignoring {} trailing bytes", datagram.len() - used);
        }

        let mut fields = outer.expect_tag(TAG_SEQUENCE)?.children()?.into_iter();

        let version = fields
            .next()
            .ok_or(BerError::MissingField("version"))?
            .as_integer()? as i64;
        let community = fields
            .next()
            .ok_or(BerError::MissingField("community"))?
            .expect_tag(TAG_OCTET_STRING)?
            .payload;
        let pdu_record = fields.next().ok_or(BerError::MissingField("pdu"))?;
        let kind = PduKind::from_byte(pdu_record.tag).ok_or(BerError::UnexpectedTag {
            expected: PduKind::GetResponse.to_byte(),
            found: pdu_record.tag,
        })?;

        let mut pdu_fields = pdu_record.children()?.into_iter();
        let mut next_integer = |name: &'static str| -> Result<u64, BerError> {
            pdu_fields
                .next()
                .ok_or(BerError::MissingField(name))?
                .as_integer()
        };
        let request_id = next_integer("request-id")? as i64;
        let error_status = next_integer("error-status")?;
        let error_index = next_integer("error-index")?;

        let varbinds = pdu_fields
            .next()
            .ok_or(BerError::MissingField("varbind list"))?
            .expect_tag(TAG_SEQUENCE)?
            .children()?
            .into_iter()
            .map(VarBind::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SnmpMessage {
            version,
            community,
            pdu: Pdu {
                kind,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }
}

/// Draws a request id for a new exchange.
pub fn generate_request_id() -> i64 {
    rand::thread_rng().gen_range(REQUEST_ID_RANGE)
}
