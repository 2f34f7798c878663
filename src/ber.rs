//! BER value codec for the subset of ASN.1 used by SNMPv1.
//!
//! Encoding covers INTEGER, OCTET STRING, IpAddress and NULL values plus definite
//! lengths. Decoding parses tag-length-value records with full bounds checking.

use thiserror::Error;

use crate::oid::{Oid, OidError};

/// INTEGER tag.
pub const TAG_INTEGER: u8 = 0x02;
/// OCTET STRING tag.
pub const TAG_OCTET_STRING: u8 = 0x04;
/// NULL tag.
pub const TAG_NULL: u8 = 0x05;
/// OBJECT IDENTIFIER tag.
pub const TAG_OBJECT_IDENTIFIER: u8 = 0x06;
/// SEQUENCE tag (constructed).
pub const TAG_SEQUENCE: u8 = 0x30;
/// IpAddress application tag.
pub const TAG_IP_ADDRESS: u8 = 0x40;

/// Bit marking a constructed encoding in the identifier octet.
const CONSTRUCTED_BIT: u8 = 0x20;

/// Largest integer value accepted for set-requests (two content octets).
pub const MAX_ENCODABLE_INTEGER: i64 = 0xFFFF;

/// Errors that can occur while encoding or decoding BER data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BerError {
    /// Buffer ended before a tag or length octet could be read.
    #[error("Truncated BER data at offset {0}")]
    Truncated(usize),

    /// The declared length runs past the end of the buffer.
    #[error("BER length {length} exceeds remaining buffer size {available} at offset {offset}")]
    LengthExceedsBuffer {
        offset: usize,
        length: usize,
        available: usize,
    },

    /// Indefinite length form (0x80) is not allowed in SNMP.
    #[error("Indefinite length at offset {0}")]
    IndefiniteLength(usize),

    /// Long-form length with an unsupported number of length octets.
    #[error("Unsupported long-form length with {count} octets at offset {offset}")]
    UnsupportedLengthForm { offset: usize, count: usize },

    /// Integer content longer than eight octets.
    #[error("Integer of {0} octets does not fit in 64 bits")]
    IntegerTooLong(usize),

    /// Integer value outside the range this manager can send.
    #[error("Integer {0} is outside the encodable range 0..={MAX_ENCODABLE_INTEGER}")]
    IntegerOutOfRange(i64),

    /// Text contains a character that has no Latin-1 representation.
    #[error("Character '{0}' cannot be encoded as Latin-1")]
    NotLatin1(char),

    /// Value field carries a tag this manager cannot render.
    #[error("Unsupported value type 0x{0:02X}")]
    UnsupportedType(u8),

    /// A record had a different tag than the message structure requires.
    #[error("Expected tag 0x{expected:02X}, found 0x{found:02X}")]
    UnexpectedTag { expected: u8, found: u8 },

    /// A constructed record had fewer children than the message structure requires.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// IpAddress value without exactly four octets.
    #[error("IpAddress value has {0} octets, expected 4")]
    InvalidIpAddressLength(usize),

    /// Error-status field outside the SNMPv1 range 0-5.
    #[error("Error status {0} is outside 0..=5")]
    InvalidErrorStatus(u64),

    /// Object identifier field that cannot be encoded or decoded.
    #[error("Invalid object identifier: {0}")]
    InvalidOid(#[from] OidError),
    #[error("Response binds {found}, expected {expected}")]
    UnexpectedOid { expected: Oid, found: Oid },
}

/// A scalar SNMP value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScalarValue {
    Integer(i64),
    OctetString(Vec<u8>),
    IpAddress([u8; 4]),
    Null,
}

impl ScalarValue {
    /// Builds a value from text as a string set-request sends it.
    ///
    /// Text with exactly three dots whose four components all parse as bytes is an
    /// IpAddress; anything else is an OCTET STRING of the Latin-1 bytes.
    pub fn from_text(text: &str) -> Result<Self, BerError> {
        if text.matches('.').count() == 3 {
            let octets: Result<Vec<u8>, _> = text.split('.').map(str::parse::<u8>).collect();
            if let Ok(octets) = octets {
                return Ok(ScalarValue::IpAddress([
                    octets[0], octets[1], octets[2], octets[3],
                ]));
            }
        }
        Ok(ScalarValue::OctetString(latin1_bytes(text)?))
    }

    /// Renders the value as text.
    ///
    /// # Errors
    /// Returns `BerError::UnsupportedType` for NULL, which carries no value.
    pub fn render(&self) -> Result<String, BerError> {
        match self {
            ScalarValue::Integer(v) => Ok(v.to_string()),
            ScalarValue::OctetString(bytes) => Ok(latin1_string(bytes)),
            ScalarValue::IpAddress(octets) => {
                let parts: Vec<String> = octets.iter().map(|b| b.to_string()).collect();
                Ok(parts.join("."))
            }
            ScalarValue::Null => Err(BerError::UnsupportedType(TAG_NULL)),
        }
    }

    /// Encodes the value as a complete TLV.
    pub fn encode(&self) -> Result<Vec<u8>, BerError> {
        match self {
            ScalarValue::Integer(v) => encode_integer(*v),
            ScalarValue::OctetString(bytes) => Ok(encode_octet_string(bytes)),
            ScalarValue::IpAddress(octets) => Ok(encode_tlv(TAG_IP_ADDRESS, octets)),
            ScalarValue::Null => Ok(vec![TAG_NULL, 0x00]),
        }
    }

    /// Encodes the value into a single record.
    pub fn to_record(&self) -> Result<TlvRecord, BerError> {
        let (record, _) = TlvRecord::parse(&self.encode()?, 0)?;
        Ok(record)
    }
}

/// Encodes an INTEGER: one content octet up to 255, two octets up to 65535.
///
/// # Errors
/// Returns `BerError::IntegerOutOfRange` for negative values and values above 65535.
pub fn encode_integer(value: i64) -> Result<Vec<u8>, BerError> {
    match value {
        0..=0xFF => Ok(vec![TAG_INTEGER, 0x01, value as u8]),
        0x100..=MAX_ENCODABLE_INTEGER => Ok(vec![
            TAG_INTEGER,
            0x02,
            (value >> 8) as u8,
            value as u8,
        ]),
        _ => Err(BerError::IntegerOutOfRange(value)),
    }
}

/// Encodes an OCTET STRING. Empty strings are valid.
pub fn encode_octet_string(bytes: &[u8]) -> Vec<u8> {
    encode_tlv(TAG_OCTET_STRING, bytes)
}

/// Encodes a string value, detecting dotted-quad IP addresses.
pub fn encode_string_value(text: &str) -> Result<Vec<u8>, BerError> {
    ScalarValue::from_text(text)?.encode()
}

/// Wraps content octets with a tag and a definite length.
pub fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(content.len() + 6);
    buf.push(tag);
    encode_length(&mut buf, content.len());
    buf.extend_from_slice(content);
    buf
}

/// Appends a definite length: short form up to 127, long form above.
pub fn encode_length(buf: &mut Vec<u8>, len: usize) {
    if len <= 0x7F {
        buf.push(len as u8);
        return;
    }

    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[skip..];
    buf.push(0x80 | significant.len() as u8);
    buf.extend_from_slice(significant);
}

/// Decodes a definite length starting at `data[0]`.
///
/// Returns the length and the number of octets consumed. `offset` is only used
/// for error reporting.
pub fn decode_length(data: &[u8], offset: usize) -> Result<(usize, usize), BerError> {
    let first = *data.first().ok_or(BerError::Truncated(offset))?;

    if first == 0x80 {
        return Err(BerError::IndefiniteLength(offset));
    }
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count > std::mem::size_of::<u32>() {
        return Err(BerError::UnsupportedLengthForm { offset, count });
    }
    if data.len() < 1 + count {
        return Err(BerError::Truncated(offset + data.len()));
    }

    let len = data[1..=count]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok((len, 1 + count))
}

/// Decodes the big-endian magnitude of INTEGER content octets.
pub fn decode_integer(content: &[u8]) -> Result<u64, BerError> {
    if content.len() > 8 {
        return Err(BerError::IntegerTooLong(content.len()));
    }
    Ok(content
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Converts text to Latin-1 bytes.
pub fn latin1_bytes(text: &str) -> Result<Vec<u8>, BerError> {
    text.chars()
        .map(|c| u8::try_from(c as u32).map_err(|_| BerError::NotLatin1(c)))
        .collect()
}

/// Converts Latin-1 bytes to text.
pub fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// One decoded tag-length-value unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlvRecord {
    pub tag: u8,
    pub length: usize,
    pub payload: Vec<u8>,
}

impl TlvRecord {
    /// Parses a single record from the beginning of the buffer.
    ///
    /// Returns the record and the number of bytes consumed. `offset` is the position
    /// of `buf` within the whole datagram, used for error reporting.
    ///
    /// # Errors
    /// Returns an error if the header is truncated or the payload runs past the buffer.
    pub fn parse(buf: &[u8], offset: usize) -> Result<(Self, usize), BerError> {
        let tag = *buf.first().ok_or(BerError::Truncated(offset))?;
        let (length, len_octets) = decode_length(&buf[1..], offset + 1)?;
        let header = 1 + len_octets;

        let available = buf.len() - header;
        if length > available {
            return Err(BerError::LengthExceedsBuffer {
                offset,
                length,
                available,
            });
        }

        let payload = buf[header..header + length].to_vec();
        Ok((
            Self {
                tag,
                length,
                payload,
            },
            header + length,
        ))
    }

    /// Returns true if the tag marks a constructed encoding (SEQUENCE or a PDU).
    pub fn is_constructed(&self) -> bool {
        self.tag & CONSTRUCTED_BIT != 0
    }

    /// Parses the payload of a constructed record into its direct children.
    pub fn children(&self) -> Result<Vec<TlvRecord>, BerError> {
        parse_sequence(&self.payload)
    }

    /// Checks the tag and returns the record.
    pub fn expect_tag(self, expected: u8) -> Result<Self, BerError> {
        if self.tag != expected {
            return Err(BerError::UnexpectedTag {
                expected,
                found: self.tag,
            });
        }
        Ok(self)
    }

    /// Decodes an INTEGER record to its magnitude.
    pub fn as_integer(&self) -> Result<u64, BerError> {
        if self.tag != TAG_INTEGER {
            return Err(BerError::UnexpectedTag {
                expected: TAG_INTEGER,
                found: self.tag,
            });
        }
        decode_integer(&self.payload)
    }
}

/// Parses consecutive records that exactly fill `buf`.
pub fn parse_sequence(buf: &[u8]) -> Result<Vec<TlvRecord>, BerError> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (record, used) = TlvRecord::parse(&buf[pos..], pos)?;
        records.push(record);
        pos += used;
    }
    Ok(records)
}

/// Scans a datagram into a flat list of records in wire order.
///
/// Constructed records are emitted with their whole content as payload and the
/// scan then continues with their first child, so nested fields appear right
/// after their parent.
pub fn decode_tlvs(buf: &[u8]) -> Result<Vec<TlvRecord>, BerError> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (record, used) = TlvRecord::parse(&buf[pos..], pos)?;
        pos += if record.is_constructed() {
            used - record.length
        } else {
            used
        };
        records.push(record);
    }
    Ok(records)
}

/// Renders the value record of a response as text.
///
/// INTEGER becomes its decimal magnitude, IpAddress a dotted quad and OCTET STRING
/// its Latin-1 text.
pub fn extract_scalar(record: &TlvRecord) -> Result<String, BerError> {
    decode_scalar(record)?.render()
}

/// Decodes a value record into a `ScalarValue`.
pub fn decode_scalar(record: &TlvRecord) -> Result<ScalarValue, BerError> {
    match record.tag {
        TAG_INTEGER => {
            let magnitude = decode_integer(&record.payload)?;
            let value = i64::try_from(magnitude)
                .map_err(|_| BerError::IntegerTooLong(record.payload.len()))?;
            Ok(ScalarValue::Integer(value))
        }
        TAG_OCTET_STRING => Ok(ScalarValue::OctetString(record.payload.clone())),
        TAG_IP_ADDRESS => {
            let octets: [u8; 4] = record
                .payload
                .as_slice()
                .try_into()
                .map_err(|_| BerError::InvalidIpAddressLength(record.payload.len()))?;
            Ok(ScalarValue::IpAddress(octets))
        }
        TAG_NULL => Ok(ScalarValue::Null),
        other => Err(BerError::UnsupportedType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_integer_one_byte() {
        assert_eq!(encode_integer(42).unwrap(), vec![0x02, 0x01, 0x2A]);
        assert_eq!(encode_integer(0).unwrap(), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_integer(255).unwrap(), vec![0x02, 0x01, 0xFF]);
    }

    #[test]
    fn test_encode_integer_two_bytes() {
        assert_eq!(encode_integer(1000).unwrap(), vec![0x02, 0x02, 0x03, 0xE8]);
        assert_eq!(encode_integer(256).unwrap(), vec![0x02, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_integer_decodes_back() {
        for value in [42i64, 1000] {
            let encoded = encode_integer(value).unwrap();
            let (record, _) = TlvRecord::parse(&encoded, 0).unwrap();
            assert_eq!(record.as_integer().unwrap(), value as u64);
        }
    }

    #[test]
    fn test_encode_integer_out_of_range() {
        assert_eq!(encode_integer(-1), Err(BerError::IntegerOutOfRange(-1)));
        assert_eq!(
            encode_integer(70000),
            Err(BerError::IntegerOutOfRange(70000))
        );
    }

    #[test]
    fn test_ip_address_detection() {
        assert_eq!(
            encode_string_value("192.168.1.1").unwrap(),
            vec![0x40, 0x04, 192, 168, 1, 1]
        );
    }

    #[test]
    fn test_plain_text_is_octet_string() {
        assert_eq!(
            encode_string_value("hello").unwrap(),
            vec![0x04, 0x05, b'h', b'e', b'l', b'l', b'o']
        );
        assert_eq!(encode_string_value("").unwrap(), vec![0x04, 0x00]);
    }

    #[test]
    fn test_three_dots_but_not_octets_is_octet_string() {
        let encoded = encode_string_value("1.2.3.999").unwrap();
        assert_eq!(encoded[0], TAG_OCTET_STRING);
        assert_eq!(encoded[1], 9);
    }

    #[test]
    fn test_non_latin1_rejected() {
        assert_eq!(
            encode_string_value("snow\u{2603}"),
            Err(BerError::NotLatin1('\u{2603}'))
        );
    }

    #[test]
    fn test_long_form_length_decoding() {
        assert_eq!(decode_length(&[0x82, 0x01, 0x2C], 0).unwrap(), (300, 3));
        assert_eq!(decode_length(&[0x81, 0x80], 0).unwrap(), (128, 2));
        assert_eq!(decode_length(&[0x7F], 0).unwrap(), (127, 1));
    }

    #[test]
    fn test_length_errors() {
        assert_eq!(decode_length(&[0x80], 4), Err(BerError::IndefiniteLength(4)));
        assert_eq!(decode_length(&[], 2), Err(BerError::Truncated(2)));
        assert_eq!(decode_length(&[0x82, 0x01], 0), Err(BerError::Truncated(2)));
        assert_eq!(
            decode_length(&[0x85, 1, 2, 3, 4, 5], 0),
            Err(BerError::UnsupportedLengthForm {
                offset: 0,
                count: 5
            })
        );
    }

    #[test]
    fn test_encode_length_forms() {
        let mut buf = Vec::new();
        encode_length(&mut buf, 5);
        assert_eq!(buf, vec![0x05]);

        let mut buf = Vec::new();
        encode_length(&mut buf, 300);
        assert_eq!(buf, vec![0x82, 0x01, 0x2C]);

        let mut buf = Vec::new();
        encode_length(&mut buf, 200);
        assert_eq!(buf, vec![0x81, 0xC8]);
    }

    #[test]
    fn test_long_octet_string_roundtrip() {
        let text = "x".repeat(300);
        let encoded = encode_octet_string(text.as_bytes());
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2C]);
        let (record, used) = TlvRecord::parse(&encoded, 0).unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(extract_scalar(&record).unwrap(), text);
    }

    #[test]
    fn test_parse_rejects_overrun() {
        assert_eq!(
            TlvRecord::parse(&[0x04, 0x05, b'a', b'b'], 0),
            Err(BerError::LengthExceedsBuffer {
                offset: 0,
                length: 5,
                available: 2
            })
        );
    }

    #[test]
    fn test_flat_scan_descends_into_sequences() {
        // SEQUENCE { INTEGER 1, OCTET STRING "ab" }
        let data = [0x30, 0x07, 0x02, 0x01, 0x01, 0x04, 0x02, b'a', b'b'];
        let records = decode_tlvs(&data).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].tag, TAG_SEQUENCE);
        assert_eq!(records[0].length, 7);
        assert_eq!(records[1].payload, vec![0x01]);
        assert_eq!(records[2].payload, b"ab".to_vec());
    }

    #[test]
    fn test_extract_scalar_types() {
        let int = TlvRecord {
            tag: TAG_INTEGER,
            length: 2,
            payload: vec![0x03, 0xE8],
        };
        assert_eq!(extract_scalar(&int).unwrap(), "1000");

        let ip = TlvRecord {
            tag: TAG_IP_ADDRESS,
            length: 4,
            payload: vec![10, 0, 0, 254],
        };
        assert_eq!(extract_scalar(&ip).unwrap(), "10.0.0.254");

        let text = TlvRecord {
            tag: TAG_OCTET_STRING,
            length: 4,
            payload: b"host".to_vec(),
        };
        assert_eq!(extract_scalar(&text).unwrap(), "host");
    }

    #[test]
    fn test_extract_scalar_unsupported() {
        let null = TlvRecord {
            tag: TAG_NULL,
            length: 0,
            payload: vec![],
        };
        assert_eq!(extract_scalar(&null), Err(BerError::UnsupportedType(0x05)));

        let counter = TlvRecord {
            tag: 0x41,
            length: 1,
            payload: vec![7],
        };
        assert_eq!(
            extract_scalar(&counter),
            Err(BerError::UnsupportedType(0x41))
        );
    }

    #[test]
    fn test_decode_integer_too_long() {
        assert_eq!(decode_integer(&[0; 9]), Err(BerError::IntegerTooLong(9)));
        assert_eq!(decode_integer(&[]).unwrap(), 0);
    }

    #[test]
    fn test_value_to_record() {
        let record = ScalarValue::IpAddress([10, 0, 0, 1]).to_record().unwrap();
        assert_eq!(record.tag, TAG_IP_ADDRESS);
        assert_eq!(record.length, 4);
        assert_eq!(decode_scalar(&record).unwrap(), ScalarValue::IpAddress([10, 0, 0, 1]));
        assert_eq!(
            ScalarValue::Integer(70000).to_record(),
            Err(BerError::IntegerOutOfRange(70000))
        );
    }
}
