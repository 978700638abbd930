//! Minimal BER codec for SNMPv2c GET requests and responses.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;
const TAG_GET_REQUEST: u8 = 0xA0;
const TAG_RESPONSE: u8 = 0xA2;

const VERSION_2C: i64 = 1;

/// SNMP error-status for authorizationError
pub const ERROR_AUTHORIZATION: i64 = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BerError {
    #[error("message truncated")]
    Truncated,

    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported length encoding")]
    BadLength,

    #[error("integer too large")]
    IntegerOverflow,

    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
}

/// Object identifier such as `1.3.6.1.2.1.1.3.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// First two arcs packed into one subidentifier; `None` if it overflows
    fn leading_subidentifier(first: u32, second: u32) -> Option<u32> {
        first.checked_mul(40).and_then(|v| v.checked_add(second))
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let arcs = &self.0;
        // Bounded by FromStr and decode
        let leading = Self::leading_subidentifier(arcs[0], arcs[1]).unwrap_or(u32::MAX);
        out.extend(encode_base128(leading));
        for &arc in &arcs[2..] {
            out.extend(encode_base128(arc));
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, BerError> {
        if bytes.is_empty() {
            return Err(BerError::InvalidOid("empty".into()));
        }
        let mut arcs = Vec::new();
        let mut value: u32 = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            value = value
                .checked_mul(128)
                .and_then(|v| v.checked_add(u32::from(byte & 0x7f)))
                .ok_or(BerError::IntegerOverflow)?;
            if byte & 0x80 == 0 {
                if arcs.is_empty() {
                    let first = (value / 40).min(2);
                    arcs.push(first);
                    arcs.push(value - first * 40);
                } else {
                    arcs.push(value);
                }
                value = 0;
            } else if i == bytes.len() - 1 {
                return Err(BerError::Truncated);
            }
        }
        Ok(Oid(arcs))
    }
}

impl FromStr for Oid {
    type Err = BerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs: Vec<u32> = s
            .trim()
            .trim_start_matches('.')
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| BerError::InvalidOid(s.to_string()))?;

        if arcs.len() < 2
            || arcs[0] > 2
            || (arcs[0] < 2 && arcs[1] >= 40)
            || Self::leading_subidentifier(arcs[0], arcs[1]).is_none()
        {
            return Err(BerError::InvalidOid(s.to_string()));
        }
        Ok(Oid(arcs))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// Decoded varbind value
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    Other(u8),
}

impl SnmpValue {
    /// Numeric view, parsing textual numbers some agents return
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SnmpValue::Integer(v) => Some(*v as f64),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Some(f64::from(*v))
            }
            SnmpValue::Counter64(v) => Some(*v as f64),
            SnmpValue::OctetString(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().trim_end_matches('%').parse::<f64>().ok()),
            _ => None,
        }
    }

    pub fn as_counter(&self) -> Option<u64> {
        match self {
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) => Some(u64::from(*v)),
            SnmpValue::Counter64(v) => Some(*v),
            SnmpValue::Integer(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnmpResponse {
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(Oid, SnmpValue)>,
}

fn encode_base128(mut value: u32) -> Vec<u8> {
    let mut out = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        out.push(((value & 0x7f) as u8) | 0x80);
        value >>= 7;
    }
    out.reverse();
    out
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u32).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (4 - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

pub(crate) fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    encode_length(content.len(), &mut out);
    out.extend_from_slice(content);
    out
}

pub(crate) fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    // Strip redundant sign bytes, keeping the minimal two's complement form
    let mut start = 0;
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        if (b == 0x00 && next & 0x80 == 0) || (b == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    encode_tlv(TAG_INTEGER, &bytes[start..])
}

pub(crate) fn encode_oid(oid: &Oid) -> Vec<u8> {
    encode_tlv(TAG_OID, &oid.encode())
}

/// Encode an SNMPv2c GetRequest for `oids`
pub fn encode_get_request(community: &str, request_id: i32, oids: &[Oid]) -> Vec<u8> {
    let varbinds: Vec<u8> = oids
        .iter()
        .flat_map(|oid| {
            let mut vb = encode_oid(oid);
            vb.extend(encode_tlv(TAG_NULL, &[]));
            encode_tlv(TAG_SEQUENCE, &vb)
        })
        .collect();

    let mut pdu = encode_integer(i64::from(request_id));
    pdu.extend(encode_integer(0));
    pdu.extend(encode_integer(0));
    pdu.extend(encode_tlv(TAG_SEQUENCE, &varbinds));

    let mut message = encode_integer(VERSION_2C);
    message.extend(encode_tlv(TAG_OCTET_STRING, community.as_bytes()));
    message.extend(encode_tlv(TAG_GET_REQUEST, &pdu));
    encode_tlv(TAG_SEQUENCE, &message)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, BerError> {
        let b = *self.buf.get(self.pos).ok_or(BerError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, BerError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7f);
        if count == 0 || count > 4 {
            return Err(BerError::BadLength);
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    fn tlv(&mut self) -> Result<(u8, &'a [u8]), BerError> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self.pos.checked_add(len).ok_or(BerError::BadLength)?;
        let content = self.buf.get(self.pos..end).ok_or(BerError::Truncated)?;
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], BerError> {
        let (tag, content) = self.tlv()?;
        if tag != expected {
            return Err(BerError::UnexpectedTag {
                expected,
                found: tag,
            });
        }
        Ok(content)
    }

    fn integer(&mut self) -> Result<i64, BerError> {
        decode_signed(self.expect(TAG_INTEGER)?)
    }
}

fn decode_signed(bytes: &[u8]) -> Result<i64, BerError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | i64::from(b);
    }
    Ok(value)
}

fn decode_unsigned(bytes: &[u8]) -> Result<u64, BerError> {
    let trimmed = match bytes.iter().position(|&b| b != 0) {
        Some(start) => &bytes[start..],
        None => return Ok(0),
    };
    if trimmed.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    Ok(trimmed.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn decode_u32(bytes: &[u8]) -> Result<u32, BerError> {
    u32::try_from(decode_unsigned(bytes)?).map_err(|_| BerError::IntegerOverflow)
}

fn decode_value(tag: u8, content: &[u8]) -> Result<SnmpValue, BerError> {
    Ok(match tag {
        TAG_INTEGER => SnmpValue::Integer(decode_signed(content)?),
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_NULL => SnmpValue::Null,
        TAG_IP_ADDRESS if content.len() == 4 => {
            SnmpValue::IpAddress([content[0], content[1], content[2], content[3]])
        }
        TAG_COUNTER32 => SnmpValue::Counter32(decode_u32(content)?),
        TAG_GAUGE32 => SnmpValue::Gauge32(decode_u32(content)?),
        TAG_TIMETICKS => SnmpValue::TimeTicks(decode_u32(content)?),
        TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
        TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
        other => SnmpValue::Other(other),
    })
}

/// Decode a GetResponse message
pub fn decode_response(buf: &[u8]) -> Result<SnmpResponse, BerError> {
    let mut outer = Reader::new(buf);
    let mut message = Reader::new(outer.expect(TAG_SEQUENCE)?);

    let _version = message.integer()?;
    let _community = message.expect(TAG_OCTET_STRING)?;
    let mut pdu = Reader::new(message.expect(TAG_RESPONSE)?);

    let request_id = pdu.integer()?;
    let error_status = pdu.integer()?;
    let error_index = pdu.integer()?;
    let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);

    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut varbind = Reader::new(list.expect(TAG_SEQUENCE)?);
        let oid = Oid::decode(varbind.expect(TAG_OID)?)?;
        let (tag, content) = varbind.tlv()?;
        varbinds.push((oid, decode_value(tag, content)?));
    }

    Ok(SnmpResponse {
        request_id: request_id as i32,
        error_status,
        error_index,
        varbinds,
    })
}

/// Encode a GetResponse; used by the fake agents in tests
#[cfg(test)]
pub(crate) fn encode_response(
    community: &str,
    request_id: i32,
    error_status: i64,
    varbinds: &[(Oid, u8, Vec<u8>)],
) -> Vec<u8> {
    let list: Vec<u8> = varbinds
        .iter()
        .flat_map(|(oid, tag, content)| {
            let mut vb = encode_oid(oid);
            vb.extend(encode_tlv(*tag, content));
            encode_tlv(TAG_SEQUENCE, &vb)
        })
        .collect();

    let mut pdu = encode_integer(i64::from(request_id));
    pdu.extend(encode_integer(error_status));
    pdu.extend(encode_integer(0));
    pdu.extend(encode_tlv(TAG_SEQUENCE, &list));

    let mut message = encode_integer(VERSION_2C);
    message.extend(encode_tlv(TAG_OCTET_STRING, community.as_bytes()));
    message.extend(encode_tlv(TAG_RESPONSE, &pdu));
    encode_tlv(TAG_SEQUENCE, &message)
}

/// Decode the request id and requested OIDs of a GetRequest; used by test agents
#[cfg(test)]
pub(crate) fn decode_get_request(buf: &[u8]) -> Result<(i32, Vec<Oid>), BerError> {
    let mut outer = Reader::new(buf);
    let mut message = Reader::new(outer.expect(TAG_SEQUENCE)?);
    message.integer()?;
    message.expect(TAG_OCTET_STRING)?;
    let mut pdu = Reader::new(message.expect(TAG_GET_REQUEST)?);
    let request_id = pdu.integer()? as i32;
    pdu.integer()?;
    pdu.integer()?;
    let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
    let mut oids = Vec::new();
    while !list.is_empty() {
        let mut varbind = Reader::new(list.expect(TAG_SEQUENCE)?);
        oids.push(Oid::decode(varbind.expect(TAG_OID)?)?);
    }
    Ok((request_id, oids))
}
