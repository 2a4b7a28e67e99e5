// ── BER codec for SNMP v1/v2c messages ──
//
// Only the subset needed for Get/GetNext requests and their responses.
// Encoding writes definite-length TLVs into a `BytesMut`; decoding walks
// a borrowed slice and never allocates for framing.

use bytes::{BufMut, Bytes, BytesMut};

use super::SnmpVersion;
use super::oid::Oid;
use crate::error::Error;

// Universal tags
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

// SNMP application tags
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;

// v2c exception values (context-specific, primitive)
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// A decoded variable-binding value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// `noSuchObject`, `noSuchInstance` or `endOfMibView`.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// Numeric view of any unsigned-compatible value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Counter32(v) | Self::Gauge32(v) | Self::TimeTicks(v) => Some(u64::from(*v)),
            Self::Counter64(v) => Some(*v),
            Self::Integer(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Integer view (ifOperStatus and friends).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            other => other.as_u64().and_then(|v| i64::try_from(v).ok()),
        }
    }

    /// Lossy UTF-8 view of an OCTET STRING, trimmed of padding NULs.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::OctetString(bytes) => Some(
                String::from_utf8_lossy(bytes)
                    .trim_end_matches('\0')
                    .trim()
                    .to_owned(),
            ),
            _ => None,
        }
    }
}

/// One `OID = value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: SnmpValue,
}

/// PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetNextRequest,
    Response,
}

impl PduKind {
    fn tag(self) -> u8 {
        match self {
            Self::GetRequest => 0xA0,
            Self::GetNextRequest => 0xA1,
            Self::Response => 0xA2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl Message {
    /// Build a request PDU whose varbinds all carry NULL values.
    pub fn request(
        version: SnmpVersion,
        community: &[u8],
        kind: PduKind,
        request_id: i32,
        oids: &[Oid],
    ) -> Self {
        Self {
            version,
            community: community.to_vec(),
            pdu: Pdu {
                kind,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: oids
                    .iter()
                    .map(|oid| VarBind {
                        oid: oid.clone(),
                        value: SnmpValue::Null,
                    })
                    .collect(),
            },
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────────

pub fn encode_message(msg: &Message) -> Bytes {
    let mut varbinds = BytesMut::new();
    for vb in &msg.pdu.varbinds {
        let mut pair = BytesMut::new();
        put_oid(&mut pair, &vb.oid);
        put_value(&mut pair, &vb.value);
        put_tlv(&mut varbinds, TAG_SEQUENCE, &pair);
    }

    let mut pdu = BytesMut::new();
    put_integer(&mut pdu, TAG_INTEGER, i64::from(msg.pdu.request_id));
    put_integer(&mut pdu, TAG_INTEGER, msg.pdu.error_status);
    put_integer(&mut pdu, TAG_INTEGER, msg.pdu.error_index);
    put_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

    let mut body = BytesMut::new();
    put_integer(&mut body, TAG_INTEGER, msg.version.wire_value());
    put_tlv(&mut body, TAG_OCTET_STRING, &msg.community);
    put_tlv(&mut body, msg.pdu.kind.tag(), &pdu);

    let mut out = BytesMut::with_capacity(body.len() + 4);
    put_tlv(&mut out, TAG_SEQUENCE, &body);
    out.freeze()
}

fn put_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        // Short form; the guard makes the narrowing exact.
        out.put_u8(u8::try_from(len).unwrap_or(0x7F));
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    out.put_u8(0x80 | u8::try_from(significant.len()).unwrap_or(0));
    out.put_slice(significant);
}

fn put_tlv(out: &mut BytesMut, tag: u8, content: &[u8]) {
    out.put_u8(tag);
    put_length(out, content.len());
    out.put_slice(content);
}

/// Minimal two's-complement encoding.
fn put_integer(out: &mut BytesMut, tag: u8, value: i64) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let cur = bytes[start];
        let next_high = bytes[start + 1] & 0x80;
        if (cur == 0x00 && next_high == 0) || (cur == 0xFF && next_high != 0) {
            start += 1;
        } else {
            break;
        }
    }
    put_tlv(out, tag, &bytes[start..]);
}

/// Unsigned encoding with a leading zero when the high bit is set.
fn put_unsigned(out: &mut BytesMut, tag: u8, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut content = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(&bytes[skip..]);
    put_tlv(out, tag, &content);
}

fn put_oid(out: &mut BytesMut, oid: &Oid) {
    let arcs = oid.arcs();
    let mut content = Vec::with_capacity(arcs.len() + 4);
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (a * 40 + b, rest),
        [a] => (a * 40, &[][..]),
        [] => (0, &[][..]),
    };
    put_base128(&mut content, first);
    for arc in rest {
        put_base128(&mut content, *arc);
    }
    put_tlv(out, TAG_OID, &content);
}

fn put_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut stack = [0u8; 5];
    let mut n = 0;
    loop {
        stack[n] = u8::try_from(value & 0x7F).unwrap_or(0);
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(stack[i] | continuation);
    }
}

fn put_value(out: &mut BytesMut, value: &SnmpValue) {
    match value {
        SnmpValue::Integer(v) => put_integer(out, TAG_INTEGER, *v),
        SnmpValue::OctetString(b) => put_tlv(out, TAG_OCTET_STRING, b),
        SnmpValue::Null => put_tlv(out, TAG_NULL, &[]),
        SnmpValue::ObjectId(oid) => put_oid(out, oid),
        SnmpValue::IpAddress(ip) => put_tlv(out, TAG_IP_ADDRESS, ip),
        SnmpValue::Counter32(v) => put_unsigned(out, TAG_COUNTER32, u64::from(*v)),
        SnmpValue::Gauge32(v) => put_unsigned(out, TAG_GAUGE32, u64::from(*v)),
        SnmpValue::TimeTicks(v) => put_unsigned(out, TAG_TIMETICKS, u64::from(*v)),
        SnmpValue::Opaque(b) => put_tlv(out, TAG_OPAQUE, b),
        SnmpValue::Counter64(v) => put_unsigned(out, TAG_COUNTER64, *v),
        SnmpValue::NoSuchObject => put_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => put_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => put_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

pub fn decode_message(buf: &[u8]) -> Result<Message, Error> {
    let mut outer = Reader::new(buf);
    let body = outer.expect(TAG_SEQUENCE)?;

    let mut r = Reader::new(body);
    let version = decode_integer(r.expect(TAG_INTEGER)?)?;
    let version = SnmpVersion::from_wire_value(version)
        .ok_or_else(|| Error::Codec(format!("unsupported SNMP version {version}")))?;
    let community = r.expect(TAG_OCTET_STRING)?.to_vec();

    let (tag, pdu_body) = r.next()?;
    let kind = PduKind::from_tag(tag)
        .ok_or_else(|| Error::Codec(format!("unexpected PDU tag 0x{tag:02x}")))?;

    let mut p = Reader::new(pdu_body);
    let request_id = decode_integer(p.expect(TAG_INTEGER)?)?;
    let request_id = i32::try_from(request_id)
        .map_err(|_| Error::Codec(format!("request-id {request_id} out of range")))?;
    let error_status = decode_integer(p.expect(TAG_INTEGER)?)?;
    let error_index = decode_integer(p.expect(TAG_INTEGER)?)?;

    let mut list = Reader::new(p.expect(TAG_SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut pair = Reader::new(list.expect(TAG_SEQUENCE)?);
        let oid = decode_oid(pair.expect(TAG_OID)?)?;
        let (tag, content) = pair.next()?;
        varbinds.push(VarBind {
            oid,
            value: decode_value(tag, content)?,
        });
    }

    Ok(Message {
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

fn decode_value(tag: u8, content: &[u8]) -> Result<SnmpValue, Error> {
    Ok(match tag {
        TAG_INTEGER => SnmpValue::Integer(decode_integer(content)?),
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_NULL => SnmpValue::Null,
        TAG_OID => SnmpValue::ObjectId(decode_oid(content)?),
        TAG_IP_ADDRESS => {
            let ip: [u8; 4] = content
                .try_into()
                .map_err(|_| Error::Codec("IpAddress must be 4 bytes".into()))?;
            SnmpValue::IpAddress(ip)
        }
        TAG_COUNTER32 => SnmpValue::Counter32(decode_u32(content)?),
        TAG_GAUGE32 => SnmpValue::Gauge32(decode_u32(content)?),
        TAG_TIMETICKS => SnmpValue::TimeTicks(decode_u32(content)?),
        TAG_OPAQUE => SnmpValue::Opaque(content.to_vec()),
        TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
        TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
        other => return Err(Error::Codec(format!("unknown value tag 0x{other:02x}"))),
    })
}

fn decode_integer(content: &[u8]) -> Result<i64, Error> {
    if content.is_empty() || content.len() > 8 {
        return Err(Error::Codec(format!(
            "INTEGER of {} bytes not supported",
            content.len()
        )));
    }
    let negative = content[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for b in content {
        value = (value << 8) | i64::from(*b);
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, Error> {
    let content = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if content.is_empty() || content.len() > 8 {
        return Err(Error::Codec(format!(
            "unsigned value of {} bytes not supported",
            content.len()
        )));
    }
    Ok(content.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_u32(content: &[u8]) -> Result<u32, Error> {
    let v = decode_unsigned(content)?;
    u32::try_from(v).map_err(|_| Error::Codec(format!("32-bit value overflow: {v}")))
}

fn decode_oid(content: &[u8]) -> Result<Oid, Error> {
    let mut arcs = Vec::with_capacity(content.len() + 1);
    let mut acc: u32 = 0;
    let mut first = true;
    for b in content {
        acc = acc
            .checked_mul(128)
            .ok_or_else(|| Error::Codec("OID arc overflow".into()))?
            | u32::from(b & 0x7F);
        if b & 0x80 == 0 {
            if first {
                let (a, b) = if acc < 80 { (acc / 40, acc % 40) } else { (2, acc - 80) };
                arcs.push(a);
                arcs.push(b);
                first = false;
            } else {
                arcs.push(acc);
            }
            acc = 0;
        }
    }
    if first {
        return Err(Error::Codec("empty OID".into()));
    }
    Ok(Oid::new(arcs))
}

/// Cursor over a run of TLVs.
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

    fn byte(&mut self) -> Result<u8, Error> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::Codec("truncated message".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, Error> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7F);
        if count == 0 || count > 4 {
            return Err(Error::Codec(format!("unsupported length form 0x{first:02x}")));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.byte()?);
        }
        Ok(len)
    }

    fn next(&mut self) -> Result<(u8, &'a [u8]), Error> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::Codec("length exceeds buffer".into()))?;
        let content = &self.buf[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, want: u8) -> Result<&'a [u8], Error> {
        let (tag, content) = self.next()?;
        if tag != want {
            return Err(Error::Codec(format!(
                "expected tag 0x{want:02x}, found 0x{tag:02x}"
            )));
        }
        Ok(content)
    }
}
