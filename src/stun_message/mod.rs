//! A narrow STUN message codec covering exactly the wire surface the STUN
//! Binding handler needs: message type, a 16-byte transaction id (RFC 3489
//! style — no magic cookie), and two attributes, USERNAME and
//! MAPPED-ADDRESS. Built directly on `bytes::Buf`/`BufMut` rather than a
//! general-purpose STUN crate, since the full RFC 5389 attribute surface
//! (XOR-MAPPED-ADDRESS, MESSAGE-INTEGRITY, FINGERPRINT, ...) is never
//! exercised here.


use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const TRANSACTION_ID_LEN: usize = 16;

const HEADER_LEN: usize = 20;
const ATTR_HEADER_LEN: usize = 4;

const TYPE_BINDING_REQUEST: u16 = 0x0001;
const TYPE_BINDING_RESPONSE: u16 = 0x0101;
const TYPE_BINDING_ERROR_RESPONSE: u16 = 0x0111;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_USERNAME: u16 = 0x0006;

const ADDRESS_FAMILY_IPV4: u8 = 0x01;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageType {
    BindingRequest,
    BindingResponse,
    BindingErrorResponse,
}

impl MessageType {
    fn code(self) -> u16 {
        match self {
            MessageType::BindingRequest => TYPE_BINDING_REQUEST,
            MessageType::BindingResponse => TYPE_BINDING_RESPONSE,
            MessageType::BindingErrorResponse => TYPE_BINDING_ERROR_RESPONSE,
        }
    }

    fn from_code(code: u16) -> Option<Self> {
        match code {
            TYPE_BINDING_REQUEST => Some(MessageType::BindingRequest),
            TYPE_BINDING_RESPONSE => Some(MessageType::BindingResponse),
            TYPE_BINDING_ERROR_RESPONSE => Some(MessageType::BindingErrorResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Username(String),
    MappedAddress(SocketAddr),
}

impl Attribute {
    fn kind(&self) -> u16 {
        match self {
            Attribute::Username(_) => ATTR_USERNAME,
            Attribute::MappedAddress(_) => ATTR_MAPPED_ADDRESS,
        }
    }
}

/// Kinds usable with `Message::find_attribute`, mirroring the two TLVs this
/// codec knows how to decode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    Username,
    MappedAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub typ: MessageType,
    pub transaction_id: [u8; TRANSACTION_ID_LEN],
    pub attributes: Vec<Attribute>,
}

impl Message {
    pub fn new(typ: MessageType, transaction_id: [u8; TRANSACTION_ID_LEN]) -> Self {
        Message {
            typ,
            transaction_id,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn find_attribute(&self, kind: AttributeKind) -> Option<&Attribute> {
        self.attributes.iter().find(|a| match (kind, a) {
            (AttributeKind::Username, Attribute::Username(_)) => true,
            (AttributeKind::MappedAddress, Attribute::MappedAddress(_)) => true,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackError(pub String);

impl fmt::Display for UnpackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed STUN message: {}", self.0)
    }
}

impl std::error::Error for UnpackError {}

/// Classifies the first byte of a UDP datagram per RFC 5389 §8: the top two
/// bits of an RTP packet's version field are `10`; the top two bits of every
/// STUN message are `00`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DatagramKind {
    Application,
    Stun,
    Other,
}

pub fn classify_first_byte(b: u8) -> DatagramKind {
    match b & 0xc0 {
        0x80 => DatagramKind::Application,
        0x00 => DatagramKind::Stun,
        _ => DatagramKind::Other,
    }
}

/// Packs a message to its wire form: a 20-byte header (type, body length,
/// 16-byte transaction id) followed by each attribute as a type-length-value
/// triple, value zero-padded to a 4-byte boundary.
pub fn pack(msg: &Message) -> Bytes {
    let mut body = BytesMut::new();
    for attr in &msg.attributes {
        let value = encode_attribute_value(attr);
        body.put_u16(attr.kind());
        body.put_u16(value.len() as u16);
        body.extend_from_slice(&value);
        let padding = (4 - (value.len() % 4)) % 4;
        body.put_bytes(0, padding);
    }

    let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
    out.put_u16(msg.typ.code());
    out.put_u16(body.len() as u16);
    out.extend_from_slice(&msg.transaction_id);
    out.extend_from_slice(&body);
    out.freeze()
}

fn encode_attribute_value(attr: &Attribute) -> Vec<u8> {
    match attr {
        Attribute::Username(s) => s.as_bytes().to_vec(),
        Attribute::MappedAddress(addr) => {
            let mut v = Vec::with_capacity(8);
            v.push(0); // reserved
            v.push(ADDRESS_FAMILY_IPV4);
            v.extend_from_slice(&addr.port().to_be_bytes());
            match addr {
                SocketAddr::V4(v4) => v.extend_from_slice(&v4.ip().octets()),
                SocketAddr::V6(_) => v.extend_from_slice(&[0, 0, 0, 0]),
            }
            v
        }
    }
}

/// Unpacks a wire-form message. Returns `Err` for anything too short to be a
/// STUN header, an unknown message type, or a truncated attribute — the
/// STUN handler treats any of these as "unpack failed".
pub fn unpack(buf: &[u8]) -> Result<Message, UnpackError> {
    if buf.len() < HEADER_LEN {
        return Err(UnpackError("shorter than the STUN header".to_owned()));
    }

    let mut cursor = buf;
    let type_code = cursor.get_u16();
    let body_len = cursor.get_u16() as usize;
    let typ = MessageType::from_code(type_code)
        .ok_or_else(|| UnpackError(format!("unknown message type {:#06x}", type_code)))?;

    let mut transaction_id = [0u8; TRANSACTION_ID_LEN];
    transaction_id.copy_from_slice(&cursor[..TRANSACTION_ID_LEN]);
    cursor.advance(TRANSACTION_ID_LEN);

    if cursor.remaining() < body_len {
        return Err(UnpackError("message length exceeds buffer".to_owned()));
    }
    let mut body = &cursor[..body_len];

    let mut attributes = Vec::new();
    while body.remaining() > 0 {
        if body.remaining() < ATTR_HEADER_LEN {
            return Err(UnpackError("truncated attribute header".to_owned()));
        }
        let attr_type = body.get_u16();
        let attr_len = body.get_u16() as usize;
        if body.remaining() < attr_len {
            return Err(UnpackError("truncated attribute value".to_owned()));
        }
        let value = &body[..attr_len];
        attributes.push(decode_attribute(attr_type, value)?);
        let padding = (4 - (attr_len % 4)) % 4;
        body.advance(attr_len);
        if body.remaining() < padding {
            return Err(UnpackError("truncated attribute padding".to_owned()));
        }
        body.advance(padding);
    }

    Ok(Message {
        typ,
        transaction_id,
        attributes,
    })
}

fn decode_attribute(attr_type: u16, value: &[u8]) -> Result<Attribute, UnpackError> {
    match attr_type {
        ATTR_USERNAME => {
            let s = std::str::from_utf8(value)
                .map_err(|_| UnpackError("USERNAME is not valid UTF-8".to_owned()))?;
            Ok(Attribute::Username(s.to_owned()))
        }
        ATTR_MAPPED_ADDRESS => {
            if value.len() < 8 || value[1] != ADDRESS_FAMILY_IPV4 {
                return Err(UnpackError("unsupported MAPPED-ADDRESS family".to_owned()));
            }
            let port = u16::from_be_bytes([value[2], value[3]]);
            let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
            Ok(Attribute::MappedAddress(SocketAddr::V4(SocketAddrV4::new(
                ip, port,
            ))))
        }
        other => Err(UnpackError(format!("unsupported attribute {:#06x}", other))),
    }
}
