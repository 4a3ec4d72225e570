//! Control Packets
//!
//! Serialization of single control-channel packets.
//!
//! # Wire Format
//!
//! ```text
//! opcode      : (code << 3) | key                 1 byte
//! session id  :                                   8 bytes
//! ack count   : n                                 1 byte
//! ack ids     : n x packet id (big-endian)        4n bytes
//! remote sid  : only if n > 0                     8 bytes
//! packet id   : big-endian, absent on P_ACK_V1    4 bytes
//! payload     : rest of packet
//! ```

use crate::zeroing::to_hex;
use std::fmt;

/// Opcode length in bytes
pub const OPCODE_LENGTH: usize = 1;
/// Session id length in bytes
pub const SESSION_ID_LENGTH: usize = 8;
/// Packet id length in bytes
pub const PACKET_ID_LENGTH: usize = 4;
/// Ack count length in bytes
pub const ACK_LENGTH_LENGTH: usize = 1;
/// Most ids a single packet can acknowledge
pub const MAX_ACKS: usize = u8::MAX as usize;

/// Control-channel session identifier
pub type SessionId = [u8; SESSION_ID_LENGTH];

/// Packet opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketCode {
    SoftResetV1 = 0x03,
    ControlV1 = 0x04,
    AckV1 = 0x05,
    DataV1 = 0x06,
    HardResetClientV2 = 0x07,
    HardResetServerV2 = 0x08,
    DataV2 = 0x09,
}

impl PacketCode {
    /// Codes carried over the control channel
    pub fn is_control(&self) -> bool {
        !matches!(self, PacketCode::DataV1 | PacketCode::DataV2)
    }

    /// Short protocol name
    pub fn name(&self) -> &'static str {
        match self {
            PacketCode::SoftResetV1 => "SOFT_RESET_V1",
            PacketCode::ControlV1 => "CONTROL_V1",
            PacketCode::AckV1 => "ACK_V1",
            PacketCode::DataV1 => "DATA_V1",
            PacketCode::HardResetClientV2 => "HARD_RESET_CLIENT_V2",
            PacketCode::HardResetServerV2 => "HARD_RESET_SERVER_V2",
            PacketCode::DataV2 => "DATA_V2",
        }
    }
}

impl TryFrom<u8> for PacketCode {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(PacketCode::SoftResetV1),
            0x04 => Ok(PacketCode::ControlV1),
            0x05 => Ok(PacketCode::AckV1),
            0x06 => Ok(PacketCode::DataV1),
            0x07 => Ok(PacketCode::HardResetClientV2),
            0x08 => Ok(PacketCode::HardResetServerV2),
            0x09 => Ok(PacketCode::DataV2),
            other => Err(PacketError::UnknownCode(other)),
        }
    }
}

impl fmt::Display for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Acknowledgements piggybacked on a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acks {
    /// Acknowledged packet ids (1 to [`MAX_ACKS`])
    pub ids: Vec<u32>,
    /// Session id of the peer whose packets are acknowledged
    pub remote_session_id: SessionId,
}

impl Acks {
    fn new(ids: Vec<u32>, remote_session_id: SessionId) -> Result<Self, PacketError> {
        if ids.len() > MAX_ACKS {
            return Err(PacketError::TooManyAcks(ids.len()));
        }
        Ok(Self {
            ids,
            remote_session_id,
        })
    }
}

/// A single control-channel packet
///
/// Pure acks (`AckV1`) have no packet id and no payload; every other
/// packet carries a packet id.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlPacket {
    code: PacketCode,
    key: u8,
    session_id: SessionId,
    packet_id: Option<u32>,
    payload: Option<Vec<u8>>,
    acks: Option<Acks>,
}

impl ControlPacket {
    /// Create a packet carrying a packet id and an optional payload
    ///
    /// `code` must not be `AckV1`; use [`ControlPacket::ack`] instead.
    pub fn new(
        code: PacketCode,
        key: u8,
        session_id: SessionId,
        packet_id: u32,
        payload: Option<Vec<u8>>,
    ) -> Self {
        debug_assert!(code != PacketCode::AckV1, "ack packets carry no packet id");
        Self {
            code,
            key: key & 0b111,
            session_id,
            packet_id: Some(packet_id),
            payload: payload.filter(|p| !p.is_empty()),
            acks: None,
        }
    }

    /// Create a pure ack packet
    ///
    /// Fails unless `ids` holds between 1 and [`MAX_ACKS`] ids.
    pub fn ack(
        key: u8,
        session_id: SessionId,
        ids: Vec<u32>,
        remote_session_id: SessionId,
    ) -> Result<Self, PacketError> {
        if ids.is_empty() {
            return Err(PacketError::AckWithoutIds);
        }
        Ok(Self {
            code: PacketCode::AckV1,
            key: key & 0b111,
            session_id,
            packet_id: None,
            payload: None,
            acks: Some(Acks::new(ids, remote_session_id)?),
        })
    }

    /// Piggyback acknowledgements on this packet
    ///
    /// An empty id list clears any acks; more than [`MAX_ACKS`] ids fail.
    pub fn with_acks(mut self, ids: Vec<u32>, remote_session_id: SessionId) -> Result<Self, PacketError> {
        self.acks = if ids.is_empty() {
            None
        } else {
            Some(Acks::new(ids, remote_session_id)?)
        };
        Ok(self)
    }

    pub fn code(&self) -> PacketCode {
        self.code
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn packet_id(&self) -> Option<u32> {
        self.packet_id
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn acks(&self) -> Option<&Acks> {
        self.acks.as_ref()
    }

    /// Whether this is a pure ack
    pub fn is_ack(&self) -> bool {
        self.code == PacketCode::AckV1
    }

    /// Serialize to the wire format
    pub fn serialize(&self) -> Vec<u8> {
        let ack_count = self.acks.as_ref().map_or(0, |a| a.ids.len());
        let payload_len = self.payload.as_ref().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(
            OPCODE_LENGTH
                + SESSION_ID_LENGTH
                + ACK_LENGTH_LENGTH
                + ack_count * PACKET_ID_LENGTH
                + SESSION_ID_LENGTH
                + PACKET_ID_LENGTH
                + payload_len,
        );

        out.push(((self.code as u8) << 3) | (self.key & 0b111));
        out.extend_from_slice(&self.session_id);

        match &self.acks {
            // 1..=MAX_ACKS ids, enforced on construction
            Some(acks) => {
                out.push(acks.ids.len() as u8);
                for id in &acks.ids {
                    out.extend_from_slice(&id.to_be_bytes());
                }
                out.extend_from_slice(&acks.remote_session_id);
            }
            None => out.push(0),
        }

        if !self.is_ack() {
            out.extend_from_slice(&self.packet_id.unwrap_or_default().to_be_bytes());
            if let Some(payload) = &self.payload {
                out.extend_from_slice(payload);
            }
        }

        out
    }

    /// Parse a packet from the wire format
    pub fn parse(packet: &[u8]) -> Result<Self, PacketError> {
        let mut reader = Reader::new(packet);

        let opcode = reader.u8().ok_or(PacketError::MissingOpcode)?;
        let code = PacketCode::try_from(opcode >> 3)?;
        if !code.is_control() {
            return Err(PacketError::NotControl(code));
        }
        let key = opcode & 0b111;

        let session_id = reader
            .session_id()
            .ok_or(PacketError::MissingSessionId)?;

        let ack_count = reader.u8().ok_or(PacketError::MissingAckSize)?;
        let mut acks = None;
        if ack_count > 0 {
            let mut ids = Vec::with_capacity(ack_count as usize);
            for _ in 0..ack_count {
                ids.push(reader.u32().ok_or(PacketError::MissingAcks)?);
            }
            let remote_session_id = reader
                .session_id()
                .ok_or(PacketError::MissingRemoteSessionId)?;
            acks = Some(Acks {
                ids,
                remote_session_id,
            });
        }

        if code == PacketCode::AckV1 {
            if acks.is_none() {
                return Err(PacketError::AckWithoutIds);
            }
            return Ok(Self {
                code,
                key,
                session_id,
                packet_id: None,
                payload: None,
                acks,
            });
        }

        let packet_id = reader.u32().ok_or(PacketError::MissingPacketId)?;
        let rest = reader.rest();
        let payload = (!rest.is_empty()).then(|| rest.to_vec());

        Ok(Self {
            code,
            key,
            session_id,
            packet_id: Some(packet_id),
            payload,
            acks,
        })
    }

    /// Human-readable rendering
    ///
    /// The payload is shown in clear only when `reveal` is set.
    pub fn describe(&self, reveal: bool) -> PacketDescription<'_> {
        PacketDescription {
            packet: self,
            reveal,
        }
    }
}

impl fmt::Debug for ControlPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.describe(false), f)
    }
}

/// Printable packet, redacted unless asked otherwise
pub struct PacketDescription<'a> {
    packet: &'a ControlPacket,
    reveal: bool,
}

impl fmt::Display for PacketDescription<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.packet;
        write!(
            f,
            "{{{} key={} sid={}",
            p.code,
            p.key,
            to_hex(&p.session_id)
        )?;
        if let Some(acks) = &p.acks {
            write!(f, " acks={{{:?}, {}}}", acks.ids, to_hex(&acks.remote_session_id))?;
        }
        if let Some(id) = p.packet_id {
            write!(f, " pid={id}")?;
        }
        if let Some(payload) = &p.payload {
            if self.reveal {
                write!(f, " [{}]", to_hex(payload))?;
            } else {
                write!(f, " [{} bytes]", payload.len())?;
            }
        }
        f.write_str("}")
    }
}

/// Bounds-checked big-endian reader
struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let slice = self.buf.get(self.offset..self.offset.checked_add(len)?)?;
        self.offset += len;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(PACKET_ID_LENGTH)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn session_id(&mut self) -> Option<SessionId> {
        self.take(SESSION_ID_LENGTH).map(|b| {
            let mut id = [0u8; SESSION_ID_LENGTH];
            id.copy_from_slice(b);
            id
        })
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.offset..];
        self.offset = self.buf.len();
        rest
    }
}

/// Control packet framing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("Missing opcode")]
    MissingOpcode,

    #[error("Unknown packet code: {0:#04x}")]
    UnknownCode(u8),

    #[error("Not a control packet: {0}")]
    NotControl(PacketCode),

    #[error("Missing session id")]
    MissingSessionId,

    #[error("Missing ack count")]
    MissingAckSize,

    #[error("Missing ack ids")]
    MissingAcks,

    #[error("Missing remote session id")]
    MissingRemoteSessionId,

    #[error("Ack packet without ids")]
    AckWithoutIds,

    #[error("Too many acks for one packet: {0}")]
    TooManyAcks(usize),

    #[error("Missing packet id")]
    MissingPacketId,
}
