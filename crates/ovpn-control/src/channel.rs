//! Reliable Control Channel
//!
//! Sequencing layer between the transport and the TLS session:
//! reorders inbound packets by packet id, fragments outbound payloads,
//! tracks acknowledgements and resends unacknowledged packets.
//!
//! Packet (de)serialization goes through a [`ControlSerializer`] so that
//! tls-auth/tls-crypt wrapping can be supplied by the crypto back-end.

use crate::packet::{
    ControlPacket, PacketCode, PacketError, SessionId, MAX_ACKS, SESSION_ID_LENGTH,
};
use crate::zeroing::to_hex;
use rand::{CryptoRng, RngCore};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Inbound packet ids accepted ahead of the next expected one
pub const INBOUND_WINDOW: u32 = 64;

/// Wire (de)serialization of control packets
pub trait ControlSerializer {
    /// Drop per-session state (replay windows, counters)
    fn reset(&mut self);

    fn serialize(&mut self, packet: &ControlPacket) -> Result<Vec<u8>, ChannelError>;

    fn deserialize(&mut self, data: &[u8]) -> Result<ControlPacket, ChannelError>;
}

/// Control packets without tls-auth/tls-crypt wrapping
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSerializer;

impl ControlSerializer for PlainSerializer {
    fn reset(&mut self) {}

    fn serialize(&mut self, packet: &ControlPacket) -> Result<Vec<u8>, ChannelError> {
        Ok(packet.serialize())
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<ControlPacket, ChannelError> {
        Ok(ControlPacket::parse(data)?)
    }
}

/// Control channel errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Malformed control packet: {0}")]
    Packet(#[from] PacketError),

    #[error("Missing local session id")]
    MissingSessionId,

    #[error("Acks for session {received} while local session is {expected}")]
    SessionMismatch { expected: String, received: String },

    #[error("Invalid maximum packet size: {0}")]
    InvalidPacketSize(usize),
}

/// Ordering and retransmission state for one control channel
pub struct ControlChannel<S: ControlSerializer = PlainSerializer> {
    serializer: S,
    session_id: Option<SessionId>,
    remote_session_id: Option<SessionId>,
    inbound: Vec<ControlPacket>,
    outbound: Vec<ControlPacket>,
    next_inbound_id: u32,
    next_outbound_id: u32,
    pending_acks: BTreeSet<u32>,
    sent_times: HashMap<u32, Instant>,
}

impl ControlChannel<PlainSerializer> {
    /// Channel without control packet wrapping
    pub fn plain() -> Self {
        Self::new(PlainSerializer)
    }
}

impl<S: ControlSerializer> ControlChannel<S> {
    pub fn new(serializer: S) -> Self {
        Self {
            serializer,
            session_id: None,
            remote_session_id: None,
            inbound: Vec::new(),
            outbound: Vec::new(),
            next_inbound_id: 0,
            next_outbound_id: 0,
            pending_acks: BTreeSet::new(),
            sent_times: HashMap::new(),
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn remote_session_id(&self) -> Option<&SessionId> {
        self.remote_session_id.as_ref()
    }

    /// Clear queues and counters
    ///
    /// A new session also gets a fresh random local session id and
    /// forgets the remote one.
    pub fn reset<R: RngCore + CryptoRng + ?Sized>(&mut self, for_new_session: bool, rng: &mut R) {
        if for_new_session {
            let mut session_id = [0u8; SESSION_ID_LENGTH];
            rng.fill_bytes(&mut session_id);
            debug!("Control: Local session id is {}", to_hex(&session_id));
            self.session_id = Some(session_id);
            self.remote_session_id = None;
        }
        self.inbound.clear();
        self.outbound.clear();
        self.next_inbound_id = 0;
        self.next_outbound_id = 0;
        self.pending_acks.clear();
        self.sent_times.clear();
        self.serializer.reset();
    }

    pub fn set_remote_session_id(&mut self, remote_session_id: SessionId) {
        info!("Control: Remote session id is {}", to_hex(&remote_session_id));
        self.remote_session_id = Some(remote_session_id);
    }

    /// Deserialize an inbound packet and process its acks
    pub fn read_inbound_packet(&mut self, data: &[u8]) -> Result<ControlPacket, ChannelError> {
        let packet = self.serializer.deserialize(data).map_err(|e| {
            error!("Control: Channel failure: {}", e);
            e
        })?;
        debug!("Control: Read packet {}", packet.describe(false));

        if let Some(acks) = packet.acks() {
            self.read_acks(&acks.ids, &acks.remote_session_id)?;
        }
        Ok(packet)
    }

    /// Queue an inbound packet and return those now deliverable in order
    ///
    /// Packet ids wrap around. Duplicates, packets older than the next
    /// expected id and packets beyond [`INBOUND_WINDOW`] are dropped.
    pub fn enqueue_inbound(&mut self, packet: ControlPacket) -> Vec<ControlPacket> {
        let Some(packet_id) = packet.packet_id() else {
            return Vec::new();
        };
        let next = self.next_inbound_id;
        let offset = packet_id.wrapping_sub(next);
        if offset >= INBOUND_WINDOW {
            debug!("Control: Drop packet {} outside window from {}", packet_id, next);
            return Vec::new();
        }
        match self
            .inbound
            .binary_search_by_key(&offset, |p| p.packet_id().unwrap_or_default().wrapping_sub(next))
        {
            Ok(_) => debug!("Control: Drop duplicate packet {}", packet_id),
            Err(index) => self.inbound.insert(index, packet),
        }

        let ready = self
            .inbound
            .iter()
            .enumerate()
            .take_while(|(i, p)| p.packet_id() == Some(next.wrapping_add(*i as u32)))
            .count();
        self.next_inbound_id = next.wrapping_add(ready as u32);
        self.inbound.drain(..ready).collect()
    }

    /// Split `payload` into packets of at most `max_packet_size` bytes
    pub fn enqueue_outbound(
        &mut self,
        code: PacketCode,
        key: u8,
        payload: &[u8],
        max_packet_size: usize,
    ) -> Result<(), ChannelError> {
        let session_id = self.session_id.ok_or_else(|| {
            error!("Control: Missing session id, reset for a new session first");
            ChannelError::MissingSessionId
        })?;
        if max_packet_size == 0 {
            return Err(ChannelError::InvalidPacketSize(max_packet_size));
        }

        let first_id = self.next_outbound_id;
        let mut chunks: Vec<&[u8]> = payload.chunks(max_packet_size).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        for chunk in chunks {
            let packet = ControlPacket::new(
                code,
                key,
                session_id,
                self.next_outbound_id,
                Some(chunk.to_vec()),
            );
            self.outbound.push(packet);
            self.next_outbound_id = self.next_outbound_id.wrapping_add(1);
        }

        let count = self.next_outbound_id.wrapping_sub(first_id);
        if count > 1 {
            debug!(
                "Control: Enqueued {} packets [{}-{}]",
                count,
                first_id,
                self.next_outbound_id.wrapping_sub(1)
            );
        } else {
            debug!("Control: Enqueued 1 packet [{}]", first_id);
        }
        Ok(())
    }

    /// Serialize queued packets not sent within `resend_after`
    pub fn write_outbound(
        &mut self,
        resend_after: Duration,
        now: Instant,
    ) -> Result<Vec<Vec<u8>>, ChannelError> {
        let mut raw_list = Vec::new();
        for packet in &self.outbound {
            let Some(packet_id) = packet.packet_id() else {
                continue;
            };
            if let Some(sent) = self.sent_times.get(&packet_id) {
                if now.saturating_duration_since(*sent) < resend_after {
                    continue;
                }
            }

            debug!("Control: Write control packet {}", packet.describe(false));
            raw_list.push(self.serializer.serialize(packet)?);
            self.sent_times.insert(packet_id, now);
            self.pending_acks.insert(packet_id);
        }
        Ok(raw_list)
    }

    /// Whether any sent packet is still unacknowledged
    pub fn has_pending_acks(&self) -> bool {
        !self.pending_acks.is_empty()
    }

    /// Serialize a pure ack for the peer's packets
    ///
    /// `ids` must hold between 1 and [`MAX_ACKS`] ids.
    pub fn write_acks(
        &mut self,
        key: u8,
        ids: Vec<u32>,
        remote_session_id: SessionId,
    ) -> Result<Vec<u8>, ChannelError> {
        let session_id = self.session_id.ok_or(ChannelError::MissingSessionId)?;
        let packet = ControlPacket::ack(key, session_id, ids, remote_session_id)?;
        debug!("Control: Write ack packet {}", packet.describe(false));
        self.serializer.serialize(&packet)
    }

    fn read_acks(&mut self, ids: &[u32], remote_session_id: &SessionId) -> Result<(), ChannelError> {
        let session_id = self.session_id.ok_or(ChannelError::MissingSessionId)?;
        if *remote_session_id != session_id {
            let err = ChannelError::SessionMismatch {
                expected: to_hex(&session_id),
                received: to_hex(remote_session_id),
            };
            error!("Control: {}", err);
            return Err(err);
        }

        self.outbound
            .retain(|p| p.packet_id().is_none_or(|id| !ids.contains(&id)));
        for id in ids {
            self.pending_acks.remove(id);
            self.sent_times.remove(id);
        }
        Ok(())
    }
}
