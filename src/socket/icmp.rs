use core::fmt;
use core::task::Poll;

use managed::ManagedSlice;

use crate::config::{SEND_TIMEOUT, SOCKET_OPEN_TIMEOUT};
use crate::phy::{Device, Interrupt, SocketHandle, SocketId};
use crate::time::{Clock, Duration};
use crate::wire::{
    ChecksumAccumulator, Icmpv4Header, Icmpv4Message, Icmpv4Packet, IpProtocol, IpRawInfo,
    IpRawPacket, Ipv4Address, ICMPV4_HEADER_LEN, IPRAW_INFO_LEN,
};

/// Error returned by the ICMP socket.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No chip socket is held, or the chip refused to open one.
    Socket,
    /// The chip reported a transmit timeout.
    SendTimeout,
    /// No complete datagram arrived in time.
    ReceiveTimeout,
    /// A datagram arrived whose checksum does not match its contents.
    BadChecksum,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Socket => write!(f, "socket unavailable"),
            Error::SendTimeout => write!(f, "send timed out"),
            Error::ReceiveTimeout => write!(f, "receive timed out"),
            Error::BadChecksum => write!(f, "bad checksum"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Progress of assembling one received datagram.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum Stage {
    #[default]
    AwaitingHeader,
    AwaitingPayload,
    Done,
    ChecksumMismatch,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::ChecksumMismatch)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::AwaitingHeader => write!(f, "AWAITING-HEADER"),
            Stage::AwaitingPayload => write!(f, "AWAITING-PAYLOAD"),
            Stage::Done => write!(f, "DONE"),
            Stage::ChecksumMismatch => write!(f, "CHECKSUM-MISMATCH"),
        }
    }
}

/// The last datagram assembled by a [Socket].
///
/// `payload` holds the retained part only; declared octets beyond the buffer
/// capacity were checksummed and dropped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct IncomingPacket<'p> {
    pub info: IpRawInfo,
    pub header: Icmpv4Header,
    pub payload: &'p [u8],
    pub hop_limit: u8,
}

impl<'p> IncomingPacket<'p> {
    /// Declared payload length, excluding the ICMP header.
    pub fn payload_len(&self) -> u16 {
        self.info.len.saturating_sub(ICMPV4_HEADER_LEN as u16)
    }
}

/// An ICMP socket on top of one raw-IP chip socket.
///
/// The socket owns a payload buffer of fixed capacity. Outgoing messages
/// carry the whole buffer as payload; incoming payloads are copied into it,
/// truncated to capacity. Only one datagram is assembled at a time, driven
/// by [poll_receive](#method.poll_receive).
#[derive(Debug)]
pub struct Socket<'a> {
    handle: SocketHandle,
    ident: u16,
    payload: ManagedSlice<'a, u8>,
    stage: Stage,
    /// Read pointer of the next octet to copy out of the chip.
    cursor: u16,
    info: IpRawInfo,
    header: Icmpv4Header,
    retained: usize,
    hop_limit: u8,
}

impl<'a> Socket<'a> {
    /// Create a closed ICMP socket using `ident` for outgoing echo messages.
    pub fn new<P>(ident: u16, payload: P) -> Socket<'a>
    where
        P: Into<ManagedSlice<'a, u8>>,
    {
        Socket {
            handle: SocketHandle::Unset,
            ident,
            payload: payload.into(),
            stage: Stage::AwaitingHeader,
            cursor: 0,
            info: IpRawInfo::default(),
            header: Icmpv4Header::default(),
            retained: 0,
            hop_limit: 0,
        }
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn ident(&self) -> u16 {
        self.ident
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn payload_capacity(&self) -> usize {
        self.payload.len()
    }

    /// The payload buffer, to fill in the pattern of the next request.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    fn socket(&self) -> Result<SocketId> {
        self.handle.socket().ok_or(Error::Socket)
    }

    /// Take `socket` and put it into raw-IP mode for ICMP.
    ///
    /// Whatever socket was held before is closed first. Fails with
    /// [Error::Socket] when the chip does not report raw-IP mode within
    /// [SOCKET_OPEN_TIMEOUT], in which case no socket is held.
    pub fn open<D, C>(&mut self, device: &mut D, clock: &C, socket: SocketId) -> Result<()>
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        self.close(device);
        device.close(socket);
        device.clear_interrupts(socket, Interrupt::ALL);
        device.open_raw(socket, IpProtocol::Icmp);

        let started_at = clock.now();
        loop {
            if device.is_raw_open(socket) {
                net_debug!("icmp: socket {} open", socket);
                self.handle = SocketHandle::Open(socket);
                return Ok(());
            }
            if clock.now() - started_at >= SOCKET_OPEN_TIMEOUT {
                break;
            }
            clock.relax();
        }

        net_debug!("icmp: socket {} did not enter raw mode", socket);
        device.close(socket);
        device.clear_interrupts(socket, Interrupt::ALL);
        Err(Error::Socket)
    }

    /// Close the held socket, if any.
    pub fn close<D: Device + ?Sized>(&mut self, device: &mut D) {
        if let SocketHandle::Open(socket) = self.handle {
            device.close(socket);
            device.clear_interrupts(socket, Interrupt::ALL);
            net_debug!("icmp: socket {} closed", socket);
        }
        self.handle = SocketHandle::Unset;
    }

    /// Send one echo message carrying the whole payload buffer, and wait
    /// until the chip is done with it.
    pub fn send<D, C>(
        &mut self,
        device: &mut D,
        clock: &C,
        msg_type: Icmpv4Message,
        dst_addr: Ipv4Address,
        seq_no: u16,
        hop_limit: u8,
    ) -> Result<()>
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        let socket = self.socket()?;

        let mut header = Icmpv4Header::echo(msg_type, self.ident, seq_no);
        let mut accum = ChecksumAccumulator::new();
        header.accumulate(&mut accum);
        accum.add_bytes(&self.payload);
        header.checksum = accum.finish();

        net_trace!("icmp: {} -> {} ttl={}", header, dst_addr, hop_limit);
        device.set_destination(socket, dst_addr);
        device.set_hop_limit(socket, hop_limit);
        device.write(socket, 0, &header.to_bytes());
        device.write(socket, ICMPV4_HEADER_LEN as u16, &self.payload);
        device.send(socket);

        let started_at = clock.now();
        let result = loop {
            let flags = device.interrupts(socket);
            // A completed send outranks a timeout raised alongside it.
            if flags.contains(Interrupt::SEND_OK) {
                break Ok(());
            }
            if flags.contains(Interrupt::TIMEOUT) {
                break Err(Error::SendTimeout);
            }
            if clock.now() - started_at >= SEND_TIMEOUT {
                net_debug!("icmp: socket {} never finished sending", socket);
                break Err(Error::SendTimeout);
            }
            clock.relax();
        };
        device.clear_interrupts(socket, Interrupt::SEND_OK | Interrupt::TIMEOUT);
        result
    }

    /// Forget the last assembled datagram and start waiting for the next one.
    pub fn begin_receive<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let socket = self.socket()?;
        self.payload.fill(0);
        self.stage = Stage::AwaitingHeader;
        self.info = IpRawInfo::default();
        self.header = Icmpv4Header::default();
        self.retained = 0;
        self.hop_limit = 0;
        self.cursor = device.read_cursor(socket);
        Ok(())
    }

    /// Advance datagram assembly by at most one stage.
    ///
    /// Nothing is read from the chip until everything the next stage needs
    /// has arrived. Once a terminal stage is reached, every further call
    /// reports the same result until [begin_receive](#method.begin_receive).
    pub fn poll_receive<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<Poll<()>> {
        let socket = self.socket()?;
        match self.stage {
            Stage::AwaitingHeader => {
                if (device.bytes_available(socket) as usize) < IPRAW_INFO_LEN {
                    return Ok(Poll::Pending);
                }
                let mut bytes = [0; IPRAW_INFO_LEN];
                device.read(socket, self.cursor, &mut bytes);
                self.cursor = self.cursor.wrapping_add(IPRAW_INFO_LEN as u16);

                let packet = IpRawPacket::new_unchecked(&bytes[..]);
                self.info = IpRawInfo {
                    src_addr: packet.src_addr(),
                    len: packet.len(),
                };
                net_trace!(
                    "icmp: {} octets from {} announced",
                    self.info.len,
                    self.info.src_addr
                );
                self.stage = Stage::AwaitingPayload;
                Ok(Poll::Pending)
            }
            Stage::AwaitingPayload => {
                let needed = IPRAW_INFO_LEN + self.info.len as usize;
                if (device.bytes_available(socket) as usize) < needed {
                    return Ok(Poll::Pending);
                }
                self.assemble(device, socket);
                self.outcome()
            }
            Stage::Done | Stage::ChecksumMismatch => self.outcome(),
        }
    }

    fn outcome(&self) -> Result<Poll<()>> {
        match self.stage {
            Stage::Done => Ok(Poll::Ready(())),
            Stage::ChecksumMismatch => Err(Error::BadChecksum),
            Stage::AwaitingHeader | Stage::AwaitingPayload => Ok(Poll::Pending),
        }
    }

    /// Copy the announced datagram out of the chip and verify its checksum.
    fn assemble<D: Device + ?Sized>(&mut self, device: &mut D, socket: SocketId) {
        let declared = self.info.len as usize;
        let consumed = (IPRAW_INFO_LEN + declared) as u16;

        if declared < ICMPV4_HEADER_LEN {
            net_debug!("icmp: {}-octet datagram is shorter than a header", declared);
            device.receive_ack(socket, consumed);
            device.clear_interrupts(socket, Interrupt::RECV);
            self.hop_limit = device.last_hop_limit(socket);
            self.stage = Stage::ChecksumMismatch;
            return;
        }

        let mut bytes = [0; ICMPV4_HEADER_LEN];
        device.read(socket, self.cursor, &mut bytes);
        self.cursor = self.cursor.wrapping_add(ICMPV4_HEADER_LEN as u16);

        let mut header = Icmpv4Header::parse(&Icmpv4Packet::new_unchecked(&bytes[..]));
        let received = header.checksum;
        header.checksum = 0;

        let mut accum = ChecksumAccumulator::new();
        header.accumulate(&mut accum);

        let payload_len = declared - ICMPV4_HEADER_LEN;
        let retained = payload_len.min(self.payload.len());
        device.read(socket, self.cursor, &mut self.payload[..retained]);
        self.cursor = self.cursor.wrapping_add(retained as u16);
        accum.add_bytes(&self.payload);

        // Octets past the buffer are only summed.
        let mut rest = payload_len - retained;
        if rest > 0 {
            net_debug!("icmp: dropping {} payload octets past capacity", rest);
        }
        while rest > 0 {
            let mut pair = [0; 2];
            let chunk = rest.min(pair.len());
            device.read(socket, self.cursor, &mut pair[..chunk]);
            self.cursor = self.cursor.wrapping_add(chunk as u16);
            accum.add_bytes(&pair[..chunk]);
            rest -= chunk;
        }

        device.receive_ack(socket, consumed);
        device.clear_interrupts(socket, Interrupt::RECV);
        self.hop_limit = device.last_hop_limit(socket);

        let computed = accum.finish();
        header.checksum = received;
        self.header = header;
        self.retained = retained;

        if computed == received {
            net_trace!("icmp: {} <- {}", header, self.info.src_addr);
            self.stage = Stage::Done;
        } else {
            net_debug!(
                "icmp: checksum mismatch from {}: got {:#06x}, computed {:#06x}",
                self.info.src_addr,
                received,
                computed
            );
            self.stage = Stage::ChecksumMismatch;
        }
    }

    /// Wait for one datagram, giving up once more than `timeout` has passed.
    pub fn receive<D, C>(&mut self, device: &mut D, clock: &C, timeout: Duration) -> Result<()>
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        let started_at = clock.now();
        self.begin_receive(device)?;
        loop {
            if self.poll_receive(device)?.is_ready() {
                return Ok(());
            }
            if clock.now() - started_at > timeout {
                net_debug!("icmp: nothing received within {:?}", timeout);
                return Err(Error::ReceiveTimeout);
            }
            clock.relax();
        }
    }

    /// The datagram assembled by the last receive.
    pub fn incoming(&self) -> IncomingPacket<'_> {
        IncomingPacket {
            info: self.info,
            header: self.header,
            payload: &self.payload[..self.retained],
            hop_limit: self.hop_limit,
        }
    }
}
