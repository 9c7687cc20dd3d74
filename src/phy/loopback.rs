use heapless::Vec;

use crate::config::{
    LOOPBACK_BUFFER_SIZE, LOOPBACK_MAX_HOSTS, LOOPBACK_MAX_ROUTERS, LOOPBACK_SOCKET_COUNT,
};
use crate::phy::{Device, Interrupt, SocketId};
use crate::wire::{
    Icmpv4Header, Icmpv4Message, Icmpv4Packet, Icmpv4TimeExceeded, IpProtocol, IpRawInfo,
    Ipv4Address, Ipv4Repr, ICMPV4_HEADER_LEN, IPRAW_INFO_LEN, IPV4_HEADER_LEN,
};

type Buffer = Vec<u8, LOOPBACK_BUFFER_SIZE>;

/// Hop limit of replies that did not cross any router.
const REPLY_HOP_LIMIT: u8 = 64;

/// Error returned when socket memory cannot take a datagram.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Full;

#[derive(Debug)]
struct Slot {
    protocol: Option<IpProtocol>,
    dst_addr: Ipv4Address,
    hop_limit: u8,
    tx: Buffer,
    rx: Buffer,
    /// Read pointer value of `rx[0]`.
    rx_base: u16,
    interrupts: Interrupt,
    last_hop_limit: u8,
    sent: Buffer,
    /// Status reads left before raw mode is reported.
    open_countdown: u8,
}

impl Slot {
    fn new() -> Slot {
        Slot {
            protocol: None,
            dst_addr: Ipv4Address::UNSPECIFIED,
            hop_limit: 0,
            tx: Vec::new(),
            rx: Vec::new(),
            rx_base: 0,
            interrupts: Interrupt::NONE,
            last_hop_limit: 0,
            sent: Vec::new(),
            open_countdown: 0,
        }
    }
}

/// A simulated socket chip.
///
/// Echo requests sent to a registered host are answered with an echo reply
/// placed into the receive memory of the sending socket. When routers are
/// registered, a request whose TTL does not cover the whole chain is answered
/// with "time exceeded" by the router where it ran out. Datagrams can also be
/// injected directly, a few octets at a time, to exercise partial arrival.
#[derive(Debug)]
pub struct Loopback {
    address: Ipv4Address,
    slots: [Slot; LOOPBACK_SOCKET_COUNT],
    hosts: Vec<Ipv4Address, LOOPBACK_MAX_HOSTS>,
    routers: Vec<Ipv4Address, LOOPBACK_MAX_ROUTERS>,
    refuse_open: bool,
    open_delay: u8,
    fail_sends: bool,
    responding: bool,
}

impl Loopback {
    /// Creates a chip configured with our own `address` and no reachable hosts.
    pub fn new(address: Ipv4Address) -> Loopback {
        Loopback {
            address,
            slots: core::array::from_fn(|_| Slot::new()),
            hosts: Vec::new(),
            routers: Vec::new(),
            refuse_open: false,
            open_delay: 0,
            fail_sends: false,
            responding: true,
        }
    }

    pub fn address(&self) -> Ipv4Address {
        self.address
    }

    /// Make `addr` answer echo requests.
    pub fn add_host(&mut self, addr: Ipv4Address) -> Result<(), Full> {
        self.hosts.push(addr).map_err(|_| Full)
    }

    /// Append a router to the path every request travels.
    pub fn add_router(&mut self, addr: Ipv4Address) -> Result<(), Full> {
        self.routers.push(addr).map_err(|_| Full)
    }

    /// Never report raw-IP mode after an open command.
    pub fn set_refuse_open(&mut self, refuse: bool) {
        self.refuse_open = refuse
    }

    /// Make the socket status read `reads` times after an open command
    /// before it reports raw-IP mode.
    pub fn set_open_delay(&mut self, reads: u8) {
        self.open_delay = reads
    }

    /// Report a transmit timeout for every send.
    pub fn set_send_failure(&mut self, fail: bool) {
        self.fail_sends = fail
    }

    /// Whether hosts and routers answer at all.
    pub fn set_responding(&mut self, responding: bool) {
        self.responding = responding
    }

    pub fn is_open(&self, socket: SocketId) -> bool {
        self.slot(socket).protocol.is_some()
    }

    pub fn destination(&self, socket: SocketId) -> Ipv4Address {
        self.slot(socket).dst_addr
    }

    pub fn hop_limit(&self, socket: SocketId) -> u8 {
        self.slot(socket).hop_limit
    }

    /// The datagram transmitted by the last send command.
    pub fn sent(&self, socket: SocketId) -> &[u8] {
        &self.slot(socket).sent
    }

    /// Octets waiting in receive memory.
    pub fn pending(&self, socket: SocketId) -> usize {
        self.slot(socket).rx.len()
    }

    /// Append raw octets to the receive memory of `socket`.
    pub fn inject(&mut self, socket: SocketId, data: &[u8]) -> Result<(), Full> {
        let slot = self.slot_mut(socket);
        slot.rx.extend_from_slice(data).map_err(|_| Full)?;
        slot.interrupts.insert(Interrupt::RECV);
        Ok(())
    }

    /// Append a whole datagram, info block included.
    pub fn inject_datagram(
        &mut self,
        socket: SocketId,
        src_addr: Ipv4Address,
        payload: &[u8],
    ) -> Result<(), Full> {
        let info = IpRawInfo {
            src_addr,
            len: payload.len() as u16,
        };
        if self.pending(socket) + IPRAW_INFO_LEN + payload.len() > LOOPBACK_BUFFER_SIZE {
            return Err(Full);
        }
        self.inject(socket, &info.to_bytes())?;
        self.inject(socket, payload)
    }

    fn slot(&self, socket: SocketId) -> &Slot {
        &self.slots[socket.0 as usize]
    }

    fn slot_mut(&mut self, socket: SocketId) -> &mut Slot {
        &mut self.slots[socket.0 as usize]
    }

    fn respond(&mut self, socket: SocketId, frame: &[u8]) {
        if !self.responding {
            return;
        }
        let request = match Icmpv4Packet::new_checked(frame) {
            Ok(packet) => Icmpv4Header::parse(&packet),
            Err(_) => return,
        };
        if request.msg_type != Icmpv4Message::EchoRequest {
            return;
        }
        let dst_addr = self.slot(socket).dst_addr;
        if !self.hosts.contains(&dst_addr) {
            net_debug!("loopback: no host at {}", dst_addr);
            return;
        }

        let hop_limit = self.slot(socket).hop_limit;
        let mut reply = Buffer::new();
        // A TTL of zero runs out at the first router, if there is one.
        let expired_at = if (hop_limit as usize) <= self.routers.len() {
            self.routers.get((hop_limit as usize).max(1) - 1).copied()
        } else {
            None
        };
        let (src_addr, arrival_hop_limit) = if let Some(router) = expired_at {
            if time_exceeded(&mut reply, self.address, dst_addr, frame).is_err() {
                return;
            }
            (router, REPLY_HOP_LIMIT.saturating_sub(hop_limit))
        } else {
            if reply.extend_from_slice(frame).is_err() {
                return;
            }
            let mut packet = Icmpv4Packet::new_unchecked(&mut reply[..]);
            packet.set_msg_type(Icmpv4Message::EchoReply);
            packet.fill_checksum();
            let hops = self.routers.len() as u8;
            (dst_addr, REPLY_HOP_LIMIT.saturating_sub(hops))
        };

        match self.inject_datagram(socket, src_addr, &reply) {
            Ok(()) => {
                self.slot_mut(socket).last_hop_limit = arrival_hop_limit;
                net_trace!("loopback: {} octets from {}", reply.len(), src_addr);
            }
            Err(Full) => net_debug!("loopback: receive memory full, dropping reply"),
        }
    }
}

/// Build a "time exceeded" message quoting the IPv4 header and the first
/// eight octets of `frame`.
fn time_exceeded(
    reply: &mut Buffer,
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    frame: &[u8],
) -> Result<(), Full> {
    let quoted = frame.len().min(ICMPV4_HEADER_LEN);
    let len = ICMPV4_HEADER_LEN + IPV4_HEADER_LEN + quoted;
    reply.resize(len, 0).map_err(|_| Full)?;

    let ip_repr = Ipv4Repr {
        src_addr,
        dst_addr,
        next_header: IpProtocol::Icmp,
        payload_len: frame.len(),
        hop_limit: 1,
    };
    ip_repr
        .emit(&mut reply[ICMPV4_HEADER_LEN..])
        .map_err(|_| Full)?;
    reply[ICMPV4_HEADER_LEN + IPV4_HEADER_LEN..].copy_from_slice(&frame[..quoted]);

    let mut packet = Icmpv4Packet::new_unchecked(&mut reply[..]);
    let header = Icmpv4Header {
        msg_type: Icmpv4Message::TimeExceeded,
        code: Icmpv4TimeExceeded::TtlExpired.into(),
        checksum: 0,
        ident: 0,
        seq_no: 0,
    };
    header.emit(&mut packet);
    packet.fill_checksum();
    Ok(())
}

impl Device for Loopback {
    fn open_raw(&mut self, socket: SocketId, protocol: IpProtocol) {
        let refuse = self.refuse_open;
        let delay = self.open_delay;
        let slot = self.slot_mut(socket);
        slot.tx.clear();
        slot.open_countdown = delay;
        if !refuse {
            slot.protocol = Some(protocol);
        }
    }

    fn is_raw_open(&mut self, socket: SocketId) -> bool {
        let slot = self.slot_mut(socket);
        if slot.protocol.is_some() && slot.open_countdown > 0 {
            slot.open_countdown -= 1;
            return false;
        }
        slot.protocol.is_some()
    }

    fn close(&mut self, socket: SocketId) {
        let slot = self.slot_mut(socket);
        slot.protocol = None;
        slot.tx.clear();
        let discarded = slot.rx.len() as u16;
        slot.rx.clear();
        slot.rx_base = slot.rx_base.wrapping_add(discarded);
    }

    fn bytes_available(&mut self, socket: SocketId) -> u16 {
        let slot = self.slot(socket);
        if slot.protocol.is_none() {
            return 0;
        }
        slot.rx.len() as u16
    }

    fn read_cursor(&mut self, socket: SocketId) -> u16 {
        self.slot(socket).rx_base
    }

    fn read(&mut self, socket: SocketId, cursor: u16, buf: &mut [u8]) {
        let slot = self.slot(socket);
        let start = cursor.wrapping_sub(slot.rx_base) as usize;
        for (i, octet) in buf.iter_mut().enumerate() {
            // Past the received data the chip returns whatever memory holds.
            *octet = slot.rx.get(start + i).copied().unwrap_or(0);
        }
    }

    fn write(&mut self, socket: SocketId, offset: u16, data: &[u8]) {
        let slot = self.slot_mut(socket);
        let start = (offset as usize).min(LOOPBACK_BUFFER_SIZE);
        let end = (start + data.len()).min(LOOPBACK_BUFFER_SIZE);
        if slot.tx.len() < end && slot.tx.resize(end, 0).is_err() {
            return;
        }
        slot.tx[start..end].copy_from_slice(&data[..end - start]);
    }

    fn set_destination(&mut self, socket: SocketId, addr: Ipv4Address) {
        self.slot_mut(socket).dst_addr = addr
    }

    fn set_hop_limit(&mut self, socket: SocketId, hop_limit: u8) {
        self.slot_mut(socket).hop_limit = hop_limit
    }

    fn send(&mut self, socket: SocketId) {
        let fail = self.fail_sends;
        let slot = self.slot_mut(socket);
        let frame = core::mem::take(&mut slot.tx);
        if fail || slot.protocol.is_none() {
            slot.interrupts.insert(Interrupt::TIMEOUT);
            return;
        }
        slot.interrupts.insert(Interrupt::SEND_OK);
        slot.sent = frame.clone();
        self.respond(socket, &frame);
    }

    fn receive_ack(&mut self, socket: SocketId, len: u16) {
        let slot = self.slot_mut(socket);
        let consumed = (len as usize).min(slot.rx.len());
        slot.rx.rotate_left(consumed);
        slot.rx.truncate(slot.rx.len() - consumed);
        slot.rx_base = slot.rx_base.wrapping_add(consumed as u16);
        if slot.rx.is_empty() {
            slot.interrupts.remove(Interrupt::RECV);
        } else {
            slot.interrupts.insert(Interrupt::RECV);
        }
    }

    fn interrupts(&mut self, socket: SocketId) -> Interrupt {
        self.slot(socket).interrupts
    }

    fn clear_interrupts(&mut self, socket: SocketId, mask: Interrupt) {
        let slot = self.slot_mut(socket);
        slot.interrupts.remove(mask);
        // RECV stays asserted while unread data remains.
        if slot.protocol.is_some() && !slot.rx.is_empty() {
            slot.interrupts.insert(Interrupt::RECV);
        }
    }

    fn last_hop_limit(&mut self, socket: SocketId) -> u8 {
        self.slot(socket).last_hop_limit
    }
}
