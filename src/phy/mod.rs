/*! Access to the socket engine of a network interface chip.

Chips of the W5100/W5500 family implement sockets in hardware and expose each
one as a small register file plus transmit and receive memory. In raw-IP mode
a socket exchanges bare IP payloads for one protocol number; the chip builds
the IP header on transmit and strips it on receive, replacing it with a
six-octet info block (see [wire::ipraw](crate::wire::ipraw)).

[Device] is the narrow contract the ICMP socket needs from such a chip. It
does no buffering or interpretation of its own; every call maps onto one
register access or command.
*/

use core::{fmt, ops};

use crate::wire::{IpProtocol, Ipv4Address};

mod loopback;

pub use self::loopback::{Full, Loopback};

/// Index of a hardware socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(pub u8);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The socket a protocol engine currently owns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SocketHandle {
    #[default]
    Unset,
    Open(SocketId),
}

impl SocketHandle {
    pub fn socket(&self) -> Option<SocketId> {
        match *self {
            SocketHandle::Open(id) => Some(id),
            SocketHandle::Unset => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SocketHandle::Open(_))
    }
}

/// Socket interrupt flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interrupt(u8);

impl Interrupt {
    pub const NONE: Interrupt = Interrupt(0x00);
    /// Data arrived, or remains after a receive command.
    pub const RECV: Interrupt = Interrupt(0x04);
    /// The chip gave up on a transmission.
    pub const TIMEOUT: Interrupt = Interrupt(0x08);
    /// A send command completed.
    pub const SEND_OK: Interrupt = Interrupt(0x10);
    pub const ALL: Interrupt = Interrupt(0xff);

    /// Whether every flag of `other` is set in `self`.
    pub const fn contains(&self, other: Interrupt) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Interrupt) {
        self.0 |= other.0
    }

    pub fn remove(&mut self, other: Interrupt) {
        self.0 &= !other.0
    }
}

impl ops::BitOr for Interrupt {
    type Output = Interrupt;

    fn bitor(self, rhs: Interrupt) -> Interrupt {
        Interrupt(self.0 | rhs.0)
    }
}

/// The socket operations of a network interface chip.
///
/// All methods take `&mut self`: on real hardware even a register read is a
/// bus transaction. Socket indices are trusted; passing one the chip does not
/// have is a caller bug and may panic.
pub trait Device {
    /// Put `socket` into raw-IP mode for `protocol` and issue the open command.
    fn open_raw(&mut self, socket: SocketId, protocol: IpProtocol);

    /// Whether the socket status register reports raw-IP mode.
    fn is_raw_open(&mut self, socket: SocketId) -> bool;

    /// Cancel all activity on `socket` and close it.
    fn close(&mut self, socket: SocketId);

    /// Octets received and not yet acknowledged.
    fn bytes_available(&mut self, socket: SocketId) -> u16;

    /// The receive read pointer.
    fn read_cursor(&mut self, socket: SocketId) -> u16;

    /// Copy received octets starting at read pointer value `cursor`.
    fn read(&mut self, socket: SocketId, cursor: u16, buf: &mut [u8]);

    /// Copy octets into transmit memory at `offset` from the start of the
    /// next datagram.
    fn write(&mut self, socket: SocketId, offset: u16, data: &[u8]);

    fn set_destination(&mut self, socket: SocketId, addr: Ipv4Address);

    fn set_hop_limit(&mut self, socket: SocketId, hop_limit: u8);

    /// Transmit everything written since the last send.
    fn send(&mut self, socket: SocketId);

    /// Release `len` received octets and issue the receive command.
    fn receive_ack(&mut self, socket: SocketId, len: u16);

    fn interrupts(&mut self, socket: SocketId) -> Interrupt;

    fn clear_interrupts(&mut self, socket: SocketId, mask: Interrupt);

    /// TTL of the most recently received datagram.
    fn last_hop_limit(&mut self, socket: SocketId) -> u8;
}
