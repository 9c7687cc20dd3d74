/*! Low-level packet access.

Every protocol here comes in two parts, following the same split:

 * `Packet<T>` is a typed view over a byte buffer that reads and writes fields
   in network byte order without copying;
 * a plain value type (`Header`, `PacketInfo`, `Repr`) is the parsed,
   host-order form that the socket layer works with.

The raw-IP socket of the chip prefixes every received datagram with a small
info block (`ipraw`), followed by the ICMP message itself (`icmpv4`).
*/

use core::fmt;

pub mod checksum;
pub mod icmpv4;
pub mod ip;
pub mod ipraw;
pub mod ipv4;

pub use self::checksum::Accumulator as ChecksumAccumulator;

pub use self::icmpv4::{
    Header as Icmpv4Header, Message as Icmpv4Message, Packet as Icmpv4Packet,
    TimeExceeded as Icmpv4TimeExceeded, HEADER_LEN as ICMPV4_HEADER_LEN,
};

pub use self::ip::Protocol as IpProtocol;

pub use self::ipraw::{Packet as IpRawPacket, PacketInfo as IpRawInfo, INFO_LEN as IPRAW_INFO_LEN};

pub use self::ipv4::{
    Address as Ipv4Address, AddressExt as Ipv4AddressExt, Repr as Ipv4Repr,
    HEADER_LEN as IPV4_HEADER_LEN,
};

mod field {
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

/// Parsing a packet failed.
///
/// Either it is malformed, or it is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;
