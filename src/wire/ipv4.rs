use byteorder::{ByteOrder, NetworkEndian};

pub use core::net::Ipv4Addr as Address;

use super::checksum;
use super::ip::Protocol;
use super::{Error, Result};

pub const ADDR_SIZE: usize = 4;

mod field {
    use crate::wire::field::*;

    pub const VER_IHL: usize = 0;
    pub const LENGTH: Field = 2..4;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: Field = 10..12;
    pub const SRC_ADDR: Field = 12..16;
    pub const DST_ADDR: Field = 16..20;
}

/// Length of an IPv4 header without options.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

pub trait AddressExt {
    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    fn from_bytes(data: &[u8]) -> Self;
}

impl AddressExt for Address {
    fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; ADDR_SIZE];
        bytes.copy_from_slice(data);
        Address::from(bytes)
    }
}

/// A high-level representation of an option-less IPv4 header.
///
/// Only emitted, to quote the offending datagram inside ICMP error messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub next_header: Protocol,
    pub payload_len: usize,
    pub hop_limit: u8,
}

impl Repr {
    /// Emit this representation into the first `HEADER_LEN` octets of `buffer`,
    /// filling in the header checksum.
    pub fn emit(&self, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < HEADER_LEN {
            return Err(Error);
        }
        let header = &mut buffer[..HEADER_LEN];
        header.fill(0);
        header[field::VER_IHL] = 0x45;
        NetworkEndian::write_u16(
            &mut header[field::LENGTH],
            (HEADER_LEN + self.payload_len) as u16,
        );
        header[field::TTL] = self.hop_limit;
        header[field::PROTOCOL] = self.next_header.into();
        header[field::SRC_ADDR].copy_from_slice(&self.src_addr.octets());
        header[field::DST_ADDR].copy_from_slice(&self.dst_addr.octets());
        let sum = checksum::data(header);
        NetworkEndian::write_u16(&mut header[field::CHECKSUM], sum);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_bytes() {
        let addr = Address::from_bytes(&[192, 168, 1, 7]);
        assert_eq!(addr, Address::new(192, 168, 1, 7));
    }

    #[test]
    fn emit_header_with_valid_checksum() {
        let repr = Repr {
            src_addr: Address::new(10, 0, 0, 2),
            dst_addr: Address::new(10, 0, 0, 9),
            next_header: Protocol::Icmp,
            payload_len: 40,
            hop_limit: 1,
        };
        let mut bytes = [0xaa; HEADER_LEN + 4];
        repr.emit(&mut bytes).unwrap();
        assert_eq!(bytes[0], 0x45);
        assert_eq!(&bytes[2..4], &[0x00, 60]);
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 1);
        assert_eq!(checksum::data(&bytes[..HEADER_LEN]), 0);
        assert_eq!(&bytes[HEADER_LEN..], &[0xaa; 4]);
    }

    #[test]
    fn emit_into_short_buffer() {
        let repr = Repr {
            src_addr: Address::UNSPECIFIED,
            dst_addr: Address::UNSPECIFIED,
            next_header: Protocol::Icmp,
            payload_len: 0,
            hop_limit: 64,
        };
        assert_eq!(repr.emit(&mut [0; 19]), Err(Error));
    }
}
