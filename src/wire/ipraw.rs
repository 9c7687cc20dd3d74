//! The info block a raw-IP mode socket puts in front of every received datagram.
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+
//! |          source address           |  data length    |
//! +--------+--------+--------+--------+--------+--------+
//! ```
//!
//! Both fields are in network byte order. The length counts the IP payload
//! that follows, ICMP header included.

use byteorder::{ByteOrder, NetworkEndian};

use super::ipv4::{Address, AddressExt};
use super::{Error, Result};

mod field {
    use crate::wire::field::*;

    pub const SRC_ADDR: Field = 0..4;
    pub const LENGTH: Field = 4..6;
}

pub const INFO_LEN: usize = field::LENGTH.end;

/// A read/write wrapper around a raw-IP info block.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < INFO_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Return the source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        Address::from_bytes(&data[field::SRC_ADDR])
    }

    /// Return the data length field.
    #[inline]
    pub fn len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::LENGTH])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::SRC_ADDR].copy_from_slice(&value.octets())
    }

    #[inline]
    pub fn set_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::LENGTH], value)
    }
}

/// Per-datagram metadata delivered by the chip ahead of the ICMP message.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PacketInfo {
    pub src_addr: Address,
    /// Declared length of the datagram payload, ICMP header included.
    pub len: u16,
}

impl Default for PacketInfo {
    fn default() -> Self {
        PacketInfo {
            src_addr: Address::UNSPECIFIED,
            len: 0,
        }
    }
}

impl PacketInfo {
    pub fn parse<T: AsRef<[u8]> + ?Sized>(packet: &Packet<&T>) -> Result<PacketInfo> {
        packet.check_len()?;
        Ok(PacketInfo {
            src_addr: packet.src_addr(),
            len: packet.len(),
        })
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        packet.set_src_addr(self.src_addr);
        packet.set_len(self.len);
    }

    pub fn to_bytes(&self) -> [u8; INFO_LEN] {
        let mut bytes = [0; INFO_LEN];
        self.emit(&mut Packet::new_unchecked(&mut bytes[..]));
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static INFO_BYTES: [u8; 6] = [192, 168, 0, 77, 0x00, 0x28];

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_checked(&INFO_BYTES[..]).unwrap();
        assert_eq!(packet.src_addr(), Address::new(192, 168, 0, 77));
        assert_eq!(packet.len(), 40);
    }

    #[test]
    fn test_parse_emit() {
        let info = PacketInfo::parse(&Packet::new_unchecked(&INFO_BYTES[..])).unwrap();
        assert_eq!(
            info,
            PacketInfo {
                src_addr: Address::new(192, 168, 0, 77),
                len: 40,
            }
        );
        assert_eq!(info.to_bytes(), INFO_BYTES);
    }

    #[test]
    fn test_parse_truncated() {
        let packet = Packet::new_unchecked(&INFO_BYTES[..5]);
        assert_eq!(PacketInfo::parse(&packet), Err(Error));
    }
}
