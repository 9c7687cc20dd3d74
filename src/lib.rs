/*! ICMP echo (ping) for network chips with hardware raw-IP sockets.

The crate talks to a W5100/W5500-style chip through the [phy::Device] trait
and never touches the IP layer itself: the chip adds and strips IP headers,
while this crate builds and checks the ICMP messages inside them.

 * [wire] has typed views over the ICMP header, the info block the chip puts
   in front of received datagrams, and the Internet checksum.
 * [socket::icmp] sends echo messages and assembles answers incrementally.
 * [socket::ping] runs one ping attempt at a time and classifies the outcome.

Everything is polled. Waits that cannot be avoided, like the chip confirming
a transmission, spin on a [time::Clock] and call its `relax` hook.

The crate is `no_std` with `alloc` unless the `std` feature (on by default)
is enabled; `std` adds [time::StdClock].
*/

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod config;
pub mod phy;
pub mod socket;
pub mod time;
pub mod wire;
