/*! ICMP communication over a raw-IP chip socket.

[icmp::Socket] is the packet engine: it sends echo messages and assembles
received datagrams in stages, one poll at a time. [ping::Session] builds the
request/reply exchange on top of it.
*/

pub mod icmp;
pub mod ping;
