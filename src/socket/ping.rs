/*! Echo request/reply exchanges with one host at a time.

A [Session] drives a single [icmp::Socket] through the whole life of one
ping attempt: it allocates the payload, opens the chip socket, sends the
request and then, poll after poll, waits for the answer and classifies it.
Whatever the outcome, every resource of the attempt is given back as soon
as a terminal [Status] is reached.

```rust,ignore
let mut session = Session::new(SocketId(0));
let config = Config::default().with_timeout(Duration::from_millis(500));
match session.ping(&mut device, &clock, Ipv4Address::new(192, 168, 0, 1), &config) {
    Status::Success => println!("{} ms", session.reply().time.as_millis()),
    status => println!("{}", status),
}
```
*/

use alloc::vec::Vec;
use core::fmt;
use core::task::Poll;

use super::icmp::{self, IncomingPacket};
use crate::config::{DEFAULT_HOP_LIMIT, DEFAULT_IDENT, DEFAULT_PAYLOAD_LEN, DEFAULT_TIMEOUT};
use crate::phy::{Device, SocketId};
use crate::time::{Clock, Duration, Instant};
use crate::wire::{Icmpv4Message, Ipv4Address};

/// Outcome of a ping attempt.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    /// The request is out and no conclusive answer has arrived yet.
    InProgress,
    Success,
    SendTimeout,
    /// Nothing usable arrived in time, or the answer was for someone else.
    ReceiveTimeout,
    SocketError,
    /// The payload buffer could not be allocated.
    NoMemory,
    /// Our echo came back with a different payload size.
    BadResponse,
    /// A router reported that the TTL ran out on the way.
    HopReached,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        *self != Status::InProgress
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::InProgress => write!(f, "in progress"),
            Status::Success => write!(f, "success"),
            Status::SendTimeout => write!(f, "send timeout"),
            Status::ReceiveTimeout => write!(f, "receive timeout"),
            Status::SocketError => write!(f, "socket error"),
            Status::NoMemory => write!(f, "not enough memory"),
            Status::BadResponse => write!(f, "bad response"),
            Status::HopReached => write!(f, "hop reached"),
        }
    }
}

impl From<icmp::Error> for Status {
    fn from(err: icmp::Error) -> Status {
        match err {
            icmp::Error::Socket => Status::SocketError,
            icmp::Error::SendTimeout => Status::SendTimeout,
            icmp::Error::ReceiveTimeout | icmp::Error::BadChecksum => Status::ReceiveTimeout,
        }
    }
}

/// Parameters of one ping attempt.
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Config {
    /// Echo payload size, ICMP header excluded.
    pub payload_len: u16,
    /// Echo identifier. Its low byte is also the payload fill pattern.
    pub ident: u16,
    pub hop_limit: u8,
    /// Time allowed from the start of the attempt until the answer.
    pub timeout: Duration,
}

impl Config {
    pub fn new() -> Config {
        Config {
            payload_len: DEFAULT_PAYLOAD_LEN,
            ident: DEFAULT_IDENT,
            hop_limit: DEFAULT_HOP_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_payload_len(mut self, payload_len: u16) -> Config {
        self.payload_len = payload_len;
        self
    }

    pub fn with_ident(mut self, ident: u16) -> Config {
        self.ident = ident;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Config {
        self.hop_limit = hop_limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Config {
        self.timeout = timeout;
        self
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

/// What came back for the last attempt.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Reply {
    pub msg_type: Icmpv4Message,
    pub code: u8,
    /// Declared payload size of the answer.
    pub payload_len: u16,
    pub src_addr: Ipv4Address,
    /// Time since the attempt started, as of the last poll.
    pub time: Duration,
}

impl Default for Reply {
    fn default() -> Reply {
        Reply {
            msg_type: Icmpv4Message::EchoReply,
            code: 0,
            payload_len: 0,
            src_addr: Ipv4Address::UNSPECIFIED,
            time: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct Attempt {
    engine: icmp::Socket<'static>,
    dst_addr: Ipv4Address,
    ident: u16,
    seq_no: u16,
    payload_len: u16,
    timeout: Duration,
    started_at: Instant,
}

impl Attempt {
    fn classify(&self, incoming: &IncomingPacket<'_>) -> Status {
        let header = &incoming.header;
        match header.msg_type {
            Icmpv4Message::EchoReply => {
                if incoming.info.src_addr != self.dst_addr
                    || header.ident != self.ident
                    || header.seq_no != self.seq_no
                {
                    net_debug!(
                        "ping: echo reply from {} id={} seq={} is not ours",
                        incoming.info.src_addr,
                        header.ident,
                        header.seq_no
                    );
                    Status::ReceiveTimeout
                } else if incoming.payload_len() != self.payload_len {
                    Status::BadResponse
                } else {
                    Status::Success
                }
            }
            Icmpv4Message::TimeExceeded => Status::HopReached,
            other => {
                net_debug!("ping: ignoring {} from {}", other, incoming.info.src_addr);
                Status::InProgress
            }
        }
    }

    /// Drop the assembled datagram and wait for the next one.
    fn restart<D: Device + ?Sized>(&mut self, device: &mut D) -> Status {
        match self.engine.begin_receive(device) {
            Ok(()) => Status::InProgress,
            Err(err) => err.into(),
        }
    }

    fn advance<D, C>(&mut self, device: &mut D, clock: &C, reply: &mut Reply) -> Status
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        reply.time = clock.now() - self.started_at;
        if reply.time >= self.timeout {
            return Status::ReceiveTimeout;
        }

        match self.engine.poll_receive(device) {
            Ok(Poll::Pending) => Status::InProgress,
            Ok(Poll::Ready(())) => {
                let incoming = self.engine.incoming();
                reply.msg_type = incoming.header.msg_type;
                reply.code = incoming.header.code;
                reply.src_addr = incoming.info.src_addr;
                reply.payload_len = incoming.payload_len();
                match self.classify(&incoming) {
                    Status::InProgress => self.restart(device),
                    status => status,
                }
            }
            Err(icmp::Error::BadChecksum) => self.restart(device),
            Err(err) => err.into(),
        }
    }
}

/// A ping client bound to one chip socket.
///
/// Sequence numbers start at zero and advance after every finished attempt.
/// The chip socket is only held while an attempt is in progress; dropping
/// the session frees the payload buffer but cannot reach the chip, so call
/// [release](#method.release) to cancel an attempt early.
#[derive(Debug)]
pub struct Session {
    socket: SocketId,
    seq_no: u16,
    attempt: Option<Attempt>,
    status: Status,
    reply: Reply,
}

impl Session {
    pub fn new(socket: SocketId) -> Session {
        Session {
            socket,
            seq_no: 0,
            attempt: None,
            status: Status::SocketError,
            reply: Reply::default(),
        }
    }

    /// Send an echo request to `dst_addr` and start waiting for the answer.
    ///
    /// A previous attempt still in progress is abandoned. Returns
    /// [Status::InProgress] when the request went out; any other status is
    /// final and nothing is left allocated.
    pub fn start<D, C>(
        &mut self,
        device: &mut D,
        clock: &C,
        dst_addr: Ipv4Address,
        config: &Config,
    ) -> Status
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        self.release(device);
        self.reply = Reply::default();

        self.status = match self.launch(device, clock, dst_addr, config) {
            Ok(attempt) => {
                self.attempt = Some(attempt);
                Status::InProgress
            }
            Err(status) => status,
        };
        net_debug!(
            "ping: {} seq={} started: {}",
            dst_addr,
            self.seq_no,
            self.status
        );
        self.status
    }

    fn launch<D, C>(
        &self,
        device: &mut D,
        clock: &C,
        dst_addr: Ipv4Address,
        config: &Config,
    ) -> Result<Attempt, Status>
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        let len = config.payload_len as usize;
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(len)
            .map_err(|_| Status::NoMemory)?;
        payload.resize(len, config.ident as u8);

        let mut engine = icmp::Socket::new(config.ident, payload);
        engine.open(device, clock, self.socket)?;
        let started_at = clock.now();

        let sent = engine
            .send(
                device,
                clock,
                Icmpv4Message::EchoRequest,
                dst_addr,
                self.seq_no,
                config.hop_limit,
            )
            .and_then(|()| engine.begin_receive(device));
        if let Err(err) = sent {
            engine.close(device);
            return Err(err.into());
        }

        Ok(Attempt {
            engine,
            dst_addr,
            ident: config.ident,
            seq_no: self.seq_no,
            payload_len: config.payload_len,
            timeout: config.timeout,
            started_at,
        })
    }

    /// Check for an answer without blocking.
    ///
    /// Does nothing unless an attempt is in progress. Once the result is
    /// known the attempt is released and the sequence number advances.
    pub fn poll<D, C>(&mut self, device: &mut D, clock: &C) -> Status
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        if self.status != Status::InProgress {
            return self.status;
        }

        let status = match self.attempt.as_mut() {
            Some(attempt) => attempt.advance(device, clock, &mut self.reply),
            None => Status::SocketError,
        };
        if status.is_terminal() {
            net_debug!(
                "ping: seq={} {} after {}ms",
                self.seq_no,
                status,
                self.reply.time.as_millis()
            );
            self.release(device);
            self.seq_no = self.seq_no.wrapping_add(1);
        }
        self.status = status;
        status
    }

    /// Start an attempt and poll it to completion.
    pub fn ping<D, C>(
        &mut self,
        device: &mut D,
        clock: &C,
        dst_addr: Ipv4Address,
        config: &Config,
    ) -> Status
    where
        D: Device + ?Sized,
        C: Clock + ?Sized,
    {
        let mut status = self.start(device, clock, dst_addr, config);
        while status == Status::InProgress {
            clock.relax();
            status = self.poll(device, clock);
        }
        status
    }

    /// Close the chip socket and free the payload of the current attempt.
    ///
    /// The status is left alone; polling a released attempt reports
    /// [Status::SocketError].
    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D) {
        if let Some(mut attempt) = self.attempt.take() {
            attempt.engine.close(device);
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn reply(&self) -> &Reply {
        &self.reply
    }

    /// Sequence number of the current or next request.
    pub fn seq_no(&self) -> u16 {
        self.seq_no
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    /// Whether an attempt currently holds the chip socket.
    pub fn is_active(&self) -> bool {
        self.attempt.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::Loopback;
    use crate::time::TickClock;
    use crate::wire::{Icmpv4Header, Icmpv4Packet, ICMPV4_HEADER_LEN};
    use std::vec;

    const LOCAL: Ipv4Address = Ipv4Address::new(192, 168, 0, 2);
    const REMOTE: Ipv4Address = Ipv4Address::new(192, 168, 0, 77);
    const SOCKET: SocketId = SocketId(1);

    fn chip() -> Loopback {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut chip = Loopback::new(LOCAL);
        chip.add_host(REMOTE).unwrap();
        chip
    }

    fn message(msg_type: Icmpv4Message, ident: u16, seq_no: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0; ICMPV4_HEADER_LEN + payload.len()];
        let mut packet = Icmpv4Packet::new_unchecked(&mut bytes[..]);
        Icmpv4Header::echo(msg_type, ident, seq_no).emit(&mut packet);
        packet.data_mut().copy_from_slice(payload);
        packet.fill_checksum();
        bytes
    }

    /// Start an attempt that the chip will not answer by itself.
    fn start_silent(chip: &mut Loopback, clock: &TickClock, session: &mut Session) {
        chip.set_responding(false);
        let status = session.start(chip, clock, REMOTE, &Config::default());
        assert_eq!(status, Status::InProgress);
        assert!(session.is_active());
    }

    fn poll_to_end(chip: &mut Loopback, clock: &TickClock, session: &mut Session) -> Status {
        loop {
            match session.poll(chip, clock) {
                Status::InProgress => continue,
                status => return status,
            }
        }
    }

    #[test]
    fn status_from_error() {
        assert_eq!(Status::from(icmp::Error::Socket), Status::SocketError);
        assert_eq!(Status::from(icmp::Error::SendTimeout), Status::SendTimeout);
        assert_eq!(
            Status::from(icmp::Error::BadChecksum),
            Status::ReceiveTimeout
        );
        assert!(!Status::InProgress.is_terminal());
        assert!(Status::HopReached.is_terminal());
    }

    #[test]
    fn config_builder() {
        let config = Config::new()
            .with_payload_len(56)
            .with_ident(0x1234)
            .with_hop_limit(3)
            .with_timeout(Duration::from_millis(250));
        assert_eq!(config.payload_len, 56);
        assert_eq!(config.ident, 0x1234);
        assert_eq!(config.hop_limit, 3);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(Config::default().hop_limit, 0x80);
    }

    #[test]
    fn ping_success() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);

        let status = session.ping(&mut chip, &clock, REMOTE, &Config::default());
        assert_eq!(status, Status::Success);

        let request = Icmpv4Packet::new_checked(chip.sent(SOCKET)).unwrap();
        assert_eq!(request.msg_type(), Icmpv4Message::EchoRequest);
        assert_eq!(request.echo_ident(), 0x41);
        assert_eq!(request.echo_seq_no(), 0);
        assert_eq!(request.data(), &[0x41; 32][..]);
        assert!(request.verify_checksum());
        assert_eq!(chip.hop_limit(SOCKET), 0x80);

        let reply = session.reply();
        assert_eq!(reply.msg_type, Icmpv4Message::EchoReply);
        assert_eq!(reply.code, 0);
        assert_eq!(reply.payload_len, 32);
        assert_eq!(reply.src_addr, REMOTE);
        assert!(reply.time < DEFAULT_TIMEOUT);

        assert_eq!(session.seq_no(), 1);
        assert!(!session.is_active());
        assert!(!chip.is_open(SOCKET));
    }

    #[test]
    fn zero_hop_limit_without_routers() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);

        let config = Config::default().with_hop_limit(0);
        assert_eq!(
            session.ping(&mut chip, &clock, REMOTE, &config),
            Status::Success
        );
        assert_eq!(chip.hop_limit(SOCKET), 0);
        assert_eq!(session.reply().src_addr, REMOTE);
    }

    #[test]
    fn reply_time_excludes_socket_open() {
        let mut session = Session::new(SOCKET);

        let mut prompt = chip();
        let clock = TickClock::new(1);
        assert_eq!(
            session.ping(&mut prompt, &clock, REMOTE, &Config::default()),
            Status::Success
        );
        let prompt_time = session.reply().time;

        let mut slow = chip();
        slow.set_open_delay(6);
        let clock = TickClock::new(1);
        assert_eq!(
            session.ping(&mut slow, &clock, REMOTE, &Config::default()),
            Status::Success
        );
        assert_eq!(session.reply().time, prompt_time);
    }

    #[test]
    fn sequence_numbers_advance() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        let config = Config::default().with_ident(0x0102).with_payload_len(5);

        for seq_no in 0..3 {
            assert_eq!(
                session.ping(&mut chip, &clock, REMOTE, &config),
                Status::Success
            );
            let request = Icmpv4Packet::new_checked(chip.sent(SOCKET)).unwrap();
            assert_eq!(request.echo_seq_no(), seq_no);
            assert_eq!(request.data(), &[0x02; 5][..]);
        }
        assert_eq!(session.seq_no(), 3);
    }

    #[test]
    fn no_answer_times_out() {
        let mut chip = chip();
        chip.set_responding(false);
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        let config = Config::default().with_timeout(Duration::from_millis(50));

        assert_eq!(
            session.ping(&mut chip, &clock, REMOTE, &config),
            Status::ReceiveTimeout
        );
        assert!(session.reply().time >= Duration::from_millis(50));
        assert!(!session.is_active());
        assert!(!chip.is_open(SOCKET));
        assert_eq!(session.seq_no(), 1);
        // Terminal status sticks.
        assert_eq!(session.poll(&mut chip, &clock), Status::ReceiveTimeout);
        assert_eq!(session.seq_no(), 1);
    }

    #[test]
    fn foreign_reply_is_not_ours() {
        let cases = [
            (REMOTE, 0x42, 0),
            (REMOTE, 0x41, 1),
            (Ipv4Address::new(10, 0, 0, 1), 0x41, 0),
        ];
        for (src_addr, ident, seq_no) in cases {
            let mut chip = chip();
            let clock = TickClock::new(1);
            let mut session = Session::new(SOCKET);
            start_silent(&mut chip, &clock, &mut session);

            let reply = message(Icmpv4Message::EchoReply, ident, seq_no, &[0x41; 32]);
            chip.inject_datagram(SOCKET, src_addr, &reply).unwrap();
            assert_eq!(
                poll_to_end(&mut chip, &clock, &mut session),
                Status::ReceiveTimeout
            );
            // Decided by the datagram, long before the budget ran out.
            assert!(session.reply().time < DEFAULT_TIMEOUT);
            assert_eq!(session.reply().src_addr, src_addr);
            assert!(!chip.is_open(SOCKET));
        }
    }

    #[test]
    fn payload_size_mismatch() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        start_silent(&mut chip, &clock, &mut session);

        let reply = message(Icmpv4Message::EchoReply, 0x41, 0, &[0x41; 16]);
        chip.inject_datagram(SOCKET, REMOTE, &reply).unwrap();
        assert_eq!(
            poll_to_end(&mut chip, &clock, &mut session),
            Status::BadResponse
        );
        assert_eq!(session.reply().payload_len, 16);
    }

    #[test]
    fn time_exceeded_reaches_hop() {
        let router = Ipv4Address::new(172, 16, 0, 1);
        let mut chip = chip();
        chip.add_router(router).unwrap();
        chip.add_router(Ipv4Address::new(172, 16, 1, 1)).unwrap();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);

        let config = Config::default().with_hop_limit(1);
        assert_eq!(
            session.ping(&mut chip, &clock, REMOTE, &config),
            Status::HopReached
        );
        let reply = session.reply();
        assert_eq!(reply.msg_type, Icmpv4Message::TimeExceeded);
        assert_eq!(reply.src_addr, router);

        let config = Config::default().with_hop_limit(3);
        assert_eq!(
            session.ping(&mut chip, &clock, REMOTE, &config),
            Status::Success
        );
        assert_eq!(session.seq_no(), 2);
    }

    #[test]
    fn other_messages_are_skipped() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        start_silent(&mut chip, &clock, &mut session);

        let unreachable = message(Icmpv4Message::DstUnreachable, 0, 0, &[0; 28]);
        chip.inject_datagram(SOCKET, REMOTE, &unreachable).unwrap();
        let reply = message(Icmpv4Message::EchoReply, 0x41, 0, &[0x41; 32]);
        chip.inject_datagram(SOCKET, REMOTE, &reply).unwrap();

        assert_eq!(
            poll_to_end(&mut chip, &clock, &mut session),
            Status::Success
        );
        assert_eq!(session.reply().msg_type, Icmpv4Message::EchoReply);
    }

    #[test]
    fn corrupted_reply_is_skipped() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        start_silent(&mut chip, &clock, &mut session);

        let mut corrupted = message(Icmpv4Message::EchoReply, 0x41, 0, &[0x41; 32]);
        corrupted[ICMPV4_HEADER_LEN] ^= 0x01;
        chip.inject_datagram(SOCKET, REMOTE, &corrupted).unwrap();
        assert_eq!(
            poll_to_end(&mut chip, &clock, &mut session),
            Status::ReceiveTimeout
        );
        assert!(session.reply().time >= DEFAULT_TIMEOUT);
        assert_eq!(chip.pending(SOCKET), 0);
    }

    #[test]
    fn corrupted_then_valid_reply() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        start_silent(&mut chip, &clock, &mut session);

        let reply = message(Icmpv4Message::EchoReply, 0x41, 0, &[0x41; 32]);
        let mut corrupted = reply.clone();
        corrupted[ICMPV4_HEADER_LEN + 31] = 0;
        chip.inject_datagram(SOCKET, REMOTE, &corrupted).unwrap();
        chip.inject_datagram(SOCKET, REMOTE, &reply).unwrap();
        assert_eq!(
            poll_to_end(&mut chip, &clock, &mut session),
            Status::Success
        );
    }

    #[test]
    fn open_refused() {
        let mut chip = chip();
        chip.set_refuse_open(true);
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);

        assert_eq!(
            session.ping(&mut chip, &clock, REMOTE, &Config::default()),
            Status::SocketError
        );
        assert!(!session.is_active());
        assert_eq!(session.seq_no(), 0);
    }

    #[test]
    fn send_failure() {
        let mut chip = chip();
        chip.set_send_failure(true);
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);

        assert_eq!(
            session.start(&mut chip, &clock, REMOTE, &Config::default()),
            Status::SendTimeout
        );
        assert_eq!(session.status(), Status::SendTimeout);
        assert!(!session.is_active());
        assert!(!chip.is_open(SOCKET));
    }

    #[test]
    fn restart_abandons_previous_attempt() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        start_silent(&mut chip, &clock, &mut session);

        chip.set_responding(true);
        assert_eq!(
            session.ping(&mut chip, &clock, REMOTE, &Config::default()),
            Status::Success
        );
        assert_eq!(session.seq_no(), 1);
    }

    #[test]
    fn release_cancels() {
        let mut chip = chip();
        let clock = TickClock::new(1);
        let mut session = Session::new(SOCKET);
        start_silent(&mut chip, &clock, &mut session);

        session.release(&mut chip);
        assert!(!session.is_active());
        assert!(!chip.is_open(SOCKET));
        assert_eq!(session.poll(&mut chip, &clock), Status::SocketError);
    }
}
