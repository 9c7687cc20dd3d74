//! Compile-time tunables.

use crate::time::Duration;

/// How long a freshly opened socket may take to report raw-IP mode.
pub const SOCKET_OPEN_TIMEOUT: Duration = Duration::from_millis(10);

/// Upper bound on waiting for the chip's send-complete or timeout flag.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Reply budget used when the caller does not choose one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

pub const DEFAULT_HOP_LIMIT: u8 = 0x80;
pub const DEFAULT_IDENT: u16 = 0x41;
pub const DEFAULT_PAYLOAD_LEN: u16 = 0x20;

/// Hardware sockets of the simulated chip.
pub const LOOPBACK_SOCKET_COUNT: usize = 4;
/// Per-socket transmit and receive memory of the simulated chip, in octets.
pub const LOOPBACK_BUFFER_SIZE: usize = 2048;
pub const LOOPBACK_MAX_HOSTS: usize = 8;
pub const LOOPBACK_MAX_ROUTERS: usize = 16;
