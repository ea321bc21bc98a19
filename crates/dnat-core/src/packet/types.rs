//! Packet type definitions

use std::fmt;

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP (protocol number 6)
    Tcp,
    /// UDP (protocol number 17)
    Udp,
    /// ICMP (protocol number 1)
    Icmp,
    /// Any other protocol number
    Other(u8),
}

impl Protocol {
    /// Create from protocol number
    pub fn from_u8(proto: u8) -> Self {
        match proto {
            1 => Protocol::Icmp,
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            other => Protocol::Other(other),
        }
    }

    /// Get protocol number
    pub fn to_u8(self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Other(n) => n,
        }
    }

    /// Whether the protocol carries 16-bit source and destination ports
    pub fn has_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Icmp => f.write_str("ICMP"),
            Protocol::Other(n) => write!(f, "proto-{n}"),
        }
    }
}

/// Transport-level fields that identify a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// TCP or UDP ports
    Ports {
        /// Source port
        src: u16,
        /// Destination port
        dst: u16,
    },
    /// ICMP header fields
    Icmp {
        /// Message type
        icmp_type: u8,
        /// Message code
        code: u8,
        /// Identifier, only for echo request/reply
        echo_id: Option<u16>,
    },
    /// No transport header (other protocols or non-first fragments)
    None,
}

/// ICMP message types with flow identity beyond type/code
pub mod icmp {
    /// Echo reply
    pub const ECHO_REPLY: u8 = 0;
    /// Echo request
    pub const ECHO_REQUEST: u8 = 8;

    /// Whether `icmp_type` carries an echo identifier
    pub fn is_echo(icmp_type: u8) -> bool {
        icmp_type == ECHO_REQUEST || icmp_type == ECHO_REPLY
    }
}
