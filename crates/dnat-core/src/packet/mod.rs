//! Packet classification
//!
//! Extracts the fields the redirector keys flows on from a raw IPv4 datagram
//! as delivered by the kernel packet queue.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// Minimum IPv4 header length
pub const IPV4_HEADER_LEN: usize = 20;

/// A queued packet reduced to its flow identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassifiedPacket {
    /// Transport protocol
    pub protocol: Protocol,
    /// Source address
    pub src_addr: Ipv4Addr,
    /// Destination address
    pub dst_addr: Ipv4Addr,
    /// Ports or ICMP fields
    pub transport: Transport,
}

impl ClassifiedPacket {
    /// Classify a raw IPv4 datagram
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < IPV4_HEADER_LEN {
            return Err(Error::PacketTooSmall {
                expected: IPV4_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = data[0] >> 4;
        if version != 4 {
            return Err(Error::packet_parse_at(format!("Unsupported IP version: {version}"), 0));
        }

        let header_len = usize::from(data[0] & 0x0F) * 4;
        if header_len < IPV4_HEADER_LEN {
            return Err(Error::packet_parse_at(format!("Invalid IHL: {header_len} bytes"), 0));
        }
        if data.len() < header_len {
            return Err(Error::PacketTooSmall {
                expected: header_len,
                actual: data.len(),
            });
        }

        let protocol = Protocol::from_u8(data[9]);
        let src_addr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let dst_addr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

        // Only the first fragment carries the transport header
        let fragment_offset = u16::from_be_bytes([data[6], data[7]]) & 0x1FFF;
        let transport = if fragment_offset == 0 {
            parse_transport(protocol, &data[header_len..], header_len)?
        } else {
            Transport::None
        };

        Ok(Self {
            protocol,
            src_addr,
            dst_addr,
            transport,
        })
    }

    /// Build a TCP or UDP packet description
    pub fn with_ports(
        protocol: Protocol,
        src_addr: Ipv4Addr,
        src_port: u16,
        dst_addr: Ipv4Addr,
        dst_port: u16,
    ) -> Self {
        Self {
            protocol,
            src_addr,
            dst_addr,
            transport: Transport::Ports {
                src: src_port,
                dst: dst_port,
            },
        }
    }

    /// Source port for TCP/UDP
    pub fn src_port(&self) -> Option<u16> {
        match self.transport {
            Transport::Ports { src, .. } => Some(src),
            _ => None,
        }
    }

    /// Destination port for TCP/UDP
    pub fn dst_port(&self) -> Option<u16> {
        match self.transport {
            Transport::Ports { dst, .. } => Some(dst),
            _ => None,
        }
    }
}

fn parse_transport(protocol: Protocol, segment: &[u8], offset: usize) -> Result<Transport> {
    match protocol {
        Protocol::Tcp | Protocol::Udp => {
            if segment.len() < 4 {
                return Err(Error::PacketTooSmall {
                    expected: offset + 4,
                    actual: offset + segment.len(),
                });
            }
            Ok(Transport::Ports {
                src: u16::from_be_bytes([segment[0], segment[1]]),
                dst: u16::from_be_bytes([segment[2], segment[3]]),
            })
        }
        Protocol::Icmp => {
            if segment.len() < 2 {
                return Err(Error::PacketTooSmall {
                    expected: offset + 2,
                    actual: offset + segment.len(),
                });
            }
            let icmp_type = segment[0];
            let echo_id = if icmp::is_echo(icmp_type) {
                if segment.len() < 6 {
                    return Err(Error::packet_parse_at("Truncated ICMP echo header", offset));
                }
                Some(u16::from_be_bytes([segment[4], segment[5]]))
            } else {
                None
            };
            Ok(Transport::Icmp {
                icmp_type,
                code: segment[1],
                echo_id,
            })
        }
        Protocol::Other(_) => Ok(Transport::None),
    }
}

/// Renders `addr[:port]` for connection log lines
pub struct Endpoint(pub Ipv4Addr, pub Option<u16>);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            Some(port) => write!(f, "{}:{}", self.0, port),
            None => write!(f, "{}", self.0),
        }
    }
}
