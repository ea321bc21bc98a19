//! Integration tests for packet classification
//!
//! These tests feed raw datagrams, as the kernel queue delivers them, through
//! classification and on into the redirector.

use dnat_core::packet::*;
use dnat_core::redirect::{ConntrackInjector, RedirectOutcome, Redirector};
use dnat_core::table::DynamicTable;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test data: minimal valid IPv4 TCP SYN packet to a synthetic address
fn create_tcp_syn_packet() -> Vec<u8> {
    vec![
        // IPv4 header (20 bytes)
        0x45, 0x00, 0x00, 0x28, // Version, IHL, DSCP, ECN, Total Length (40)
        0x00, 0x01, 0x40, 0x00, // Identification, Flags (DF), Fragment Offset
        0x40, 0x06, 0x00, 0x00, // TTL (64), Protocol (TCP), Checksum
        0xC0, 0xA8, 0x01, 0x05, // Source IP: 192.168.1.5
        0x0A, 0x40, 0x00, 0x00, // Dest IP: 10.64.0.0
        // TCP header (20 bytes)
        0x9C, 0x40, 0x01, 0xBB, // Src Port (40000), Dst Port (443)
        0x00, 0x00, 0x00, 0x01, // Sequence Number
        0x00, 0x00, 0x00, 0x00, // Acknowledgment Number
        0x50, 0x02, 0xFF, 0xFF, // Data Offset, SYN flag, Window Size
        0x00, 0x00, 0x00, 0x00, // Checksum, Urgent Pointer
    ]
}

/// Test data: ICMP echo request with identifier 0x1234
fn create_icmp_echo_packet() -> Vec<u8> {
    vec![
        0x45, 0x00, 0x00, 0x1C, 0x00, 0x02, 0x00, 0x00, 0x40, 0x01, 0x00, 0x00, // IPv4, ICMP
        0xC0, 0xA8, 0x01, 0x05, // Source IP: 192.168.1.5
        0x0A, 0x40, 0x00, 0x00, // Dest IP: 10.64.0.0
        0x08, 0x00, 0x00, 0x00, // Type 8, Code 0, Checksum
        0x12, 0x34, 0x00, 0x01, // Identifier, Sequence
    ]
}

#[derive(Default)]
struct RecordingConntrack {
    created: Mutex<Vec<(ClassifiedPacket, Ipv4Addr)>>,
}

impl ConntrackInjector for &RecordingConntrack {
    fn exists(&self, flow: &ClassifiedPacket) -> dnat_core::Result<bool> {
        Ok(self.created.lock().unwrap().iter().any(|(f, _)| f == flow))
    }

    fn create(&self, flow: &ClassifiedPacket, real: Ipv4Addr, _timeout: Duration) -> dnat_core::Result<()> {
        self.created.lock().unwrap().push((*flow, real));
        Ok(())
    }
}

// ============ Classification Tests ============

#[test]
fn test_classify_tcp_syn() {
    let packet = ClassifiedPacket::from_bytes(&create_tcp_syn_packet()).unwrap();
    assert_eq!(packet.protocol, Protocol::Tcp);
    assert_eq!(packet.src_addr, Ipv4Addr::new(192, 168, 1, 5));
    assert_eq!(packet.dst_addr, Ipv4Addr::new(10, 64, 0, 0));
    assert_eq!(packet.src_port(), Some(40000));
    assert_eq!(packet.dst_port(), Some(443));
}

#[test]
fn test_classify_with_ip_options() {
    // IHL 6: one word of options shifts the TCP header
    let mut data = create_tcp_syn_packet();
    data[0] = 0x46;
    data.splice(20..20, [0x01, 0x01, 0x01, 0x00]);
    let packet = ClassifiedPacket::from_bytes(&data).unwrap();
    assert_eq!(packet.dst_port(), Some(443));
}

#[test]
fn test_classify_icmp_echo() {
    let packet = ClassifiedPacket::from_bytes(&create_icmp_echo_packet()).unwrap();
    assert_eq!(packet.protocol, Protocol::Icmp);
    assert_eq!(
        packet.transport,
        Transport::Icmp {
            icmp_type: icmp::ECHO_REQUEST,
            code: 0,
            echo_id: Some(0x1234),
        }
    );
    assert_eq!(packet.src_port(), None);
}

#[test]
fn test_later_fragment_has_no_transport() {
    let mut data = create_tcp_syn_packet();
    data[6] = 0x00;
    data[7] = 0x10; // offset 16 * 8 bytes
    let packet = ClassifiedPacket::from_bytes(&data).unwrap();
    assert_eq!(packet.transport, Transport::None);
    assert_eq!(packet.dst_addr, Ipv4Addr::new(10, 64, 0, 0));
}

#[test]
fn test_rejects_ipv6_and_truncation() {
    let mut data = create_tcp_syn_packet();
    data[0] = 0x60;
    assert!(ClassifiedPacket::from_bytes(&data).is_err());

    let data = create_tcp_syn_packet();
    assert!(ClassifiedPacket::from_bytes(&data[..22]).is_err());
    assert!(ClassifiedPacket::from_bytes(&data[..12]).is_err());
}

#[test]
fn test_endpoint_display() {
    assert_eq!(Endpoint(Ipv4Addr::new(10, 0, 0, 1), Some(80)).to_string(), "10.0.0.1:80");
    assert_eq!(Endpoint(Ipv4Addr::new(10, 0, 0, 1), None).to_string(), "10.0.0.1");
}

// ============ Classification to Redirection ============

#[test]
fn test_raw_packets_redirected_once_per_flow() {
    let table = Arc::new(DynamicTable::new("10.64.0.0/16".parse().unwrap()));
    let real = Ipv4Addr::new(93, 184, 216, 34);
    assert_eq!(table.reverse_lookup_or_allocate(real), Ipv4Addr::new(10, 64, 0, 0));

    let conntrack = RecordingConntrack::default();
    let mut redirector = Redirector::new(table, &conntrack, Duration::from_secs(120));

    let syn = ClassifiedPacket::from_bytes(&create_tcp_syn_packet()).unwrap();
    assert_eq!(redirector.handle(&syn), RedirectOutcome::Installed(real));
    assert_eq!(redirector.handle(&syn), RedirectOutcome::AlreadyTracked(real));

    let echo = ClassifiedPacket::from_bytes(&create_icmp_echo_packet()).unwrap();
    assert_eq!(redirector.handle(&echo), RedirectOutcome::Installed(real));

    let created = conntrack.created.lock().unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|(_, r)| *r == real));
}
